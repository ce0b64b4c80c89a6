//! GATT layout of the die.
//!
//! One custom service carrying the companion-app message stream:
//! the app writes requests to `rx` and subscribes to `tx`, which the
//! session notifies through its flow-controlled channel.

/// Largest message the die notifies (default ATT MTU minus 3).
pub const MAX_MESSAGE_LEN: usize = 20;

#[nrf_softdevice::gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct DieService {
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write, write_without_response)]
    pub rx: heapless::Vec<u8, MAX_MESSAGE_LEN>,
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", read, notify)]
    pub tx: heapless::Vec<u8, MAX_MESSAGE_LEN>,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub die: DieService,
}
