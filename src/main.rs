//! Smart die BLE firmware for the nRF52840 (SoftDevice S140).
//!
//! Boot order: HAL with SoftDevice-compatible interrupt priorities,
//! SoftDevice enable, GATT server, session init (fatal on failure),
//! then the task set from [`nrf`] and fast advertising.

#![no_std]
#![no_main]

mod nrf;

use defmt::{info, unwrap};
use dice_ble::config::{ATT_MTU_MAX, MAX_DEVICE_NAME_LEN, MAX_LINKS, StackConfig};
use dice_ble::Session;
use embassy_executor::Spawner;
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::saadc::{self, ChannelConfig, Saadc};
use embassy_nrf::bind_interrupts;
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use nrf::board::DieBoard;
use nrf::gatt::Server;
use nrf::radio::{AdvBuffers, SoftdeviceRadio};

/// Name used until the settings store provides one.
const DEFAULT_NAME: &str = "Dice";
const DEFAULT_DESIGN_AND_COLOR: u8 = 0;
const LED_COUNT: u8 = 21;

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
});

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_LINKS as u8,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: ATT_MTU_MAX,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: MAX_LINKS as u8,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEFAULT_NAME.as_ptr() as _,
            current_len: DEFAULT_NAME.len() as u16,
            max_len: MAX_DEVICE_NAME_LEN as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("dice-ble starting");

    // SoftDevice reserves priorities 0, 1 and 4
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    // battery sense divider on AIN1
    interrupt::SAADC.set_priority(Priority::P3);
    let vbat = ChannelConfig::single_ended(p.P0_03);
    let adc = Saadc::new(p.SAADC, Irqs, saadc::Config::default(), [vbat]);

    let sd = Softdevice::enable(&softdevice_config());

    static SERVER: StaticCell<Server> = StaticCell::new();
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));

    unwrap!(spawner.spawn(nrf::softdevice_task(sd)));

    static ADV_BUFFERS: StaticCell<AdvBuffers> = StaticCell::new();
    let radio = SoftdeviceRadio::new(ADV_BUFFERS.init(AdvBuffers::new()));
    let board = DieBoard::new(DEFAULT_NAME, DEFAULT_DESIGN_AND_COLOR, LED_COUNT);

    let mut session = Session::new(radio, board, StackConfig::default());
    unwrap!(session.init());
    nrf::install(session);

    unwrap!(spawner.spawn(nrf::ble_task(sd, server)));
    unwrap!(spawner.spawn(nrf::tick_task()));
    unwrap!(spawner.spawn(nrf::rssi_task()));
    unwrap!(spawner.spawn(nrf::tx_task()));
    unwrap!(spawner.spawn(nrf::outbound_task(server)));
    unwrap!(spawner.spawn(nrf::roll_task()));
    unwrap!(spawner.spawn(nrf::battery_task(adc)));

    if let Some(Err(e)) = nrf::with_session(|s| s.start_advertising()) {
        defmt::panic!("advertising start failed: {}", e);
    }
    info!("advertising");
}
