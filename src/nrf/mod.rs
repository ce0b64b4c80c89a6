//! nRF52840 + SoftDevice S140 bindings for the session.
//!
//! The session lives in a critical-section mutex, so radio events, timer
//! ticks and sensor producers all mutate it from one priority level.
//! Tasks:
//!
//! 1. **BLE** - advertises on request and runs the GATT server for the
//!    lifetime of each connection, turning both into [`RadioEvent`]s.
//! 2. **Tick** - drives connection parameter negotiation.
//! 3. **RSSI** - samples the link while RSSI reporting is on.
//! 4. **TX** - reports notification completion one connection interval
//!    after each accepted notification.
//! 5. **Outbound** - drains [`OUTBOUND`] into the notification channel,
//!    retrying while it is busy.
//! 6. **Roll** - forwards readings posted to [`ROLL_CHANGED`] by the
//!    accelerometer face detector.
//! 7. **Battery** - samples the cell voltage through the SAADC.

pub mod board;
pub mod gatt;
pub mod radio;

use core::cell::RefCell;

use defmt::{debug, info, warn};
use dice_ble::ble::radio::{hci, ConnHandle};
use dice_ble::ble::{RadioEvent, SendError};
use dice_ble::board::{battery_level_from_millivolts, RollReading};
use dice_ble::Session;
use embassy_futures::select::{select, Either};
use embassy_nrf::saadc::Saadc;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use heapless::Vec;
use nrf_softdevice::ble::gatt_server;
use nrf_softdevice::ble::peripheral::{self, AdvertiseError, ConnectableAdvertisement};
use nrf_softdevice::Softdevice;

use board::DieBoard;
use gatt::{DieServiceEvent, Server, ServerEvent, MAX_MESSAGE_LEN};
use radio::{AdvCommand, SoftdeviceRadio, ADV_CONTROL, TX_QUEUED};

pub type DieSession = Session<SoftdeviceRadio, DieBoard>;

static SESSION: Mutex<CriticalSectionRawMutex, RefCell<Option<DieSession>>> =
    Mutex::new(RefCell::new(None));

/// Messages waiting to be notified to the companion app.
pub static OUTBOUND: Channel<CriticalSectionRawMutex, Vec<u8, MAX_MESSAGE_LEN>, 4> = Channel::new();

/// Latest reading from the accelerometer face detector. The detector
/// signals here on every roll-state or face change.
pub static ROLL_CHANGED: Signal<CriticalSectionRawMutex, RollReading> = Signal::new();

/// Battery sampling period.
const BATTERY_POLL: Duration = Duration::from_secs(10);

/// Poll period for RSSI sampling.
const RSSI_POLL: Duration = Duration::from_millis(500);

/// Tick period for connection parameter negotiation.
const TICK: Duration = Duration::from_millis(250);

/// Retry delay while the notification channel is busy.
const SEND_RETRY: Duration = Duration::from_millis(5);

/// Install the initialised session.
pub fn install(session: DieSession) {
    SESSION.lock(|cell| cell.replace(Some(session)));
}

/// Run `f` against the session. Returns `None` before [`install`].
pub fn with_session<T>(f: impl FnOnce(&mut DieSession) -> T) -> Option<T> {
    SESSION.lock(|cell| cell.borrow_mut().as_mut().map(f))
}

#[embassy_executor::task]
pub async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
pub async fn ble_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    loop {
        let params = match ADV_CONTROL.wait().await {
            AdvCommand::Start(params) => params,
            AdvCommand::Stop => continue,
        };
        let Some((adv_data, scan_data, tx_power)) = with_session(|s| {
            let (adv, scan) = s.radio().adv_data();
            (adv, scan, s.radio().tx_power())
        }) else {
            continue;
        };

        let config = peripheral::Config {
            interval: params.interval,
            timeout: (params.duration != 0).then_some(params.duration),
            tx_power,
            ..Default::default()
        };
        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data,
            scan_data: &scan_data,
        };

        let conn = match select(
            peripheral::advertise_connectable(sd, adv, &config),
            ADV_CONTROL.wait(),
        )
        .await
        {
            Either::First(Ok(conn)) => conn,
            Either::First(Err(AdvertiseError::Timeout)) => {
                with_session(|s| {
                    s.radio_mut().advertising_ended();
                    s.handle_event(RadioEvent::AdvertisingTimeout);
                });
                continue;
            }
            Either::First(Err(e)) => {
                warn!("advertising failed: {:?}", e);
                with_session(|s| s.radio_mut().advertising_ended());
                continue;
            }
            // dropping the advertising future stops the radio
            Either::Second(AdvCommand::Start(params)) => {
                ADV_CONTROL.signal(AdvCommand::Start(params));
                continue;
            }
            Either::Second(AdvCommand::Stop) => continue,
        };

        let Some(handle) = conn.handle() else {
            continue;
        };
        let handle = ConnHandle(handle);
        let params = radio::from_raw(&conn.conn_params());
        with_session(|s| {
            s.radio_mut().attach(handle);
            s.handle_event(RadioEvent::Connected {
                conn: handle,
                params,
            });
        });

        let e = gatt_server::run(&conn, server, |e| match e {
            ServerEvent::Die(DieServiceEvent::RxWrite(data)) => {
                debug!("rx: {} bytes", data.len());
            }
            ServerEvent::Die(DieServiceEvent::TxCccdWrite { notifications }) => {
                info!("tx notifications: {}", notifications);
            }
        })
        .await;
        info!("gatt server exited: {:?}", e);

        with_session(|s| {
            s.radio_mut().detach();
            // the wrapper does not surface the HCI reason
            s.handle_event(RadioEvent::Disconnected {
                conn: handle,
                reason: hci::REMOTE_USER_TERMINATED_CONNECTION,
            });
        });
    }
}

#[embassy_executor::task]
pub async fn tick_task() -> ! {
    loop {
        Timer::after(TICK).await;
        let now = Instant::now().as_millis();
        with_session(|s| s.on_tick(now));
    }
}

#[embassy_executor::task]
pub async fn rssi_task() -> ! {
    loop {
        Timer::after(RSSI_POLL).await;
        with_session(|s| {
            if let Some(event) = s.radio_mut().poll_rssi() {
                s.handle_event(event);
            }
        });
    }
}

#[embassy_executor::task]
pub async fn tx_task() -> ! {
    loop {
        let conn = TX_QUEUED.wait().await;
        // 1.25 ms units
        let interval = with_session(|s| s.config().preferred_conn_params.max_interval).unwrap_or(160);
        Timer::after(Duration::from_micros(interval as u64 * 1250)).await;
        with_session(|s| {
            s.handle_event(RadioEvent::NotificationTxComplete { conn, count: 1 })
        });
    }
}

#[embassy_executor::task]
pub async fn outbound_task(server: &'static Server) -> ! {
    let attr_handle = server.die.tx_value_handle;
    loop {
        let message = OUTBOUND.receive().await;
        loop {
            match with_session(|s| s.send(attr_handle, &message)) {
                Some(Err(SendError::Busy)) => Timer::after(SEND_RETRY).await,
                Some(Err(e)) => {
                    warn!("dropping message: {:?}", e);
                    break;
                }
                _ => break,
            }
        }
    }
}

#[embassy_executor::task]
pub async fn roll_task() -> ! {
    loop {
        let reading = ROLL_CHANGED.wait().await;
        board::publish_roll(reading);
    }
}

#[embassy_executor::task]
pub async fn battery_task(mut saadc: Saadc<'static, 1>) -> ! {
    saadc.calibrate().await;
    loop {
        let mut sample = [0i16; 1];
        saadc.sample(&mut sample).await;
        let mv = board::vbat_millivolts(sample[0]);
        debug!("battery: {=u32} mV", mv);
        board::publish_battery(battery_level_from_millivolts(mv));
        Timer::after(BATTERY_POLL).await;
    }
}
