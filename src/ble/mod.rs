//! Bluetooth Low Energy subsystem.
//!
//! The die runs in **Peripheral** role with a single central link:
//!
//! 1. **Registry** - fixed-capacity subscriber lists for connection and
//!    RSSI events.
//! 2. **Advertising** - renders the sensor snapshot and device identity
//!    into the advertisement and scan response payloads.
//! 3. **Notify** - single-in-flight, acknowledgment-gated notification path.
//! 4. **Session** - the connection/advertising state machine; the only
//!    place radio-stack events are interpreted.
//!
//! The radio stack itself sits behind [`radio::Radio`].

pub mod adv_builder;
pub mod advertising;
pub mod conn_params;
pub mod notify;
pub mod radio;
pub mod registry;
pub mod session;

pub use advertising::{AdvertisedState, PayloadComposer};
pub use notify::{NotificationChannel, SendError};
pub use radio::{AdvMode, ConnHandle, ConnParams, Radio, RadioEvent};
pub use registry::{ConnectionHandler, EventRegistry, RssiHandler, Token};
pub use session::{LinkState, Session};
