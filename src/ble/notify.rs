//! Flow-controlled notification channel.
//!
//! At most one notification is in flight.  A send while one is pending is
//! refused with [`SendError::Busy`] and never queued; the channel clears
//! when the stack reports the notification sent (tx-complete or peer
//! confirmation) or when the stack rejects the send synchronously.

use crate::ble::radio::{ConnHandle, Radio};
use crate::error::RawError;

/// Why a send did not go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// No central is attached.
    NotConnected,
    /// A notification is still in flight; retry once [`NotificationChannel::can_send`].
    Busy,
    /// The stack refused the notification. No completion will follow.
    Rejected(RawError),
}

/// The notification currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingNotification {
    pub conn: ConnHandle,
    pub attr_handle: u16,
    pub len: usize,
}

/// Single-slot notification gate.
#[derive(Debug, Default)]
pub struct NotificationChannel {
    pending: Option<PendingNotification>,
}

impl NotificationChannel {
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// True exactly when nothing is pending.
    pub fn can_send(&self) -> bool {
        self.pending.is_none()
    }

    pub fn pending(&self) -> Option<&PendingNotification> {
        self.pending.as_ref()
    }

    /// Notify `data` on `attr_handle` over `conn`.
    ///
    /// `conn` is the session's current link, `None` when disconnected.
    pub fn send<R: Radio>(
        &mut self,
        radio: &mut R,
        conn: Option<ConnHandle>,
        attr_handle: u16,
        data: &[u8],
    ) -> Result<(), SendError> {
        let conn = conn.ok_or(SendError::NotConnected)?;
        if self.pending.is_some() {
            return Err(SendError::Busy);
        }

        self.pending = Some(PendingNotification {
            conn,
            attr_handle,
            len: data.len(),
        });

        if let Err(e) = radio.notify(conn, attr_handle, data) {
            self.pending = None;
            error!(
                "notify rejected: type={=u8} len={=usize} err={=u32:#x}",
                data.first().copied().unwrap_or(0),
                data.len(),
                e.0
            );
            return Err(SendError::Rejected(e));
        }
        Ok(())
    }

    /// The stack reported the pending notification as sent.
    ///
    /// Returns whether anything was pending.
    pub fn complete(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Drop any pending state (the link went away).
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
