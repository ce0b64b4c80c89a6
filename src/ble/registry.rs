//! Fixed-capacity, ordered subscriber lists.
//!
//! Each entry pairs an opaque correlation [`Token`] with a handler.
//! Registration order is dispatch order, registration beyond capacity
//! fails instead of dropping an entry, and removal works either by
//! handler or by token.  Handlers are compared by identity.

use heapless::Vec;

/// Caller-supplied correlation key, handed back to the handler on every
/// dispatch. The registry never interprets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Token(pub usize);

/// Connection events: `(token, connected)`.
pub type ConnectionHandler = fn(Token, bool);

/// RSSI samples: `(token, rssi_dbm, channel_index)`.
pub type RssiHandler = fn(Token, i8, u8);

#[derive(Clone, Copy)]
struct Subscription<H> {
    token: Token,
    handler: H,
}

/// Ordered set of at most `N` subscriptions.
pub struct EventRegistry<H, const N: usize> {
    entries: Vec<Subscription<H>, N>,
}

impl<H: Copy + PartialEq, const N: usize> EventRegistry<H, N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a subscription. Returns `false` when the registry is full.
    pub fn register(&mut self, token: Token, handler: H) -> bool {
        self.entries.push(Subscription { token, handler }).is_ok()
    }

    /// Remove the first entry with this handler. Returns whether one was
    /// removed; removing an unknown handler is a no-op.
    pub fn unregister_handler(&mut self, handler: H) -> bool {
        match self.entries.iter().position(|s| s.handler == handler) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the first entry with this token.
    pub fn unregister_token(&mut self, token: Token) -> bool {
        match self.entries.iter().position(|s| s.token == token) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Call `f` for every subscription in registration order.
    ///
    /// Iterates a snapshot taken before the first call, so entries added
    /// or removed by a handler only take effect on the next dispatch.
    pub fn dispatch(&self, mut f: impl FnMut(Token, H)) {
        let snapshot = self.entries.clone();
        for entry in snapshot.iter() {
            f(entry.token, entry.handler);
        }
    }
}

impl<H: Copy + PartialEq, const N: usize> Default for EventRegistry<H, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
