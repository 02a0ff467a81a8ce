//! Port traits: the hexagonal boundary between connection management and
//! the radio stack.
//!
//! ```text
//!   BleLink (adapter) ──▶ LinkObserver ──▶ ConnectionManager (domain)
//!   ConnectionManager ──▶ LinkController ──▶ BleLink (adapter)
//! ```
//!
//! The domain never touches the Bluetooth stack directly, so the whole
//! admission state machine runs against test doubles on the host.

use std::sync::Arc;

use crate::gap::{AdvertisingPayload, ConnectOutcome, PeerHandle};

// ───────────────────────────────────────────────────────────────
// Link controller (driven adapter: domain → radio stack)
// ───────────────────────────────────────────────────────────────

/// Command side of the radio stack.
pub trait LinkController: Send + Sync {
    /// Register the single lifecycle subscriber.  A second registration
    /// must fail with [`SubscribeError::AlreadySubscribed`].
    fn subscribe(&self, observer: Arc<dyn LinkObserver>) -> Result<(), SubscribeError>;

    /// Start connectable advertising with the given payloads.
    fn advertise_start(&self, payload: &AdvertisingPayload) -> Result<(), AdvertiseError>;

    /// Take a reference on a peer connection object.
    fn retain(&self, peer: PeerHandle);

    /// Drop a reference taken with [`retain`](Self::retain).
    fn release(&self, peer: PeerHandle);
}

/// Shared controllers: the stack callbacks and the manager both hold one.
impl<T: LinkController + ?Sized> LinkController for Arc<T> {
    fn subscribe(&self, observer: Arc<dyn LinkObserver>) -> Result<(), SubscribeError> {
        (**self).subscribe(observer)
    }

    fn advertise_start(&self, payload: &AdvertisingPayload) -> Result<(), AdvertiseError> {
        (**self).advertise_start(payload)
    }

    fn retain(&self, peer: PeerHandle) {
        (**self).retain(peer);
    }

    fn release(&self, peer: PeerHandle) {
        (**self).release(peer);
    }
}

// ───────────────────────────────────────────────────────────────
// Link observer (driving adapter: radio stack → domain)
// ───────────────────────────────────────────────────────────────

/// Lifecycle notifications delivered from stack callback contexts.
///
/// Implementations must not block: these run at stack priority, possibly
/// in interrupt-like contexts.
pub trait LinkObserver: Send + Sync {
    fn on_connected(&self, peer: PeerHandle, outcome: ConnectOutcome);

    fn on_disconnected(&self, peer: PeerHandle, reason: u8);

    fn on_slot_recycled(&self);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`LinkController::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeError {
    AlreadySubscribed,
}

/// Errors from [`LinkController::advertise_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseError {
    /// No free connection object or advertising set in the stack.
    NoResources,
    /// The controller rejected the parameters or the request.
    Rejected(i32),
    /// The stack is not enabled.
    NotReady,
}

impl core::fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadySubscribed => write!(f, "lifecycle subscriber already registered"),
        }
    }
}

impl core::fmt::Display for AdvertiseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoResources => write!(f, "no resources"),
            Self::Rejected(code) => write!(f, "rejected ({})", code),
            Self::NotReady => write!(f, "stack not ready"),
        }
    }
}
