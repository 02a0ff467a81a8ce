//! Connection management for the Environmental Sensing Profile (GAP role).
//!
//! Decides *when* connectable advertising runs and *how many* peer
//! connections may be outstanding, over a fixed pool of connection slots
//! owned by the radio stack.
//!
//! ```text
//!  ┌──────────────┐ on_connected     ┌────────────┐      ┌──────────┐
//!  │ LinkController│ on_disconnected ▶│ EventQueue │─────▶│  Worker  │
//!  │ (radio stack) │ on_slot_recycled └────────────┘      └────┬─────┘
//!  └──────▲───────┘                                          │ acquire_wait
//!         │ advertise_start        ┌─────────────────────┐   ▼
//!         └────────────────────────│  ConnectionManager  │◀──┘
//!                                  │ flags · slots       │
//!  start_advertising() ──try_acquire▶ AdmissionLock      │──▶ StateChangedFn
//!                                  └─────────────────────┘
//! ```
//!
//! ## Flags layout
//!
//! | Bits   | Range         | Meaning                                   |
//! |--------|---------------|-------------------------------------------|
//! | 0–15   | configuration | set once at construction (`CFG_*`)        |
//! | 16–23  | state         | advertising / connected (`STATE_*`)       |
//! | 24–31  | error         | sticky until the next successful start    |

pub mod lock;
pub mod manager;
pub mod payload;
pub mod queue;
pub mod worker;

pub use manager::{ConnectionManager, StateChangedFn};
pub use payload::AdvertisingPayload;

use core::fmt;

// ───────────────────────────────────────────────────────────────
// Flags
// ───────────────────────────────────────────────────────────────

/// Bitmask for configuration flags.
pub const CFG_BITMASK: u32 = 0x0000_ffff;

/// Configuration flag, automatically resume advertising.
pub const CFG_ADV_AUTO: u32 = 1 << 0;

/// Bitmask for state flags.
pub const STATE_BITMASK: u32 = 0xffff_0000;

/// State flag, advertising connectable.
pub const STATE_ADV_CONN: u32 = 1 << 16;

/// State flag, connected to at least one central.
pub const STATE_CONNECTED: u32 = 1 << 17;

/// Bitmask for error flags (subset of state flags).
pub const ERROR_BITMASK: u32 = 0xff00_0000;

/// Error state flag, BLE advertising down.
pub const STATE_ADV_DOWN: u32 = 1 << 24;

// ───────────────────────────────────────────────────────────────
// Link lifecycle types
// ───────────────────────────────────────────────────────────────

/// Opaque handle of a peer connection, as assigned by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(pub u16);

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Result of a connection attempt reported by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Success,
    /// HCI status code of the failed attempt.
    Failed(u8),
}

impl ConnectOutcome {
    /// Map a raw HCI status (0 = success) to an outcome.
    pub const fn from_hci(status: u8) -> Self {
        if status == 0 {
            Self::Success
        } else {
            Self::Failed(status)
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Connection lifecycle event, produced in stack callback contexts and
/// consumed by the GAP worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected {
        peer: PeerHandle,
        outcome: ConnectOutcome,
    },
    Disconnected {
        peer: PeerHandle,
        /// HCI disconnect reason.
        reason: u8,
    },
    /// A connection object returned to the stack's free pool.
    SlotRecycled,
}

// ───────────────────────────────────────────────────────────────
// Committed state
// ───────────────────────────────────────────────────────────────

/// The `(flags, slots_available)` pair, as committed by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapSnapshot {
    pub flags: u32,
    pub slots_available: u8,
}

impl GapSnapshot {
    pub const fn is_advertising(&self) -> bool {
        self.flags & STATE_ADV_CONN != 0
    }

    pub const fn is_connected(&self) -> bool {
        self.flags & STATE_CONNECTED != 0
    }

    pub const fn is_advertising_down(&self) -> bool {
        self.flags & STATE_ADV_DOWN != 0
    }

    pub const fn auto_resume(&self) -> bool {
        self.flags & CFG_ADV_AUTO != 0
    }
}

/// Coarse state derived from a snapshot, for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapState {
    Idle,
    Advertising,
    /// Connected, with the number of slots currently spent.
    Connected(u8),
}

impl GapState {
    /// Derive the state from committed flags.  `Connected` takes precedence
    /// over `Advertising` when both bits are set (several slots configured).
    pub fn from_snapshot(snapshot: GapSnapshot, max_slots: u8) -> Self {
        if snapshot.is_connected() {
            Self::Connected(max_slots.saturating_sub(snapshot.slots_available))
        } else if snapshot.is_advertising() {
            Self::Advertising
        } else {
            Self::Idle
        }
    }
}

impl fmt::Display for GapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Advertising => write!(f, "advertising"),
            Self::Connected(k) => write!(f, "connected({k})"),
        }
    }
}
