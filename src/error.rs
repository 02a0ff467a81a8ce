//! Unified error types for the EssNode firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! top-level error handling uniform. All variants are `Copy` so they can be
//! returned from callback contexts without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Connection management (GAP) refused or failed an operation.
    Gap(GapError),
    /// An Environmental Sensing Service value or descriptor was rejected.
    Ess(EssError),
    /// Peripheral or stack initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gap(e) => write!(f, "gap: {e}"),
            Self::Ess(e) => write!(f, "ess: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Connection management errors
// ---------------------------------------------------------------------------

/// Errors returned by the connection manager's synchronous API.
///
/// | Kind                 | Variants                                  |
/// |----------------------|-------------------------------------------|
/// | admission contention | `Busy`                                    |
/// | logical conflict     | `AlreadyAdvertising`, `AlreadyInitialized`|
/// | resource exhaustion  | `NoSlotsAvailable`                        |
/// | subsystem failure    | `ConnectionRefused`, `WorkerSpawn`        |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapError {
    /// Another transition holds the admission lock; retry later.
    Busy,
    /// Already in the advertising connectable state.
    AlreadyAdvertising,
    /// Every connection slot is in use.
    NoSlotsAvailable,
    /// The radio stack refused to start advertising.
    ConnectionRefused,
    /// A lifecycle subscriber is already registered with the link.
    AlreadyInitialized,
    /// The GAP worker thread could not be created.
    WorkerSpawn,
}

impl GapError {
    /// Whether the same call may succeed later without a caller-side change.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Busy | Self::NoSlotsAvailable | Self::ConnectionRefused
        )
    }
}

impl fmt::Display for GapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "connection management busy"),
            Self::AlreadyAdvertising => write!(f, "already advertising"),
            Self::NoSlotsAvailable => write!(f, "no connection slot available"),
            Self::ConnectionRefused => write!(f, "advertising refused by the stack"),
            Self::AlreadyInitialized => write!(f, "already initialized"),
            Self::WorkerSpawn => write!(f, "worker thread spawn failed"),
        }
    }
}

impl From<GapError> for Error {
    fn from(e: GapError) -> Self {
        Self::Gap(e)
    }
}

// ---------------------------------------------------------------------------
// ESS errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssError {
    /// Temperature below absolute zero (and not the "unknown" marker).
    InvalidTemperature(i16),
    /// Relative humidity above 100.00 % (and not the "unknown" marker).
    InvalidHumidity(u16),
    /// Trigger condition code is reserved for future use.
    UnsupportedCondition(u8),
    /// Trigger operand does not fit the condition or value format.
    OperandOutOfRange(i64),
}

impl fmt::Display for EssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTemperature(v) => write!(f, "invalid temperature: {v}"),
            Self::InvalidHumidity(v) => write!(f, "invalid humidity: {v}"),
            Self::UnsupportedCondition(c) => write!(f, "unsupported trigger condition 0x{c:02x}"),
            Self::OperandOutOfRange(v) => write!(f, "trigger operand out of range: {v}"),
        }
    }
}

impl From<EssError> for Error {
    fn from(e: EssError) -> Self {
        Self::Ess(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
