//! EssNode firmware library.
//!
//! BLE Environmental Sensing Profile node: connection admission and
//! advertising resumption over a bounded pool of connection slots, plus the
//! ESS characteristic model.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; the rest runs and is
//! tested on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod ess;
pub mod gap;

pub use error::{Error, EssError, GapError, Result};
