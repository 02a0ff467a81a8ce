//! Log-based state-changed sink.
//!
//! Renders every committed `(flags, slots_available)` pair to the ESP-IDF
//! logger (UART / USB-CDC in production):
//!
//! ```text
//! GAP | state: 0x00010001 (2) [advertising]
//! GAP | state: 0x01000001 (0) [idle, advertising down]
//! ```

use core::fmt::Write;

use log::info;

use crate::gap::{
    CFG_ADV_AUTO, GapSnapshot, GapState, STATE_ADV_DOWN, StateChangedFn,
};

/// Human-readable state for a committed pair.
pub fn describe(flags: u32, slots_available: u8, max_slots: u8) -> heapless::String<80> {
    let snapshot = GapSnapshot {
        flags,
        slots_available,
    };
    let mut out = heapless::String::new();
    let _ = write!(
        out,
        "state: 0x{:08x} ({}) [{}",
        flags,
        slots_available,
        GapState::from_snapshot(snapshot, max_slots)
    );
    if flags & STATE_ADV_DOWN != 0 {
        let _ = out.push_str(", advertising down");
    }
    if flags & CFG_ADV_AUTO == 0 {
        let _ = out.push_str(", manual");
    }
    let _ = out.push(']');
    out
}

pub fn log_state_changed(flags: u32, slots_available: u8, max_slots: u8) {
    info!("GAP | {}", describe(flags, slots_available, max_slots));
}

/// State-changed callback logging every transition.
pub fn state_changed_sink(max_slots: u8) -> StateChangedFn {
    Box::new(move |flags, slots| log_state_changed(flags, slots, max_slots))
}
