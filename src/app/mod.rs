//! Application boundary: the port traits connection management is written
//! against.  All interaction with the radio stack happens through
//! [`ports`], keeping the domain fully testable without real hardware.

pub mod ports;
