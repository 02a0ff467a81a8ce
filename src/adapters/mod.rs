//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements       | Connects to                 |
//! |------------|------------------|-----------------------------|
//! | `ble`      | LinkController   | Bluedroid GAP/GATTS         |
//! | `log_sink` | StateChangedFn   | Serial log output           |

pub mod ble;
pub mod log_sink;
