//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a subsystem against mock
//! adapters.  All tests run on the host with no real radio required.

mod ble_link_tests;
mod ess_tests;
mod gap_scenarios;
mod mock_link;
