//! Fuzz target: `NodeConfig::from_json`
//!
//! Any document accepted by the loader must describe a configuration the
//! connection manager and the ESS model can be built from.
//!
//! cargo fuzz run fuzz_node_config

#![no_main]

use essnode::config::{MAX_CONNECTIONS, NodeConfig};
use essnode::ess::EnvironmentalService;
use libfuzzer_sys::fuzz_target;

// Links the std critical-section impl.
use critical_section as _;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = NodeConfig::from_json(data) {
        assert!((1..=MAX_CONNECTIONS).contains(&config.gap.max_slots));
        assert!(!config.device_name.is_empty());
        assert!(EnvironmentalService::new(&config.ess).is_ok());
    }
});
