//! Fuzz target: `Characteristic::write_trigger`
//!
//! Drives arbitrary client writes of the ES Trigger Setting descriptor into
//! each characteristic and asserts that rejected writes leave the stored
//! setting untouched and accepted writes read back byte for byte.
//!
//! cargo fuzz run fuzz_trigger_setting

#![no_main]

use essnode::ess::{Characteristic, EssKind, TriggerSetting};
use libfuzzer_sys::fuzz_target;

// Links the std critical-section impl.
use critical_section as _;

fuzz_target!(|data: &[u8]| {
    for kind in [EssKind::Temperature, EssKind::Pressure, EssKind::Humidity] {
        let mut c = Characteristic::new(kind, TriggerSetting::VALUE_CHANGED);
        c.set_subscribed(true);

        match c.write_trigger(data) {
            Ok(_) => assert_eq!(c.read_trigger().as_slice(), data),
            Err(_) => assert_eq!(*c.trigger(), TriggerSetting::VALUE_CHANGED),
        }

        // Whatever the trigger, updates must not panic.
        let _ = c.update(kind.unknown_value(), 0);
        let _ = c.update(0, u32::MAX);
    }
});
