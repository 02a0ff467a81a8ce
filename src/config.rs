//! Node configuration parameters
//!
//! All tunable parameters for the EssNode firmware.  Defaults match the
//! build-time configuration of the sensor profile; a JSON document may
//! override them at provisioning time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ess::{EssKind, TriggerCondition, TriggerSetting};

/// Connection objects reserved in the Bluetooth stack.
pub const MAX_CONNECTIONS: u8 = 4;

/// Default advertised device name.
pub const DEFAULT_DEVICE_NAME: &str = "EssNode";

/// Connection management configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapConfig {
    /// Connection slots managed by the node (1..=MAX_CONNECTIONS)
    pub max_slots: u8,
    /// Resume advertising whenever a slot is free
    pub auto_resume: bool,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            max_slots: MAX_CONNECTIONS,
            auto_resume: true,
        }
    }
}

/// ES Trigger Setting for one characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Condition code (ESS Table 3.11, 0x00-0x09)
    pub condition: u8,
    /// Seconds for time-based conditions, raw value for value-based ones
    pub operand: i64,
}

impl TriggerSpec {
    pub const fn value_changed() -> Self {
        Self {
            condition: TriggerCondition::ValueChanged as u8,
            operand: 0,
        }
    }
}

/// ES Trigger Settings of the exposed characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssTriggerConfig {
    pub temperature: TriggerSpec,
    pub pressure: TriggerSpec,
    pub humidity: TriggerSpec,
}

impl Default for EssTriggerConfig {
    fn default() -> Self {
        Self {
            temperature: TriggerSpec::value_changed(),
            pressure: TriggerSpec::value_changed(),
            humidity: TriggerSpec::value_changed(),
        }
    }
}

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Complete local name in the scan response
    pub device_name: heapless::String<24>,
    pub gap: GapConfig,
    pub ess: EssTriggerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut device_name = heapless::String::new();
        let _ = device_name.push_str(DEFAULT_DEVICE_NAME);
        Self {
            device_name,
            gap: GapConfig::default(),
            ess: EssTriggerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let config: Self =
            serde_json::from_slice(raw).map_err(|_| Error::Config("malformed JSON"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the firmware cannot honour.  Invalid values are never
    /// clamped.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(Error::Config("device_name must not be empty"));
        }
        if self.gap.max_slots == 0 {
            return Err(Error::Config("gap.max_slots must be at least 1"));
        }
        if self.gap.max_slots > MAX_CONNECTIONS {
            return Err(Error::Config("gap.max_slots exceeds MAX_CONNECTIONS"));
        }
        for (kind, spec) in [
            (EssKind::Temperature, self.ess.temperature),
            (EssKind::Pressure, self.ess.pressure),
            (EssKind::Humidity, self.ess.humidity),
        ] {
            TriggerSetting::new(spec.condition, spec.operand, kind.format())?;
        }
        Ok(())
    }
}
