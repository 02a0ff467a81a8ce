//! Environmental Sensing Service (ESS) model.
//!
//! Pure logic behind the GATT server the node exposes next to connection
//! management: three characteristics (temperature, pressure, humidity), each
//! with a Characteristic Presentation Format and an ES Trigger Setting
//! deciding when value updates are notified.  The GATT glue owns the
//! attribute table and forwards reads, writes and CCC changes here.

pub mod characteristic;
pub mod trigger;

pub use characteristic::{Characteristic, EssKind, Notification, PeriodicTimer};
pub use trigger::{AttError, TriggerCondition, TriggerSetting, ValueFormat};

use log::{info, warn};

use crate::config::{EssTriggerConfig, TriggerSpec};
use crate::error::EssError;

/// Lowest valid temperature, 0.01 °C (absolute zero).
pub const TEMPERATURE_MIN: i16 = -27_315;
/// Highest valid relative humidity, 0.01 %.
pub const HUMIDITY_MAX: u16 = 10_000;

/// Environmental sample in physical units, as produced by the IAQ
/// algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// °C
    pub temperature: f32,
    /// Pa
    pub pressure: f32,
    /// %
    pub humidity: f32,
}

impl SensorReading {
    /// ESS representation: 0.01 °C, 0.1 Pa, 0.01 %.
    pub fn to_ess(&self) -> (i16, u32, u16) {
        (
            (self.temperature * 100.0) as i16,
            (self.pressure * 10.0) as u32,
            (self.humidity * 100.0) as u16,
        )
    }
}

pub struct EnvironmentalService {
    temperature: Characteristic,
    pressure: Characteristic,
    humidity: Characteristic,
}

impl EnvironmentalService {
    pub fn new(config: &EssTriggerConfig) -> Result<Self, EssError> {
        let build = |kind: EssKind, spec: TriggerSpec| -> Result<Characteristic, EssError> {
            let trigger = TriggerSetting::new(spec.condition, spec.operand, kind.format())?;
            info!(
                "ESS: {} trigger 0x{:02x} ({})",
                kind.label(),
                spec.condition,
                spec.operand
            );
            Ok(Characteristic::new(kind, trigger))
        };
        Ok(Self {
            temperature: build(EssKind::Temperature, config.temperature)?,
            pressure: build(EssKind::Pressure, config.pressure)?,
            humidity: build(EssKind::Humidity, config.humidity)?,
        })
    }

    pub fn characteristic(&self, kind: EssKind) -> &Characteristic {
        match kind {
            EssKind::Temperature => &self.temperature,
            EssKind::Pressure => &self.pressure,
            EssKind::Humidity => &self.humidity,
        }
    }

    pub fn characteristic_mut(&mut self, kind: EssKind) -> &mut Characteristic {
        match kind {
            EssKind::Temperature => &mut self.temperature,
            EssKind::Pressure => &mut self.pressure,
            EssKind::Humidity => &mut self.humidity,
        }
    }

    /// Temperature in 0.01 °C; `i16::MIN` marks an unknown value.
    pub fn update_temperature(
        &mut self,
        value: i16,
        now_secs: u32,
    ) -> Result<Option<Notification>, EssError> {
        if value < TEMPERATURE_MIN && value != i16::MIN {
            warn!("ESS: invalid temperature: {}", value);
            return Err(EssError::InvalidTemperature(value));
        }
        Ok(self.temperature.update(i64::from(value), now_secs))
    }

    /// Pressure in 0.1 Pa.
    pub fn update_pressure(&mut self, value: u32, now_secs: u32) -> Option<Notification> {
        self.pressure.update(i64::from(value), now_secs)
    }

    /// Relative humidity in 0.01 %; `u16::MAX` marks an unknown value.
    pub fn update_humidity(
        &mut self,
        value: u16,
        now_secs: u32,
    ) -> Result<Option<Notification>, EssError> {
        if value > HUMIDITY_MAX && value != u16::MAX {
            warn!("ESS: invalid humidity: {}", value);
            return Err(EssError::InvalidHumidity(value));
        }
        Ok(self.humidity.update(i64::from(value), now_secs))
    }

    /// Publish a full sample.  Invalid components are logged and skipped.
    pub fn apply_sample(
        &mut self,
        reading: &SensorReading,
        now_secs: u32,
    ) -> heapless::Vec<Notification, 3> {
        let (temperature, pressure, humidity) = reading.to_ess();
        let mut out = heapless::Vec::new();
        // At most one notification per characteristic.
        if let Ok(Some(n)) = self.update_temperature(temperature, now_secs) {
            let _ = out.push(n);
        }
        if let Some(n) = self.update_pressure(pressure, now_secs) {
            let _ = out.push(n);
        }
        if let Ok(Some(n)) = self.update_humidity(humidity, now_secs) {
            let _ = out.push(n);
        }
        out
    }
}
