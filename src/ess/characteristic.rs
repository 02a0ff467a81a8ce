//! One ESS characteristic: value, presentation format, trigger setting and
//! notification state.

use heapless::Vec;
use log::debug;

use super::trigger::{AttError, MAX_TRIGGER_LEN, Operand, TriggerCondition, TriggerSetting, ValueFormat};

/// Characteristic Presentation Format namespace: Bluetooth SIG.
pub const CPF_NAMESPACE_SIG: u8 = 0x01;
/// Characteristic Presentation Format description: "main".
pub const CPF_DESCRIPTION_MAIN: u16 = 0x0106;

/// Largest characteristic value (uint32).
pub const MAX_VALUE_LEN: usize = 4;

pub type ValueBytes = Vec<u8, MAX_VALUE_LEN>;

// ───────────────────────────────────────────────────────────────
// Presentation format
// ───────────────────────────────────────────────────────────────

/// Characteristic Presentation Format descriptor (Assigned Numbers §2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cpf {
    pub format: ValueFormat,
    /// Decimal exponent of the represented value.
    pub exponent: i8,
    pub unit: u16,
    pub namespace: u8,
    pub description: u16,
}

impl Cpf {
    /// 7-byte descriptor value.
    pub fn to_bytes(&self) -> [u8; 7] {
        let unit = self.unit.to_le_bytes();
        let description = self.description.to_le_bytes();
        [
            self.format.code(),
            self.exponent as u8,
            unit[0],
            unit[1],
            self.namespace,
            description[0],
            description[1],
        ]
    }
}

// ───────────────────────────────────────────────────────────────
// Exposed characteristics
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssKind {
    /// 0.01 °C, sint16.
    Temperature,
    /// 0.1 Pa, uint32.
    Pressure,
    /// 0.01 %, uint16.
    Humidity,
}

impl EssKind {
    pub const fn uuid(self) -> u16 {
        match self {
            Self::Temperature => 0x2a6e,
            Self::Pressure => 0x2a6d,
            Self::Humidity => 0x2a6f,
        }
    }

    pub const fn format(self) -> ValueFormat {
        match self {
            Self::Temperature => ValueFormat::Sint16,
            Self::Pressure => ValueFormat::Uint32,
            Self::Humidity => ValueFormat::Uint16,
        }
    }

    pub const fn cpf(self) -> Cpf {
        let (exponent, unit) = match self {
            // degree Celsius
            Self::Temperature => (-2, 0x272f),
            // pascal
            Self::Pressure => (-1, 0x2724),
            // percentage
            Self::Humidity => (-2, 0x27ad),
        };
        Cpf {
            format: self.format(),
            exponent,
            unit,
            namespace: CPF_NAMESPACE_SIG,
            description: CPF_DESCRIPTION_MAIN,
        }
    }

    /// Value exposed before the first sample.
    pub const fn unknown_value(self) -> i64 {
        match self {
            Self::Temperature => i16::MIN as i64,
            Self::Pressure => 0,
            Self::Humidity => u16::MAX as i64,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
        }
    }
}

/// Value notification to send to subscribed peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: u16,
    pub payload: ValueBytes,
}

/// Change to apply to the fixed-interval notification timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicTimer {
    /// (Re)start with this period in seconds.
    Start(u32),
    Stop,
    Keep,
}

// ───────────────────────────────────────────────────────────────
// Characteristic state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Characteristic {
    kind: EssKind,
    value: i64,
    /// Seconds since boot of the last `GteTime` notification.
    value_ts: u32,
    /// At least one peer enabled notifications in its CCC.
    subscribed: bool,
    trigger: TriggerSetting,
}

impl Characteristic {
    pub fn new(kind: EssKind, trigger: TriggerSetting) -> Self {
        Self {
            kind,
            value: kind.unknown_value(),
            value_ts: 0,
            subscribed: false,
            trigger,
        }
    }

    pub fn kind(&self) -> EssKind {
        self.kind
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn trigger(&self) -> &TriggerSetting {
        &self.trigger
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Value as read or notified: little-endian, format width.
    pub fn value_bytes(&self) -> ValueBytes {
        let mut out = ValueBytes::new();
        let _ = self.kind.format().encode(self.value, &mut out);
        out
    }

    /// Store a validated value; returns the notification its trigger
    /// setting calls for, if any.
    pub fn update(&mut self, value: i64, now_secs: u32) -> Option<Notification> {
        let old = core::mem::replace(&mut self.value, value);
        if !self.subscribed {
            return None;
        }

        let notify = match (self.trigger.condition(), self.trigger.operand()) {
            (TriggerCondition::GteTime, Operand::Seconds(interval)) => {
                let due = now_secs.wrapping_sub(self.value_ts) >= interval;
                if due {
                    self.value_ts = now_secs;
                }
                due
            }
            _ => self.trigger.value_triggers(value, old),
        };

        notify.then(|| self.notification())
    }

    /// CCC change.  Returns what to do with the fixed-interval timer.
    pub fn set_subscribed(&mut self, subscribed: bool) -> PeriodicTimer {
        self.subscribed = subscribed;
        debug!("ESS: {} notifications {}", self.kind.label(), if subscribed { "on" } else { "off" });
        match self.trigger.fixed_interval() {
            Some(secs) if subscribed => PeriodicTimer::Start(secs),
            Some(_) => PeriodicTimer::Stop,
            None => PeriodicTimer::Keep,
        }
    }

    /// Client write of the ES Trigger Setting descriptor.
    pub fn write_trigger(&mut self, pdu: &[u8]) -> Result<PeriodicTimer, AttError> {
        let trigger = TriggerSetting::parse(pdu, self.kind.format())?;
        let was_fixed = self.trigger.fixed_interval().is_some();
        self.trigger = trigger;
        debug!("ESS: {} trigger {:?}", self.kind.label(), trigger);

        Ok(match trigger.fixed_interval() {
            Some(secs) if self.subscribed => PeriodicTimer::Start(secs),
            _ if was_fixed => PeriodicTimer::Stop,
            _ => PeriodicTimer::Keep,
        })
    }

    /// ES Trigger Setting descriptor value.
    pub fn read_trigger(&self) -> Vec<u8, MAX_TRIGGER_LEN> {
        self.trigger.encode(self.kind.format())
    }

    /// Notification for a fixed-interval timer tick: no condition to check.
    pub fn notification(&self) -> Notification {
        Notification {
            uuid: self.kind.uuid(),
            payload: self.value_bytes(),
        }
    }
}
