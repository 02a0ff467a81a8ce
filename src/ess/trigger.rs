//! ES Trigger Setting descriptor (ESS §3.1.2.2).
//!
//! Wire layout: one condition byte followed by an operand whose size depends
//! on the condition and, for value-based conditions, on the characteristic's
//! presentation format.
//!
//! | Condition                 | Operand                      |
//! |---------------------------|------------------------------|
//! | Inactive, ValueChanged    | none                         |
//! | FixedTime, GteTime        | seconds, uint24 LE           |
//! | Lt … NotSpecified         | value, characteristic format |

use core::fmt;

use heapless::Vec;

use crate::error::EssError;

/// Largest encoded descriptor: condition + uint32 operand.
pub const MAX_TRIGGER_LEN: usize = 5;

/// Largest seconds operand (uint24).
pub const MAX_SECONDS: u32 = 0x00ff_ffff;

// ───────────────────────────────────────────────────────────────
// Condition
// ───────────────────────────────────────────────────────────────

/// Trigger condition (ESS Table 3.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerCondition {
    /// No notification.
    Inactive = 0x00,
    /// Notify on a fixed interval, independent of value updates.
    FixedTime = 0x01,
    /// Notify no more often than the interval.
    GteTime = 0x02,
    ValueChanged = 0x03,
    Lt = 0x04,
    Lte = 0x05,
    Gt = 0x06,
    Gte = 0x07,
    Specified = 0x08,
    NotSpecified = 0x09,
}

impl TriggerCondition {
    pub const fn is_time_based(self) -> bool {
        matches!(self, Self::FixedTime | Self::GteTime)
    }

    /// Conditions comparing the new value against an operand.
    pub const fn has_value_operand(self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Lte | Self::Gt | Self::Gte | Self::Specified | Self::NotSpecified
        )
    }
}

impl TryFrom<u8> for TriggerCondition {
    type Error = EssError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => Self::Inactive,
            0x01 => Self::FixedTime,
            0x02 => Self::GteTime,
            0x03 => Self::ValueChanged,
            0x04 => Self::Lt,
            0x05 => Self::Lte,
            0x06 => Self::Gt,
            0x07 => Self::Gte,
            0x08 => Self::Specified,
            0x09 => Self::NotSpecified,
            other => return Err(EssError::UnsupportedCondition(other)),
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Value formats
// ───────────────────────────────────────────────────────────────

/// GATT format types used by the exposed characteristics
/// (Assigned Numbers §2.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Uint16,
    Uint32,
    Sint16,
}

impl ValueFormat {
    pub const fn code(self) -> u8 {
        match self {
            Self::Uint16 => 0x06,
            Self::Uint32 => 0x08,
            Self::Sint16 => 0x0e,
        }
    }

    pub const fn size(self) -> usize {
        match self {
            Self::Uint16 | Self::Sint16 => 2,
            Self::Uint32 => 4,
        }
    }

    pub fn contains(self, value: i64) -> bool {
        match self {
            Self::Uint16 => u16::try_from(value).is_ok(),
            Self::Uint32 => u32::try_from(value).is_ok(),
            Self::Sint16 => i16::try_from(value).is_ok(),
        }
    }

    /// Decode a little-endian value; `raw` must be exactly `size()` bytes.
    pub fn decode(self, raw: &[u8]) -> Option<i64> {
        match self {
            Self::Uint16 => Some(i64::from(u16::from_le_bytes(raw.try_into().ok()?))),
            Self::Uint32 => Some(i64::from(u32::from_le_bytes(raw.try_into().ok()?))),
            Self::Sint16 => Some(i64::from(i16::from_le_bytes(raw.try_into().ok()?))),
        }
    }

    /// Little-endian encoding of `value`, truncated to the format's width.
    pub fn encode<const N: usize>(self, value: i64, out: &mut Vec<u8, N>) -> bool {
        let bytes = value.to_le_bytes();
        out.extend_from_slice(&bytes[..self.size()]).is_ok()
    }
}

// ───────────────────────────────────────────────────────────────
// Descriptor
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Seconds(u32),
    Value(i64),
}

/// ATT application errors returned to a client writing the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttError {
    /// Empty write.
    InvalidAttributeLength,
    /// Operand size does not match the condition and format.
    OutOfRange,
    /// Condition code reserved for future use.
    ConditionNotSupported,
}

impl AttError {
    pub const fn code(self) -> u8 {
        match self {
            Self::InvalidAttributeLength => 0x0d,
            Self::OutOfRange => 0xff,
            Self::ConditionNotSupported => 0x81,
        }
    }
}

impl fmt::Display for AttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAttributeLength => write!(f, "invalid attribute length"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::ConditionNotSupported => write!(f, "condition not supported"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSetting {
    condition: TriggerCondition,
    operand: Operand,
}

impl TriggerSetting {
    pub const VALUE_CHANGED: Self = Self {
        condition: TriggerCondition::ValueChanged,
        operand: Operand::None,
    };

    /// Build a setting from a condition code and a raw operand, checking the
    /// operand against the characteristic's format.
    pub fn new(condition: u8, operand: i64, format: ValueFormat) -> Result<Self, EssError> {
        let condition = TriggerCondition::try_from(condition)?;
        let operand = if condition.is_time_based() {
            let seconds = u32::try_from(operand)
                .ok()
                .filter(|s| *s <= MAX_SECONDS)
                .ok_or(EssError::OperandOutOfRange(operand))?;
            Operand::Seconds(seconds)
        } else if condition.has_value_operand() {
            if !format.contains(operand) {
                return Err(EssError::OperandOutOfRange(operand));
            }
            Operand::Value(operand)
        } else {
            Operand::None
        };
        Ok(Self { condition, operand })
    }

    /// Parse a client write of the descriptor.
    pub fn parse(pdu: &[u8], format: ValueFormat) -> Result<Self, AttError> {
        let (&code, raw) = pdu.split_first().ok_or(AttError::InvalidAttributeLength)?;
        let condition =
            TriggerCondition::try_from(code).map_err(|_| AttError::ConditionNotSupported)?;

        let operand = if condition.is_time_based() {
            let &[b0, b1, b2] = raw else {
                return Err(AttError::OutOfRange);
            };
            Operand::Seconds(u32::from_le_bytes([b0, b1, b2, 0]))
        } else if condition.has_value_operand() {
            if raw.len() != format.size() {
                return Err(AttError::OutOfRange);
            }
            Operand::Value(format.decode(raw).ok_or(AttError::OutOfRange)?)
        } else {
            if !raw.is_empty() {
                return Err(AttError::OutOfRange);
            }
            Operand::None
        };

        Ok(Self { condition, operand })
    }

    /// Descriptor value as read by a client.
    pub fn encode(&self, format: ValueFormat) -> Vec<u8, MAX_TRIGGER_LEN> {
        let mut out = Vec::new();
        // Capacity covers the widest operand.
        let _ = out.push(self.condition as u8);
        match self.operand {
            Operand::None => {}
            Operand::Seconds(s) => {
                let _ = out.extend_from_slice(&s.to_le_bytes()[..3]);
            }
            Operand::Value(v) => {
                let _ = format.encode(v, &mut out);
            }
        }
        out
    }

    pub fn condition(&self) -> TriggerCondition {
        self.condition
    }

    pub fn operand(&self) -> Operand {
        self.operand
    }

    /// Interval of a fixed-time trigger.
    pub fn fixed_interval(&self) -> Option<u32> {
        match (self.condition, self.operand) {
            (TriggerCondition::FixedTime, Operand::Seconds(s)) => Some(s),
            _ => None,
        }
    }

    /// Evaluate a value-based condition for an update from `old` to `new`.
    /// Always false for time-based and inactive conditions.
    pub fn value_triggers(&self, new: i64, old: i64) -> bool {
        let operand = match self.operand {
            Operand::Value(v) => v,
            _ => 0,
        };
        match self.condition {
            TriggerCondition::ValueChanged => new != old,
            TriggerCondition::Lt => new < operand,
            TriggerCondition::Lte => new <= operand,
            TriggerCondition::Gt => new > operand,
            TriggerCondition::Gte => new >= operand,
            TriggerCondition::Specified => new == operand,
            TriggerCondition::NotSpecified => new != operand,
            TriggerCondition::Inactive
            | TriggerCondition::FixedTime
            | TriggerCondition::GteTime => false,
        }
    }
}

impl Default for TriggerSetting {
    fn default() -> Self {
        Self::VALUE_CHANGED
    }
}
