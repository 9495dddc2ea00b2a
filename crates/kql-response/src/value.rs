use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// 100-nanosecond units per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;
const TICKS_PER_MINUTE: i64 = 60 * TICKS_PER_SECOND;
const TICKS_PER_HOUR: i64 = 60 * TICKS_PER_MINUTE;
const TICKS_PER_DAY: i64 = 24 * TICKS_PER_HOUR;

/// A typed cell value produced by converting a wire scalar according to its column's type.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Real(f64),
    Decimal(Decimal),
    String(String),
    DateTime(DateTime<Utc>),
    Timespan(Timespan),
    /// Structured JSON (from `dynamic` columns or passthrough of non-scalar wire values).
    Dynamic(JsonValue),
}

impl Value {
    /// Map a wire scalar onto the closest typed value without any type-directed conversion.
    pub fn from_json(value: &JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Real(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => Value::Dynamic(value.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Dynamic(v) => Some(v),
            _ => None,
        }
    }
}

/// A signed duration with 100ns ("tick") resolution, as used by the wire `timespan` type.
///
/// Stored as a total tick count so the sign/day/hour/minute/second/sub-second components
/// reconstruct exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timespan {
    ticks: i64,
}

impl Timespan {
    pub const ZERO: Timespan = Timespan { ticks: 0 };

    pub fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    /// Assemble a timespan from its magnitude components.
    ///
    /// Returns `None` when a component is out of range (hours ≥ 24, minutes/seconds ≥ 60,
    /// sub-second ticks ≥ 10⁷) or the total overflows.
    pub fn from_parts(
        negative: bool,
        days: u64,
        hours: u32,
        minutes: u32,
        seconds: u32,
        sub_second_ticks: u32,
    ) -> Option<Self> {
        if hours >= 24
            || minutes >= 60
            || seconds >= 60
            || i64::from(sub_second_ticks) >= TICKS_PER_SECOND
        {
            return None;
        }
        let days = i64::try_from(days).ok()?;
        let magnitude = days
            .checked_mul(TICKS_PER_DAY)?
            .checked_add(i64::from(hours) * TICKS_PER_HOUR)?
            .checked_add(i64::from(minutes) * TICKS_PER_MINUTE)?
            .checked_add(i64::from(seconds) * TICKS_PER_SECOND)?
            .checked_add(i64::from(sub_second_ticks))?;
        let ticks = if negative { -magnitude } else { magnitude };
        Some(Self { ticks })
    }

    pub fn ticks(&self) -> i64 {
        self.ticks
    }

    pub fn is_negative(&self) -> bool {
        self.ticks < 0
    }

    fn magnitude(&self) -> u64 {
        self.ticks.unsigned_abs()
    }

    pub fn days(&self) -> u64 {
        self.magnitude() / TICKS_PER_DAY as u64
    }

    pub fn hours(&self) -> u32 {
        ((self.magnitude() % TICKS_PER_DAY as u64) / TICKS_PER_HOUR as u64) as u32
    }

    pub fn minutes(&self) -> u32 {
        ((self.magnitude() % TICKS_PER_HOUR as u64) / TICKS_PER_MINUTE as u64) as u32
    }

    pub fn seconds(&self) -> u32 {
        ((self.magnitude() % TICKS_PER_MINUTE as u64) / TICKS_PER_SECOND as u64) as u32
    }

    pub fn sub_second_ticks(&self) -> u32 {
        (self.magnitude() % TICKS_PER_SECOND as u64) as u32
    }

    pub fn to_duration(&self) -> TimeDelta {
        TimeDelta::microseconds(self.ticks / 10) + TimeDelta::nanoseconds((self.ticks % 10) * 100)
    }
}

impl fmt::Display for Timespan {
    /// Wire form: `[-][d.]hh:mm:ss[.fffffff]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            f.write_str("-")?;
        }
        let days = self.days();
        if days > 0 {
            write!(f, "{days}.")?;
        }
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )?;
        let frac = self.sub_second_ticks();
        if frac > 0 {
            write!(f, ".{frac:07}")?;
        }
        Ok(())
    }
}

impl Serialize for Timespan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
