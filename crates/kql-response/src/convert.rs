//! Pure conversions from wire scalars to typed [`Value`]s, one per wire type that needs it.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::error::DecodeError;
use crate::schema::WireType;
use crate::value::{Timespan, Value, TICKS_PER_SECOND};

/// Convert one cell according to the type its column is decoded with.
pub fn convert_cell(wire_type: &WireType, value: &JsonValue) -> Result<Value, DecodeError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match wire_type {
        WireType::Bool => to_bool(value),
        WireType::Int32 | WireType::Int64 => to_int(wire_type, value),
        WireType::UInt => to_uint(value),
        WireType::Real => to_real(value),
        WireType::Decimal => Ok(to_decimal(value)?.map_or(Value::Null, Value::Decimal)),
        WireType::String | WireType::Guid => match value {
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            other => Ok(Value::from_json(other)),
        },
        WireType::DateTime => Ok(to_datetime(value)?.map_or(Value::Null, Value::DateTime)),
        WireType::Timespan => Ok(to_timespan(value)?.map_or(Value::Null, Value::Timespan)),
        WireType::Dynamic => Ok(Value::Dynamic(to_dynamic(value).into_owned())),
        WireType::Other(_) => Ok(Value::from_json(value)),
    }
}

fn blank(value: &JsonValue) -> bool {
    matches!(value, JsonValue::String(s) if s.trim().is_empty())
}

fn to_bool(value: &JsonValue) -> Result<Value, DecodeError> {
    let parsed = match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        JsonValue::String(s) if s.trim().is_empty() => return Ok(Value::Null),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Value::Bool)
        .ok_or_else(|| DecodeError::invalid_cell("bool", value))
}

fn to_int(wire_type: &WireType, value: &JsonValue) -> Result<Value, DecodeError> {
    if blank(value) {
        return Ok(Value::Null);
    }
    let parsed = match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(Value::Int)
        .ok_or_else(|| DecodeError::invalid_cell(wire_type.name(), value))
}

fn to_uint(value: &JsonValue) -> Result<Value, DecodeError> {
    if blank(value) {
        return Ok(Value::Null);
    }
    let parsed = match value {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(Value::UInt)
        .ok_or_else(|| DecodeError::invalid_cell("uint", value))
}

fn to_real(value: &JsonValue) -> Result<Value, DecodeError> {
    if blank(value) {
        return Ok(Value::Null);
    }
    // Non-finite reals arrive as the strings `NaN`, `Infinity` and `-Infinity`.
    let parsed = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .map(Value::Real)
        .ok_or_else(|| DecodeError::invalid_cell("real", value))
}

/// Decimal string (or number) → [`Decimal`]; null/blank → `None`.
pub fn to_decimal(value: &JsonValue) -> Result<Option<Decimal>, DecodeError> {
    let text: Cow<'_, str> = match value {
        JsonValue::Null => return Ok(None),
        JsonValue::String(s) if s.trim().is_empty() => return Ok(None),
        JsonValue::String(s) => Cow::Borrowed(s.trim()),
        JsonValue::Number(n) => Cow::Owned(n.to_string()),
        other => return Err(DecodeError::invalid_cell("decimal", other)),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| DecodeError::invalid_cell("decimal", value))
}

/// ISO-8601 string → UTC timestamp; null/blank → `None`.
///
/// Values without an explicit offset are interpreted as UTC.
pub fn to_datetime(value: &JsonValue) -> Result<Option<DateTime<Utc>>, DecodeError> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) if s.trim().is_empty() => Ok(None),
        JsonValue::String(s) => parse_datetime(s)
            .map(Some)
            .ok_or_else(|| DecodeError::invalid_cell("datetime", value)),
        other => Err(DecodeError::invalid_cell("datetime", other)),
    }
}

pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Tick count (100ns units) or `[-][d.]hh:mm:ss[.fffffff]` string → [`Timespan`].
pub fn to_timespan(value: &JsonValue) -> Result<Option<Timespan>, DecodeError> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) if s.is_empty() => Ok(None),
        JsonValue::String(s) => parse_timespan(s).map(Some),
        JsonValue::Number(n) => {
            if let Some(ticks) = n.as_i64() {
                return Ok(Some(Timespan::from_ticks(ticks)));
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                    Ok(Some(Timespan::from_ticks(f.round() as i64)))
                }
                _ => Err(DecodeError::InvalidTimespan(n.to_string())),
            }
        }
        other => Err(DecodeError::InvalidTimespan(other.to_string())),
    }
}

pub fn parse_timespan(text: &str) -> Result<Timespan, DecodeError> {
    static TIMESPAN_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIMESPAN_RE.get_or_init(|| {
        Regex::new(r"^(-)?(?:(\d+)\.)?(\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,7}))?$")
            .expect("valid regex")
    });

    let invalid = || DecodeError::InvalidTimespan(text.to_string());
    let caps = re.captures(text.trim()).ok_or_else(invalid)?;

    let negative = caps.get(1).is_some();
    let days = match caps.get(2) {
        Some(d) => d.as_str().parse::<u64>().map_err(|_| invalid())?,
        None => 0,
    };
    let field = |idx: usize| -> Result<u32, DecodeError> {
        caps.get(idx)
            .ok_or_else(invalid)?
            .as_str()
            .parse::<u32>()
            .map_err(|_| invalid())
    };
    let hours = field(3)?;
    let minutes = field(4)?;
    let seconds = field(5)?;

    // Fractional digits are left-aligned: `.5` is 5_000_000 ticks.
    let sub_second_ticks = match caps.get(6) {
        Some(frac) => {
            let digits = frac.as_str();
            let raw = digits.parse::<u32>().map_err(|_| invalid())?;
            let scale = 10u32.pow(7 - digits.len() as u32);
            raw * scale
        }
        None => 0,
    };
    debug_assert!(i64::from(sub_second_ticks) < TICKS_PER_SECOND);

    Timespan::from_parts(negative, days, hours, minutes, seconds, sub_second_ticks)
        .ok_or_else(invalid)
}

/// JSON-encoded text → structured value.
///
/// Already-structured values, null, empty strings and text that is not valid JSON pass
/// through unchanged, so applying this twice never double-decodes.
pub fn to_dynamic(value: &JsonValue) -> Cow<'_, JsonValue> {
    match value {
        JsonValue::String(s) if !s.is_empty() => match serde_json::from_str::<JsonValue>(s) {
            Ok(parsed) => Cow::Owned(parsed),
            Err(_) => Cow::Borrowed(value),
        },
        _ => Cow::Borrowed(value),
    }
}
