//! Claim payload encoding
//!
//! Principal attributes may hold values JSON has no native form for (UUIDs,
//! datetimes). A [`ClaimEncoder`] turns each resolved attribute into the JSON
//! value placed in the token payload. The encoder is configurable through the
//! `TOKEN_USER_ENCODER` setting.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde_json::{Number, Value};

use crate::claims::AttributeValue;

/// Converts a resolved attribute value into a claim value
pub trait ClaimEncoder: Send + Sync + std::fmt::Debug {
    /// Encode `value`, the attribute behind claim `claim`
    ///
    /// # Errors
    ///
    /// Returns the reason the value cannot be represented; the caller wraps it
    /// into [`TokenError::Encoding`](crate::TokenError::Encoding).
    fn encode(&self, claim: &str, value: &AttributeValue) -> Result<Value, String>;
}

/// Default encoder
///
/// - UUIDs become their hyphenated lowercase form
/// - UTC datetimes become ISO-8601 with a `Z` suffix
/// - naive datetimes become ISO-8601 without offset
/// - dates become `YYYY-MM-DD`
///
/// Datetimes carry millisecond precision only when the sub-second part is
/// non-zero (`2012-01-14T12:00:01`, `2012-01-14T12:00:01.250Z`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonClaimEncoder;

impl ClaimEncoder for JsonClaimEncoder {
    fn encode(&self, _claim: &str, value: &AttributeValue) -> Result<Value, String> {
        Ok(match value {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(i) => Value::from(*i),
            AttributeValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| format!("{f} is not a finite number"))?,
            AttributeValue::Text(s) => Value::String(s.clone()),
            AttributeValue::Uuid(id) => Value::String(id.hyphenated().to_string()),
            AttributeValue::DateTime(dt) => Value::String(format_utc(dt)),
            AttributeValue::NaiveDateTime(dt) => Value::String(format_naive(dt)),
            AttributeValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        })
    }
}

fn format_naive(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() / 1_000 == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }
}

fn format_utc(dt: &DateTime<Utc>) -> String {
    format!("{}Z", format_naive(&dt.naive_utc()))
}
