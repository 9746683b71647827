//! Match subject extraction: the bytes a pattern is tested against.

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Datelike, SecondsFormat};
use serde_json::{Map, Number, Value};

use crate::config::MatchTarget;
use crate::error::SerializationError;
use crate::queue::{Delivery, HeaderValue, Headers};

/// Produce the match subject for `delivery`.
///
/// `Body` borrows the payload as-is. `Headers` serializes the header table to
/// compact JSON with keys in sorted order, e.g. `{"urgent":true}`. Neither
/// touches the delivery itself.
///
/// Byte arrays are written as base64 strings, timestamps as RFC 3339 UTC
/// strings and decimals as `{"Scale":..,"Value":..}`, so a pattern matches the
/// same messages it would in other AMQP tooling that marshals tables this way.
pub fn extract<'a, D: Delivery>(
    delivery: &'a D,
    target: MatchTarget,
) -> Result<Cow<'a, [u8]>, SerializationError> {
    match target {
        MatchTarget::Body => Ok(Cow::Borrowed(delivery.body())),
        MatchTarget::Headers => headers_to_json(delivery.headers()).map(Cow::Owned),
    }
}

/// Serialize a header table to compact JSON bytes.
pub fn headers_to_json(headers: &Headers) -> Result<Vec<u8>, SerializationError> {
    let value = table_to_value(headers, "")?;
    Ok(serde_json::to_vec(&value)?)
}

fn table_to_value(table: &Headers, path: &str) -> Result<Value, SerializationError> {
    let mut map = Map::with_capacity(table.len());
    for (key, value) in table {
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        map.insert(key.clone(), to_value(value, &child)?);
    }
    Ok(Value::Object(map))
}

fn to_value(value: &HeaderValue, path: &str) -> Result<Value, SerializationError> {
    Ok(match value {
        HeaderValue::Void => Value::Null,
        HeaderValue::Bool(b) => Value::Bool(*b),
        HeaderValue::Int(i) => Value::from(*i),
        HeaderValue::UInt(u) => Value::from(*u),
        HeaderValue::Timestamp(seconds) => Value::String(format_timestamp(*seconds, path)?),
        HeaderValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| SerializationError::NonFiniteFloat {
                key: path.to_string(),
            })?,
        HeaderValue::Decimal { scale, value } => {
            let mut map = Map::new();
            map.insert("Scale".into(), Value::from(*scale));
            map.insert("Value".into(), Value::from(*value));
            Value::Object(map)
        }
        HeaderValue::String(s) => Value::String(s.clone()),
        HeaderValue::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        HeaderValue::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| to_value(item, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        HeaderValue::Table(table) => table_to_value(table, path)?,
    })
}

/// Seconds since the epoch as `YYYY-MM-DDTHH:MM:SSZ`. Four-digit years only.
fn format_timestamp(seconds: u64, path: &str) -> Result<String, SerializationError> {
    let out_of_range = || SerializationError::TimestampOutOfRange {
        key: path.to_string(),
        seconds,
    };
    let secs = i64::try_from(seconds).map_err(|_| out_of_range())?;
    let at = DateTime::from_timestamp(secs, 0).ok_or_else(out_of_range)?;
    if at.year() > 9999 {
        return Err(out_of_range());
    }
    Ok(at.to_rfc3339_opts(SecondsFormat::Secs, true))
}
