//! Lenient ingest codec for sensor readings.
//!
//! Edge devices are inconsistent about JSON typing: the same firmware may
//! send `"temperature": 22.4` or `"temperature": "22.4"` depending on the
//! sampling path.  The decoder accepts either form for every field, parses
//! string values as decimal literals, and truncates float strings for the
//! integer timestamp.  Unknown keys are rejected outright so schema drift on
//! a device shows up as a 400 instead of silently dropped data.
//!
//! Decoding walks the JSON object map explicitly -- every known field is
//! matched by name, so error values can carry the offending field.

use crate::SensorReading;
use serde_json::Value;

/// Errors produced by [`decode_reading`] and [`decode_readings_batch`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("expected a JSON array")]
    NotAnArray,
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid field '{name}': {cause}")]
    InvalidField { name: &'static str, cause: String },
    #[error("missing or zero timestamp")]
    MissingTimestamp,
    #[error("batch is empty")]
    BatchEmpty,
    #[error("batch exceeds max size of {0}")]
    BatchTooLarge(usize),
    #[error("reading at index {index}: {source}")]
    BatchItem {
        index: usize,
        source: Box<DecodeError>,
    },
}

const FIELDS: [&str; 10] = [
    "timestamp",
    "temperature",
    "pressure",
    "humidity",
    "oxidised",
    "reduced",
    "nh3",
    "pm1",
    "pm2",
    "pm10",
];

/// Decode a single reading from raw JSON bytes.
pub fn decode_reading(bytes: &[u8]) -> Result<SensorReading, DecodeError> {
    let value: Value = serde_json::from_slice(bytes)?;
    decode_value(&value)
}

/// Decode a JSON array of readings, enforcing `1 ..= max` elements.
///
/// Item errors are wrapped with the offending array index.
pub fn decode_readings_batch(bytes: &[u8], max: usize) -> Result<Vec<SensorReading>, DecodeError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let items = value.as_array().ok_or(DecodeError::NotAnArray)?;
    if items.is_empty() {
        return Err(DecodeError::BatchEmpty);
    }
    if items.len() > max {
        return Err(DecodeError::BatchTooLarge(max));
    }
    let mut readings = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let reading = decode_value(item).map_err(|e| DecodeError::BatchItem {
            index,
            source: Box::new(e),
        })?;
        readings.push(reading);
    }
    Ok(readings)
}

fn decode_value(value: &Value) -> Result<SensorReading, DecodeError> {
    let map = value.as_object().ok_or(DecodeError::NotAnObject)?;

    for key in map.keys() {
        if !FIELDS.contains(&key.as_str()) {
            return Err(DecodeError::UnknownField(key.clone()));
        }
    }

    let timestamp = int_field(map, "timestamp")?;
    if timestamp == 0 {
        return Err(DecodeError::MissingTimestamp);
    }

    Ok(SensorReading {
        timestamp,
        temperature: float_field(map, "temperature")?,
        pressure: float_field(map, "pressure")?,
        humidity: float_field(map, "humidity")?,
        oxidised: float_field(map, "oxidised")?,
        reduced: float_field(map, "reduced")?,
        nh3: float_field(map, "nh3")?,
        pm1: float_field(map, "pm1")?,
        pm2: float_field(map, "pm2")?,
        pm10: float_field(map, "pm10")?,
    })
}

fn float_field(
    map: &serde_json::Map<String, Value>,
    name: &'static str,
) -> Result<f64, DecodeError> {
    let value = map.get(name).ok_or(DecodeError::MissingField(name))?;
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| DecodeError::InvalidField {
            name,
            cause: format!("number {n} is not representable"),
        }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|e| DecodeError::InvalidField {
            name,
            cause: format!("'{s}': {e}"),
        }),
        other => Err(DecodeError::InvalidField {
            name,
            cause: format!("expected number or string, got {other}"),
        }),
    }
}

/// Integer fields accept float strings and truncate toward zero.
fn int_field(map: &serde_json::Map<String, Value>, name: &'static str) -> Result<i64, DecodeError> {
    let value = map.get(name).ok_or(DecodeError::MissingField(name))?;
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f as i64)
            } else {
                Err(DecodeError::InvalidField {
                    name,
                    cause: format!("number {n} is not representable"),
                })
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(i)
            } else {
                trimmed
                    .parse::<f64>()
                    .map(|f| f as i64)
                    .map_err(|e| DecodeError::InvalidField {
                        name,
                        cause: format!("'{s}': {e}"),
                    })
            }
        }
        other => Err(DecodeError::InvalidField {
            name,
            cause: format!("expected number or string, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUMERIC: &str = r#"{"timestamp":1738886400,"temperature":22.4,"pressure":101305.2,
        "humidity":40.1,"oxidised":1.2,"reduced":1.1,"nh3":0.7,"pm1":2.0,"pm2":3.0,"pm10":4.0}"#;

    const STRINGLY: &str = r#"{"timestamp":"1738886400","temperature":"22.4","pressure":101305.2,
        "humidity":"40.1","oxidised":"1.2","reduced":"1.1","nh3":"0.7","pm1":"2","pm2":3,"pm10":"4"}"#;

    #[test]
    fn numeric_and_stringly_forms_decode_equal() {
        let a = decode_reading(NUMERIC.as_bytes()).unwrap();
        let b = decode_reading(STRINGLY.as_bytes()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.timestamp, 1738886400);
        assert_eq!(a.pm2, 3.0);
    }

    #[test]
    fn encode_decode_round_trip() {
        let reading = decode_reading(NUMERIC.as_bytes()).unwrap();
        let encoded = serde_json::to_vec(&reading).unwrap();
        let decoded = decode_reading(&encoded).unwrap();
        assert_eq!(reading, decoded);
    }

    #[test]
    fn float_string_timestamp_truncates() {
        let json = NUMERIC.replace("1738886400", "\"1738886400.9\"");
        let reading = decode_reading(json.as_bytes()).unwrap();
        assert_eq!(reading.timestamp, 1738886400);
    }

    #[test]
    fn unknown_field_rejected() {
        let json = NUMERIC.replace("\"pm10\":4.0", "\"pm10\":4.0,\"co2\":5");
        let err = decode_reading(json.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownField(ref k) if k == "co2"), "{err}");
    }

    #[test]
    fn missing_field_rejected() {
        let json = NUMERIC.replace("\"nh3\":0.7,", "");
        let err = decode_reading(json.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("nh3")), "{err}");
    }

    #[test]
    fn zero_timestamp_rejected() {
        let json = NUMERIC.replace("1738886400", "0");
        let err = decode_reading(json.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingTimestamp), "{err}");
    }

    #[test]
    fn garbage_string_value_rejected() {
        let json = NUMERIC.replace("22.4", "\"warm\"");
        let err = decode_reading(json.as_bytes()).unwrap_err();
        assert!(
            matches!(err, DecodeError::InvalidField { name: "temperature", .. }),
            "{err}"
        );
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            decode_reading(b"[1,2,3]").unwrap_err(),
            DecodeError::NotAnObject
        ));
        assert!(matches!(decode_reading(b"not json").unwrap_err(), DecodeError::Json(_)));
    }

    #[test]
    fn batch_decodes_in_order() {
        let json = format!("[{NUMERIC},{STRINGLY}]");
        let readings = decode_readings_batch(json.as_bytes(), 1000).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0], readings[1]);
    }

    #[test]
    fn batch_bounds_enforced() {
        assert!(matches!(
            decode_readings_batch(b"[]", 1000).unwrap_err(),
            DecodeError::BatchEmpty
        ));
        let json = format!("[{NUMERIC},{NUMERIC}]");
        assert!(matches!(
            decode_readings_batch(json.as_bytes(), 1).unwrap_err(),
            DecodeError::BatchTooLarge(1)
        ));
    }

    #[test]
    fn batch_item_error_carries_index() {
        let bad = NUMERIC.replace("1738886400", "0");
        let json = format!("[{NUMERIC},{bad}]");
        let err = decode_readings_batch(json.as_bytes(), 1000).unwrap_err();
        match err {
            DecodeError::BatchItem { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, DecodeError::MissingTimestamp));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
