use super::Converter;
use crate::error::CodecError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Normalize a field reference to a JSON pointer.
///
/// Accepts pointers (`/joinDate`) and simple JSONPaths (`$.joinDate`, `$.a.b`).
pub fn json_pointer(field: &str) -> String {
    if let Some(path) = field.strip_prefix("$.") {
        format!("/{}", path.replace('.', "/"))
    } else if field == "$" {
        String::new()
    } else if field.starts_with('/') {
        field.to_string()
    } else {
        format!("/{field}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    Seconds,
    Millis,
}

/// Stores RFC 3339 timestamps as integer unix time so they can be indexed as
/// numeric fields, and turns them back into RFC 3339 strings on read.
///
/// Missing and `null` fields are left alone. On write, values that are already
/// numbers are kept; on read, values that are already strings are kept.
/// Timestamps finer than the unit are rejected on write rather than truncated.
#[derive(Debug, Clone)]
pub struct UnixTime {
    fields: Vec<String>,
    precision: Precision,
}

impl UnixTime {
    pub fn seconds<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_precision(fields, Precision::Seconds)
    }

    pub fn millis<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_precision(fields, Precision::Millis)
    }

    fn with_precision<I, S>(fields: I, precision: Precision) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        UnixTime {
            fields: fields.into_iter().map(|f| json_pointer(f.as_ref())).collect(),
            precision,
        }
    }

    fn error(&self, field: &str, message: impl Into<String>) -> CodecError {
        CodecError::Converter {
            converter: self.name().to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn to_epoch(&self, field: &str, text: &str) -> Result<i64, CodecError> {
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|e| self.error(field, format!("invalid timestamp '{text}': {e}")))?;
        let (epoch, unit_nanos) = match self.precision {
            Precision::Seconds => (parsed.timestamp(), 1_000_000_000),
            Precision::Millis => (parsed.timestamp_millis(), 1_000_000),
        };
        // Sub-unit precision would not survive the round trip.
        if parsed.timestamp_subsec_nanos() % unit_nanos != 0 {
            return Err(self.error(
                field,
                format!("timestamp '{text}' is more precise than {}", self.name()),
            ));
        }
        Ok(epoch)
    }

    fn from_epoch(&self, field: &str, epoch: i64) -> Result<String, CodecError> {
        let dt = match self.precision {
            Precision::Seconds => DateTime::<Utc>::from_timestamp(epoch, 0),
            Precision::Millis => DateTime::<Utc>::from_timestamp_millis(epoch),
        }
        .ok_or_else(|| self.error(field, format!("timestamp {epoch} out of range")))?;
        Ok(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Converter for UnixTime {
    fn name(&self) -> &str {
        match self.precision {
            Precision::Seconds => "unix_time_seconds",
            Precision::Millis => "unix_time_millis",
        }
    }

    fn write(&self, doc: &mut Value) -> Result<(), CodecError> {
        for field in &self.fields {
            let Some(slot) = doc.pointer_mut(field) else {
                continue;
            };
            let encoded = match &*slot {
                Value::String(text) => Value::from(self.to_epoch(field, text)?),
                Value::Null | Value::Number(_) => continue,
                other => {
                    return Err(self.error(field, format!("expected a timestamp string, got {other}")));
                }
            };
            *slot = encoded;
        }
        Ok(())
    }

    fn read(&self, doc: &mut Value) -> Result<(), CodecError> {
        for field in &self.fields {
            let Some(slot) = doc.pointer_mut(field) else {
                continue;
            };
            let decoded = match &*slot {
                Value::Number(n) => {
                    let epoch = n
                        .as_i64()
                        .or_else(|| n.as_f64().map(|f| f as i64))
                        .ok_or_else(|| self.error(field, format!("invalid epoch value {n}")))?;
                    Value::String(self.from_epoch(field, epoch)?)
                }
                Value::Null | Value::String(_) => continue,
                other => {
                    return Err(self.error(field, format!("expected an epoch number, got {other}")));
                }
            };
            *slot = decoded;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_pointer() {
        assert_eq!(json_pointer("$.joinDate"), "/joinDate");
        assert_eq!(json_pointer("$.meta.created"), "/meta/created");
        assert_eq!(json_pointer("/joinDate"), "/joinDate");
        assert_eq!(json_pointer("joinDate"), "/joinDate");
        assert_eq!(json_pointer("$"), "");
    }

    #[test]
    fn test_seconds_write_and_read() {
        let conv = UnixTime::seconds(["$.joinDate"]);
        let mut doc = json!({ "joinDate": "2020-01-01T00:00:00+00:00", "name": "x" });

        conv.write(&mut doc).unwrap();
        assert_eq!(doc, json!({ "joinDate": 1577836800, "name": "x" }));

        conv.read(&mut doc).unwrap();
        assert_eq!(doc["joinDate"], json!("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn test_offsets_are_normalized_to_utc() {
        let conv = UnixTime::seconds(["/t"]);
        let mut doc = json!({ "t": "2020-01-01T02:00:00+02:00" });
        conv.write(&mut doc).unwrap();
        assert_eq!(doc["t"], json!(1577836800));
    }

    #[test]
    fn test_millis() {
        let conv = UnixTime::millis(["/t"]);
        let mut doc = json!({ "t": "2020-01-01T00:00:00.250Z" });
        conv.write(&mut doc).unwrap();
        assert_eq!(doc["t"], json!(1577836800250i64));

        conv.read(&mut doc).unwrap();
        assert_eq!(doc["t"], json!("2020-01-01T00:00:00.250Z"));
    }

    #[test]
    fn test_fractional_seconds_rejected() {
        let conv = UnixTime::seconds(["/t"]);
        let mut doc = json!({ "t": "2026-10-16T04:13:54.758505024Z" });
        let err = conv.write(&mut doc).unwrap_err();
        assert!(matches!(err, CodecError::Converter { ref field, .. } if field == "/t"));
        assert_eq!(doc["t"], json!("2026-10-16T04:13:54.758505024Z"));

        let conv = UnixTime::millis(["/t"]);
        assert!(conv.write(&mut doc).is_err());
        let mut whole_millis = json!({ "t": "2026-10-16T04:13:54.758Z" });
        conv.write(&mut whole_millis).unwrap();
    }

    #[test]
    fn test_missing_and_null_are_ignored() {
        let conv = UnixTime::seconds(["/t", "/u"]);
        let mut doc = json!({ "u": null });
        conv.write(&mut doc).unwrap();
        conv.read(&mut doc).unwrap();
        assert_eq!(doc, json!({ "u": null }));
    }

    #[test]
    fn test_invalid_timestamp() {
        let conv = UnixTime::seconds(["/t"]);
        let mut doc = json!({ "t": "yesterday" });
        let err = conv.write(&mut doc).unwrap_err();
        assert!(matches!(err, CodecError::Converter { ref field, .. } if field == "/t"));
    }

    #[test]
    fn test_wrong_type_on_read() {
        let conv = UnixTime::seconds(["/t"]);
        let mut doc = json!({ "t": [1, 2] });
        assert!(conv.read(&mut doc).is_err());
    }
}
