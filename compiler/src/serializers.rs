//! Primitive serializers: named conversions between the wire form of a
//! value and its in-memory form.

use crate::error::SerializeError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// In-memory card data. Mirrors JSON, plus the typed primitives that
/// serializers produce.
#[derive(Debug, Clone, PartialEq)]
pub enum CardValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<CardValue>),
    Record(IndexMap<String, CardValue>),
}

impl CardValue {
    pub fn record() -> Self {
        CardValue::Record(IndexMap::new())
    }

    /// `null`, `false`, `0` and `""` carry nothing to convert.
    pub fn is_falsy(&self) -> bool {
        match self {
            CardValue::Null => true,
            CardValue::Bool(b) => !b,
            CardValue::Number(n) => n.as_f64() == Some(0.0),
            CardValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, CardValue>> {
        match self {
            CardValue::Record(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut IndexMap<String, CardValue>> {
        match self {
            CardValue::Record(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a dotted path through nested records.
    pub fn get_path(&self, path: &str) -> Option<&CardValue> {
        path.split('.')
            .try_fold(self, |value, key| value.as_record()?.get(key))
    }

    pub fn to_json(&self) -> Value {
        match self {
            CardValue::Null => Value::Null,
            CardValue::Bool(b) => Value::Bool(*b),
            CardValue::Number(n) => Value::Number(n.clone()),
            CardValue::String(s) => Value::String(s.clone()),
            CardValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            CardValue::DateTime(dt) => {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            CardValue::List(items) => Value::Array(items.iter().map(CardValue::to_json).collect()),
            CardValue::Record(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    fn describe(&self) -> String {
        match self {
            CardValue::Null => "null".to_string(),
            CardValue::Bool(b) => format!("boolean {}", b),
            CardValue::Number(n) => format!("number {}", n),
            CardValue::String(s) => format!("string '{}'", s),
            CardValue::Date(d) => format!("date {}", d),
            CardValue::DateTime(dt) => format!("datetime {}", dt),
            CardValue::List(_) => "list".to_string(),
            CardValue::Record(_) => "record".to_string(),
        }
    }
}

impl From<Value> for CardValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CardValue::Null,
            Value::Bool(b) => CardValue::Bool(b),
            Value::Number(n) => CardValue::Number(n),
            Value::String(s) => CardValue::String(s),
            Value::Array(items) => CardValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                CardValue::Record(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for CardValue {
    fn from(value: &str) -> Self {
        CardValue::String(value.to_string())
    }
}

impl From<NaiveDate> for CardValue {
    fn from(value: NaiveDate) -> Self {
        CardValue::Date(value)
    }
}

impl From<DateTime<Utc>> for CardValue {
    fn from(value: DateTime<Utc>) -> Self {
        CardValue::DateTime(value)
    }
}

impl fmt::Display for CardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A named, bidirectional conversion of one primitive value.
pub trait PrimitiveSerializer: Send + Sync {
    fn name(&self) -> &'static str;

    /// In-memory form to wire form.
    fn serialize(&self, value: &CardValue) -> Result<CardValue, SerializeError>;

    /// Wire form to in-memory form.
    fn deserialize(&self, value: &CardValue) -> Result<CardValue, SerializeError>;
}

/// Calendar dates, written as `YYYY-MM-DD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateSerializer;

impl PrimitiveSerializer for DateSerializer {
    fn name(&self) -> &'static str {
        "date"
    }

    fn serialize(&self, value: &CardValue) -> Result<CardValue, SerializeError> {
        match value {
            CardValue::Date(date) => Ok(CardValue::String(date.format(DATE_FORMAT).to_string())),
            CardValue::DateTime(dt) => Ok(CardValue::String(
                dt.date_naive().format(DATE_FORMAT).to_string(),
            )),
            CardValue::String(s) => Ok(CardValue::String(
                parse_date(s)?.format(DATE_FORMAT).to_string(),
            )),
            other => Err(unsupported(self.name(), "serialize", other)),
        }
    }

    fn deserialize(&self, value: &CardValue) -> Result<CardValue, SerializeError> {
        match value {
            CardValue::String(s) => Ok(CardValue::Date(parse_date(s)?)),
            CardValue::Date(_) => Ok(value.clone()),
            other => Err(unsupported(self.name(), "deserialize", other)),
        }
    }
}

/// Instants, written as RFC 3339 in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateTimeSerializer;

impl PrimitiveSerializer for DateTimeSerializer {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn serialize(&self, value: &CardValue) -> Result<CardValue, SerializeError> {
        let instant = match value {
            CardValue::DateTime(dt) => *dt,
            CardValue::String(s) => parse_datetime(s)?,
            other => return Err(unsupported(self.name(), "serialize", other)),
        };
        Ok(CardValue::String(
            instant.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ))
    }

    fn deserialize(&self, value: &CardValue) -> Result<CardValue, SerializeError> {
        match value {
            CardValue::String(s) => Ok(CardValue::DateTime(parse_datetime(s)?)),
            CardValue::DateTime(_) => Ok(value.clone()),
            other => Err(unsupported(self.name(), "deserialize", other)),
        }
    }
}

fn parse_date(input: &str) -> Result<NaiveDate, SerializeError> {
    NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|e| SerializeError::Parse {
        serializer: "date",
        input: input.to_string(),
        reason: e.to_string(),
    })
}

fn parse_datetime(input: &str) -> Result<DateTime<Utc>, SerializeError> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SerializeError::Parse {
            serializer: "datetime",
            input: input.to_string(),
            reason: e.to_string(),
        })
}

fn unsupported(serializer: &'static str, direction: &'static str, found: &CardValue) -> SerializeError {
    SerializeError::UnsupportedValue {
        serializer,
        direction,
        found: found.describe(),
    }
}

/// Serializers available to the runtime model, by name.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: HashMap<&'static str, Arc<dyn PrimitiveSerializer>>,
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.serializers.keys().collect();
        names.sort();
        f.debug_struct("SerializerRegistry")
            .field("serializers", &names)
            .finish()
    }
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `date` and `datetime` serializers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DateSerializer);
        registry.register(DateTimeSerializer);
        registry
    }

    pub fn register(&mut self, serializer: impl PrimitiveSerializer + 'static) {
        self.serializers
            .insert(serializer.name(), Arc::new(serializer));
    }

    pub fn get(&self, name: &str) -> Option<&dyn PrimitiveSerializer> {
        self.serializers.get(name).map(|s| s.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.serializers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap();
        let value = CardValue::Date(date);
        let wire = DateSerializer.serialize(&value).unwrap();

        assert_eq!(wire, CardValue::from("2021-03-14"));
        assert_eq!(DateSerializer.deserialize(&wire).unwrap(), value);
    }

    #[test]
    fn test_datetime_round_trip() {
        let instant = Utc.with_ymd_and_hms(2021, 3, 14, 9, 26, 53).unwrap();
        let value = CardValue::DateTime(instant);
        let wire = DateTimeSerializer.serialize(&value).unwrap();

        assert_eq!(wire, CardValue::from("2021-03-14T09:26:53Z"));
        assert_eq!(DateTimeSerializer.deserialize(&wire).unwrap(), value);
    }

    #[test]
    fn test_datetime_normalizes_offsets() {
        let wire = DateTimeSerializer
            .serialize(&CardValue::from("2021-03-14T10:26:53+01:00"))
            .unwrap();
        assert_eq!(wire, CardValue::from("2021-03-14T09:26:53Z"));
    }

    #[test]
    fn test_malformed_input_is_error() {
        let err = DateSerializer
            .deserialize(&CardValue::from("14/03/2021"))
            .unwrap_err();
        assert!(matches!(err, SerializeError::Parse { serializer: "date", .. }));

        let err = DateSerializer
            .deserialize(&CardValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, SerializeError::UnsupportedValue { .. }));
    }

    #[test]
    fn test_registry_defaults() {
        let registry = SerializerRegistry::with_defaults();
        assert!(registry.get("date").is_some());
        assert!(registry.get("datetime").is_some());
        assert!(registry.get("money").is_none());
        assert_eq!(registry.names().count(), 2);
    }

    #[test]
    fn test_card_value_json_conversion() {
        let value = CardValue::from(json!({ "a": [1, "x", null], "b": { "c": false } }));
        assert_eq!(value.get_path("b.c"), Some(&CardValue::Bool(false)));
        assert_eq!(
            value.to_json(),
            json!({ "a": [1, "x", null], "b": { "c": false } })
        );
        assert!(CardValue::from(json!(0)).is_falsy());
        assert!(CardValue::from(json!("")).is_falsy());
        assert!(!CardValue::from(json!("0")).is_falsy());
    }
}
