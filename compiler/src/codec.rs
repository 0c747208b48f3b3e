//! Applies a primitive serializer at a dotted attribute path inside nested
//! card data.

use crate::error::SerializeError;
use crate::serializers::{CardValue, PrimitiveSerializer};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Serialize,
    Deserialize,
}

/// Convert the value found at `path` in `record` in place.
///
/// Falsy or missing values along the way mean there is nothing to convert
/// and are skipped without error. Lists are mapped element-wise, both in the
/// middle of a path and at its leaf.
pub fn apply(
    record: &mut IndexMap<String, CardValue>,
    path: &str,
    serializer: &dyn PrimitiveSerializer,
    direction: Direction,
) -> Result<(), SerializeError> {
    let segments: Vec<&str> = path.split('.').collect();
    apply_segments(record, &segments, serializer, direction)
}

fn apply_segments(
    record: &mut IndexMap<String, CardValue>,
    segments: &[&str],
    serializer: &dyn PrimitiveSerializer,
    direction: Direction,
) -> Result<(), SerializeError> {
    let Some((key, rest)) = segments.split_first() else {
        return Ok(());
    };
    let Some(value) = record.get_mut(*key) else {
        return Ok(());
    };
    if value.is_falsy() {
        return Ok(());
    }

    if rest.is_empty() {
        return convert(value, serializer, direction);
    }

    match value {
        CardValue::List(items) => {
            for item in items.iter_mut() {
                if let CardValue::Record(inner) = item {
                    apply_segments(inner, rest, serializer, direction)?;
                }
            }
            Ok(())
        }
        CardValue::Record(inner) => apply_segments(inner, rest, serializer, direction),
        _ => Ok(()),
    }
}

fn convert(
    value: &mut CardValue,
    serializer: &dyn PrimitiveSerializer,
    direction: Direction,
) -> Result<(), SerializeError> {
    if let CardValue::List(items) = value {
        for item in items.iter_mut().filter(|item| !item.is_falsy()) {
            *item = run(item, serializer, direction)?;
        }
        return Ok(());
    }
    *value = run(value, serializer, direction)?;
    Ok(())
}

fn run(
    value: &CardValue,
    serializer: &dyn PrimitiveSerializer,
    direction: Direction,
) -> Result<CardValue, SerializeError> {
    match direction {
        Direction::Serialize => serializer.serialize(value),
        Direction::Deserialize => serializer.deserialize(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializers::DateSerializer;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(value: serde_json::Value) -> IndexMap<String, CardValue> {
        match CardValue::from(value) {
            CardValue::Record(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> CardValue {
        CardValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_deserialize_top_level_and_nested() {
        let mut data = record(json!({
            "createdAt": "2021-01-02",
            "author": { "birthdate": "1980-05-06" }
        }));
        apply(&mut data, "createdAt", &DateSerializer, Direction::Deserialize).unwrap();
        apply(&mut data, "author.birthdate", &DateSerializer, Direction::Deserialize).unwrap();

        assert_eq!(data["createdAt"], date(2021, 1, 2));
        assert_eq!(
            CardValue::Record(data.clone()).get_path("author.birthdate"),
            Some(&date(1980, 5, 6))
        );
    }

    #[test]
    fn test_maps_over_lists() {
        let mut data = record(json!({
            "authors": [
                { "birthdate": "1980-05-06" },
                { "birthdate": null },
                { "birthdate": "1990-07-08" }
            ],
            "holidays": ["2021-12-25", "", "2022-01-01"]
        }));
        apply(&mut data, "authors.birthdate", &DateSerializer, Direction::Deserialize).unwrap();
        apply(&mut data, "holidays", &DateSerializer, Direction::Deserialize).unwrap();

        let CardValue::List(authors) = &data["authors"] else {
            panic!("authors should stay a list");
        };
        assert_eq!(authors[0].get_path("birthdate"), Some(&date(1980, 5, 6)));
        assert_eq!(authors[1].get_path("birthdate"), Some(&CardValue::Null));
        assert_eq!(authors[2].get_path("birthdate"), Some(&date(1990, 7, 8)));
        assert_eq!(
            data["holidays"],
            CardValue::List(vec![date(2021, 12, 25), CardValue::from(""), date(2022, 1, 1)])
        );
    }

    #[test]
    fn test_falsy_leaves_are_skipped() {
        for falsy in [json!(0), json!(""), json!(false), json!(null)] {
            let original = record(json!({ "when": falsy, "nested": { "when": falsy } }));
            let mut data = original.clone();
            apply(&mut data, "when", &DateSerializer, Direction::Serialize).unwrap();
            apply(&mut data, "nested.when", &DateSerializer, Direction::Deserialize).unwrap();
            assert_eq!(data, original);
        }

        let original = record(json!({ "other": 1 }));
        let mut data = original.clone();
        apply(&mut data, "missing.deeper", &DateSerializer, Direction::Deserialize).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_serialize_round_trip_through_codec() {
        let mut data = record(json!({ "event": { "on": "2021-06-01" } }));
        let original = data.clone();
        apply(&mut data, "event.on", &DateSerializer, Direction::Deserialize).unwrap();
        apply(&mut data, "event.on", &DateSerializer, Direction::Serialize).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_serializer_failure_propagates() {
        let mut data = record(json!({ "when": "not-a-date" }));
        let err = apply(&mut data, "when", &DateSerializer, Direction::Deserialize).unwrap_err();
        assert!(matches!(err, SerializeError::Parse { .. }));
    }
}
