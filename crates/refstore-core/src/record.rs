//! Catalog record representation.

use serde_json::Value;

use crate::error::Result;

/// A single catalog record: a parsed JSON object carrying a persistent
/// identifier under `"DOI"` and, usually, a nested indexed timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Record(Value);

impl Record {
    /// Wrap a parsed value. Returns `None` for anything that is not a JSON
    /// object.
    pub fn from_value(value: Value) -> Option<Self> {
        value.is_object().then_some(Self(value))
    }

    /// Parse a record from stored (already decoded) bytes.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value).ok_or_else(|| {
            serde::de::Error::custom("expected a JSON object")
        })
    }

    /// The record's persistent identifier, when present.
    pub fn doi(&self) -> Option<&str> {
        self.0.get("DOI").and_then(Value::as_str)
    }

    /// Minified serialization, as written to the store.
    pub fn to_minified_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Record::from_value(json!({"DOI": "10.1/a"})).is_some());
        assert!(Record::from_value(json!([1, 2, 3])).is_none());
        assert!(Record::from_value(json!("10.1/a")).is_none());
    }

    #[test]
    fn test_doi_extraction() {
        let record = Record::from_value(json!({"DOI": "10.1234/example"})).unwrap();
        assert_eq!(record.doi(), Some("10.1234/example"));

        let record = Record::from_value(json!({"title": ["no identifier"]})).unwrap();
        assert_eq!(record.doi(), None);

        // a non-string DOI counts as absent
        let record = Record::from_value(json!({"DOI": 42})).unwrap();
        assert_eq!(record.doi(), None);
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let record = Record::from_value(json!({"DOI": "10.1/a", "x": 1})).unwrap();
        let bytes = record.to_minified_bytes().unwrap();
        assert_eq!(Record::from_bytes(&bytes).unwrap(), record);

        assert!(Record::from_bytes(b"[1, 2]").is_err());
        assert!(Record::from_bytes(b"not json").is_err());
    }
}
