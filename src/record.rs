//! Record and batch payload types.
//!
//! A [`Record`] is the unit of data produced by models: an ordered mapping
//! from field names to dynamic JSON values. Records flow from a model
//! through the mapping chain into a format, which folds a run of them into
//! a single opaque [`Payload`] handed to a medium.

use serde_json::Map;

/// Dynamic field value (string, number, boolean, nested object, list, null).
pub type Value = serde_json::Value;

/// One generated item: an ordered mapping from field names to values.
///
/// Field order is preserved from insertion, which is what line formats use
/// to keep column order stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a field, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Remove a field, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Check whether a field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Iterate over field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Mutably iterate over fields in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.0.iter_mut()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Serialize the record as a compact JSON object string.
    pub fn to_json(&self) -> String {
        // A map of JSON values cannot fail to serialize.
        serde_json::to_string(&self.0).expect("record serialization cannot fail")
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A serialized batch: one opaque payload of up to `batch-size` records.
///
/// Formats declare their encoding through the variant they produce; mediums
/// that only understand one encoding reject the other at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 text (line formats).
    Text(String),
    /// Raw bytes (binary formats).
    Binary(Vec<u8>),
}

impl Payload {
    /// An empty text payload (the `size = 0` no-op batch).
    pub fn empty() -> Self {
        Payload::Text(String::new())
    }

    /// Byte view of the payload, regardless of encoding.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Binary(b) => b,
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Text view, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_insert_get() {
        let mut record = Record::new();
        record.insert("name", "snort");
        record.insert("count", 3);
        assert_eq!(record.get("name"), Some(&json!("snort")));
        assert_eq!(record.get("count"), Some(&json!(3)));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_record_preserves_insertion_order() {
        let mut record = Record::new();
        record.insert("z", 1);
        record.insert("a", 2);
        record.insert("m", 3);
        let keys: Vec<_> = record.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_record_to_json() {
        let mut record = Record::new();
        record.insert("id", "test1");
        record.insert("ok", true);
        assert_eq!(record.to_json(), r#"{"id":"test1","ok":true}"#);
    }

    #[test]
    fn test_payload_bytes() {
        assert_eq!(Payload::Text("abc".into()).as_bytes(), b"abc");
        assert_eq!(Payload::Binary(vec![1, 2]).len(), 2);
        assert!(Payload::empty().is_empty());
    }

    #[test]
    fn test_payload_text_view() {
        assert_eq!(Payload::Text("x".into()).as_text(), Some("x"));
        assert_eq!(Payload::Binary(vec![0]).as_text(), None);
    }
}
