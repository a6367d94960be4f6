//! Record model: keys, bins and values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordering key of an entry inside a map bin.
pub type SubKey = i64;

/// Width in bytes of a digest record identifier.
pub const DIGEST_SIZE: usize = 32;

/// Identifier of a record within a namespace and set.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
    /// A human-readable key.
    Text(String),
    /// A fixed-width content digest.
    Digest([u8; DIGEST_SIZE]),
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Text(text) => write!(f, "Text({text:?})"),
            RecordId::Digest(_) => write!(f, "Digest({self})"),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Text(text) => f.write_str(text),
            RecordId::Digest(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Fully qualified address of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Namespace holding the record.
    pub namespace: String,
    /// Set within the namespace.
    pub set: String,
    /// Record identifier within the set.
    pub id: RecordId,
}

impl RecordKey {
    /// Creates a key from its parts.
    pub fn new(namespace: impl Into<String>, set: impl Into<String>, id: RecordId) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            id,
        }
    }

    /// Creates a key with a text identifier.
    pub fn text(namespace: impl Into<String>, set: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(namespace, set, RecordId::Text(id.into()))
    }

    /// Returns true if the key belongs to `namespace`/`set`.
    pub fn in_set(&self, namespace: &str, set: &str) -> bool {
        self.namespace == namespace && self.set == set
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.set, self.id)
    }
}

/// A bin value.
///
/// Application payloads are opaque to the store and to the engine; maps
/// are always ordered by their integer keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value. Writing `Null` to a bin removes the bin.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Key-ordered map.
    Map(BTreeMap<SubKey, Value>),
}

impl Value {
    /// Returns the integer if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the list if this is a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the text if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the map if this is a `Map`.
    pub fn as_map(&self) -> Option<&BTreeMap<SubKey, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns true if this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<SubKey, Value>> for Value {
    fn from(v: BTreeMap<SubKey, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A stored record: a generation plus named bins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    /// Mutation counter, 1 after creation.
    pub generation: u32,
    /// Named bins.
    pub bins: BTreeMap<String, Value>,
}

impl Record {
    /// Returns a bin, if present.
    pub fn bin(&self, name: &str) -> Option<&Value> {
        self.bins.get(name)
    }

    /// Returns a map bin, if present and a map.
    pub fn map(&self, name: &str) -> Option<&BTreeMap<SubKey, Value>> {
        self.bin(name).and_then(Value::as_map)
    }

    /// Returns an integer bin, if present and an integer.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.bin(name).and_then(Value::as_int)
    }

    /// Removes and returns a bin.
    pub fn take_bin(&mut self, name: &str) -> Option<Value> {
        self.bins.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_key_display() {
        let key = RecordKey::text("test", "testAdapt", "12345:0");
        assert_eq!(key.to_string(), "test/testAdapt/12345:0");
        assert!(key.in_set("test", "testAdapt"));
        assert!(!key.in_set("test", "other"));
    }

    #[test]
    fn digest_key_display_is_hex() {
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes[0] = 0xab;
        bytes[DIGEST_SIZE - 1] = 0x01;
        let id = RecordId::Digest(bytes);
        let text = id.to_string();
        assert_eq!(text.len(), DIGEST_SIZE * 2);
        assert!(text.starts_with("ab"));
        assert!(text.ends_with("01"));
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(5i64).as_int(), Some(5));
        assert_eq!(Value::from("x").as_text(), Some("x"));
        assert!(Value::from(None::<i64>).is_null());
        let list = Value::from(vec![Value::from(1i64)]);
        assert_eq!(list.as_list().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn value_serde_json() {
        let mut map = BTreeMap::new();
        map.insert(-3, Value::from("neg"));
        map.insert(10, Value::List(vec![Value::Bool(true)]));
        let value = Value::Map(map);
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn record_accessors() {
        let mut record = Record::default();
        record.bins.insert("lo".into(), Value::Int(4));
        record.bins.insert("m".into(), Value::Map(BTreeMap::new()));
        assert_eq!(record.int("lo"), Some(4));
        assert!(record.map("m").unwrap().is_empty());
        assert!(record.map("lo").is_none());
        assert_eq!(record.take_bin("lo"), Some(Value::Int(4)));
        assert!(record.bin("lo").is_none());
    }
}
