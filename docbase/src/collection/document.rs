use crate::common::{Value, DOC_ID, FIELD_SEPARATOR};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{Debug, Display};

/// An ordered set of named [Value]s.
///
/// Fields keep the order in which they were first inserted. Aggregation
/// stages, sort specifications and index keys are all order sensitive, so
/// the document is backed by an [IndexMap] rather than a hash or tree map.
///
/// Equality ignores field order: `{a: 1, b: 2}` equals `{b: 2, a: 1}`,
/// which matches how a store compares filter documents for equality on
/// plain data. Use [Document::keys] when order is what you need to check.
///
/// Keys are stored literally. A key such as `"address.city"` is one field
/// named `address.city`; the dotted-path helpers ([Document::get_path],
/// [Document::set_path]) interpret dots as nesting.
#[derive(Clone, Default)]
pub struct Document {
    data: IndexMap<String, Value>,
}

impl Document {
    /// Creates a new empty document.
    pub fn new() -> Self {
        Document {
            data: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Sets `key` to `value`. An existing key keeps its position; a new key
    /// is appended. Returns the previous value, if any.
    pub fn put<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Builder form of [Document::put].
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.put(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Resolves a dotted path through nested documents and array indexes,
    /// e.g. `"address.city"` or `"tags.0"`.
    ///
    /// A literal key containing the separator takes precedence over the
    /// nested interpretation.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }
        let mut parts = path.split(FIELD_SEPARATOR);
        let first = parts.next()?;
        let mut current = self.data.get(first)?;
        for part in parts {
            current = match current {
                Value::Document(doc) => doc.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets a value at a dotted path, creating intermediate documents and
    /// replacing non-document intermediates.
    pub fn set_path(&mut self, path: &str, value: Value) {
        match path.split_once(FIELD_SEPARATOR) {
            None => {
                self.data.insert(path.to_string(), value);
            }
            Some((head, rest)) => {
                let entry = self
                    .data
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Document(Document::new()));
                if entry.as_document().is_none() {
                    *entry = Value::Document(Document::new());
                }
                if let Some(nested) = entry.as_document_mut() {
                    nested.set_path(rest, value);
                }
            }
        }
    }

    /// Removes a field, keeping the relative order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Field names in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// The `_id` field, if present.
    pub fn id(&self) -> Option<&Value> {
        self.data.get(DOC_ID)
    }

    /// Copies every field of `other` into this document, overwriting fields
    /// with the same name.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.iter() {
            self.data.insert(key.clone(), value.clone());
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    pub(crate) fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Document {}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality ignores field order, so ordering compares fields by name.
impl Ord for Document {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.data.iter().sorted_by(|a, b| a.0.cmp(b.0));
        let right = other.data.iter().sorted_by(|a, b| a.0.cmp(b.0));
        left.cmp(right)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.data.iter()).finish()
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.data.iter())
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Map::deserialize(deserializer).map(Document::from_json_map)
    }
}

pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [Document] with JSON-like syntax.
///
/// Keys may be identifiers or string literals. Values may be literals,
/// nested `{ .. }` documents, `[ .. ]` arrays, or any expression wrapped in
/// parentheses (negative numbers included: `(-1)`).
///
/// ```rust
/// use docbase::doc;
///
/// let base = 10;
/// let filter = doc! {
///     "name": "Alice",
///     age: (base * 3),
///     address: { city: "Paris" },
///     tags: ["a", "b"],
/// };
/// assert_eq!(filter.len(), 4);
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::collection::Document::new()
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            let mut doc = $crate::collection::Document::new();
            $(
                doc.put($crate::collection::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Helper macro converting values for [doc!].
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
