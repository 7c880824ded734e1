use crate::collection::Document;
use crate::common::{Value, INDEX_NAME_SEPARATOR};
use crate::errors::{DataError, DataResult, ErrorKind};
use itertools::Itertools;

/// Specifies the direction for sorting documents or building index keys.
///
/// On the wire a direction is the integer `1` (ascending) or `-1`
/// (descending), which is also the suffix used in derived index names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Smallest to largest
    Ascending,
    /// Largest to smallest
    Descending,
}

impl SortOrder {
    pub fn direction(&self) -> i64 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    /// Parses a wire direction. Only `1` and `-1` are accepted.
    pub fn from_direction(value: &Value) -> DataResult<SortOrder> {
        match value.as_i64() {
            Some(1) => Ok(SortOrder::Ascending),
            Some(-1) => Ok(SortOrder::Descending),
            _ => {
                log::error!("Invalid sort direction {}", value);
                Err(DataError::new(
                    &format!("Invalid sort direction {}, expected 1 or -1", value),
                    ErrorKind::InvalidOperation,
                ))
            }
        }
    }
}

/// An ordered list of `(field, direction)` pairs.
///
/// Used both as the optional sort argument of the accessor's read
/// operations and as the key list of an index. Order matters: the first
/// field is the primary sort key.
///
/// ```rust
/// use docbase::common::SortSpec;
///
/// let spec = SortSpec::new().desc("uid").asc("created");
/// assert_eq!(spec.index_name(), "uid_-1_created_1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    fields: Vec<(String, SortOrder)>,
}

impl SortSpec {
    pub fn new() -> SortSpec {
        SortSpec { fields: Vec::new() }
    }

    /// A single-field spec.
    pub fn by(field: &str, order: SortOrder) -> SortSpec {
        SortSpec::new().then(field, order)
    }

    pub fn then(mut self, field: &str, order: SortOrder) -> SortSpec {
        self.fields.push((field.to_string(), order));
        self
    }

    pub fn asc(self, field: &str) -> SortSpec {
        self.then(field, SortOrder::Ascending)
    }

    pub fn desc(self, field: &str) -> SortSpec {
        self.then(field, SortOrder::Descending)
    }

    pub fn fields(&self) -> &[(String, SortOrder)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Index name derived the way document stores name unnamed indexes:
    /// each field followed by its direction, all joined with `_`.
    pub fn index_name(&self) -> String {
        self.fields
            .iter()
            .map(|(field, order)| format!("{}{}{}", field, INDEX_NAME_SEPARATOR, order.direction()))
            .join(INDEX_NAME_SEPARATOR)
    }

    /// The `{field: direction}` document form.
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(field, order)| (field.clone(), Value::from(order.direction())))
            .collect()
    }

    /// Reads a `{field: 1 | -1, ...}` document, keeping field order.
    pub fn from_document(document: &Document) -> DataResult<SortSpec> {
        let mut spec = SortSpec::new();
        for (field, direction) in document.iter() {
            spec = spec.then(field, SortOrder::from_direction(direction)?);
        }
        Ok(spec)
    }
}
