use crate::collection::Document;
use crate::common::{SortSpec, Value};

/// Options for controlling find operations.
///
/// Supports method chaining:
///
/// ```rust
/// use docbase::collection::FindOptions;
/// use docbase::common::SortSpec;
///
/// let options = FindOptions::new()
///     .sort(SortSpec::new().desc("created"))
///     .skip(20)
///     .limit(10);
/// assert_eq!(options.limit, Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub projection: Option<Vec<String>>,
}

/// Creates `FindOptions` sorted by the given spec.
pub fn order_by(sort: SortSpec) -> FindOptions {
    FindOptions::new().sort(sort)
}

/// Creates `FindOptions` that skips a number of results.
pub fn skip_by(skip: u64) -> FindOptions {
    FindOptions::new().skip(skip)
}

/// Creates `FindOptions` that limits the number of results.
pub fn limit_to(limit: u64) -> FindOptions {
    FindOptions::new().limit(limit)
}

impl FindOptions {
    pub fn new() -> FindOptions {
        FindOptions::default()
    }

    pub fn sort(mut self, sort: SortSpec) -> FindOptions {
        self.sort = Some(sort);
        self
    }

    /// Sets the sort only when one is given; `None` keeps store order.
    pub fn sort_opt(mut self, sort: Option<&SortSpec>) -> FindOptions {
        self.sort = sort.filter(|s| !s.is_empty()).cloned();
        self
    }

    pub fn skip(mut self, skip: u64) -> FindOptions {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> FindOptions {
        self.limit = Some(limit);
        self
    }

    /// Restricts returned documents to the named fields (plus `_id`). An
    /// empty list means no projection.
    pub fn projection<S: AsRef<str>>(mut self, fields: &[S]) -> FindOptions {
        if fields.is_empty() {
            self.projection = None;
        } else {
            self.projection = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        }
        self
    }

    /// The `{field: 1, ...}` projection document, if any.
    pub fn projection_document(&self) -> Option<Document> {
        self.projection
            .as_ref()
            .map(|fields| fields.iter().map(|f| (f.clone(), Value::from(1))).collect())
    }
}
