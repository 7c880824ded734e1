use crate::common::SortSpec;

/// A request to build an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub keys: SortSpec,
    pub unique: bool,
    /// Explicit index name; derived from `keys` when `None`.
    pub name: Option<String>,
}

impl IndexModel {
    pub fn new(keys: SortSpec, unique: bool) -> Self {
        IndexModel { keys, unique, name: None }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// The explicit name, or the store's default derived name.
    pub fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.keys.index_name())
    }
}

/// An index as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpecification {
    pub name: String,
    pub keys: SortSpec,
    pub unique: bool,
}
