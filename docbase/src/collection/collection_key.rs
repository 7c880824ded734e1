use std::fmt::{Display, Formatter};

/// Identifies one collection inside one database.
///
/// Used only as the registry's cache key. Equality and hashing are
/// structural, so two keys built from the same names hit the same cache
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    database: String,
    collection: String,
}

impl CollectionKey {
    pub fn new(database: &str, collection: &str) -> Self {
        CollectionKey {
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Replaces an empty database name with `default_database`.
    pub(crate) fn or_default_database(&self, default_database: &str) -> CollectionKey {
        if self.database.is_empty() {
            CollectionKey::new(default_database, &self.collection)
        } else {
            self.clone()
        }
    }
}

impl Display for CollectionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equal_names_are_equal_keys() {
        let mut set = HashSet::new();
        set.insert(CollectionKey::new("db", "user"));
        assert!(set.contains(&CollectionKey::new("db", "user")));
        assert!(!set.contains(&CollectionKey::new("other", "user")));
    }

    #[test]
    fn empty_database_takes_default() {
        let key = CollectionKey::new("", "user").or_default_database("test");
        assert_eq!(key, CollectionKey::new("test", "user"));
        let key = CollectionKey::new("admin", "user").or_default_database("test");
        assert_eq!(key.database(), "admin");
    }

    #[test]
    fn display_is_dotted() {
        assert_eq!(CollectionKey::new("db", "api_log").to_string(), "db.api_log");
    }
}
