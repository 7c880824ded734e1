//! Documents and typed collection access.
//!
//! A [Document] is an ordered map of field names to [crate::common::Value]s.
//! The [CollectionRegistry] caches one store handle per [CollectionKey];
//! a [CollectionAccessor] binds a key to the registry and exposes the
//! generic read, write, aggregation and index operations.
//!
//! ```rust
//! use docbase::collection::{CollectionAccessor, CollectionKey, CollectionRegistry};
//! use docbase::common::CallContext;
//! use docbase::doc;
//! use docbase::store::memory::InMemoryDocumentStore;
//! use docbase::store::DocumentStore;
//!
//! let registry = CollectionRegistry::new(DocumentStore::new(InMemoryDocumentStore::new()));
//! let events = CollectionAccessor::new(registry, CollectionKey::new("", "event"));
//! let ctx = CallContext::background();
//!
//! events.create(&ctx, &doc! { kind: "login" }).unwrap();
//! let all: Vec<docbase::collection::Document> = events.get_all_by_map(&ctx, &doc! {}, None).unwrap();
//! assert_eq!(all.len(), 1);
//! ```

mod accessor;
mod collection_key;
mod document;
mod find_options;
mod index_model;
mod registry;
mod write_result;

pub use accessor::*;
pub use collection_key::*;
pub use document::*;
pub use find_options::*;
pub use index_model::*;
pub use registry::*;
pub use write_result::*;
