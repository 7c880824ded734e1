//! In-process implementations of the document store and the counter store.

mod aggregate;
mod collection;
mod counter;
mod document_store;
mod query;

pub use collection::*;
pub use counter::*;
pub use document_store::*;
