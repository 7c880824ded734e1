//! Store abstractions.
//!
//! Two external collaborators sit behind traits:
//!
//! - a **document store** ([DocumentStoreProvider]) that hands out
//!   collection handles ([CollectionProvider]) and executes queries, writes,
//!   aggregations and index management;
//! - a **counter store** ([CounterStoreProvider]) offering atomic integer
//!   increments, used by the identifier allocator.
//!
//! Each trait is wrapped by a cheap-to-clone handle ([DocumentStore],
//! [CollectionHandle], [CounterStore]) that dereferences to the provider.
//! The [memory] module implements both collaborators in process.

mod collection_handle;
mod counter_store;
mod document_store;
pub mod memory;

pub use collection_handle::*;
pub use counter_store::*;
pub use document_store::*;
