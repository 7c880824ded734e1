//! # docbase - typed data access over document databases
//!
//! docbase gives services a small, generic data-access layer on top of a
//! document database, plus an auto-increment identifier allocator shared
//! by every process that writes the same collections.
//!
//! ## Key Features
//!
//! - **Collection registry**: one cached handle per `(database, collection)`
//! - **Generic accessor**: typed reads, pagination, writes, aggregation and
//!   idempotent index creation, with serde doing the encoding
//! - **Pipeline text**: aggregation pipelines written as JSON-like text,
//!   with stage and key order preserved
//! - **Id allocator**: dense, strictly increasing integer ids backed by an
//!   external counter store, with an observable degraded mode when that
//!   store is unavailable
//! - **Models**: per-entity wrappers adding id allocation, `created`
//!   stamps and soft delete
//!
//! ## Quick Start
//!
//! ```rust
//! use docbase::common::{SortSpec, Value};
//! use docbase::data_context::DataContext;
//! use docbase::doc;
//! use docbase::repository::Entity;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct User {
//!     #[serde(rename = "_id")]
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for User {
//!     fn collection_name() -> &'static str { "user" }
//!     fn id(&self) -> Value { Value::from(self.id) }
//!     fn set_id(&mut self, id: i64) { self.id = id; }
//! }
//!
//! let context = DataContext::builder().track::<User>().open().unwrap();
//! let ctx = context.call_context();
//! let users = context.model::<User>();
//!
//! let mut user = User { name: "ann".into(), ..User::default() };
//! let id = users.create(&ctx, &mut user).unwrap();
//! assert_eq!(id, Value::from(1));
//!
//! let found: Vec<User> = users
//!     .list(&ctx, &doc! {}, 1, 10, Some(&SortSpec::new().desc("_id")))
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! ```
//!
//! ## Module Organization
//!
//! - [`allocator`] - Distributed auto-increment identifiers
//! - [`collection`] - Documents, the collection registry and the accessor
//! - [`common`] - Values, sort specifications, call contexts and the codec
//! - [`config`] - Connection and allocator settings
//! - [`data_context`] - The process-wide entry point
//! - [`errors`] - Error types and result definitions
//! - [`pipeline`] - Aggregation pipeline parsing
//! - [`repository`] - Typed entity models
//! - [`store`] - Document and counter store abstractions, in-memory backends

pub mod allocator;
pub mod collection;
pub mod common;
pub mod config;
pub mod data_context;
pub mod errors;
pub mod pipeline;
pub mod repository;
pub mod store;
