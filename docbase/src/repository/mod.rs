//! Typed models on top of the collection accessor.
//!
//! An [Entity] describes a record type and its collection; an
//! [EntityModel] wraps the accessor for that collection and the shared id
//! allocator, adding `create` with identifier allocation, soft delete and
//! declared index creation.

mod entity;
mod entity_model;

pub use entity::*;
pub use entity_model::*;
