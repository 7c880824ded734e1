//! Common types shared by every layer: values, sort specifications, call
//! contexts, the serde codec and small synchronization helpers.

mod call_context;
mod codec;
mod constants;
mod sort_order;
mod sync;
mod value;

pub use call_context::*;
pub use codec::*;
pub use constants::*;
pub use sort_order::*;
pub use sync::*;
pub use value::*;
