//! Value encoding for property indexes.
//!
//! - `numeric`: order-preserving text encoding of doubles
//! - `value`: the indexed value model and its document encoding

pub mod numeric;
pub mod value;

pub use value::{ArrayValue, Value, ValueCodec};
