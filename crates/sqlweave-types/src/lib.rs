//! sqlweave-types: foundation types shared by every sqlweave crate
//!
//! - [`Value`]: the dynamic object graph that parameter objects, scope
//!   bindings, cache key components and result rows are expressed in
//! - [`ObjectAccessor`]: structural, name-based field access over values,
//!   distinguishing a field that is absent from the schema
//!   ([`FieldLookup::Missing`]) from a field that is present but null
//! - [`StructuralAccessor`]: the default accessor for maps and records

mod accessor;
mod value;

pub use accessor::{AccessError, FieldLookup, ObjectAccessor, StructuralAccessor};
pub use value::{Record, Value};
