//! Type and schema system: data type tags, attributes, tuple schemas,
//! and the owned scalar representation.

mod attribute;
mod data_type;
mod datum;
mod schema;

pub use attribute::{Attribute, Nullability};
pub use data_type::DataType;
pub use datum::Datum;
pub use schema::TupleSchema;
