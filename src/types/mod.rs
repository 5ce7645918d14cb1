//! Core type definitions: data types, runtime values, and schemas.

mod schema;
mod value;

pub use schema::{Column, Schema, SchemaRef, TableSourceReference};
pub use value::{DataType, Value};
