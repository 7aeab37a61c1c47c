//! Logical type system shared by the schema decoder and batch materializer.

pub mod mapping;

pub use mapping::LogicalType;
