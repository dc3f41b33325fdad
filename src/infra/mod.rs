//! Infrastructure shared by every protocol layer: the schema-driven frame codec.
pub mod codec;
