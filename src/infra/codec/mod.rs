//! Frame codec: byte cursors, the schema interpreter, and the typed-record contract.
pub mod cursor;
pub mod engine;
pub mod traits;
