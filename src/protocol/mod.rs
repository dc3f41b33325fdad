//! High-level components of the bench protocol: the diagnostic dialect, emulated
//! modules, lookup tables, the message catalog, passive monitors and the CAN/ISO-TP
//! transport.
pub mod diagnostic;
pub mod emulators;
pub mod lookups;
pub mod messages;
pub mod monitoring;
pub mod transport;
