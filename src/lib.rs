//! `ecu-emu` library: the protocol engine used to exercise and emulate control units
//! on a bench CAN bus, in a `no_std` environment. The crate exposes the
//! infrastructure modules (frame codec), the transport (CAN frames, ISO-TP style
//! segmentation), the diagnostic request/response dialect, and emulated modules.
#![cfg_attr(not(test), no_std)]
//==================================================================================
/// Core data types shared by the message catalog and the codec engine.
pub mod core;
/// Domain and low-level errors (frame validation, exchange deadlines, segmentation,
/// bus failures).
pub mod error;
/// Schema-driven frame codec.
pub mod infra;
/// Bench protocol implementation: CAN transport, ISO-TP framer, diagnostic sessions,
/// emulators, and lookup tables.
pub mod protocol;
//==================================================================================
