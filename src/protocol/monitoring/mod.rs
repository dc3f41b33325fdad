//! Passive observers of the module under test: the debug console text stream and the
//! periodic status reports.
pub mod console;
pub mod status;
