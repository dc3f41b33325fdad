//! Abstraction traits used by the transport layer (CAN bus, timer, record sender, power lines).
pub mod bus_timer;
pub mod can_bus;
pub mod power;
pub mod record_sender;
