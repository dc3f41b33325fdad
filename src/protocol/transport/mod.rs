//! Transport layer: CAN frame representation, identifier helpers, the ISO-TP style
//! segmentation framer, and bus abstraction traits.
//!
//! The constants below pace segmented transfers and bound the waits of the framer.

pub mod can_frame;
pub mod can_id;
pub mod iso_tp;
pub mod traits;

/// Minimal delay between two consecutive frames of a segmented payload (ms).
///
/// Flow-control frames carry a separation time chosen by the receiver. The emulated
/// modules always ask for 1 ms and the framer never goes below that, even when a peer
/// announces 0 or a sub-millisecond value.
///
/// # Recommended Values
///
/// - **1 ms**: What the bench modules announce and what their own emulators use.
/// - **2–5 ms**: Useful with adapters that buffer only a couple of frames.
pub const TP_SEPARATION_TIME_MS: u8 = 1;

/// Block size announced in outgoing flow-control frames (0 = send everything).
pub const TP_FLOW_BLOCK_SIZE: u8 = 0;

/// Upper bound a [`CanBus`](traits::can_bus::CanBus) adapter should put on one `send()` (ms).
///
/// The library never enforces it itself: a blocked `send()` only stalls the emulator that
/// issued it. USB adapters queue a few frames and acknowledge within a couple of
/// milliseconds; 100 ms means the adapter or the bus is gone.
///
/// ```rust,ignore
/// use embassy_time::{with_timeout, Duration};
/// use ecu_emu::protocol::transport::CAN_SEND_TIMEOUT_MS;
///
/// with_timeout(Duration::from_millis(CAN_SEND_TIMEOUT_MS as u64), adapter.write(&raw))
///     .await
///     .map_err(|_| AdapterError::SendTimeout)?;
/// ```
pub const CAN_SEND_TIMEOUT_MS: u32 = 100;

/// Idle time after which an unfinished reassembly is discarded (µs of adapter time).
///
/// Measured with the timestamps carried by received frames, so no clock is needed. The
/// next frame handled by the assembler evicts any slot older than this.
pub const TP_REASSEMBLY_TIMEOUT_US: u64 = 1_000_000;

/// How long a sender waits for the peer's flow-control frame after a first frame (ms).
pub const TP_FLOW_CONTROL_TIMEOUT_MS: u32 = 1_000;
