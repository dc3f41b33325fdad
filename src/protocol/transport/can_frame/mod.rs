//! In-memory representation of a classic CAN frame as seen by the bench adapter.
use crate::core::MAX_FRAME_BYTES;
use crate::protocol::transport::can_id::CanId;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw frame observed on or sent to the bus.
pub struct CanFrame {
    /// 11-bit or 29-bit identifier.
    pub id: CanId,
    /// Payload buffer. Classic CAN frames carry at most eight bytes.
    pub data: [u8; MAX_FRAME_BYTES],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
    /// Adapter timestamp in microseconds, 0 for frames built locally.
    pub timestamp_us: u64,
}

impl CanFrame {
    /// Build a data frame; payloads longer than eight bytes are truncated.
    pub fn new(id: CanId, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_FRAME_BYTES);
        let mut data = [0u8; MAX_FRAME_BYTES];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            data,
            len,
            timestamp_us: 0,
        }
    }

    /// Attach the receive timestamp reported by the adapter.
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<embedded_can::Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_FRAME_BYTES {
            return None;
        }
        Some(CanFrame::new(CanId::from(id.into()), data))
    }

    /// Remote frames are never used on the bench.
    fn new_remote(_id: impl Into<embedded_can::Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> embedded_can::Id {
        self.id.into()
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}
