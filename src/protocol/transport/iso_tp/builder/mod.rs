//! Outbound segmentation: turns a payload into the single frame, or the first frame
//! followed by consecutive frames, that carry it.
use super::{next_sequence, TpAddressing, TpFrame, MAX_TP_PAYLOAD};
use crate::error::ProtocolViolation;
use crate::protocol::transport::can_frame::CanFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Single,
    First,
    Consecutive,
    Done,
}

/// Owned copy of an outbound payload plus the cursor over its frames.
///
/// The segment holds its own buffer so a framer can keep it across the flow-control
/// wait without borrowing from the caller.
#[derive(Debug, Clone)]
pub struct TransmitSegment {
    addressing: TpAddressing,
    sender: u8,
    recipient: u8,
    payload: [u8; MAX_TP_PAYLOAD],
    len: usize,
    offset: usize,
    sequence: u8,
    next_kind: SegmentKind,
}

impl TransmitSegment {
    /// Prepare the frames carrying `payload` from `sender` to `recipient`.
    ///
    /// # Errors
    /// [`ProtocolViolation::LengthOutOfRange`] for empty payloads and payloads longer
    /// than [`MAX_TP_PAYLOAD`].
    pub fn new(
        addressing: TpAddressing,
        sender: u8,
        recipient: u8,
        payload: &[u8],
    ) -> Result<Self, ProtocolViolation> {
        let len = payload.len();
        if len == 0 || len > MAX_TP_PAYLOAD {
            return Err(ProtocolViolation::LengthOutOfRange { length: len });
        }
        let mut buffer = [0u8; MAX_TP_PAYLOAD];
        buffer[..len].copy_from_slice(payload);

        let next_kind = if len <= addressing.single_capacity() {
            SegmentKind::Single
        } else {
            SegmentKind::First
        };

        Ok(Self {
            addressing,
            sender,
            recipient,
            payload: buffer,
            len,
            offset: 0,
            sequence: 1,
            next_kind,
        })
    }

    /// Peer the segment is addressed to.
    pub fn recipient(&self) -> u8 {
        self.recipient
    }

    /// True once the last frame was produced.
    pub fn is_drained(&self) -> bool {
        self.next_kind == SegmentKind::Done
    }

    /// True when the segment needs more than one frame (and therefore flow control).
    pub fn is_segmented(&self) -> bool {
        self.len > self.addressing.single_capacity()
    }

    /// Payload bytes not yet handed to a frame.
    pub fn remaining(&self) -> usize {
        self.len - self.offset
    }

    /// Produce the next frame, `None` once drained.
    pub fn next_frame(&mut self) -> Option<CanFrame> {
        let (frame, taken, next_kind) = match self.next_kind {
            SegmentKind::Done => return None,
            SegmentKind::Single => {
                let frame = TpFrame::Single {
                    data: &self.payload[..self.len],
                };
                (frame, self.len, SegmentKind::Done)
            }
            SegmentKind::First => {
                let count = self.addressing.first_capacity().min(self.len);
                let frame = TpFrame::First {
                    total_len: self.len,
                    data: &self.payload[..count],
                };
                (frame, count, SegmentKind::Consecutive)
            }
            SegmentKind::Consecutive => {
                let count = self.addressing.consecutive_capacity().min(self.remaining());
                let frame = TpFrame::Consecutive {
                    sequence: self.sequence,
                    data: &self.payload[self.offset..self.offset + count],
                };
                let next_kind = if self.offset + count >= self.len {
                    SegmentKind::Done
                } else {
                    SegmentKind::Consecutive
                };
                (frame, count, next_kind)
            }
        };

        let raw = frame.to_can_frame(self.addressing, self.sender, self.recipient);
        if self.next_kind == SegmentKind::Consecutive {
            self.sequence = next_sequence(self.sequence);
        }
        self.offset += taken;
        self.next_kind = next_kind;
        Some(raw)
    }
}

impl Iterator for TransmitSegment {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}
