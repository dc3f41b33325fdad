//! ISO-TP style segmentation: carries payloads of up to 4095 bytes over 8-byte frames
//! using the single / first / consecutive / flow-control frame taxonomy.
//!
//! In the addressed dialect used by the bench modules, byte 0 of every frame is the
//! logical recipient and the protocol control information (PCI) sits in byte 1. The
//! high nibble of the PCI selects the frame type.
use crate::core::MAX_FRAME_BYTES;
use crate::error::MessageError;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;

pub mod assembler;
pub mod builder;
pub mod framer;

/// Largest payload a 12-bit first-frame length can announce.
pub const MAX_TP_PAYLOAD: usize = 4095;

/// Padding byte for unused frame bytes.
const PADDING: u8 = 0x00;

const PCI_SINGLE: u8 = 0x0;
const PCI_FIRST: u8 = 0x1;
const PCI_CONSECUTIVE: u8 = 0x2;
const PCI_FLOW: u8 = 0x3;

//==================================================================================ADDRESSING
/// Whether frames start with a recipient byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TpAddressing {
    /// `[recipient][pci]...`: the dialect spoken by the DDE and its tester.
    Addressed,
    /// `[pci]...`: canonical ISO-TP, one more data byte per frame.
    Normal,
}

impl TpAddressing {
    /// Bytes preceding the PCI.
    pub const fn header_len(self) -> usize {
        match self {
            TpAddressing::Addressed => 1,
            TpAddressing::Normal => 0,
        }
    }

    /// Largest payload that fits a single frame (6 addressed, 7 normal).
    pub const fn single_capacity(self) -> usize {
        MAX_FRAME_BYTES - 1 - self.header_len()
    }

    /// Data bytes carried by a first frame (5 addressed, 6 normal).
    pub const fn first_capacity(self) -> usize {
        MAX_FRAME_BYTES - 2 - self.header_len()
    }

    /// Data bytes carried by a consecutive frame (6 addressed, 7 normal).
    pub const fn consecutive_capacity(self) -> usize {
        MAX_FRAME_BYTES - 1 - self.header_len()
    }
}

//==================================================================================FLOW_STATUS
/// Flow-control subtype (low nibble of a flow frame's PCI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowStatus {
    /// Clear to send the next block.
    Continue = 0,
    /// Receiver busy; hold the transfer until the next flow frame.
    Wait = 1,
    /// Receiver cannot take the transfer; cancel it.
    Abort = 2,
}

impl FlowStatus {
    fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(FlowStatus::Continue),
            1 => Some(FlowStatus::Wait),
            2 => Some(FlowStatus::Abort),
            _ => None,
        }
    }
}

/// Convert a separation-time byte into whole milliseconds, never below 1 ms.
///
/// 0x00–0x7F are milliseconds, 0xF1–0xF9 are 100–900 µs, everything else is reserved
/// and treated as the longest legal value.
pub const fn separation_time_ms(raw: u8) -> u32 {
    let millis = match raw {
        0x00..=0x7f => raw as u32,
        0xf1..=0xf9 => 1,
        _ => 0x7f,
    };
    if millis == 0 {
        1
    } else {
        millis
    }
}

//==================================================================================TP_FRAME
/// One decoded segmentation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TpFrame<'a> {
    /// Whole payload in one frame.
    Single { data: &'a [u8] },
    /// Start of a segmented payload with its 12-bit total length.
    First { total_len: usize, data: &'a [u8] },
    /// Next chunk, tagged with the 4-bit rolling sequence.
    Consecutive { sequence: u8, data: &'a [u8] },
    /// Receiver's pacing instructions.
    FlowControl {
        status: FlowStatus,
        block_size: u8,
        separation_time: u8,
    },
}

/// Segmentation frame plus the addressing recovered from the raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TpPdu<'a> {
    /// Sender byte of the `0x600 | sender` identifier.
    pub sender: u8,
    /// Recipient byte, `None` in the normal dialect.
    pub recipient: Option<u8>,
    pub frame: TpFrame<'a>,
}

impl<'a> TpPdu<'a> {
    /// Classify a raw frame.
    pub fn parse(addressing: TpAddressing, raw: &'a CanFrame) -> Result<Self, MessageError> {
        let sender = raw.id.sender().ok_or(MessageError::NotDiagnostic)?;
        let data = raw.payload();
        let offset = addressing.header_len();
        if data.len() <= offset {
            return Err(MessageError::MalformedFrame);
        }
        let recipient = match addressing {
            TpAddressing::Addressed => Some(data[0]),
            TpAddressing::Normal => None,
        };

        let pci = data[offset];
        let body = &data[offset + 1..];
        let frame = match pci >> 4 {
            PCI_SINGLE => {
                let len = (pci & 0x0f) as usize;
                if len == 0 || len > addressing.single_capacity() || len > body.len() {
                    return Err(MessageError::MalformedFrame);
                }
                TpFrame::Single { data: &body[..len] }
            }
            PCI_FIRST => {
                let (low, chunk) = body.split_first().ok_or(MessageError::MalformedFrame)?;
                TpFrame::First {
                    total_len: ((pci as usize & 0x0f) << 8) | *low as usize,
                    data: chunk,
                }
            }
            PCI_CONSECUTIVE => TpFrame::Consecutive {
                sequence: pci & 0x0f,
                data: body,
            },
            PCI_FLOW => TpFrame::FlowControl {
                status: FlowStatus::from_nibble(pci & 0x0f).ok_or(MessageError::MalformedFrame)?,
                block_size: body.first().copied().unwrap_or(0),
                separation_time: body.get(1).copied().unwrap_or(0),
            },
            other => return Err(MessageError::ReservedFrameType { pci: other }),
        };

        Ok(Self {
            sender,
            recipient,
            frame,
        })
    }
}

impl TpFrame<'_> {
    /// Encode into a frame sent by `sender`. `recipient` is dropped in the normal dialect.
    ///
    /// Data longer than the frame role allows is truncated; data frames are padded to
    /// eight bytes, flow frames are not.
    pub fn to_can_frame(&self, addressing: TpAddressing, sender: u8, recipient: u8) -> CanFrame {
        let mut data = [PADDING; MAX_FRAME_BYTES];
        let mut len = 0;
        if addressing == TpAddressing::Addressed {
            data[0] = recipient;
            len = 1;
        }

        match *self {
            TpFrame::Single { data: chunk } => {
                let count = chunk.len().min(addressing.single_capacity());
                data[len] = (PCI_SINGLE << 4) | count as u8;
                put_chunk(&mut data, len + 1, &chunk[..count]);
                len = MAX_FRAME_BYTES;
            }
            TpFrame::First {
                total_len,
                data: chunk,
            } => {
                data[len] = (PCI_FIRST << 4) | ((total_len >> 8) & 0x0f) as u8;
                data[len + 1] = (total_len & 0xff) as u8;
                let count = chunk.len().min(addressing.first_capacity());
                put_chunk(&mut data, len + 2, &chunk[..count]);
                len = MAX_FRAME_BYTES;
            }
            TpFrame::Consecutive {
                sequence,
                data: chunk,
            } => {
                data[len] = (PCI_CONSECUTIVE << 4) | (sequence & 0x0f);
                put_chunk(&mut data, len + 1, chunk);
                len = MAX_FRAME_BYTES;
            }
            TpFrame::FlowControl {
                status,
                block_size,
                separation_time,
            } => {
                data[len] = (PCI_FLOW << 4) | status as u8;
                data[len + 1] = block_size;
                data[len + 2] = separation_time;
                len += 3;
            }
        }

        CanFrame::new(CanId::addressed(sender), &data[..len])
    }
}

fn put_chunk(data: &mut [u8; MAX_FRAME_BYTES], start: usize, chunk: &[u8]) {
    let count = chunk.len().min(MAX_FRAME_BYTES - start);
    data[start..start + count].copy_from_slice(&chunk[..count]);
}

/// Next rolling sequence number: 1, 2, ... 15, 0, 1, ...
pub const fn next_sequence(sequence: u8) -> u8 {
    sequence.wrapping_add(1) & 0x0f
}
