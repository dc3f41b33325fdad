//! Diagnostic dialect spoken by the body modules: addressed 8-byte frames where byte 0 is
//! the recipient and byte 1 a sequence marker rather than an ISO-TP PCI.
//!
//! ```text
//! request (short)   [recipient][len 1..=6][command...]          pad 0xff
//! initial           [recipient][0x10][total len][chunk <= 5]     pad 0xff
//! continuation      [recipient][0x21, 0x22, ...][chunk <= 6]     pad 0xff
//! continue request  [recipient][0x30 00 01 00 00 00 00]
//! ```
//!
//! The identifier of every frame is `0x600 | sender`.
use crate::core::MAX_FRAME_BYTES;
use crate::error::MessageError;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;

pub mod exchange;
pub mod responder;

//==================================================================================NODE_IDS
/// Logical address of the diagnostic tester.
pub const TESTER_ID: u8 = 0xf1;
/// Engine controller.
pub const DDE_ID: u8 = 0x12;
/// Transmission controller.
pub const EGS_ID: u8 = 0x18;
/// Car access system.
pub const CAS_ID: u8 = 0x40;
/// Junction box electronics.
pub const JBE_ID: u8 = 0x00;
/// Functional address every body module listens to.
pub const BROADCAST_ID: u8 = 0xef;

//==================================================================================TIMING
/// Deadline for the first frame of a reply (ms).
pub const DIAG_REPLY_TIMEOUT_MS: u32 = 2_000;
/// Deadline for each continuation frame, and for the go-ahead on long requests (ms).
pub const DIAG_CONTINUATION_TIMEOUT_MS: u32 = 1_000;

//==================================================================================WIRE
/// Sequence byte of an initial frame.
pub const SEQ_INITIAL: u8 = 0x10;
/// Sequence byte of a continuation request.
pub const SEQ_CONTINUE_REQUEST: u8 = 0x30;
/// Acknowledgement bit set on the first echoed command byte.
pub const ACK_BIT: u8 = 0x40;
/// Payload bytes carried by an initial frame.
pub const INITIAL_CHUNK: usize = 5;
/// Payload bytes carried by a continuation frame.
pub const CONTINUATION_CHUNK: usize = 6;
/// Longest command that fits the short request form.
pub const SHORT_COMMAND_MAX: usize = 6;
/// The length byte caps a payload at 255 bytes.
pub const MAX_DIAG_PAYLOAD: usize = u8::MAX as usize;

/// Sequence byte of the first continuation frame.
pub const SEQ_FIRST_CONTINUATION: u8 = 0x21;
/// Sequence byte of the last continuation a 255-byte payload needs.
pub const SEQ_LAST_CONTINUATION: u8 = continuation_sequence(
    (MAX_DIAG_PAYLOAD - INITIAL_CHUNK).div_ceil(CONTINUATION_CHUNK) - 1,
);

const PADDING: u8 = 0xff;
const CONTINUE_REQUEST_BODY: [u8; 7] = [SEQ_CONTINUE_REQUEST, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
static CONTINUE_REQUEST_TAIL: [u8; 6] = [0x00, 0x01, 0x00, 0x00, 0x00, 0x00];

/// Sequence byte of continuation `index` (0-based): 0x21, 0x22, ... counting up by one.
pub const fn continuation_sequence(index: usize) -> u8 {
    SEQ_FIRST_CONTINUATION.wrapping_add(index as u8)
}

//==================================================================================FRAMES
/// Role of a diagnostic frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagKind<'a> {
    /// Start of a payload; `chunk` holds at most `declared_len` bytes.
    Initial { declared_len: usize, chunk: &'a [u8] },
    /// Follow-up chunk; trailing padding is kept, the exchange trims it.
    Continuation { sequence: u8, chunk: &'a [u8] },
    /// Go-ahead for the rest of a payload.
    ContinuationRequest,
    /// Request fitting a single frame.
    Short { command: &'a [u8] },
}

/// One decoded diagnostic frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagFrame<'a> {
    pub sender: u8,
    pub recipient: u8,
    pub kind: DiagKind<'a>,
}

impl<'a> DiagFrame<'a> {
    /// Classify a raw frame of the diagnostic dialect.
    pub fn parse(raw: &'a CanFrame) -> Result<Self, MessageError> {
        let sender = raw.id.sender().ok_or(MessageError::NotDiagnostic)?;
        let data = raw.payload();
        if data.len() < 2 {
            return Err(MessageError::MalformedFrame);
        }
        let recipient = data[0];
        let sequence = data[1];

        let kind = match sequence {
            SEQ_INITIAL => {
                let (declared, rest) = data[2..]
                    .split_first()
                    .ok_or(MessageError::MalformedFrame)?;
                let declared_len = *declared as usize;
                let count = declared_len.min(rest.len());
                DiagKind::Initial {
                    declared_len,
                    chunk: &rest[..count],
                }
            }
            SEQ_CONTINUE_REQUEST if data[1..] == CONTINUE_REQUEST_BODY => {
                DiagKind::ContinuationRequest
            }
            SEQ_FIRST_CONTINUATION..=SEQ_LAST_CONTINUATION if data.len() == MAX_FRAME_BYTES => {
                DiagKind::Continuation {
                    sequence,
                    chunk: &data[2..],
                }
            }
            1..=0x06 => {
                let len = sequence as usize;
                let command = data[2..]
                    .get(..len)
                    .ok_or(MessageError::MalformedFrame)?;
                DiagKind::Short { command }
            }
            _ => return Err(MessageError::MalformedFrame),
        };

        Ok(Self {
            sender,
            recipient,
            kind,
        })
    }

    /// Sequence and chunk when the frame can continue a payload.
    ///
    /// Continuation 0x30 carrying `00 01 00 00 00 00` has the same bytes as a continuation
    /// request; the receiver expecting 0x30 takes it as data.
    pub fn as_continuation(&self) -> Option<(u8, &'a [u8])> {
        match self.kind {
            DiagKind::Continuation { sequence, chunk } => Some((sequence, chunk)),
            DiagKind::ContinuationRequest => {
                Some((SEQ_CONTINUE_REQUEST, &CONTINUE_REQUEST_TAIL[..]))
            }
            _ => None,
        }
    }
}

fn padded(sender: u8, header: &[u8], chunk: &[u8]) -> CanFrame {
    let mut data = [PADDING; MAX_FRAME_BYTES];
    data[..header.len()].copy_from_slice(header);
    let count = chunk.len().min(MAX_FRAME_BYTES - header.len());
    data[header.len()..header.len() + count].copy_from_slice(&chunk[..count]);
    CanFrame::new(CanId::addressed(sender), &data)
}

/// `[recipient][0x10][declared_len][chunk <= 5]`.
pub fn initial_frame(sender: u8, recipient: u8, declared_len: u8, chunk: &[u8]) -> CanFrame {
    let count = chunk.len().min(INITIAL_CHUNK);
    padded(sender, &[recipient, SEQ_INITIAL, declared_len], &chunk[..count])
}

/// `[recipient][sequence][chunk <= 6]`.
pub fn continuation_frame(sender: u8, recipient: u8, sequence: u8, chunk: &[u8]) -> CanFrame {
    padded(sender, &[recipient, sequence], chunk)
}

/// `[recipient][30 00 01 00 00 00 00]`.
pub fn continuation_request(sender: u8, recipient: u8) -> CanFrame {
    let mut data = [0u8; MAX_FRAME_BYTES];
    data[0] = recipient;
    data[1..].copy_from_slice(&CONTINUE_REQUEST_BODY);
    CanFrame::new(CanId::addressed(sender), &data)
}

/// `[recipient][len][command]`, only for commands of 1 to 6 bytes.
pub fn short_request(sender: u8, recipient: u8, command: &[u8]) -> Option<CanFrame> {
    if command.is_empty() || command.len() > SHORT_COMMAND_MAX {
        return None;
    }
    Some(padded(sender, &[recipient, command.len() as u8], command))
}
