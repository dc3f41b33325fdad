//! Module side of the diagnostic dialect: request reassembly and reply cursors.
use super::{
    continuation_frame, continuation_sequence, initial_frame, DiagFrame, DiagKind,
    CONTINUATION_CHUNK, INITIAL_CHUNK, MAX_DIAG_PAYLOAD, SEQ_CONTINUE_REQUEST,
};
use crate::error::MessageError;
use crate::protocol::transport::can_frame::CanFrame;

//==================================================================================REQUEST
/// A complete request addressed to one of the responder's addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagRequest {
    pub requester: u8,
    /// Address the request was sent to (possibly the broadcast address).
    pub recipient: u8,
    command: [u8; MAX_DIAG_PAYLOAD],
    len: usize,
}

impl DiagRequest {
    fn new(requester: u8, recipient: u8, command: &[u8]) -> Self {
        let len = command.len().min(MAX_DIAG_PAYLOAD);
        let mut buffer = [0u8; MAX_DIAG_PAYLOAD];
        buffer[..len].copy_from_slice(&command[..len]);
        Self {
            requester,
            recipient,
            command: buffer,
            len,
        }
    }

    pub fn command(&self) -> &[u8] {
        &self.command[..self.len]
    }
}

/// What a frame meant to the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    /// Not addressed to us, or not part of a request.
    None,
    /// A request is complete.
    Request(DiagRequest),
    /// A long request started: answer `requester` with a continuation request.
    NeedsContinuation { requester: u8, recipient: u8 },
    /// `requester` asks `recipient` for the rest of its pending reply.
    Resume { requester: u8, recipient: u8 },
}

struct PendingRequest {
    requester: u8,
    recipient: u8,
    buffer: [u8; MAX_DIAG_PAYLOAD],
    received: usize,
    declared_len: usize,
    continuations: usize,
}

//==================================================================================RESPONDER
/// Classifies frames addressed to a set of logical addresses.
pub struct DiagResponder {
    addresses: &'static [u8],
    pending: Option<PendingRequest>,
}

impl DiagResponder {
    /// Listen on `addresses`.
    pub const fn new(addresses: &'static [u8]) -> Self {
        Self {
            addresses,
            pending: None,
        }
    }

    /// True when `address` is one we answer to.
    pub fn listens_to(&self, address: u8) -> bool {
        self.addresses.contains(&address)
    }

    /// Interpret one received frame.
    ///
    /// # Errors
    /// [`MessageError::UnexpectedSequence`] when a long request continues out of order;
    /// the partial request is dropped.
    pub fn on_frame(&mut self, frame: &CanFrame) -> Result<RequestEvent, MessageError> {
        let Ok(diag) = DiagFrame::parse(frame) else {
            return Ok(RequestEvent::None);
        };
        if !self.listens_to(diag.recipient) {
            return Ok(RequestEvent::None);
        }

        match diag.kind {
            DiagKind::Short { command } => {
                self.pending = None;
                Ok(RequestEvent::Request(DiagRequest::new(
                    diag.sender,
                    diag.recipient,
                    command,
                )))
            }
            DiagKind::Initial {
                declared_len,
                chunk,
            } => {
                if declared_len == 0 {
                    return Err(MessageError::MalformedFrame);
                }
                let mut pending = PendingRequest {
                    requester: diag.sender,
                    recipient: diag.recipient,
                    buffer: [0; MAX_DIAG_PAYLOAD],
                    received: 0,
                    declared_len,
                    continuations: 0,
                };
                let count = chunk.len().min(INITIAL_CHUNK);
                pending.buffer[..count].copy_from_slice(&chunk[..count]);
                pending.received = count;

                if pending.received >= declared_len {
                    self.pending = None;
                    return Ok(RequestEvent::Request(DiagRequest::new(
                        diag.sender,
                        diag.recipient,
                        &pending.buffer[..declared_len],
                    )));
                }
                self.pending = Some(pending);
                Ok(RequestEvent::NeedsContinuation {
                    requester: diag.sender,
                    recipient: diag.recipient,
                })
            }
            DiagKind::ContinuationRequest if !self.continues_with_request_bytes(diag.sender) => {
                Ok(RequestEvent::Resume {
                    requester: diag.sender,
                    recipient: diag.recipient,
                })
            }
            _ => {
                let Some((sequence, chunk)) = diag.as_continuation() else {
                    return Ok(RequestEvent::None);
                };
                let Some(pending) = self.pending.as_mut() else {
                    return Ok(RequestEvent::None);
                };
                if pending.requester != diag.sender {
                    return Ok(RequestEvent::None);
                }
                let expected = continuation_sequence(pending.continuations);
                if sequence != expected {
                    self.pending = None;
                    return Err(MessageError::UnexpectedSequence {
                        expected,
                        actual: sequence,
                    });
                }
                let count = chunk
                    .len()
                    .min(CONTINUATION_CHUNK)
                    .min(pending.declared_len - pending.received);
                pending.buffer[pending.received..pending.received + count]
                    .copy_from_slice(&chunk[..count]);
                pending.received += count;
                pending.continuations += 1;

                if pending.received < pending.declared_len {
                    return Ok(RequestEvent::None);
                }
                let request = DiagRequest::new(
                    pending.requester,
                    pending.recipient,
                    &pending.buffer[..pending.received],
                );
                self.pending = None;
                Ok(RequestEvent::Request(request))
            }
        }
    }

    /// True when the partial request of `sender` expects continuation 0x30, whose data
    /// can read like a continuation request.
    fn continues_with_request_bytes(&self, sender: u8) -> bool {
        self.pending.as_ref().is_some_and(|pending| {
            pending.requester == sender
                && continuation_sequence(pending.continuations) == SEQ_CONTINUE_REQUEST
        })
    }
}

//==================================================================================RESPONSE
/// Cursor over the frames of one reply: the initial frame, then continuations.
#[derive(Debug, Clone)]
pub struct DiagResponse {
    responder: u8,
    requester: u8,
    payload: [u8; MAX_DIAG_PAYLOAD],
    len: usize,
    offset: usize,
    continuations: usize,
    started: bool,
}

impl DiagResponse {
    /// Reply `payload` (echo first) from `responder` to `requester`.
    pub fn new(responder: u8, requester: u8, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_DIAG_PAYLOAD);
        let mut buffer = [0u8; MAX_DIAG_PAYLOAD];
        buffer[..len].copy_from_slice(&payload[..len]);
        Self {
            responder,
            requester,
            payload: buffer,
            len,
            offset: 0,
            continuations: 0,
            started: false,
        }
    }

    pub fn responder(&self) -> u8 {
        self.responder
    }

    pub fn requester(&self) -> u8 {
        self.requester
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Bytes not yet put in a frame.
    pub fn residual(&self) -> usize {
        self.len - self.offset
    }

    /// Initial frame on the first call, continuations afterwards, `None` once drained.
    pub fn next_frame(&mut self) -> Option<CanFrame> {
        if !self.started {
            let count = self.len.min(INITIAL_CHUNK);
            let frame = initial_frame(
                self.responder,
                self.requester,
                self.len as u8,
                &self.payload[..count],
            );
            self.offset = count;
            self.started = true;
            return Some(frame);
        }
        if self.residual() == 0 {
            return None;
        }
        let count = self.residual().min(CONTINUATION_CHUNK);
        let frame = continuation_frame(
            self.responder,
            self.requester,
            continuation_sequence(self.continuations),
            &self.payload[self.offset..self.offset + count],
        );
        self.offset += count;
        self.continuations += 1;
        Some(frame)
    }
}
