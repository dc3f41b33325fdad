//! Error definitions shared across library modules.
//! Each type models one failure scenario of the stack: frame validation,
//! exchange deadlines, segmentation faults, and bus-level failures.
use thiserror_no_std::Error;

//==================================================================================MESSAGE_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A received frame failed schema, echo, or sequence validation.
///
/// Recoverable: the caller discards the offending frame and decides whether to keep waiting.
pub enum MessageError {
    /// Arbitration identifier differs from the schema expectation.
    #[error("Arbitration id mismatch: expected {expected:#x}, got {actual:#x}")]
    AddressMismatch { expected: u32, actual: u32 },
    /// Standard frame where an extended one was expected, or the reverse.
    #[error("Arbitration id type mismatch")]
    IdTypeMismatch,
    /// Data length differs from the total field width.
    #[error("Data length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// A constant filter field holds the wrong value.
    #[error("Constraint violated by field {index} ({name})")]
    FieldConstraintViolation { index: usize, name: &'static str },
    /// Override value does not fit the declared field type or width.
    #[error("Value type mismatch for field {name}")]
    FieldTypeMismatch { name: &'static str },
    /// Override names a field the schema does not declare.
    #[error("Unknown field")]
    UnknownField,
    /// A typed record expected a field the decoded map does not hold.
    #[error("Missing field {name}")]
    MissingField { name: &'static str },
    /// Addressed schema encoded without a sender byte.
    #[error("Addressed frame requires a sender")]
    MissingSender,
    /// Reply does not echo the request command.
    #[error("Command echo mismatch at byte {index}: {actual:#04x} != {expected:#04x}")]
    CommandEchoMismatch { index: usize, expected: u8, actual: u8 },
    /// Continuation arrived out of order.
    #[error("Unexpected sequence: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedSequence { expected: u8, actual: u8 },
    /// Frame is addressed to another node.
    #[error("Frame not addressed to us (recipient {recipient:#04x})")]
    NotAddressed { recipient: u8 },
    /// Identifier outside the addressed diagnostic range.
    #[error("Not a diagnostic frame")]
    NotDiagnostic,
    /// Frame type nibble is not one of the known segmentation roles.
    #[error("Reserved frame type {pci:#x}")]
    ReservedFrameType { pci: u8 },
    /// Frame is too short or carries an impossible header.
    #[error("Malformed frame")]
    MalformedFrame,
    /// Declared reply length cannot even hold the command echo.
    #[error("Declared length {declared} shorter than command ({command} bytes)")]
    LengthTooShort { declared: usize, command: usize },
}

//==================================================================================MODULE_ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Blocking wait steps of an exchange, each with its own deadline.
pub enum ExchangeStage {
    /// First frame of a reply.
    InitialReply,
    /// Consecutive frame of a reply.
    Continuation,
    /// Responder's go-ahead before a long request is streamed.
    ContinuationRequest,
    /// Flow-control frame from the peer of a segmented transfer.
    FlowControl,
    /// Any single frame the caller asked for explicitly.
    ExpectedFrame,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// An expected exchange step never arrived within its deadline.
pub enum ModuleError {
    #[error("Timed out waiting for {stage:?}")]
    Timeout { stage: ExchangeStage },
}

//==================================================================================PROTOCOL_VIOLATION
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Malformed segmentation. The affected reassembly slot has been reset.
pub enum ProtocolViolation {
    /// Consecutive frame carried the wrong rolling sequence.
    #[error("Sender {sender:#04x}: expected sequence {expected}, got {actual}")]
    UnexpectedSequence { sender: u8, expected: u8, actual: u8 },
    /// Consecutive frame from a peer other than the one being reassembled.
    #[error("Unexpected sender: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedSender { expected: u8, actual: u8 },
    /// Consecutive frame without a preceding first frame.
    #[error("No transfer in progress for sender {sender:#04x}")]
    NoTransferInProgress { sender: u8 },
    /// Declared or requested payload length cannot be segmented.
    #[error("Length out of range: {length}")]
    LengthOutOfRange { length: usize },
}

//==================================================================================SEND_ERROR
#[derive(Debug, Error)]
/// Errors encountered when sending a typed record (encode + transmit).
pub enum SendFrameError<E: core::fmt::Debug> {
    /// Record encoding failed.
    #[error("Frame build failed: {0:?}")]
    Build(MessageError),
    /// CAN layer refused or failed to send the frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
}

//==================================================================================FRAMER_ERROR
#[derive(Debug, Error)]
/// Failures of the segmentation transport.
pub enum FramerError<E: core::fmt::Debug> {
    /// CAN bus rejected a frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
    /// Unable to receive frames from the bus.
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    /// Reassembly detected a malformed transfer.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    /// Peer never answered with flow control.
    #[error(transparent)]
    Module(#[from] ModuleError),
    /// Peer cancelled the outbound transfer.
    #[error("Transfer aborted by {recipient:#04x}")]
    TransferAborted { recipient: u8 },
    /// A new transfer was requested while one is still draining.
    #[error("Transmission already in progress")]
    TransmitBusy,
}

//==================================================================================SESSION_ERROR
#[derive(Debug, Error)]
/// Failures of a diagnostic request/response exchange.
pub enum SessionError<E: core::fmt::Debug> {
    /// CAN bus rejected a frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
    /// Unable to receive frames from the bus.
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    /// A frame failed validation fatally for this exchange.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// A wait step missed its deadline.
    #[error(transparent)]
    Module(#[from] ModuleError),
    /// Command longer than the dialect's one-byte length field.
    #[error("Payload too large: {len} bytes")]
    PayloadTooLarge { len: usize },
}

//==================================================================================EMULATOR_ERROR
#[derive(Debug, Error)]
/// Failures surfaced by an ECU emulator while handling a frame.
pub enum EmulatorError<E: core::fmt::Debug> {
    /// CAN bus rejected a reply frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
    /// Segmentation transport failed.
    #[error("Transport error: {0:?}")]
    Framer(FramerError<E>),
    /// Reply could not be encoded.
    #[error(transparent)]
    Message(#[from] MessageError),
}

#[derive(Debug, Error)]
/// Errors that stop an [`EmulatorRunner`](crate::protocol::emulators::service::EmulatorRunner).
pub enum EmulatorRunError<E: core::fmt::Debug> {
    /// Unable to receive frames from the bus.
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    /// Queued frame could not be sent.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
    /// The emulator hit a bus failure.
    #[error("Emulator error: {0:?}")]
    Emulator(EmulatorError<E>),
}

impl<E: core::fmt::Debug> From<FramerError<E>> for EmulatorError<E> {
    fn from(err: FramerError<E>) -> Self {
        EmulatorError::Framer(err)
    }
}

impl<E: core::fmt::Debug> From<EmulatorError<E>> for EmulatorRunError<E> {
    fn from(err: EmulatorError<E>) -> Self {
        EmulatorRunError::Emulator(err)
    }
}

//==================================================================================CURSOR_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Errors raised by the byte cursors of the codec.
pub enum CursorError {
    /// Attempted to read or write past the end of the buffer.
    #[error("Attempted to access out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested more bytes than the target integer can hold.
    #[error("Cannot handle more than {max} bytes. Requested: {asked}")]
    TooWide { max: u8, asked: u8 },
}
