//! Public traits exposed by the codec engine. They decouple the typed records of
//! `protocol::messages` from the decode/encode logic and give upper layers a uniform API.
use crate::core::{DecodedFields, MessageSchema};
use crate::error::MessageError;
use crate::infra::codec::engine;
use crate::protocol::transport::can_frame::CanFrame;

//==================================================================================FRAME_RECORD
/// Implemented by every typed record of the message catalog.
/// Acts as a bridge between a static schema and the interpretation engine.
///
/// ```rust, ignore
/// let frame = SignOn { reason_code: 0x51, module_id: 7, status_code: 0, sw_version: 3 }
///     .encode()?;
/// let record = SignOn::decode(&frame)?;
/// assert_eq!(record.reason(), Some("watchdog timeout"));
/// ```
pub trait FrameRecord: Sized {
    /// Schema describing the frame shape of the record.
    const SCHEMA: &'static MessageSchema;

    /// Build the record from the variable fields of a decoded frame.
    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError>;

    /// Encode the record into a frame ready to transmit.
    fn encode(&self) -> Result<CanFrame, MessageError>;

    /// Validate `frame` against [`Self::SCHEMA`] and build the record.
    fn decode(frame: &CanFrame) -> Result<Self, MessageError> {
        let fields = engine::decode(Self::SCHEMA, frame)?;
        Self::from_fields(&fields)
    }
}

/// Fetch an integer field from a decoded map, typed as the caller needs.
pub(crate) fn field_uint<T: TryFrom<u32>>(
    fields: &DecodedFields,
    name: &'static str,
) -> Result<T, MessageError> {
    let raw = fields
        .uint(name)
        .ok_or(MessageError::MissingField { name })?;
    T::try_from(raw).map_err(|_| MessageError::FieldTypeMismatch { name })
}

/// Fetch a fixed-width byte field from a decoded map.
pub(crate) fn field_array<const N: usize>(
    fields: &DecodedFields,
    name: &'static str,
) -> Result<[u8; N], MessageError> {
    let bytes = fields
        .bytes(name)
        .ok_or(MessageError::MissingField { name })?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| MessageError::FieldTypeMismatch { name })
}
