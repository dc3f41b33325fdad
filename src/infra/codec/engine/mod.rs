//! Generic decode/encode engine driven by the static message schemas.
//! It owns the byte cursors and turns raw frames into [`DecodedFields`] and back.
//! Pure transforms: no state, every failure is a typed [`MessageError`].
use super::cursor::{ByteReader, ByteWriter};
use crate::core::{
    DecodedFields, FieldBytes, FieldDescriptor, FieldKind, FieldRole, FieldValue, IdMatch,
    MessageSchema, MAX_FRAME_BYTES,
};
use crate::error::{CursorError, MessageError};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;

/// Mask isolating the sender byte of an addressed identifier.
const SENDER_MASK: u32 = 0xff;

/// Decode `frame` against `schema`.
///
/// Checks run in order: identifier, identifier type, data length, then every constant
/// filter field. On success the variable fields are returned keyed by identifier,
/// together with the frame metadata.
pub fn decode(schema: &MessageSchema, frame: &CanFrame) -> Result<DecodedFields, MessageError> {
    let sender = check_identifier(schema, frame.id)?;

    let expected = schema.data_len();
    if frame.len != expected {
        return Err(MessageError::LengthMismatch {
            expected,
            actual: frame.len,
        });
    }

    let mut decoded = DecodedFields::new(frame.id.raw(), sender, frame.timestamp_us);
    let mut reader = ByteReader::new(frame.payload());

    for (index, field) in schema.fields.iter().enumerate() {
        let value = read_field(&mut reader, field)?;
        match field.role {
            FieldRole::Constant(required) => {
                if value != required {
                    return Err(MessageError::FieldConstraintViolation {
                        index,
                        name: field.id,
                    });
                }
            }
            FieldRole::Variable { .. } => decoded.push(field.id, value),
        }
    }

    Ok(decoded)
}

/// Check whether `frame` decodes cleanly against `schema`.
pub fn matches(schema: &MessageSchema, frame: &CanFrame) -> bool {
    decode(schema, frame).is_ok()
}

/// Build a frame from `schema`.
///
/// * `sender` – low identifier byte, required by addressed schemas and ignored otherwise
/// * `overrides` – explicit values for variable fields; omitted fields use their default
///
/// Constant fields are always written with their required value; overriding one is a
/// [`MessageError::FieldConstraintViolation`].
pub fn encode(
    schema: &MessageSchema,
    sender: Option<u8>,
    overrides: &[(&str, FieldValue)],
) -> Result<CanFrame, MessageError> {
    for (name, _) in overrides {
        match schema.field(name) {
            None => return Err(MessageError::UnknownField),
            Some((index, field)) if field.is_constant() => {
                return Err(MessageError::FieldConstraintViolation {
                    index,
                    name: field.id,
                })
            }
            Some(_) => {}
        }
    }

    let id = match schema.arbitration {
        IdMatch::Fixed(raw) if schema.extended => CanId::extended(raw),
        IdMatch::Fixed(raw) => CanId::standard(raw as u16),
        IdMatch::Addressed { base } => {
            let sender = sender.ok_or(MessageError::MissingSender)?;
            let raw = base | sender as u32;
            if schema.extended {
                CanId::extended(raw)
            } else {
                CanId::standard(raw as u16)
            }
        }
    };

    let mut data = [0u8; MAX_FRAME_BYTES];
    let len = {
        let mut writer = ByteWriter::new(&mut data);
        for field in schema.fields {
            let value = match field.role {
                FieldRole::Constant(value) => value,
                FieldRole::Variable { default } => overrides
                    .iter()
                    .find(|(name, _)| *name == field.id)
                    .map(|(_, value)| *value)
                    .unwrap_or(default),
            };
            write_field(&mut writer, field, &value)?;
        }
        writer.position()
    };

    Ok(CanFrame::new(id, &data[..len]))
}

//==================================================================================HELPERS
/// Validate the identifier and recover the sender byte of addressed schemas.
fn check_identifier(schema: &MessageSchema, id: CanId) -> Result<Option<u8>, MessageError> {
    let sender = match schema.arbitration {
        IdMatch::Fixed(expected) => {
            if id.raw() != expected {
                return Err(MessageError::AddressMismatch {
                    expected,
                    actual: id.raw(),
                });
            }
            None
        }
        IdMatch::Addressed { base } => {
            if id.raw() & !SENDER_MASK != base {
                return Err(MessageError::AddressMismatch {
                    expected: base,
                    actual: id.raw(),
                });
            }
            Some((id.raw() & SENDER_MASK) as u8)
        }
    };
    if id.is_extended() != schema.extended {
        return Err(MessageError::IdTypeMismatch);
    }
    Ok(sender)
}

fn read_field(
    reader: &mut ByteReader<'_>,
    field: &FieldDescriptor,
) -> Result<FieldValue, MessageError> {
    match field.kind {
        FieldKind::Unsigned => {
            let raw = reader
                .read_uint(field.width, field.order)
                .map_err(cursor_to_message)?;
            Ok(FieldValue::from_u32(raw, field.width))
        }
        FieldKind::Bytes => {
            let slice = reader
                .read_slice(field.width as usize)
                .map_err(cursor_to_message)?;
            Ok(FieldValue::Bytes(FieldBytes::from_slice(slice)))
        }
    }
}

fn write_field(
    writer: &mut ByteWriter<'_>,
    field: &FieldDescriptor,
    value: &FieldValue,
) -> Result<(), MessageError> {
    let mismatch = MessageError::FieldTypeMismatch { name: field.id };
    match (field.kind, value) {
        (FieldKind::Unsigned, FieldValue::Bytes(_)) => Err(mismatch),
        (FieldKind::Unsigned, _) => {
            let raw = value.as_u32().ok_or(mismatch)?;
            // Reject values that would be silently truncated.
            if field.width < 4 && raw >> (field.width as u32 * 8) != 0 {
                return Err(mismatch);
            }
            writer
                .write_uint(raw, field.width, field.order)
                .map_err(cursor_to_message)
        }
        (FieldKind::Bytes, FieldValue::Bytes(bytes)) => {
            if bytes.len() != field.width as usize {
                return Err(mismatch);
            }
            writer
                .write_slice(bytes.as_slice())
                .map_err(cursor_to_message)
        }
        (FieldKind::Bytes, _) => Err(mismatch),
    }
}

/// Cursor failures only happen when a schema and a buffer disagree on length.
fn cursor_to_message(err: CursorError) -> MessageError {
    match err {
        CursorError::OutOfBounds { asked, available } => MessageError::LengthMismatch {
            expected: asked,
            actual: available,
        },
        CursorError::TooWide { .. } => MessageError::MalformedFrame,
    }
}
