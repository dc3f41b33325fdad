//! Defines the "data contract" between the static message catalog and the
//! frame codec engine.
//!
//! `protocol::messages` declares static [`MessageSchema`] values that implement this
//! contract. The `infra::codec::engine` module interprets them to validate, decode, and
//! build classic CAN payloads.

/// Classic CAN payload capacity.
pub const MAX_FRAME_BYTES: usize = 8;

/// A fixed frame never carries more fields than it has bytes.
pub const MAX_SCHEMA_FIELDS: usize = MAX_FRAME_BYTES;

/// Byte order of a multi-byte field.
///
/// The bench protocol is big-endian throughout; the two DDE telemetry broadcasts are the
/// only little-endian frames and declare it explicitly in their descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ByteOrder {
    Big,
    Little,
}

/// Semantic type of a field slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldKind {
    /// Unsigned integer, 1 to 4 bytes wide.
    Unsigned,
    /// Opaque fixed-width byte block (padding runs, raw values, ASCII).
    Bytes,
}

/// Whether a field is a filter or a free variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// The field must hold exactly this value; decode rejects anything else and encode
    /// always writes it.
    Constant(FieldValue),
    /// The field is extracted on decode. `default` is written when encode receives no override.
    Variable { default: FieldValue },
}

/// Descriptor for a single field slot.
#[derive(Debug)]
pub struct FieldDescriptor {
    /// 1. Field identifier, used as the key in decoded maps and encode overrides.
    pub id: &'static str,
    /// 2. Semantic type.
    pub kind: FieldKind,
    /// 3. Width in bytes.
    pub width: u8,
    /// 4. Byte order for multi-byte unsigned fields.
    pub order: ByteOrder,
    /// 5. Filter or variable.
    pub role: FieldRole,
}

impl FieldDescriptor {
    /// Big-endian unsigned variable defaulting to zero.
    pub const fn unsigned(id: &'static str, width: u8) -> Self {
        Self {
            id,
            kind: FieldKind::Unsigned,
            width,
            order: ByteOrder::Big,
            role: FieldRole::Variable {
                default: FieldValue::zero(width),
            },
        }
    }

    /// Little-endian unsigned variable defaulting to zero.
    pub const fn unsigned_le(id: &'static str, width: u8) -> Self {
        Self {
            id,
            kind: FieldKind::Unsigned,
            width,
            order: ByteOrder::Little,
            role: FieldRole::Variable {
                default: FieldValue::zero(width),
            },
        }
    }

    /// Byte-block variable defaulting to `default`.
    pub const fn bytes(id: &'static str, width: u8, default: FieldBytes) -> Self {
        Self {
            id,
            kind: FieldKind::Bytes,
            width,
            order: ByteOrder::Big,
            role: FieldRole::Variable {
                default: FieldValue::Bytes(default),
            },
        }
    }

    /// Big-endian unsigned filter.
    pub const fn constant(id: &'static str, width: u8, value: u32) -> Self {
        Self {
            id,
            kind: FieldKind::Unsigned,
            width,
            order: ByteOrder::Big,
            role: FieldRole::Constant(FieldValue::from_u32(value, width)),
        }
    }

    /// Little-endian unsigned filter.
    pub const fn constant_le(id: &'static str, width: u8, value: u32) -> Self {
        Self {
            id,
            kind: FieldKind::Unsigned,
            width,
            order: ByteOrder::Little,
            role: FieldRole::Constant(FieldValue::from_u32(value, width)),
        }
    }

    /// Byte-block filter.
    pub const fn constant_bytes(id: &'static str, value: FieldBytes) -> Self {
        Self {
            id,
            kind: FieldKind::Bytes,
            width: value.len as u8,
            order: ByteOrder::Big,
            role: FieldRole::Constant(FieldValue::Bytes(value)),
        }
    }

    /// Override the default of a variable field.
    pub const fn with_default(mut self, default: FieldValue) -> Self {
        if let FieldRole::Variable { .. } = self.role {
            self.role = FieldRole::Variable { default };
        }
        self
    }

    /// True when the field is a filter.
    pub const fn is_constant(&self) -> bool {
        matches!(self.role, FieldRole::Constant(_))
    }
}

/// How a schema expects the arbitration identifier to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMatch {
    /// Exactly this identifier.
    Fixed(u32),
    /// Any identifier of the form `base | sender`: the low byte carries the sender address.
    Addressed { base: u32 },
}

/// Static description of one frame shape.
///
/// Invariant: the sum of the field widths equals the frame's data length.
#[derive(Debug)]
pub struct MessageSchema {
    /// 1. Schema name (diagnostics).
    pub name: &'static str,
    /// 2. Identifier expectation.
    pub arbitration: IdMatch,
    /// 3. `true` for 29-bit identifiers, `false` for 11-bit ones.
    pub extended: bool,
    /// 4. Ordered field slots.
    pub fields: &'static [FieldDescriptor],
}

impl MessageSchema {
    /// Data length implied by the field widths.
    pub const fn data_len(&self) -> usize {
        let mut total = 0usize;
        let mut idx = 0;
        while idx < self.fields.len() {
            total += self.fields[idx].width as usize;
            idx += 1;
        }
        total
    }

    /// Locate a field by identifier.
    pub fn field(&self, id: &str) -> Option<(usize, &'static FieldDescriptor)> {
        self.fields.iter().enumerate().find(|(_, f)| f.id == id)
    }
}

//==================================================================================FIELD_BYTES
/// Inline byte block for `FieldKind::Bytes` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBytes {
    pub len: usize,
    pub data: [u8; MAX_FRAME_BYTES],
}

impl Default for FieldBytes {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldBytes {
    /// Create an empty block.
    pub const fn new() -> Self {
        Self {
            len: 0,
            data: [0; MAX_FRAME_BYTES],
        }
    }

    /// Block of `len` copies of `byte` (clamped to the frame capacity).
    pub const fn filled(len: usize, byte: u8) -> Self {
        let len = if len > MAX_FRAME_BYTES {
            MAX_FRAME_BYTES
        } else {
            len
        };
        let mut data = [0; MAX_FRAME_BYTES];
        let mut idx = 0;
        while idx < len {
            data[idx] = byte;
            idx += 1;
        }
        Self { len, data }
    }

    /// Copy of `slice` (clamped to the frame capacity).
    pub const fn from_slice(slice: &[u8]) -> Self {
        let len = if slice.len() > MAX_FRAME_BYTES {
            MAX_FRAME_BYTES
        } else {
            slice.len()
        };
        let mut data = [0; MAX_FRAME_BYTES];
        let mut idx = 0;
        while idx < len {
            data[idx] = slice[idx];
            idx += 1;
        }
        Self { len, data }
    }

    /// Number of valid bytes stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the block is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Immutable view over the populated bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

//==================================================================================FIELD_VALUE
/// Dynamic value of one field.
///
/// Decoding types integers after the field width (1 → `U8`, 2 → `U16`, otherwise `U32`),
/// while encoding accepts any integer variant that fits. A `U8` written into a two-byte
/// field therefore reads back as `U16`; compare through [`FieldValue::as_u32`] or retype
/// with [`FieldValue::with_width`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    Bytes(FieldBytes),
}

impl FieldValue {
    /// Zero of the integer type matching `width`.
    pub const fn zero(width: u8) -> Self {
        Self::from_u32(0, width)
    }

    /// Integer value typed after `width` (1 → `U8`, 2 → `U16`, otherwise `U32`).
    pub const fn from_u32(value: u32, width: u8) -> Self {
        match width {
            1 => FieldValue::U8(value as u8),
            2 => FieldValue::U16(value as u16),
            _ => FieldValue::U32(value),
        }
    }

    /// The same integer typed after `width`, as decoding would return it. Values wider
    /// than `width` are truncated; byte blocks are returned unchanged.
    pub const fn with_width(self, width: u8) -> Self {
        match self {
            FieldValue::U8(v) => Self::from_u32(v as u32, width),
            FieldValue::U16(v) => Self::from_u32(v as u32, width),
            FieldValue::U32(v) => Self::from_u32(v, width),
            FieldValue::Bytes(_) => self,
        }
    }

    /// Widen any integer variant.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::U8(v) => Some(*v as u32),
            FieldValue::U16(v) => Some(*v as u32),
            FieldValue::U32(v) => Some(*v),
            FieldValue::Bytes(_) => None,
        }
    }

    /// Borrow the byte block, if any.
    pub fn as_bytes(&self) -> Option<&FieldBytes> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

//==================================================================================DECODED_FIELDS
/// Result of a successful decode: variable fields keyed by identifier, plus metadata
/// of the source frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFields {
    entries: [(&'static str, FieldValue); MAX_SCHEMA_FIELDS],
    len: usize,
    /// Raw arbitration identifier of the decoded frame.
    pub arbitration_id: u32,
    /// Sender byte recovered from an addressed identifier.
    pub sender: Option<u8>,
    /// Adapter timestamp of the decoded frame (µs).
    pub timestamp_us: u64,
}

impl DecodedFields {
    /// Empty map tagged with frame metadata.
    pub const fn new(arbitration_id: u32, sender: Option<u8>, timestamp_us: u64) -> Self {
        Self {
            entries: [("", FieldValue::U8(0)); MAX_SCHEMA_FIELDS],
            len: 0,
            arbitration_id,
            sender,
            timestamp_us,
        }
    }

    /// Append an entry; silently ignored past capacity (schemas cannot exceed it).
    pub fn push(&mut self, id: &'static str, value: FieldValue) {
        if self.len < MAX_SCHEMA_FIELDS {
            self.entries[self.len] = (id, value);
            self.len += 1;
        }
    }

    /// Value of a field.
    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.entries[..self.len]
            .iter()
            .find(|(k, _)| *k == id)
            .map(|(_, v)| v)
    }

    /// Integer value of a field.
    pub fn uint(&self, id: &str) -> Option<u32> {
        self.get(id).and_then(FieldValue::as_u32)
    }

    /// Byte block of a field.
    pub fn bytes(&self, id: &str) -> Option<&FieldBytes> {
        self.get(id).and_then(FieldValue::as_bytes)
    }

    /// Number of extracted fields.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the schema had no variable field.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over `(id, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.entries[..self.len].iter()
    }
}
