//! CAN identifiers used on the bench: 11-bit addressed diagnostic identifiers
//! (`0x600 | sender`), fixed 11-bit telemetry identifiers, and 29-bit module broadcasts.
use embedded_can::{ExtendedId, Id, StandardId};

/// Base of the addressed diagnostic range; the low byte carries the sender.
pub const DIAG_BASE_ID: u32 = 0x600;

const STANDARD_MASK: u32 = 0x7ff;
const EXTENDED_MASK: u32 = 0x1fff_ffff;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw identifier plus the flag selecting the 11-bit or 29-bit identifier space.
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    /// 11-bit identifier (upper bits masked off).
    pub const fn standard(raw: u16) -> Self {
        Self {
            raw: raw as u32 & STANDARD_MASK,
            extended: false,
        }
    }

    /// 29-bit identifier (upper bits masked off).
    pub const fn extended(raw: u32) -> Self {
        Self {
            raw: raw & EXTENDED_MASK,
            extended: true,
        }
    }

    /// Addressed diagnostic identifier of `sender`.
    pub const fn addressed(sender: u8) -> Self {
        Self::standard(DIAG_BASE_ID as u16 | sender as u16)
    }

    /// Identifier value.
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// `true` in the 29-bit space.
    pub const fn is_extended(&self) -> bool {
        self.extended
    }

    /// Sender byte when the identifier lies in the addressed diagnostic range.
    pub fn sender(&self) -> Option<u8> {
        if !self.extended && self.raw & !0xff == DIAG_BASE_ID {
            Some((self.raw & 0xff) as u8)
        } else {
            None
        }
    }
}

impl From<Id> for CanId {
    fn from(id: Id) -> Self {
        match id {
            Id::Standard(id) => CanId::standard(id.as_raw()),
            Id::Extended(id) => CanId::extended(id.as_raw()),
        }
    }
}

impl From<CanId> for Id {
    fn from(id: CanId) -> Self {
        // Masking in the constructors keeps both conversions in range.
        if id.extended {
            ExtendedId::new(id.raw)
                .map(Id::Extended)
                .unwrap_or(Id::Extended(ExtendedId::ZERO))
        } else {
            StandardId::new(id.raw as u16)
                .map(Id::Standard)
                .unwrap_or(Id::Standard(StandardId::ZERO))
        }
    }
}
