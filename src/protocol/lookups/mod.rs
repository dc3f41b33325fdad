//! Code tables carried by the sign-on broadcast.

//==================================================================================RESET_REASON
/// Why a module (re)started.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetReason {
    PowerOn = 0x00,
    Reset = 0x01,
    LowVoltageReset = 0x11,
    ClockLost = 0x21,
    AddressError = 0x31,
    IllegalOpcode = 0x41,
    WatchdogTimeout = 0x51,
}

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidResetReason(pub u8);

impl From<ResetReason> for u8 {
    fn from(reason: ResetReason) -> Self {
        reason as u8
    }
}

impl TryFrom<u8> for ResetReason {
    type Error = InvalidResetReason;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::PowerOn),
            0x01 => Ok(Self::Reset),
            0x11 => Ok(Self::LowVoltageReset),
            0x21 => Ok(Self::ClockLost),
            0x31 => Ok(Self::AddressError),
            0x41 => Ok(Self::IllegalOpcode),
            0x51 => Ok(Self::WatchdogTimeout),
            other => Err(InvalidResetReason(other)),
        }
    }
}

impl ResetReason {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::PowerOn => "power-on",
            Self::Reset => "reset",
            Self::LowVoltageReset => "low-voltage reset",
            Self::ClockLost => "clock lost",
            Self::AddressError => "address error",
            Self::IllegalOpcode => "illegal opcode",
            Self::WatchdogTimeout => "watchdog timeout",
        }
    }
}

//==================================================================================FIRMWARE_STATUS
/// Application image state reported at sign-on.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FirmwareStatus {
    Ok = 0,
    NoProgram = 4,
}

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidFirmwareStatus(pub u8);

impl From<FirmwareStatus> for u8 {
    fn from(status: FirmwareStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for FirmwareStatus {
    type Error = InvalidFirmwareStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            4 => Ok(Self::NoProgram),
            other => Err(InvalidFirmwareStatus(other)),
        }
    }
}

impl FirmwareStatus {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoProgram => "NO PROG",
        }
    }
}
