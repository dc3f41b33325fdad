//! Catalog of every frame shape seen on the bench: telemetry broadcasts, module status
//! reports, single-frame PID exchanges and the raw ISO-TP frame layouts.
//!
//! Each shape is a static [`MessageSchema`]; the typed records implement
//! [`FrameRecord`] on top of it.
use crate::core::{DecodedFields, FieldBytes, FieldDescriptor, FieldValue, IdMatch, MessageSchema};
use crate::error::MessageError;
use crate::infra::codec::engine;
use crate::infra::codec::traits::{field_array, field_uint, FrameRecord};
use crate::protocol::lookups::{FirmwareStatus, ResetReason};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::DIAG_BASE_ID;

const ADDRESSED: IdMatch = IdMatch::Addressed { base: DIAG_BASE_ID };

//==================================================================================DDE TELEMETRY
/// 0x0a8: torque and brake state, little-endian.
pub static DDE_TORQUE_BRAKE: MessageSchema = MessageSchema {
    name: "dde_torque_brake",
    arbitration: IdMatch::Fixed(0x0a8),
    extended: false,
    fields: &[
        FieldDescriptor::constant_le("magic", 1, 0x54),
        FieldDescriptor::constant_le("actual_torque", 2, 0),
        FieldDescriptor::constant_le("rounded_torque", 2, 0),
        // Clutch not depressed.
        FieldDescriptor::constant_le("clutch", 1, 0xf0),
        FieldDescriptor::constant_le("magic_2", 1, 0x0f),
        FieldDescriptor::unsigned_le("brake_state", 1),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DdeTorqueBrake {
    pub brake_state: u8,
}

impl DdeTorqueBrake {
    pub const BRAKE_ON: u8 = 32;
    pub const BRAKE_OFF: u8 = 3;

    pub const fn new(braking: bool) -> Self {
        Self {
            brake_state: if braking {
                Self::BRAKE_ON
            } else {
                Self::BRAKE_OFF
            },
        }
    }

    pub fn is_braking(&self) -> bool {
        self.brake_state == Self::BRAKE_ON
    }
}

impl FrameRecord for DdeTorqueBrake {
    const SCHEMA: &'static MessageSchema = &DDE_TORQUE_BRAKE;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            brake_state: field_uint(fields, "brake_state")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[("brake_state", FieldValue::U8(self.brake_state))],
        )
    }
}

/// 0x0aa: throttle position and engine speed, little-endian.
pub static DDE_RPM_TPS: MessageSchema = MessageSchema {
    name: "dde_rpm_tps",
    arbitration: IdMatch::Fixed(0x0aa),
    extended: false,
    fields: &[
        FieldDescriptor::constant_le("reserved", 2, 0),
        FieldDescriptor::unsigned_le("tps", 2),
        FieldDescriptor::unsigned_le("rpm", 2),
        FieldDescriptor::constant_le("reserved_2", 2, 0),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DdeRpmTps {
    pub tps: u16,
    pub rpm: u16,
}

impl FrameRecord for DdeRpmTps {
    const SCHEMA: &'static MessageSchema = &DDE_RPM_TPS;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            tps: field_uint(fields, "tps")?,
            rpm: field_uint(fields, "rpm")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                ("tps", FieldValue::U16(self.tps)),
                ("rpm", FieldValue::U16(self.rpm)),
            ],
        )
    }
}

/// 0x1d0: coolant temperature.
pub static DDE_COOLANT: MessageSchema = MessageSchema {
    name: "dde_coolant",
    arbitration: IdMatch::Fixed(0x1d0),
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("coolant_temp", 1),
        FieldDescriptor::constant_bytes("padding", FieldBytes::filled(7, 0)),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DdeCoolant {
    pub coolant_temp: u8,
}

impl FrameRecord for DdeCoolant {
    const SCHEMA: &'static MessageSchema = &DDE_COOLANT;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            coolant_temp: field_uint(fields, "coolant_temp")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[("coolant_temp", FieldValue::U8(self.coolant_temp))],
        )
    }
}

//==================================================================================BODY
/// 0x1d2: gear selected on the EGS.
pub static EGS_GEAR: MessageSchema = MessageSchema {
    name: "egs_gear",
    arbitration: IdMatch::Fixed(0x1d2),
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("selected_gear", 1),
        FieldDescriptor::constant_bytes("padding", FieldBytes::filled(7, 0)),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EgsGear {
    pub selected_gear: u8,
}

impl FrameRecord for EgsGear {
    const SCHEMA: &'static MessageSchema = &EGS_GEAR;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            selected_gear: field_uint(fields, "selected_gear")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[("selected_gear", FieldValue::U8(self.selected_gear))],
        )
    }
}

/// 0x21a: light control.
pub static LIGHTS: MessageSchema = MessageSchema {
    name: "lights",
    arbitration: IdMatch::Fixed(0x21a),
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("light_status", 1),
        FieldDescriptor::constant("reserved", 1, 0),
        FieldDescriptor::constant("magic", 1, 0xf7),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lights {
    pub light_status: u8,
}

impl Lights {
    pub const BRAKE_LIGHT: u8 = 0x80;
    pub const RAIN_LIGHT: u8 = 0x40;
    pub const TAIL_LIGHT: u8 = 0x04;

    pub const fn new(brake_light: bool, tail_light: bool, rain_light: bool) -> Self {
        let mut light_status = 0;
        if brake_light {
            light_status |= Self::BRAKE_LIGHT;
        }
        if tail_light {
            light_status |= Self::TAIL_LIGHT;
        }
        if rain_light {
            light_status |= Self::RAIN_LIGHT;
        }
        Self { light_status }
    }

    pub fn brake_light(&self) -> bool {
        self.light_status & Self::BRAKE_LIGHT != 0
    }

    pub fn tail_light(&self) -> bool {
        self.light_status & Self::TAIL_LIGHT != 0
    }

    pub fn rain_light(&self) -> bool {
        self.light_status & Self::RAIN_LIGHT != 0
    }
}

impl FrameRecord for Lights {
    const SCHEMA: &'static MessageSchema = &LIGHTS;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            light_status: field_uint(fields, "light_status")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[("light_status", FieldValue::U8(self.light_status))],
        )
    }
}

/// 0x130: terminal status broadcast by the CAS every 500 ms (ignition on).
pub static TERMINAL_STATUS: MessageSchema = MessageSchema {
    name: "terminal_status",
    arbitration: IdMatch::Fixed(0x130),
    extended: false,
    fields: &[FieldDescriptor::constant_bytes(
        "status",
        FieldBytes::from_slice(&[0xc5, 0x40, 0xff, 0xff, 0xff]),
    )],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TerminalStatus;

impl FrameRecord for TerminalStatus {
    const SCHEMA: &'static MessageSchema = &TERMINAL_STATUS;

    fn from_fields(_fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self)
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(Self::SCHEMA, None, &[])
    }
}

//==================================================================================MODULE STATUS
/// 0x1ffffff0: sign-on broadcast sent on power-up, reboot or crash.
pub static SIGN_ON: MessageSchema = MessageSchema {
    name: "sign_on",
    arbitration: IdMatch::Fixed(0x1fff_fff0),
    extended: true,
    fields: &[
        FieldDescriptor::unsigned("reason_code", 1),
        FieldDescriptor::unsigned("module_id", 4),
        FieldDescriptor::unsigned("status_code", 1),
        FieldDescriptor::unsigned("sw_version", 2),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignOn {
    pub reason_code: u8,
    pub module_id: u32,
    pub status_code: u8,
    pub sw_version: u16,
}

impl SignOn {
    /// Description of the reset reason, `None` for codes outside the table.
    pub fn reason(&self) -> Option<&'static str> {
        ResetReason::try_from(self.reason_code)
            .ok()
            .map(|reason| reason.description())
    }

    /// Description of the firmware status, `None` for codes outside the table.
    pub fn status(&self) -> Option<&'static str> {
        FirmwareStatus::try_from(self.status_code)
            .ok()
            .map(|status| status.description())
    }
}

impl FrameRecord for SignOn {
    const SCHEMA: &'static MessageSchema = &SIGN_ON;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            reason_code: field_uint(fields, "reason_code")?,
            module_id: field_uint(fields, "module_id")?,
            status_code: field_uint(fields, "status_code")?,
            sw_version: field_uint(fields, "sw_version")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                ("reason_code", FieldValue::U8(self.reason_code)),
                ("module_id", FieldValue::U32(self.module_id)),
                ("status_code", FieldValue::U8(self.status_code)),
                ("sw_version", FieldValue::U16(self.sw_version)),
            ],
        )
    }
}

/// 0x0f00000: module system status.
pub static SYSTEM_STATUS: MessageSchema = MessageSchema {
    name: "system_status",
    arbitration: IdMatch::Fixed(0x0f0_0000),
    extended: true,
    fields: &[
        FieldDescriptor::constant("reserved", 2, 0),
        FieldDescriptor::unsigned("t15_voltage", 2),
        FieldDescriptor::unsigned("temperature", 1),
        FieldDescriptor::unsigned("fuel_level", 1),
        FieldDescriptor::unsigned("output_request", 1),
        FieldDescriptor::unsigned("function_request", 1),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemStatus {
    pub t15_voltage: u16,
    pub temperature: u8,
    pub fuel_level: u8,
    pub output_request: u8,
    pub function_request: u8,
}

impl FrameRecord for SystemStatus {
    const SCHEMA: &'static MessageSchema = &SYSTEM_STATUS;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            t15_voltage: field_uint(fields, "t15_voltage")?,
            temperature: field_uint(fields, "temperature")?,
            fuel_level: field_uint(fields, "fuel_level")?,
            output_request: field_uint(fields, "output_request")?,
            function_request: field_uint(fields, "function_request")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                ("t15_voltage", FieldValue::U16(self.t15_voltage)),
                ("temperature", FieldValue::U8(self.temperature)),
                ("fuel_level", FieldValue::U8(self.fuel_level)),
                ("output_request", FieldValue::U8(self.output_request)),
                ("function_request", FieldValue::U8(self.function_request)),
            ],
        )
    }
}

/// 0x0f00001: per-output voltage/current report, one raw byte per output.
pub static VOLTAGE_CURRENT: MessageSchema = MessageSchema {
    name: "voltage_current",
    arbitration: IdMatch::Fixed(0x0f0_0001),
    extended: true,
    fields: &[
        FieldDescriptor::bytes("output_voltage", 4, FieldBytes::filled(4, 0)),
        FieldDescriptor::bytes("output_current", 4, FieldBytes::filled(4, 0)),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoltageCurrent {
    pub output_voltage: [u8; 4],
    pub output_current: [u8; 4],
}

impl FrameRecord for VoltageCurrent {
    const SCHEMA: &'static MessageSchema = &VOLTAGE_CURRENT;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            output_voltage: field_array(fields, "output_voltage")?,
            output_current: field_array(fields, "output_current")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                (
                    "output_voltage",
                    FieldValue::Bytes(FieldBytes::from_slice(&self.output_voltage)),
                ),
                (
                    "output_current",
                    FieldValue::Bytes(FieldBytes::from_slice(&self.output_current)),
                ),
            ],
        )
    }
}

/// 0x0f00002: fault report; bytes 4..=6 are a fixed marker.
pub static FAULTS: MessageSchema = MessageSchema {
    name: "faults",
    arbitration: IdMatch::Fixed(0x0f0_0002),
    extended: true,
    fields: &[
        FieldDescriptor::bytes("output_faults", 4, FieldBytes::filled(4, 0)),
        FieldDescriptor::constant("marker_0", 1, 0x11),
        FieldDescriptor::constant("marker_1", 1, 0x22),
        FieldDescriptor::constant("marker_2", 1, 0x33),
        FieldDescriptor::unsigned("system_faults", 1),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Faults {
    pub output_faults: [u8; 4],
    pub system_faults: u8,
}

impl FrameRecord for Faults {
    const SCHEMA: &'static MessageSchema = &FAULTS;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            output_faults: field_array(fields, "output_faults")?,
            system_faults: field_uint(fields, "system_faults")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                (
                    "output_faults",
                    FieldValue::Bytes(FieldBytes::from_slice(&self.output_faults)),
                ),
                ("system_faults", FieldValue::U8(self.system_faults)),
            ],
        )
    }
}

/// 0x700: DDE values echoed by the module for the dash logger.
pub static MODULE_DDE_STATUS: MessageSchema = MessageSchema {
    name: "module_dde_status",
    arbitration: IdMatch::Fixed(0x700),
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("fuel_temp", 2),
        FieldDescriptor::unsigned("intake_temp", 2),
        FieldDescriptor::unsigned("exhaust_temp", 2),
        FieldDescriptor::unsigned("manifold_pressure", 2),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleDdeStatus {
    pub fuel_temp: u16,
    pub intake_temp: u16,
    pub exhaust_temp: u16,
    pub manifold_pressure: u16,
}

impl FrameRecord for ModuleDdeStatus {
    const SCHEMA: &'static MessageSchema = &MODULE_DDE_STATUS;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            fuel_temp: field_uint(fields, "fuel_temp")?,
            intake_temp: field_uint(fields, "intake_temp")?,
            exhaust_temp: field_uint(fields, "exhaust_temp")?,
            manifold_pressure: field_uint(fields, "manifold_pressure")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                ("fuel_temp", FieldValue::U16(self.fuel_temp)),
                ("intake_temp", FieldValue::U16(self.intake_temp)),
                ("exhaust_temp", FieldValue::U16(self.exhaust_temp)),
                ("manifold_pressure", FieldValue::U16(self.manifold_pressure)),
            ],
        )
    }
}

//==================================================================================PID EXCHANGES
/// 0x6f1: single-PID read addressed to the DDE.
pub static DDE_PID_REQUEST: MessageSchema = MessageSchema {
    name: "dde_pid_request",
    arbitration: IdMatch::Fixed(0x6f1),
    extended: false,
    fields: &[
        FieldDescriptor::constant("recipient", 1, 0x12),
        // ISO-TP single frame, four data bytes.
        FieldDescriptor::constant("type_length", 1, 0x04),
        FieldDescriptor::constant("service", 1, 0x2c),
        FieldDescriptor::constant("by_pid", 1, 0x10),
        FieldDescriptor::unsigned("pid", 2),
        FieldDescriptor::constant_bytes("padding", FieldBytes::filled(2, 0)),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DdePidRequest {
    pub pid: u16,
}

impl FrameRecord for DdePidRequest {
    const SCHEMA: &'static MessageSchema = &DDE_PID_REQUEST;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            pid: field_uint(fields, "pid")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(Self::SCHEMA, None, &[("pid", FieldValue::U16(self.pid))])
    }
}

/// 0x612: DDE answer to a single-PID read.
pub static DDE_PID_RESPONSE: MessageSchema = MessageSchema {
    name: "dde_pid_response",
    arbitration: IdMatch::Fixed(0x612),
    extended: false,
    fields: &[
        FieldDescriptor::constant("recipient", 1, 0xf1),
        FieldDescriptor::unsigned("msg_len", 1),
        FieldDescriptor::constant("service", 1, 0x6c),
        FieldDescriptor::constant("by_pid", 1, 0x10),
        FieldDescriptor::bytes("value", 2, FieldBytes::filled(2, 0x55)),
        FieldDescriptor::constant_bytes("padding", FieldBytes::filled(2, 0x55)),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DdePidResponse {
    /// Single-frame length: 3 for one-byte values, 4 for two-byte values.
    pub msg_len: u8,
    pub value: [u8; 2],
}

impl DdePidResponse {
    /// Reply carrying a `width`-byte value (1 or 2).
    pub fn new(width: u8, value: u16) -> Self {
        if width == 1 {
            Self {
                msg_len: 3,
                value: [value as u8, 0x55],
            }
        } else {
            Self {
                msg_len: 4,
                value: value.to_be_bytes(),
            }
        }
    }

    /// Value width implied by the length byte.
    pub fn width(&self) -> u8 {
        self.msg_len.saturating_sub(2)
    }

    pub fn pid_value(&self) -> u16 {
        if self.width() == 1 {
            self.value[0] as u16
        } else {
            u16::from_be_bytes(self.value)
        }
    }
}

impl FrameRecord for DdePidResponse {
    const SCHEMA: &'static MessageSchema = &DDE_PID_RESPONSE;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            msg_len: field_uint(fields, "msg_len")?,
            value: field_array(fields, "value")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                ("msg_len", FieldValue::U8(self.msg_len)),
                ("value", FieldValue::Bytes(FieldBytes::from_slice(&self.value))),
            ],
        )
    }
}

/// 0x6f1: single-PID read addressed to the EGS.
pub static EGS_PID_REQUEST: MessageSchema = MessageSchema {
    name: "egs_pid_request",
    arbitration: IdMatch::Fixed(0x6f1),
    extended: false,
    fields: &[
        FieldDescriptor::constant("recipient", 1, 0x18),
        FieldDescriptor::constant("type_length", 1, 0x02),
        FieldDescriptor::constant("service", 1, 0x21),
        FieldDescriptor::unsigned("pid", 1),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EgsPidRequest {
    pub pid: u8,
}

impl FrameRecord for EgsPidRequest {
    const SCHEMA: &'static MessageSchema = &EGS_PID_REQUEST;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            pid: field_uint(fields, "pid")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(Self::SCHEMA, None, &[("pid", FieldValue::U8(self.pid))])
    }
}

/// 0x618: EGS answer to a PID read.
pub static EGS_PID_RESPONSE: MessageSchema = MessageSchema {
    name: "egs_pid_response",
    arbitration: IdMatch::Fixed(0x618),
    extended: false,
    fields: &[
        FieldDescriptor::constant("recipient", 1, 0xf1),
        FieldDescriptor::constant("type_length", 1, 0x03),
        FieldDescriptor::constant("service", 1, 0x61),
        FieldDescriptor::unsigned("pid", 1),
        FieldDescriptor::unsigned("value", 1),
        FieldDescriptor::constant_bytes("padding", FieldBytes::filled(3, 0)),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EgsPidResponse {
    pub pid: u8,
    pub value: u8,
}

impl FrameRecord for EgsPidResponse {
    const SCHEMA: &'static MessageSchema = &EGS_PID_RESPONSE;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            pid: field_uint(fields, "pid")?,
            value: field_uint(fields, "value")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            None,
            &[
                ("pid", FieldValue::U8(self.pid)),
                ("value", FieldValue::U8(self.value)),
            ],
        )
    }
}

//==================================================================================ISO-TP LAYOUTS
/// Addressed single frame; the identifier carries the sender.
pub static ISO_TP_SINGLE: MessageSchema = MessageSchema {
    name: "iso_tp_single",
    arbitration: ADDRESSED,
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("recipient", 1),
        FieldDescriptor::unsigned("type_length", 1),
        FieldDescriptor::bytes("payload", 6, FieldBytes::filled(6, 0)),
    ],
};

/// Addressed first frame.
pub static ISO_TP_INITIAL: MessageSchema = MessageSchema {
    name: "iso_tp_initial",
    arbitration: ADDRESSED,
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("recipient", 1),
        FieldDescriptor::unsigned("type_length_hi", 1),
        FieldDescriptor::unsigned("length_lo", 1),
        FieldDescriptor::bytes("payload", 5, FieldBytes::filled(5, 0)),
    ],
};

/// Addressed consecutive frame.
pub static ISO_TP_CONSECUTIVE: MessageSchema = MessageSchema {
    name: "iso_tp_consecutive",
    arbitration: ADDRESSED,
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("recipient", 1),
        FieldDescriptor::unsigned("type_sequence", 1),
        FieldDescriptor::bytes("payload", 6, FieldBytes::filled(6, 0)),
    ],
};

/// Addressed flow-control continue: send everything, 1 ms apart.
pub static ISO_TP_FLOW_CONTINUE: MessageSchema = MessageSchema {
    name: "iso_tp_flow_continue",
    arbitration: ADDRESSED,
    extended: false,
    fields: &[
        FieldDescriptor::unsigned("recipient", 1),
        FieldDescriptor::constant("flow", 1, 0x30),
        FieldDescriptor::constant("block_size", 1, 0x00),
        FieldDescriptor::constant("separation_time", 1, 0x01),
    ],
};

/// Raw layout record shared by the single and consecutive frame schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoTpSingle {
    pub sender: u8,
    pub recipient: u8,
    pub type_length: u8,
    pub payload: [u8; 6],
}

impl IsoTpSingle {
    /// Single frame carrying up to six bytes, zero padded.
    pub fn new(sender: u8, recipient: u8, data: &[u8]) -> Self {
        let count = data.len().min(6);
        let mut payload = [0u8; 6];
        payload[..count].copy_from_slice(&data[..count]);
        Self {
            sender,
            recipient,
            type_length: count as u8,
            payload,
        }
    }
}

impl FrameRecord for IsoTpSingle {
    const SCHEMA: &'static MessageSchema = &ISO_TP_SINGLE;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            sender: fields.sender.ok_or(MessageError::MissingSender)?,
            recipient: field_uint(fields, "recipient")?,
            type_length: field_uint(fields, "type_length")?,
            payload: field_array(fields, "payload")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            Some(self.sender),
            &[
                ("recipient", FieldValue::U8(self.recipient)),
                ("type_length", FieldValue::U8(self.type_length)),
                ("payload", FieldValue::Bytes(FieldBytes::from_slice(&self.payload))),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoTpInitial {
    pub sender: u8,
    pub recipient: u8,
    pub total_len: u16,
    pub payload: [u8; 5],
}

impl IsoTpInitial {
    /// First frame announcing `data.len()` bytes and carrying the first five.
    pub fn new(sender: u8, recipient: u8, data: &[u8]) -> Self {
        let count = data.len().min(5);
        let mut payload = [0u8; 5];
        payload[..count].copy_from_slice(&data[..count]);
        Self {
            sender,
            recipient,
            total_len: (data.len() & 0x0fff) as u16,
            payload,
        }
    }
}

impl FrameRecord for IsoTpInitial {
    const SCHEMA: &'static MessageSchema = &ISO_TP_INITIAL;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        let high: u8 = field_uint(fields, "type_length_hi")?;
        if high >> 4 != 0x1 {
            return Err(MessageError::FieldConstraintViolation {
                index: 1,
                name: "type_length_hi",
            });
        }
        let low: u8 = field_uint(fields, "length_lo")?;
        Ok(Self {
            sender: fields.sender.ok_or(MessageError::MissingSender)?,
            recipient: field_uint(fields, "recipient")?,
            total_len: ((high as u16 & 0x0f) << 8) | low as u16,
            payload: field_array(fields, "payload")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            Some(self.sender),
            &[
                ("recipient", FieldValue::U8(self.recipient)),
                (
                    "type_length_hi",
                    FieldValue::U8(0x10 | ((self.total_len >> 8) & 0x0f) as u8),
                ),
                ("length_lo", FieldValue::U8(self.total_len as u8)),
                ("payload", FieldValue::Bytes(FieldBytes::from_slice(&self.payload))),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoTpConsecutive {
    pub sender: u8,
    pub recipient: u8,
    pub sequence: u8,
    pub payload: [u8; 6],
}

impl FrameRecord for IsoTpConsecutive {
    const SCHEMA: &'static MessageSchema = &ISO_TP_CONSECUTIVE;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        let type_sequence: u8 = field_uint(fields, "type_sequence")?;
        if type_sequence >> 4 != 0x2 {
            return Err(MessageError::FieldConstraintViolation {
                index: 1,
                name: "type_sequence",
            });
        }
        Ok(Self {
            sender: fields.sender.ok_or(MessageError::MissingSender)?,
            recipient: field_uint(fields, "recipient")?,
            sequence: type_sequence & 0x0f,
            payload: field_array(fields, "payload")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            Some(self.sender),
            &[
                ("recipient", FieldValue::U8(self.recipient)),
                ("type_sequence", FieldValue::U8(0x20 | (self.sequence & 0x0f))),
                ("payload", FieldValue::Bytes(FieldBytes::from_slice(&self.payload))),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoTpFlowContinue {
    pub sender: u8,
    pub recipient: u8,
}

impl FrameRecord for IsoTpFlowContinue {
    const SCHEMA: &'static MessageSchema = &ISO_TP_FLOW_CONTINUE;

    fn from_fields(fields: &DecodedFields) -> Result<Self, MessageError> {
        Ok(Self {
            sender: fields.sender.ok_or(MessageError::MissingSender)?,
            recipient: field_uint(fields, "recipient")?,
        })
    }

    fn encode(&self) -> Result<CanFrame, MessageError> {
        engine::encode(
            Self::SCHEMA,
            Some(self.sender),
            &[("recipient", FieldValue::U8(self.recipient))],
        )
    }
}
