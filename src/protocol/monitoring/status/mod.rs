//! Classification of the status frames a module broadcasts, and the aggregate view a
//! bench monitor keeps of them.
use crate::infra::codec::traits::FrameRecord;
use crate::protocol::messages::{Faults, SignOn, SystemStatus, VoltageCurrent};
use crate::protocol::transport::can_frame::CanFrame;

/// Periodic identifiers that are expected on the bus but carry nothing we track.
pub const KNOWN_PERIODIC_IDS: [u32; 2] = [0x349, 0x130];

//==================================================================================STATUS_REPORT
/// One decoded status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusReport {
    System(SystemStatus),
    VoltageCurrent(VoltageCurrent),
    Faults(Faults),
    SignOn(SignOn),
}

impl StatusReport {
    /// Try each status schema in priority order and return the first match.
    pub fn classify(frame: &CanFrame) -> Option<Self> {
        if let Ok(report) = SystemStatus::decode(frame) {
            return Some(Self::System(report));
        }
        if let Ok(report) = VoltageCurrent::decode(frame) {
            return Some(Self::VoltageCurrent(report));
        }
        if let Ok(report) = Faults::decode(frame) {
            return Some(Self::Faults(report));
        }
        SignOn::decode(frame).ok().map(Self::SignOn)
    }
}

//==================================================================================MODULE_STATUS
/// Latest reports of one module plus frame counters.
#[derive(Debug, Clone, Default)]
pub struct ModuleStatus {
    pub system: Option<SystemStatus>,
    pub voltage_current: Option<VoltageCurrent>,
    pub faults: Option<Faults>,
    pub last_sign_on: Option<SignOn>,
    pub rx_count: u32,
    /// Sign-on frames seen; each one means the module restarted.
    pub module_resets: u32,
    /// Frames that matched no known shape.
    pub message_errors: u32,
    in_timeout: bool,
    did_timeout: bool,
}

impl ModuleStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one received frame.
    pub fn update(&mut self, frame: &CanFrame) -> Option<StatusReport> {
        self.rx_count = self.rx_count.wrapping_add(1);
        self.in_timeout = false;

        let report = StatusReport::classify(frame);
        match report {
            Some(StatusReport::System(r)) => self.system = Some(r),
            Some(StatusReport::VoltageCurrent(r)) => self.voltage_current = Some(r),
            Some(StatusReport::Faults(r)) => self.faults = Some(r),
            Some(StatusReport::SignOn(r)) => {
                #[cfg(feature = "defmt")]
                defmt::info!("Module {:x} signed on, reason {:x}", r.module_id, r.reason_code);
                self.last_sign_on = Some(r);
                self.module_resets = self.module_resets.wrapping_add(1);
            }
            None => {
                if !KNOWN_PERIODIC_IDS.contains(&frame.id.raw()) {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Unexpected frame {:x}", frame.id.raw());
                    self.message_errors = self.message_errors.wrapping_add(1);
                }
            }
        }
        report
    }

    /// The module went quiet: drop every report, they are stale.
    pub fn timeout(&mut self) {
        self.in_timeout = true;
        self.did_timeout = true;
        self.system = None;
        self.voltage_current = None;
        self.faults = None;
    }

    /// Silent right now.
    pub fn in_timeout(&self) -> bool {
        self.in_timeout
    }

    /// Went silent at least once since creation.
    pub fn did_timeout(&self) -> bool {
        self.did_timeout
    }
}
