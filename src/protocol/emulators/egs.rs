//! Transmission control unit (EGS, node 0x18) emulator: single-frame reads by
//! one-byte parameter identifier.
use core::future::Future;

use super::{Anomaly, AnomalyLog, Emulator, FrameDisposition};
use crate::error::EmulatorError;
use crate::infra::codec::traits::FrameRecord;
use crate::protocol::messages::{EgsPidRequest, EgsPidResponse};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::{bus_timer::BusTimer, can_bus::CanBus};

pub const EGS_OIL_TEMPERATURE: u8 = 0x01;
pub const EGS_ACTUAL_GEAR: u8 = 0x0a;
pub const EGS_SUPPLY_VOLTAGE: u8 = 0x0c;
pub const EGS_SELECTED_GEAR: u8 = 0x18;

pub const MAX_EGS_PIDS: usize = 16;

/// One emulated one-byte parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EgsPid {
    pub pid: u8,
    pub value: u8,
}

impl EgsPid {
    pub const fn new(pid: u8, value: u8) -> Self {
        Self { pid, value }
    }
}

pub const DEFAULT_EGS_PIDS: [EgsPid; 4] = [
    EgsPid::new(EGS_ACTUAL_GEAR, 0),
    EgsPid::new(EGS_SELECTED_GEAR, 0),
    EgsPid::new(EGS_SUPPLY_VOLTAGE, 0x8a),
    EgsPid::new(EGS_OIL_TEMPERATURE, 0x50),
];

/// EGS answering from its own parameter table.
pub struct EgsEmulator {
    pids: [EgsPid; MAX_EGS_PIDS],
    len: usize,
    anomalies: AnomalyLog,
}

impl Default for EgsEmulator {
    fn default() -> Self {
        Self::new(&DEFAULT_EGS_PIDS)
    }
}

impl EgsEmulator {
    /// Copy `pids` into the emulator; anything past [`MAX_EGS_PIDS`] is dropped.
    pub fn new(pids: &[EgsPid]) -> Self {
        let len = pids.len().min(MAX_EGS_PIDS);
        let mut table = [EgsPid::new(0, 0); MAX_EGS_PIDS];
        table[..len].copy_from_slice(&pids[..len]);
        Self {
            pids: table,
            len,
            anomalies: AnomalyLog::new(),
        }
    }

    pub fn value(&self, pid: u8) -> Option<u8> {
        self.pids[..self.len]
            .iter()
            .find(|entry| entry.pid == pid)
            .map(|entry| entry.value)
    }

    /// Update the value served for `pid`. Returns `false` when the table does not know it.
    pub fn set(&mut self, pid: u8, value: u8) -> bool {
        match self.pids[..self.len].iter_mut().find(|entry| entry.pid == pid) {
            Some(entry) => {
                entry.value = value;
                true
            }
            None => false,
        }
    }
}

impl Emulator for EgsEmulator {
    fn on_frame<'a, C: CanBus, T: BusTimer>(
        &'a mut self,
        can_bus: &'a mut C,
        _timer: &'a mut T,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<FrameDisposition, EmulatorError<C::Error>>> + 'a {
        async move {
            let Ok(request) = EgsPidRequest::decode(frame) else {
                return Ok(FrameDisposition::Ignored);
            };
            let Some(value) = self.value(request.pid) else {
                self.anomalies.record(Anomaly::UnknownPid {
                    pid: request.pid as u16,
                });
                return Ok(FrameDisposition::Consumed);
            };

            let reply = EgsPidResponse {
                pid: request.pid,
                value,
            }
            .encode()?;
            can_bus.send(&reply).await.map_err(EmulatorError::Send)?;
            Ok(FrameDisposition::Replied)
        }
    }

    fn anomalies(&self) -> AnomalyLog {
        self.anomalies
    }
}
