//! Engine control unit (DDE, node 0x12) emulator.
//!
//! The tester configures the DDE once with a list of parameter identifiers
//! (`2c 10 pid pid ...`), then polls it with a bare `2c 10`. Each request is answered
//! with `6c 10` followed by the current value of every listed parameter. A request
//! naming a single parameter is a one-off read answered with one single frame.
//!
//! Every completed request gets exactly one reply. Unknown parameters read as zero and a
//! request that does not parse is answered with [`DDE_NEGATIVE_REPLY`].
use core::future::Future;

use super::{Anomaly, AnomalyLog, Emulator, FrameDisposition};
use crate::error::{EmulatorError, FramerError};
use crate::infra::codec::traits::FrameRecord;
use crate::protocol::diagnostic::{ACK_BIT, DDE_ID, TESTER_ID};
use crate::protocol::messages::DdePidResponse;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::iso_tp::framer::{FramerEvent, TpConfig, TpFramer};
use crate::protocol::transport::traits::{bus_timer::BusTimer, can_bus::CanBus};

/// Service byte plus the "by identifier" sub-function.
pub const DDE_READ_SERVICE: [u8; 2] = [0x2c, 0x10];

/// Negative reply to a request the DDE cannot parse: service, then "invalid format".
pub const DDE_NEGATIVE_REPLY: [u8; 3] = [0x7f, DDE_READ_SERVICE[0], 0x12];

/// Setup request the bench tester sends once after power-up.
pub const DDE_SETUP_PAYLOAD: [u8; 14] = [
    0x2c, 0x10, 0x03, 0x85, 0x04, 0x1b, 0x07, 0x6f, 0x06, 0x6d, 0x0a, 0x8d, 0x10, 0x06,
];

/// Parameters one setup can list.
pub const MAX_CONFIGURED_PIDS: usize = 32;

/// Capacity of a [`PidTable`].
pub const MAX_TABLE_PIDS: usize = 32;

//==================================================================================PID TABLE
/// One emulated parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidEntry {
    pub pid: u16,
    /// Reply width in bytes, 1 or 2.
    pub width: u8,
    pub value: u16,
}

impl PidEntry {
    pub const fn new(pid: u16, width: u8, value: u16) -> Self {
        Self { pid, width, value }
    }

    /// Write the big-endian value into `out`, returning the bytes written.
    fn write(&self, out: &mut [u8]) -> usize {
        if self.width == 1 {
            out[0] = self.value as u8;
            1
        } else {
            out[..2].copy_from_slice(&self.value.to_be_bytes());
            2
        }
    }
}

/// Parameters of the bench DDE with plausible idle values.
pub const DEFAULT_DDE_PIDS: [PidEntry; 19] = [
    // Ambient temperature, 12.7 °C.
    PidEntry::new(0x0fd2, 2, 0x0b2a),
    PidEntry::new(0x0771, 2, 0x1a3c),
    PidEntry::new(0x076f, 2, 0x2c34),
    PidEntry::new(0x042e, 2, 0x0799),
    // Fuel temperature, 17.5 °C.
    PidEntry::new(0x0385, 2, 0x1a64),
    PidEntry::new(0x0458, 2, 0x2bde),
    PidEntry::new(0x0c1c, 2, 0x7d2e),
    PidEntry::new(0x066d, 2, 0x0000),
    PidEntry::new(0x077d, 2, 0x2a11),
    PidEntry::new(0x0a8d, 2, 0x0000),
    PidEntry::new(0x022c, 2, 0x0000),
    // Battery voltage, 12.12 V.
    PidEntry::new(0x012c, 2, 0x79ac),
    PidEntry::new(0x0e86, 1, 0x00),
    PidEntry::new(0x06f6, 1, 0x00),
    PidEntry::new(0x09c4, 2, 0xe665),
    PidEntry::new(0x041b, 2, 0x0000),
    PidEntry::new(0x1006, 2, 0x0000),
    PidEntry::new(0x0772, 2, 0x0000),
    PidEntry::new(0x0434, 2, 0x0000),
];

/// Parameter values owned by one emulator instance.
#[derive(Debug, Clone)]
pub struct PidTable {
    entries: [PidEntry; MAX_TABLE_PIDS],
    len: usize,
}

impl Default for PidTable {
    fn default() -> Self {
        Self::from_entries(&DEFAULT_DDE_PIDS)
    }
}

impl PidTable {
    /// Copy `entries`; anything past [`MAX_TABLE_PIDS`] is dropped.
    pub fn from_entries(entries: &[PidEntry]) -> Self {
        let len = entries.len().min(MAX_TABLE_PIDS);
        let mut table = [PidEntry::new(0, 2, 0); MAX_TABLE_PIDS];
        table[..len].copy_from_slice(&entries[..len]);
        Self {
            entries: table,
            len,
        }
    }

    pub fn get(&self, pid: u16) -> Option<&PidEntry> {
        self.entries[..self.len].iter().find(|entry| entry.pid == pid)
    }

    /// Update the value served for `pid`. Returns `false` when the table does not know it.
    pub fn set(&mut self, pid: u16, value: u16) -> bool {
        match self.entries[..self.len].iter_mut().find(|entry| entry.pid == pid) {
            Some(entry) => {
                entry.value = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

//==================================================================================EMULATOR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DdeState {
    Unconfigured,
    Configured,
}

/// DDE answering over the addressed ISO-TP dialect.
pub struct DdeEmulator {
    framer: TpFramer,
    table: PidTable,
    setup: [u8; DDE_SETUP_PAYLOAD.len()],
    state: DdeState,
    configured: [u16; MAX_CONFIGURED_PIDS],
    configured_len: usize,
    anomalies: AnomalyLog,
}

impl Default for DdeEmulator {
    fn default() -> Self {
        Self::new(PidTable::default())
    }
}

impl DdeEmulator {
    /// Emulator expecting [`DDE_SETUP_PAYLOAD`] and serving `table`.
    pub fn new(table: PidTable) -> Self {
        Self {
            framer: TpFramer::new(TpConfig::new(DDE_ID)),
            table,
            setup: DDE_SETUP_PAYLOAD,
            state: DdeState::Unconfigured,
            configured: [0; MAX_CONFIGURED_PIDS],
            configured_len: 0,
            anomalies: AnomalyLog::new(),
        }
    }

    pub fn state(&self) -> DdeState {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        self.state == DdeState::Configured
    }

    /// Parameters listed by the accepted setup.
    pub fn configured_pids(&self) -> &[u16] {
        &self.configured[..self.configured_len]
    }

    pub fn table(&self) -> &PidTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut PidTable {
        &mut self.table
    }

    async fn handle_request<C: CanBus>(
        &mut self,
        can_bus: &mut C,
        sender: u8,
        request: &[u8],
    ) -> Result<FrameDisposition, EmulatorError<C::Error>> {
        if sender != TESTER_ID {
            self.anomalies.record(Anomaly::BadSender { sender });
        }
        let Some(params) = request.strip_prefix(&DDE_READ_SERVICE[..]) else {
            self.anomalies.record(Anomaly::MalformedRequest);
            return self.reply_payload(can_bus, sender, &DDE_NEGATIVE_REPLY).await;
        };
        if params.len() % 2 != 0 || params.len() / 2 > MAX_CONFIGURED_PIDS {
            self.anomalies.record(Anomaly::MalformedRequest);
            return self.reply_payload(can_bus, sender, &DDE_NEGATIVE_REPLY).await;
        }

        let mut pids = [0u16; MAX_CONFIGURED_PIDS];
        let count = params.len() / 2;
        for (slot, pair) in pids.iter_mut().zip(params.chunks_exact(2)) {
            *slot = u16::from_be_bytes([pair[0], pair[1]]);
        }

        match count {
            0 => {
                if self.state == DdeState::Unconfigured {
                    self.anomalies.record(Anomaly::NotConfigured);
                }
                pids = self.configured;
                let configured = self.configured_len;
                self.reply_values(can_bus, sender, &pids[..configured]).await
            }
            1 => self.reply_single(can_bus, pids[0]).await,
            _ => {
                self.configure(request, &pids[..count]);
                self.reply_values(can_bus, sender, &pids[..count]).await
            }
        }
    }

    fn configure(&mut self, request: &[u8], pids: &[u16]) {
        match self.state {
            DdeState::Configured => self.anomalies.record(Anomaly::AlreadyConfigured),
            DdeState::Unconfigured if request == self.setup => {
                self.configured[..pids.len()].copy_from_slice(pids);
                self.configured_len = pids.len();
                self.state = DdeState::Configured;
                #[cfg(feature = "defmt")]
                defmt::info!("DDE configured with {} parameters", pids.len());
            }
            DdeState::Unconfigured => self.anomalies.record(Anomaly::UnexpectedSetup),
        }
    }

    /// One-off read answered with a dedicated single frame. An unknown parameter reads
    /// as a two-byte zero.
    async fn reply_single<C: CanBus>(
        &mut self,
        can_bus: &mut C,
        pid: u16,
    ) -> Result<FrameDisposition, EmulatorError<C::Error>> {
        let response = match self.table.get(pid) {
            Some(entry) => DdePidResponse::new(entry.width, entry.value),
            None => {
                self.anomalies.record(Anomaly::UnknownPid { pid });
                DdePidResponse::new(2, 0)
            }
        };
        let frame = response.encode()?;
        can_bus.send(&frame).await.map_err(EmulatorError::Send)?;
        Ok(FrameDisposition::Replied)
    }

    async fn reply_values<C: CanBus>(
        &mut self,
        can_bus: &mut C,
        recipient: u8,
        pids: &[u16],
    ) -> Result<FrameDisposition, EmulatorError<C::Error>> {
        let mut reply = [0u8; 2 + 2 * MAX_CONFIGURED_PIDS];
        reply[0] = DDE_READ_SERVICE[0] | ACK_BIT;
        reply[1] = DDE_READ_SERVICE[1];
        let mut len = 2;
        for &pid in pids {
            match self.table.get(pid) {
                Some(entry) => len += entry.write(&mut reply[len..]),
                None => {
                    // Keep the reply positional.
                    self.anomalies.record(Anomaly::UnknownPid { pid });
                    len += 2;
                }
            }
        }
        self.reply_payload(can_bus, recipient, &reply[..len]).await
    }

    /// Send one ISO-TP reply, replacing any transfer still in flight.
    async fn reply_payload<C: CanBus>(
        &mut self,
        can_bus: &mut C,
        recipient: u8,
        payload: &[u8],
    ) -> Result<FrameDisposition, EmulatorError<C::Error>> {
        if self.framer.is_transmitting() {
            self.framer.abandon_transmit();
        }
        self.framer.send_payload(can_bus, recipient, payload).await?;
        Ok(FrameDisposition::Replied)
    }
}

impl Emulator for DdeEmulator {
    fn on_frame<'a, C: CanBus, T: BusTimer>(
        &'a mut self,
        can_bus: &'a mut C,
        timer: &'a mut T,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<FrameDisposition, EmulatorError<C::Error>>> + 'a {
        async move {
            let event = match self.framer.on_frame(can_bus, timer, frame).await {
                Ok(event) => event,
                Err(FramerError::Protocol(_violation)) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("DDE dropped a broken transfer: {}", _violation);
                    self.anomalies.record(Anomaly::MalformedRequest);
                    return Ok(FrameDisposition::Consumed);
                }
                Err(FramerError::TransferAborted { .. }) => return Ok(FrameDisposition::Consumed),
                Err(err) => return Err(err.into()),
            };

            match event {
                FramerEvent::Ignored => Ok(FrameDisposition::Ignored),
                FramerEvent::Consumed => Ok(FrameDisposition::Consumed),
                FramerEvent::TransmitComplete => Ok(FrameDisposition::Replied),
                FramerEvent::Payload(payload) => {
                    self.handle_request(can_bus, payload.sender, payload.as_slice())
                        .await
                }
            }
        }
    }

    fn anomalies(&self) -> AnomalyLog {
        self.anomalies
    }
}
