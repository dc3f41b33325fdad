//! Emulated bench modules and the service that drives them from the bus.
//!
//! Every emulator is a policy layer over the protocol engine: it is fed each received
//! frame through [`Emulator::on_frame`], lets the transport reassemble requests, and
//! answers each complete request with exactly one scripted reply. Requests it does not
//! expect are recorded as [`Anomaly`] values and never change its state.
use core::future::Future;

use crate::error::EmulatorError;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::{bus_timer::BusTimer, can_bus::CanBus};

pub mod cas_jbe;
pub mod dde;
pub mod egs;
pub mod service;

/// What an emulator did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameDisposition {
    /// Not addressed to this emulator.
    Ignored,
    /// Taken as part of an exchange; nothing was sent.
    Consumed,
    /// A reply, or the next part of one, went out.
    Replied,
}

/// Request the emulator could not honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Anomaly {
    /// Request from someone other than the tester.
    BadSender { sender: u8 },
    /// Setup payload other than the expected one while unconfigured.
    UnexpectedSetup,
    /// Setup payload received after configuration; the configuration is kept.
    AlreadyConfigured,
    /// Resume request before any configuration.
    NotConfigured,
    /// Parameter missing from the emulator's table.
    UnknownPid { pid: u16 },
    /// Command missing from the module's catalog.
    UnknownCommand { module: u8 },
    /// Request broken at the transport or dialect level.
    MalformedRequest,
    /// Continuation request with no reply pending.
    NothingPending { module: u8 },
}

/// Anomaly counter plus the most recent entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyLog {
    count: u32,
    last: Option<Anomaly>,
}

impl AnomalyLog {
    pub const fn new() -> Self {
        Self {
            count: 0,
            last: None,
        }
    }

    pub fn record(&mut self, anomaly: Anomaly) {
        #[cfg(feature = "defmt")]
        defmt::warn!("Emulator anomaly: {}", anomaly);
        self.count = self.count.wrapping_add(1);
        self.last = Some(anomaly);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last(&self) -> Option<Anomaly> {
        self.last
    }
}

//==================================================================================EMULATOR
/// One emulated module, or a group of them sharing a bus.
pub trait Emulator {
    /// Handle one received frame, sending whatever reply it calls for before returning.
    fn on_frame<'a, C: CanBus, T: BusTimer>(
        &'a mut self,
        can_bus: &'a mut C,
        timer: &'a mut T,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<FrameDisposition, EmulatorError<C::Error>>> + 'a;

    /// Anomalies recorded so far.
    fn anomalies(&self) -> AnomalyLog;
}

/// Two emulators on one bus: the first gets every frame, the second only those the first
/// ignored.
pub struct EmulatorPair<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: Emulator, B: Emulator> EmulatorPair<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Emulator, B: Emulator> Emulator for EmulatorPair<A, B> {
    fn on_frame<'a, C: CanBus, T: BusTimer>(
        &'a mut self,
        can_bus: &'a mut C,
        timer: &'a mut T,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<FrameDisposition, EmulatorError<C::Error>>> + 'a {
        async move {
            match self.first.on_frame(can_bus, timer, frame).await? {
                FrameDisposition::Ignored => self.second.on_frame(can_bus, timer, frame).await,
                handled => Ok(handled),
            }
        }
    }

    /// Combined count; `last` prefers the first emulator's entry.
    fn anomalies(&self) -> AnomalyLog {
        let first = self.first.anomalies();
        let second = self.second.anomalies();
        AnomalyLog {
            count: first.count.wrapping_add(second.count),
            last: first.last.or(second.last),
        }
    }
}
