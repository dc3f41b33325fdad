//! Body modules on the diagnostic dialect: the CAS (car access system, 0x40) and the
//! JBE (junction box, 0x00), both also reachable through the broadcast address 0xef.
//!
//! Each module answers from a catalog of `(command, reply)` pairs. A broadcast request
//! is answered by the CAS first, then the JBE; the JBE reply starts only once the CAS
//! reply has been fully sent.
use core::future::Future;

use super::{Anomaly, AnomalyLog, Emulator, FrameDisposition};
use crate::error::EmulatorError;
use crate::protocol::diagnostic::responder::{
    DiagRequest, DiagResponder, DiagResponse, RequestEvent,
};
use crate::protocol::diagnostic::{continuation_request, BROADCAST_ID, CAS_ID, JBE_ID};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::{bus_timer::BusTimer, can_bus::CanBus};
use crate::protocol::transport::TP_SEPARATION_TIME_MS;

static BODY_ADDRESSES: [u8; 3] = [CAS_ID, JBE_ID, BROADCAST_ID];

//==================================================================================CATALOGS
/// Scripted answer to one command.
///
/// An entry matches every request whose command starts with `command`. The reply
/// begins with the command echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub command: &'static [u8],
    pub reply: &'static [u8],
}

impl CatalogEntry {
    pub const fn new(command: &'static [u8], reply: &'static [u8]) -> Self {
        Self { command, reply }
    }
}

/// One body module: its address and catalog.
#[derive(Debug, Clone, Copy)]
pub struct BodyModule {
    pub address: u8,
    pub catalog: &'static [CatalogEntry],
}

impl BodyModule {
    /// First catalog entry matching `command`.
    pub fn lookup(&self, command: &[u8]) -> Option<&'static CatalogEntry> {
        self.catalog
            .iter()
            .find(|entry| command.starts_with(entry.command))
    }
}

pub static CAS_CATALOG: [CatalogEntry; 8] = [
    // Identification.
    CatalogEntry::new(
        &[0x1a, 0x80],
        &[
            0x5a, 0x80, 0x00, 0x00, 0x09, 0x38, 0x91, 0x16, 0xc4, 0x09, 0x06, 0xa0, 0x53, 0x41,
            0x20, 0x09, 0x05, 0x20, 0x04, 0x00, 0x00, 0x00, 0x02, 0x08, 0x01, 0x03, 0x03, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x94, 0x38, 0x06, 0x30, 0x31, 0x39, 0x30, 0x30,
            0x30, 0x34, 0x32, 0x4e, 0x37, 0x44, 0x30, 0x30, 0x34, 0x32, 0x4e, 0x37, 0x44, 0x46,
            0x32, 0x32, 0x39, 0x53,
        ],
    ),
    // VIN.
    CatalogEntry::new(
        &[0x22, 0x10, 0x10],
        &[
            0x62, 0x10, 0x10, 0x57, 0x42, 0x41, 0x50, 0x4e, 0x37, 0x33, 0x35, 0x58, 0x39, 0x41,
            0x32, 0x36, 0x36, 0x33, 0x38, 0x36,
        ],
    ),
    CatalogEntry::new(
        &[0x22, 0x3f, 0x00],
        &[
            0x62, 0x3f, 0x00, 0x02, 0x41, 0x34, 0x19, 0x95, 0x94, 0x3f, 0xc2, 0xe5, 0xd3, 0x41,
            0x35, 0x54, 0xb2, 0x3c, 0xf7,
        ],
    ),
    CatalogEntry::new(
        &[0x22, 0x3f, 0x01],
        &[
            0x62, 0x3f, 0x01, 0x41, 0x04, 0x10, 0x41, 0x04, 0x10, 0x41, 0x04, 0x10, 0x41, 0x04,
            0x10, 0x41, 0x04, 0x10, 0x42,
        ],
    ),
    CatalogEntry::new(
        &[0x22, 0x3f, 0x02],
        &[
            0x62, 0x3f, 0x02, 0x11, 0x8e, 0x14, 0x90, 0x55, 0x2c, 0xfa, 0x51, 0x65, 0x54, 0x65,
            0x75, 0x21, 0x89, 0x55, 0xd0,
        ],
    ),
    CatalogEntry::new(
        &[0x22, 0x3f, 0x03],
        &[
            0x62, 0x3f, 0x03, 0x59, 0x15, 0x58, 0x49, 0x36, 0x15, 0x41, 0x85, 0x53, 0x61, 0x75,
            0x99, 0x49, 0x53, 0x21, 0x41,
        ],
    ),
    CatalogEntry::new(
        &[0x22, 0x3f, 0x04],
        &[
            0x62, 0x3f, 0x04, 0x94, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff,
        ],
    ),
    CatalogEntry::new(
        &[0x30, 0x01, 0x01],
        &[
            0x70, 0x01, 0x01, 0x83, 0xc8, 0x00, 0x28, 0x97, 0x6c, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x6c, 0x01, 0x6c, 0x6d, 0x6e, 0x6c, 0x6a, 0x00, 0x00, 0x00, 0x01, 0xf0, 0x00, 0x02,
            0x37, 0x00, 0x4b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x98, 0x9e, 0x61,
            0x00, 0xc1, 0x50, 0x06, 0x00, 0x1b, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
            0x45, 0x40, 0x21, 0x8f, 0x36, 0x80, 0x00, 0x0d, 0xff, 0xff, 0xff,
        ],
    ),
];

pub static JBE_CATALOG: [CatalogEntry; 1] = [CatalogEntry::new(
    &[0x1a, 0x80],
    &[
        0x5a, 0x80, 0x00, 0x00, 0x09, 0x18, 0x75, 0x46, 0x03, 0x0a, 0x0d, 0xd0, 0x4e, 0x52, 0x20,
        0x05, 0x12, 0x21, 0x09, 0x00, 0x1d, 0x88, 0x08, 0x3f, 0x00, 0x03, 0x0a, 0x00, 0x00, 0x00,
        0x00,
    ],
)];

pub const CAS: BodyModule = BodyModule {
    address: CAS_ID,
    catalog: &CAS_CATALOG,
};

pub const JBE: BodyModule = BodyModule {
    address: JBE_ID,
    catalog: &JBE_CATALOG,
};

//==================================================================================EMULATOR
/// Replies a broadcast can queue (one per module).
const MAX_PENDING: usize = 2;

/// CAS and JBE sharing one responder.
pub struct CasJbeEmulator {
    responder: DiagResponder,
    cas: BodyModule,
    jbe: BodyModule,
    pending: [Option<DiagResponse>; MAX_PENDING],
    anomalies: AnomalyLog,
}

impl Default for CasJbeEmulator {
    fn default() -> Self {
        Self::new(&CAS_CATALOG, &JBE_CATALOG)
    }
}

impl CasJbeEmulator {
    pub fn new(cas_catalog: &'static [CatalogEntry], jbe_catalog: &'static [CatalogEntry]) -> Self {
        Self {
            responder: DiagResponder::new(&BODY_ADDRESSES),
            cas: BodyModule {
                catalog: cas_catalog,
                ..CAS
            },
            jbe: BodyModule {
                catalog: jbe_catalog,
                ..JBE
            },
            pending: [None, None],
            anomalies: AnomalyLog::new(),
        }
    }

    /// Replies not fully sent yet.
    pub fn pending_replies(&self) -> usize {
        self.pending.iter().filter(|reply| reply.is_some()).count()
    }

    /// Queue the replies to `request` and send what can go out without a go-ahead.
    async fn start<C: CanBus>(
        &mut self,
        can_bus: &mut C,
        request: DiagRequest,
    ) -> Result<FrameDisposition, EmulatorError<C::Error>> {
        // A new request supersedes whatever was still pending.
        self.pending = [None, None];

        let broadcast = request.recipient == BROADCAST_ID;
        let mut queued = 0;
        for module in [self.cas, self.jbe] {
            if !broadcast && module.address != request.recipient {
                continue;
            }
            match module.lookup(request.command()) {
                Some(entry) => {
                    self.pending[queued] =
                        Some(DiagResponse::new(module.address, request.requester, entry.reply));
                    queued += 1;
                }
                // Silence from one module is normal for a broadcast.
                None if broadcast => {}
                None => self.anomalies.record(Anomaly::UnknownCommand {
                    module: module.address,
                }),
            }
        }

        if queued == 0 {
            return Ok(FrameDisposition::Consumed);
        }
        self.advance(can_bus).await?;
        Ok(FrameDisposition::Replied)
    }

    /// Send initial frames until the head reply waits for a continuation request.
    async fn advance<C: CanBus>(&mut self, can_bus: &mut C) -> Result<(), EmulatorError<C::Error>> {
        while let Some(head) = self.pending[0].as_mut() {
            if !head.is_started() {
                if let Some(frame) = head.next_frame() {
                    can_bus.send(&frame).await.map_err(EmulatorError::Send)?;
                }
            }
            if head.residual() > 0 {
                break;
            }
            self.pop();
        }
        Ok(())
    }

    /// Stream the rest of the head reply after the requester's go-ahead.
    async fn resume<C: CanBus, T: BusTimer>(
        &mut self,
        can_bus: &mut C,
        timer: &mut T,
        requester: u8,
        module: u8,
    ) -> Result<FrameDisposition, EmulatorError<C::Error>> {
        let Some(head) = self.pending[0]
            .as_mut()
            .filter(|head| head.responder() == module && head.requester() == requester)
        else {
            self.anomalies.record(Anomaly::NothingPending { module });
            return Ok(FrameDisposition::Consumed);
        };

        let mut first = true;
        while let Some(frame) = head.next_frame() {
            if !first {
                timer.delay_ms(TP_SEPARATION_TIME_MS as u32).await;
            }
            can_bus.send(&frame).await.map_err(EmulatorError::Send)?;
            first = false;
        }
        #[cfg(feature = "defmt")]
        defmt::debug!("Reply from {:x} to {:x} sent", module, requester);

        self.pop();
        self.advance(can_bus).await?;
        Ok(FrameDisposition::Replied)
    }

    fn pop(&mut self) {
        self.pending[0] = self.pending[1].take();
    }
}

impl Emulator for CasJbeEmulator {
    fn on_frame<'a, C: CanBus, T: BusTimer>(
        &'a mut self,
        can_bus: &'a mut C,
        timer: &'a mut T,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<FrameDisposition, EmulatorError<C::Error>>> + 'a {
        async move {
            let event = match self.responder.on_frame(frame) {
                Ok(event) => event,
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Body request dropped: {}", _err);
                    self.anomalies.record(Anomaly::MalformedRequest);
                    return Ok(FrameDisposition::Consumed);
                }
            };

            match event {
                RequestEvent::None => Ok(FrameDisposition::Ignored),
                RequestEvent::Request(request) => self.start(can_bus, request).await,
                RequestEvent::NeedsContinuation {
                    requester,
                    recipient,
                } => {
                    let from = if recipient == BROADCAST_ID {
                        self.cas.address
                    } else {
                        recipient
                    };
                    let go_ahead = continuation_request(from, requester);
                    can_bus.send(&go_ahead).await.map_err(EmulatorError::Send)?;
                    Ok(FrameDisposition::Consumed)
                }
                RequestEvent::Resume {
                    requester,
                    recipient,
                } => self.resume(can_bus, timer, requester, recipient).await,
            }
        }
    }

    fn anomalies(&self) -> AnomalyLog {
        self.anomalies
    }
}
