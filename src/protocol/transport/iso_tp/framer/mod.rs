//! Segmentation endpoint bound to one local node: reassembles inbound payloads,
//! answers first frames with flow control, and paces outbound segments according to
//! the peer's flow-control frames.
//!
//! The framer is event driven. [`TpFramer::on_frame`] is fed every received frame and
//! reports what happened; [`TpFramer::send_payload`] starts an outbound transfer whose
//! consecutive frames are released by subsequent flow-control frames. Callers that want
//! to block until a transfer is done use [`TpFramer::transmit`].
use super::assembler::{AssemblyResult, CompletedPayload, TpAssembler};
use super::builder::TransmitSegment;
use super::{separation_time_ms, FlowStatus, TpAddressing, TpFrame, TpPdu};
use crate::error::{ExchangeStage, FramerError, ModuleError};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::{
    bus_timer::BusTimer,
    can_bus::{receive_matching, CanBus},
};
use crate::protocol::transport::{
    TP_FLOW_BLOCK_SIZE, TP_FLOW_CONTROL_TIMEOUT_MS, TP_SEPARATION_TIME_MS,
};

//==================================================================================CONFIG
/// Static parameters of a framer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TpConfig {
    /// Recipient byte layout.
    pub addressing: TpAddressing,
    /// Our logical address, used as sender byte and recipient filter.
    pub node_id: u8,
    /// Separation time announced in our flow-control frames.
    pub separation_time_ms: u8,
    /// Block size announced in our flow-control frames.
    pub block_size: u8,
    /// How long [`TpFramer::transmit`] waits for each flow-control frame.
    pub flow_timeout_ms: u32,
}

impl TpConfig {
    /// Addressed endpoint for `node_id` with the bench defaults.
    pub const fn new(node_id: u8) -> Self {
        Self {
            addressing: TpAddressing::Addressed,
            node_id,
            separation_time_ms: TP_SEPARATION_TIME_MS,
            block_size: TP_FLOW_BLOCK_SIZE,
            flow_timeout_ms: TP_FLOW_CONTROL_TIMEOUT_MS,
        }
    }

    pub const fn with_addressing(mut self, addressing: TpAddressing) -> Self {
        self.addressing = addressing;
        self
    }

    pub const fn with_separation_time(mut self, millis: u8) -> Self {
        self.separation_time_ms = millis;
        self
    }

    pub const fn with_block_size(mut self, block_size: u8) -> Self {
        self.block_size = block_size;
        self
    }

    pub const fn with_flow_timeout(mut self, millis: u32) -> Self {
        self.flow_timeout_ms = millis;
        self
    }
}

/// Outcome of feeding one frame to the framer.
#[derive(Debug, PartialEq, Eq)]
pub enum FramerEvent {
    /// Not for us, or not a segmentation frame.
    Ignored,
    /// Integrated into a pending transfer; nothing to hand over yet.
    Consumed,
    /// A complete inbound payload.
    Payload(CompletedPayload),
    /// The outbound segment was fully released.
    TransmitComplete,
}

//==================================================================================FRAMER
/// Segmentation endpoint; `N` is the size of the inbound reassembly pool.
pub struct TpFramer<const N: usize = 1> {
    config: TpConfig,
    assembler: TpAssembler<N>,
    outbound: Option<TransmitSegment>,
}

impl<const N: usize> TpFramer<N> {
    pub const fn new(config: TpConfig) -> Self {
        Self {
            config,
            assembler: TpAssembler::new(),
            outbound: None,
        }
    }

    pub fn config(&self) -> &TpConfig {
        &self.config
    }

    /// True while an outbound segment waits for flow control.
    pub fn is_transmitting(&self) -> bool {
        self.outbound.is_some()
    }

    /// Drop the pending outbound segment, if any.
    pub fn abandon_transmit(&mut self) {
        if self.outbound.take().is_some() {
            #[cfg(feature = "defmt")]
            defmt::warn!("Outbound transfer abandoned");
        }
    }

    /// Process one received frame.
    ///
    /// First frames are acknowledged immediately with a flow-control continue. A
    /// flow-control frame from the peer of the pending outbound segment releases the
    /// next block of consecutive frames before this call returns.
    ///
    /// # Errors
    /// [`FramerError::Protocol`] when a transfer was broken (the slot is already reset),
    /// [`FramerError::TransferAborted`] when the peer cancelled our segment,
    /// [`FramerError::Send`] when a flow-control or consecutive frame could not be sent.
    pub async fn on_frame<C, T>(
        &mut self,
        can_bus: &mut C,
        timer: &mut T,
        frame: &CanFrame,
    ) -> Result<FramerEvent, FramerError<C::Error>>
    where
        C: CanBus,
        T: BusTimer,
    {
        let pdu = match TpPdu::parse(self.config.addressing, frame) {
            Ok(pdu) => pdu,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                if frame.id.sender().is_some() {
                    defmt::debug!("Skipping frame {:x}: {}", frame.id.raw(), _err);
                }
                return Ok(FramerEvent::Ignored);
            }
        };
        if pdu.sender == self.config.node_id {
            return Ok(FramerEvent::Ignored);
        }
        if let Some(recipient) = pdu.recipient {
            if recipient != self.config.node_id {
                return Ok(FramerEvent::Ignored);
            }
        }

        if let TpFrame::FlowControl {
            status,
            block_size,
            separation_time,
        } = pdu.frame
        {
            return self
                .handle_flow(can_bus, timer, pdu.sender, status, block_size, separation_time)
                .await;
        }

        // A peer that starts a new request has given up on our pending reply.
        if matches!(pdu.frame, TpFrame::Single { .. } | TpFrame::First { .. })
            && self
                .outbound
                .as_ref()
                .is_some_and(|segment| segment.recipient() == pdu.sender)
        {
            self.abandon_transmit();
        }

        match self.assembler.process(&pdu, frame.timestamp_us)? {
            AssemblyResult::Ignored => Ok(FramerEvent::Ignored),
            AssemblyResult::FragmentConsumed => Ok(FramerEvent::Consumed),
            AssemblyResult::MessageComplete(payload) => Ok(FramerEvent::Payload(payload)),
            AssemblyResult::FirstAccepted { sender } => {
                let flow = TpFrame::FlowControl {
                    status: FlowStatus::Continue,
                    block_size: self.config.block_size,
                    separation_time: self.config.separation_time_ms,
                }
                .to_can_frame(self.config.addressing, self.config.node_id, sender);
                can_bus.send(&flow).await.map_err(FramerError::Send)?;
                Ok(FramerEvent::Consumed)
            }
        }
    }

    /// Start sending `payload` to `recipient`.
    ///
    /// A payload that fits one frame is sent at once. Longer payloads emit the first
    /// frame and keep the rest until the peer's flow control arrives through
    /// [`on_frame`](Self::on_frame).
    ///
    /// Returns `true` when the whole payload already went out.
    pub async fn send_payload<C: CanBus>(
        &mut self,
        can_bus: &mut C,
        recipient: u8,
        payload: &[u8],
    ) -> Result<bool, FramerError<C::Error>> {
        if self.outbound.is_some() {
            return Err(FramerError::TransmitBusy);
        }
        let mut segment =
            TransmitSegment::new(self.config.addressing, self.config.node_id, recipient, payload)?;

        let Some(first) = segment.next_frame() else {
            return Ok(true);
        };
        can_bus.send(&first).await.map_err(FramerError::Send)?;

        if segment.is_drained() {
            return Ok(true);
        }
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Segment to {:x} waiting for flow control ({} bytes left)",
            recipient,
            segment.remaining()
        );
        self.outbound = Some(segment);
        Ok(false)
    }

    /// Send `payload` and drive the flow-control handshake until every frame is out.
    ///
    /// Frames other than flow control from `recipient` are discarded while waiting.
    /// Each wait is bounded by the configured flow timeout.
    pub async fn transmit<C, T>(
        &mut self,
        can_bus: &mut C,
        timer: &mut T,
        recipient: u8,
        payload: &[u8],
    ) -> Result<(), FramerError<C::Error>>
    where
        C: CanBus,
        T: BusTimer,
    {
        if self.send_payload(can_bus, recipient, payload).await? {
            return Ok(());
        }

        let addressing = self.config.addressing;
        let node_id = self.config.node_id;
        loop {
            let flow = receive_matching(can_bus, timer, self.config.flow_timeout_ms, |frame| {
                flow_control_from(addressing, node_id, recipient, frame)
            })
            .await
            .map_err(FramerError::Receive)?;

            let Some((status, block_size, separation_time)) = flow else {
                self.abandon_transmit();
                #[cfg(feature = "defmt")]
                defmt::warn!("No flow control from {:x}", recipient);
                return Err(ModuleError::Timeout {
                    stage: ExchangeStage::FlowControl,
                }
                .into());
            };

            match self
                .handle_flow(can_bus, timer, recipient, status, block_size, separation_time)
                .await?
            {
                FramerEvent::TransmitComplete => return Ok(()),
                _ => continue,
            }
        }
    }

    //==================================================================================Flow control
    async fn handle_flow<C, T>(
        &mut self,
        can_bus: &mut C,
        timer: &mut T,
        sender: u8,
        status: FlowStatus,
        block_size: u8,
        separation_time: u8,
    ) -> Result<FramerEvent, FramerError<C::Error>>
    where
        C: CanBus,
        T: BusTimer,
    {
        let Some(segment) = self.outbound.as_ref() else {
            #[cfg(feature = "defmt")]
            defmt::debug!("Flow control from {:x} without pending segment", sender);
            return Ok(FramerEvent::Ignored);
        };
        if segment.recipient() != sender {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Flow control from {:x}, segment belongs to {:x}",
                sender,
                segment.recipient()
            );
            return Ok(FramerEvent::Ignored);
        }

        match status {
            FlowStatus::Wait => {
                #[cfg(feature = "defmt")]
                defmt::debug!("Peer {:x} asked to wait", sender);
                Ok(FramerEvent::Consumed)
            }
            FlowStatus::Abort => {
                self.outbound = None;
                #[cfg(feature = "defmt")]
                defmt::warn!("Peer {:x} aborted the transfer", sender);
                Err(FramerError::TransferAborted { recipient: sender })
            }
            FlowStatus::Continue => {
                self.release_block(can_bus, timer, block_size, separation_time)
                    .await
            }
        }
    }

    /// Send up to `block_size` consecutive frames (0 = all), `separation_time` apart.
    async fn release_block<C, T>(
        &mut self,
        can_bus: &mut C,
        timer: &mut T,
        block_size: u8,
        separation_time: u8,
    ) -> Result<FramerEvent, FramerError<C::Error>>
    where
        C: CanBus,
        T: BusTimer,
    {
        let gap_ms = separation_time_ms(separation_time);
        let mut budget = if block_size == 0 {
            usize::MAX
        } else {
            block_size as usize
        };
        let mut sent = 0usize;

        while budget > 0 {
            let Some(frame) = self.outbound.as_mut().and_then(TransmitSegment::next_frame) else {
                break;
            };
            if sent > 0 {
                timer.delay_ms(gap_ms).await;
            }
            if let Err(err) = can_bus.send(&frame).await {
                self.outbound = None;
                return Err(FramerError::Send(err));
            }
            sent += 1;
            budget -= 1;
        }

        if self
            .outbound
            .as_ref()
            .map_or(true, TransmitSegment::is_drained)
        {
            self.outbound = None;
            #[cfg(feature = "defmt")]
            defmt::debug!("Segment drained after {} frames", sent);
            return Ok(FramerEvent::TransmitComplete);
        }
        Ok(FramerEvent::Consumed)
    }
}

/// Flow-control parameters of `frame` when it comes from `peer` and targets `node_id`.
fn flow_control_from(
    addressing: TpAddressing,
    node_id: u8,
    peer: u8,
    frame: &CanFrame,
) -> Option<(FlowStatus, u8, u8)> {
    let pdu = TpPdu::parse(addressing, frame).ok()?;
    if pdu.sender != peer || pdu.recipient.is_some_and(|recipient| recipient != node_id) {
        return None;
    }
    match pdu.frame {
        TpFrame::FlowControl {
            status,
            block_size,
            separation_time,
        } => Some((status, block_size, separation_time)),
        _ => None,
    }
}
