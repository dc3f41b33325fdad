//! Tester side of a diagnostic request/response cycle: echo verification, residual
//! accounting, continuation handshakes and per-step deadlines.
use embassy_time::Duration;

use super::{
    continuation_frame, continuation_request, continuation_sequence, initial_frame,
    short_request, DiagFrame, DiagKind, ACK_BIT, CONTINUATION_CHUNK, DIAG_CONTINUATION_TIMEOUT_MS,
    DIAG_REPLY_TIMEOUT_MS, INITIAL_CHUNK, MAX_DIAG_PAYLOAD, TESTER_ID,
};
use crate::error::{ExchangeStage, MessageError, ModuleError, SessionError};
use crate::infra::codec::traits::FrameRecord;
use crate::protocol::transport::traits::{
    bus_timer::BusTimer,
    can_bus::{receive_matching, CanBus},
};
use crate::protocol::transport::TP_SEPARATION_TIME_MS;

//==================================================================================ECHO
/// Check that `reply` starts with `command`, first byte carrying the acknowledgement bit.
///
/// # Example
/// ```
/// use ecu_emu::error::MessageError;
/// use ecu_emu::protocol::diagnostic::exchange::verify_echo;
///
/// assert!(verify_echo(&[0x22, 0x10, 0x10], &[0x62, 0x10, 0x10]).is_ok());
/// assert_eq!(
///     verify_echo(&[0x22, 0x10, 0x10], &[0x62, 0x10, 0x11]),
///     Err(MessageError::CommandEchoMismatch { index: 2, expected: 0x10, actual: 0x11 })
/// );
/// ```
pub fn verify_echo(command: &[u8], reply: &[u8]) -> Result<(), MessageError> {
    if reply.len() < command.len() {
        return Err(MessageError::LengthTooShort {
            declared: reply.len(),
            command: command.len(),
        });
    }
    verify_echo_prefix(command, reply)
}

/// Echo check over the bytes both sides already have.
fn verify_echo_prefix(command: &[u8], reply: &[u8]) -> Result<(), MessageError> {
    for (index, (&sent, &echoed)) in command.iter().zip(reply.iter()).enumerate() {
        let expected = if index == 0 { sent | ACK_BIT } else { sent };
        if echoed != expected {
            return Err(MessageError::CommandEchoMismatch {
                index,
                expected,
                actual: echoed,
            });
        }
    }
    Ok(())
}

//==================================================================================EXCHANGE
/// Bookkeeping of one request/response cycle.
#[derive(Debug, Clone)]
pub struct DiagnosticExchange {
    respondent: u8,
    command: [u8; MAX_DIAG_PAYLOAD],
    command_len: usize,
    reply: [u8; MAX_DIAG_PAYLOAD],
    received: usize,
    declared_len: usize,
    continuations: usize,
    started: bool,
}

impl DiagnosticExchange {
    /// Track the reply of `respondent` to `command`. Commands beyond 255 bytes are cut.
    pub fn new(respondent: u8, command: &[u8]) -> Self {
        let command_len = command.len().min(MAX_DIAG_PAYLOAD);
        let mut buffer = [0u8; MAX_DIAG_PAYLOAD];
        buffer[..command_len].copy_from_slice(&command[..command_len]);
        Self {
            respondent,
            command: buffer,
            command_len,
            reply: [0; MAX_DIAG_PAYLOAD],
            received: 0,
            declared_len: 0,
            continuations: 0,
            started: false,
        }
    }

    pub fn respondent(&self) -> u8 {
        self.respondent
    }

    pub fn command(&self) -> &[u8] {
        &self.command[..self.command_len]
    }

    /// Total reply length announced by the initial frame.
    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    /// Reply bytes still to arrive.
    pub fn residual(&self) -> usize {
        self.declared_len - self.received
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_complete(&self) -> bool {
        self.started && self.residual() == 0
    }

    /// Sequence byte the next continuation must carry.
    pub fn expected_sequence(&self) -> u8 {
        continuation_sequence(self.continuations)
    }

    /// Reply bytes received so far, echo included.
    pub fn reply(&self) -> &[u8] {
        &self.reply[..self.received]
    }

    /// Reply bytes following the command echo.
    pub fn data(&self) -> &[u8] {
        &self.reply[self.command_len.min(self.received)..self.received]
    }

    /// Integrate the initial frame of the reply.
    ///
    /// # Errors
    /// [`MessageError::LengthTooShort`] when the declared length cannot hold the echo,
    /// [`MessageError::CommandEchoMismatch`] when the echoed bytes differ.
    pub fn begin(&mut self, declared_len: usize, chunk: &[u8]) -> Result<(), MessageError> {
        if declared_len < self.command_len {
            return Err(MessageError::LengthTooShort {
                declared: declared_len,
                command: self.command_len,
            });
        }
        self.declared_len = declared_len.min(MAX_DIAG_PAYLOAD);
        self.received = 0;
        self.continuations = 0;
        self.started = true;
        self.append(chunk, INITIAL_CHUNK)
    }

    /// Integrate one continuation frame.
    ///
    /// # Errors
    /// [`MessageError::UnexpectedSequence`] when the frame is out of order. The exchange
    /// cannot resynchronise after that.
    pub fn accept_continuation(&mut self, sequence: u8, chunk: &[u8]) -> Result<(), MessageError> {
        let expected = self.expected_sequence();
        if sequence != expected {
            return Err(MessageError::UnexpectedSequence {
                expected,
                actual: sequence,
            });
        }
        self.continuations += 1;
        self.append(chunk, CONTINUATION_CHUNK)
    }

    fn append(&mut self, chunk: &[u8], capacity: usize) -> Result<(), MessageError> {
        let count = chunk.len().min(capacity).min(self.residual());
        self.reply[self.received..self.received + count].copy_from_slice(&chunk[..count]);
        self.received += count;
        verify_echo_prefix(self.command(), self.reply())
    }
}

//==================================================================================TIMEOUTS
/// Deadlines of the blocking wait steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExchangeTimeouts {
    /// Wait for the initial frame of a reply.
    pub reply: Duration,
    /// Wait for each continuation frame and for the go-ahead of long requests.
    pub continuation: Duration,
}

impl Default for ExchangeTimeouts {
    fn default() -> Self {
        Self {
            reply: Duration::from_millis(DIAG_REPLY_TIMEOUT_MS as u64),
            continuation: Duration::from_millis(DIAG_CONTINUATION_TIMEOUT_MS as u64),
        }
    }
}

impl ExchangeTimeouts {
    pub fn with_reply(mut self, reply: Duration) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_continuation(mut self, continuation: Duration) -> Self {
        self.continuation = continuation;
        self
    }
}

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

//==================================================================================SCRIPT
/// One step of a scripted conversation: a request and the modules expected to answer.
#[derive(Debug, Clone, Copy)]
pub struct ScriptStep<'s> {
    pub recipient: u8,
    pub command: &'s [u8],
    /// Answering modules in reply order; several for a broadcast.
    pub respondents: &'s [u8],
}

//==================================================================================CLIENT
/// Diagnostic tester driving request/response exchanges over a borrowed bus.
pub struct DiagnosticClient<'a, C: CanBus, T: BusTimer> {
    can_bus: &'a mut C,
    timer: &'a mut T,
    tester_id: u8,
    timeouts: ExchangeTimeouts,
}

impl<'a, C: CanBus, T: BusTimer> DiagnosticClient<'a, C, T> {
    pub fn new(can_bus: &'a mut C, timer: &'a mut T) -> Self {
        Self {
            can_bus,
            timer,
            tester_id: TESTER_ID,
            timeouts: ExchangeTimeouts::default(),
        }
    }

    pub fn with_tester_id(mut self, tester_id: u8) -> Self {
        self.tester_id = tester_id;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ExchangeTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn tester_id(&self) -> u8 {
        self.tester_id
    }

    /// Send `command` to `recipient`.
    ///
    /// Commands of up to six bytes go out as one short request. Longer commands send
    /// an initial frame, wait for the recipient's continuation request, then stream
    /// the rest.
    pub async fn send_request(
        &mut self,
        recipient: u8,
        command: &[u8],
    ) -> Result<(), SessionError<C::Error>> {
        if command.is_empty() || command.len() > MAX_DIAG_PAYLOAD {
            return Err(SessionError::PayloadTooLarge { len: command.len() });
        }
        if let Some(frame) = short_request(self.tester_id, recipient, command) {
            return self.can_bus.send(&frame).await.map_err(SessionError::Send);
        }

        let first = initial_frame(self.tester_id, recipient, command.len() as u8, command);
        self.can_bus.send(&first).await.map_err(SessionError::Send)?;

        let tester_id = self.tester_id;
        let go_ahead = receive_matching(
            &mut *self.can_bus,
            &mut *self.timer,
            millis(self.timeouts.continuation),
            |frame| match DiagFrame::parse(frame) {
                Ok(DiagFrame {
                    sender,
                    recipient: to,
                    kind: DiagKind::ContinuationRequest,
                }) if to == tester_id && (sender == recipient || is_functional(recipient)) => {
                    Some(())
                }
                _ => None,
            },
        )
        .await
        .map_err(SessionError::Receive)?;
        if go_ahead.is_none() {
            #[cfg(feature = "defmt")]
            defmt::warn!("No continuation request from {:x}", recipient);
            return Err(ModuleError::Timeout {
                stage: ExchangeStage::ContinuationRequest,
            }
            .into());
        }

        for (index, chunk) in command[INITIAL_CHUNK..].chunks(CONTINUATION_CHUNK).enumerate() {
            if index > 0 {
                self.timer.delay_ms(TP_SEPARATION_TIME_MS as u32).await;
            }
            let frame =
                continuation_frame(self.tester_id, recipient, continuation_sequence(index), chunk);
            self.can_bus.send(&frame).await.map_err(SessionError::Send)?;
        }
        Ok(())
    }

    /// Collect the reply of `respondent` to `command`.
    ///
    /// Frames not sent by `respondent` to us are discarded while waiting. When the
    /// initial frame leaves a residual, a continuation request is sent and the
    /// continuations are awaited, each with its own deadline.
    pub async fn receive_reply(
        &mut self,
        respondent: u8,
        command: &[u8],
    ) -> Result<DiagnosticExchange, SessionError<C::Error>> {
        let mut exchange = DiagnosticExchange::new(respondent, command);
        let tester_id = self.tester_id;

        let begun = receive_matching(
            &mut *self.can_bus,
            &mut *self.timer,
            millis(self.timeouts.reply),
            |frame| match DiagFrame::parse(frame) {
                Ok(DiagFrame {
                    sender,
                    recipient,
                    kind: DiagKind::Initial {
                        declared_len,
                        chunk,
                    },
                }) if sender == respondent && recipient == tester_id => {
                    Some(exchange.begin(declared_len, chunk))
                }
                _ => None,
            },
        )
        .await
        .map_err(SessionError::Receive)?;

        match begun {
            Some(result) => result?,
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Timed out waiting for reply from {:x}", respondent);
                return Err(ModuleError::Timeout {
                    stage: ExchangeStage::InitialReply,
                }
                .into());
            }
        }

        if exchange.residual() == 0 {
            return Ok(exchange);
        }

        let request = continuation_request(tester_id, respondent);
        self.can_bus.send(&request).await.map_err(SessionError::Send)?;

        while exchange.residual() > 0 {
            let step = receive_matching(
                &mut *self.can_bus,
                &mut *self.timer,
                millis(self.timeouts.continuation),
                |frame| {
                    let diag = DiagFrame::parse(frame).ok()?;
                    if diag.sender != respondent || diag.recipient != tester_id {
                        return None;
                    }
                    let (sequence, chunk) = diag.as_continuation()?;
                    Some(exchange.accept_continuation(sequence, chunk))
                },
            )
            .await
            .map_err(SessionError::Receive)?;

            match step {
                Some(result) => result?,
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "Timed out waiting for continuation {:x} from {:x}",
                        exchange.expected_sequence(),
                        respondent
                    );
                    return Err(ModuleError::Timeout {
                        stage: ExchangeStage::Continuation,
                    }
                    .into());
                }
            }
        }

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Reply from {:x} complete: {} bytes",
            respondent,
            exchange.declared_len()
        );
        Ok(exchange)
    }

    /// Send `command` to `recipient` and collect its reply.
    pub async fn request(
        &mut self,
        recipient: u8,
        command: &[u8],
    ) -> Result<DiagnosticExchange, SessionError<C::Error>> {
        self.send_request(recipient, command).await?;
        self.receive_reply(recipient, command).await
    }

    /// Wait for the next frame that decodes as `R`; everything else is discarded.
    pub async fn expect_record<R: FrameRecord>(
        &mut self,
        timeout_ms: u32,
    ) -> Result<R, SessionError<C::Error>> {
        let record = receive_matching(&mut *self.can_bus, &mut *self.timer, timeout_ms, |frame| {
            R::decode(frame).ok()
        })
        .await
        .map_err(SessionError::Receive)?;

        record.ok_or_else(|| {
            ModuleError::Timeout {
                stage: ExchangeStage::ExpectedFrame,
            }
            .into()
        })
    }

    /// Run `steps` in order and return the number of replies collected.
    ///
    /// Stops at the first failing step.
    pub async fn run_script(
        &mut self,
        steps: &[ScriptStep<'_>],
    ) -> Result<usize, SessionError<C::Error>> {
        let mut replies = 0;
        for step in steps {
            self.send_request(step.recipient, step.command).await?;
            for &respondent in step.respondents {
                self.receive_reply(respondent, step.command).await?;
                replies += 1;
            }
        }
        #[cfg(feature = "defmt")]
        defmt::info!("Script finished: {} steps, {} replies", steps.len(), replies);
        Ok(replies)
    }
}

fn is_functional(recipient: u8) -> bool {
    recipient == super::BROADCAST_ID
}
