//! Emulator service: owns the bus and keeps an [`Emulator`] fed with every frame.
//!
//! Optionally it offers:
//!
//! * a transmission handle (`EmulatorHandle`) so periodic broadcasters can queue frames
//!   without touching the bus themselves;
//! * a frame receiver (`EmulatorFrames`) delivering the frames the emulator ignored.
//!
//! The runner is the only user of the bus: queued frames go out between two received
//! frames, never in the middle of an emulator reply. Channels are provided by the
//! caller, pre-allocated; the library performs no allocation.
use core::fmt::Debug;

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};
use futures_util::{future::select, future::Either, pin_mut};

use super::{Emulator, FrameDisposition};
use crate::error::{EmulatorRunError, MessageError};
use crate::infra::codec::traits::FrameRecord;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::bus_timer::BusTimer;
use crate::protocol::transport::traits::can_bus::CanBus;

/// Commands queued by producer tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    SendFrame(CanFrame),
}

/// Channel carrying [`ServiceCommand`]s to the runner.
pub type CommandChannel<const CAP: usize> = Channel<CriticalSectionRawMutex, ServiceCommand, CAP>;

/// Channel carrying frames the emulator ignored.
pub type FrameChannel<const CAP: usize> = Channel<CriticalSectionRawMutex, CanFrame, CAP>;

/// Service assembling the runner components.
pub struct EmulatorService<'a, E, C, T, const CMD_CAP: usize, const FRAME_CAP: usize>
where
    E: Emulator,
    C: CanBus,
    T: BusTimer,
{
    emulator: E,
    can_bus: C,
    timer: T,
    command_channel: Option<&'a CommandChannel<CMD_CAP>>,
    frame_channel: Option<&'a FrameChannel<FRAME_CAP>>,
}

impl<'a, E, C, T, const CMD_CAP: usize, const FRAME_CAP: usize>
    EmulatorService<'a, E, C, T, CMD_CAP, FRAME_CAP>
where
    E: Emulator,
    C: CanBus,
    T: BusTimer,
{
    pub fn new(
        emulator: E,
        can_bus: C,
        timer: T,
        command_channel: Option<&'a CommandChannel<CMD_CAP>>,
        frame_channel: Option<&'a FrameChannel<FRAME_CAP>>,
    ) -> Self {
        Self {
            emulator,
            can_bus,
            timer,
            command_channel,
            frame_channel,
        }
    }

    /// Split into handle/receiver/runner components.
    pub fn into_parts(self) -> EmulatorServiceParts<'a, E, C, T, CMD_CAP, FRAME_CAP> {
        let handle = self.command_channel.map(|channel| EmulatorHandle {
            sender: channel.sender(),
        });
        let frames = self.frame_channel.map(|channel| EmulatorFrames {
            receiver: channel.receiver(),
        });
        EmulatorServiceParts {
            handle,
            frames,
            runner: EmulatorRunner {
                emulator: self.emulator,
                can_bus: self.can_bus,
                timer: self.timer,
                command_channel: self.command_channel,
                frame_channel: self.frame_channel,
            },
        }
    }
}

/// Bundle returned by [`EmulatorService::into_parts`].
pub struct EmulatorServiceParts<'a, E, C, T, const CMD_CAP: usize, const FRAME_CAP: usize>
where
    E: Emulator,
    C: CanBus,
    T: BusTimer,
{
    pub handle: Option<EmulatorHandle<'a, CMD_CAP>>,
    pub frames: Option<EmulatorFrames<'a, FRAME_CAP>>,
    pub runner: EmulatorRunner<'a, E, C, T, CMD_CAP, FRAME_CAP>,
}

/// Runner that drives the emulator loop.
pub struct EmulatorRunner<'a, E, C, T, const CMD_CAP: usize, const FRAME_CAP: usize>
where
    E: Emulator,
    C: CanBus,
    T: BusTimer,
{
    emulator: E,
    can_bus: C,
    timer: T,
    command_channel: Option<&'a CommandChannel<CMD_CAP>>,
    frame_channel: Option<&'a FrameChannel<FRAME_CAP>>,
}

impl<'a, E, C, T, const CMD_CAP: usize, const FRAME_CAP: usize>
    EmulatorRunner<'a, E, C, T, CMD_CAP, FRAME_CAP>
where
    E: Emulator,
    C: CanBus,
    C::Error: Debug,
    T: BusTimer,
{
    /// Borrow the emulator, e.g. to inspect its state between runs.
    pub fn emulator(&self) -> &E {
        &self.emulator
    }

    /// Run until the bus fails.
    pub async fn drive(mut self) -> Result<(), EmulatorRunError<C::Error>> {
        let command_channel = self.command_channel;

        loop {
            let mut command_to_process = None;
            let mut frame_to_handle = None;

            match command_channel {
                Some(cmd_ch) => {
                    let cmd_future = cmd_ch.receive();
                    let recv_future = self.can_bus.recv();
                    pin_mut!(cmd_future);
                    pin_mut!(recv_future);

                    match select(recv_future, cmd_future).await {
                        Either::Left((result, pending_cmd)) => {
                            frame_to_handle = Some(result.map_err(EmulatorRunError::Receive)?);
                            drop(pending_cmd);
                        }
                        Either::Right((command, pending_recv)) => {
                            command_to_process = Some(command);
                            drop(pending_recv);
                        }
                    }
                }
                None => {
                    let frame = self
                        .can_bus
                        .recv()
                        .await
                        .map_err(EmulatorRunError::Receive)?;
                    frame_to_handle = Some(frame);
                }
            }

            if let Some(frame) = frame_to_handle {
                self.handle_frame(frame).await?;
            }

            if let Some(command) = command_to_process {
                self.handle_command(command).await?;
            }
        }
    }

    async fn handle_frame(&mut self, frame: CanFrame) -> Result<(), EmulatorRunError<C::Error>> {
        let disposition = self
            .emulator
            .on_frame(&mut self.can_bus, &mut self.timer, &frame)
            .await?;
        if disposition == FrameDisposition::Ignored {
            if let Some(frame_ch) = self.frame_channel {
                frame_ch.send(frame).await;
            }
        }
        Ok(())
    }

    async fn handle_command(
        &mut self,
        command: ServiceCommand,
    ) -> Result<(), EmulatorRunError<C::Error>> {
        match command {
            ServiceCommand::SendFrame(frame) => self
                .can_bus
                .send(&frame)
                .await
                .map_err(EmulatorRunError::Send),
        }
    }
}

/// Transmission handle (optional).
pub struct EmulatorHandle<'a, const CMD_CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, ServiceCommand, CMD_CAP>,
}

impl<'a, const CMD_CAP: usize> EmulatorHandle<'a, CMD_CAP> {
    pub async fn send_frame(&self, frame: &CanFrame) {
        self.sender
            .send(ServiceCommand::SendFrame(frame.clone()))
            .await;
    }

    /// Encode `record` and queue it.
    pub async fn send_record<R: FrameRecord>(&self, record: &R) -> Result<(), MessageError> {
        let frame = record.encode()?;
        self.sender.send(ServiceCommand::SendFrame(frame)).await;
        Ok(())
    }
}

/// Optional receiver returning the frames the emulator did not handle.
pub struct EmulatorFrames<'a, const FRAME_CAP: usize> {
    receiver: Receiver<'a, CriticalSectionRawMutex, CanFrame, FRAME_CAP>,
}

impl<'a, const FRAME_CAP: usize> EmulatorFrames<'a, FRAME_CAP> {
    pub async fn recv(&mut self) -> CanFrame {
        self.receiver.receive().await
    }
}
