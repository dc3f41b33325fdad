//! Minimal abstraction for an asynchronous CAN bus. Allows the library to plug
//! into various implementations (embedded HAL, desktop adapter, in-memory mock).
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::bus_timer::BusTimer;
use futures_util::future::{select, Either};
use futures_util::{pin_mut, Future};

/// Contract to send and receive CAN frames asynchronously.
pub trait CanBus {
    type Error: core::fmt::Debug;
    /// Emit a frame on the bus. Asynchronous to accommodate non-blocking drivers.
    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;
    /// Retrieve the next available frame. Asynchronously waits until data arrives.
    fn recv<'a>(
        &'a mut self,
    ) -> impl core::future::Future<Output = Result<CanFrame, Self::Error>> + 'a;
}

/// Receive frames until `accept` returns `Some`, or until `timeout_ms` elapses.
///
/// The deadline is armed once when the call starts; frames rejected by `accept` are
/// discarded without extending it. Returns `Ok(None)` on timeout.
pub async fn receive_matching<C, T, R, F>(
    can_bus: &mut C,
    timer: &mut T,
    timeout_ms: u32,
    mut accept: F,
) -> Result<Option<R>, C::Error>
where
    C: CanBus,
    T: BusTimer,
    F: FnMut(&CanFrame) -> Option<R>,
{
    let deadline = timer.delay_ms(timeout_ms);
    pin_mut!(deadline);

    loop {
        let frame = {
            let recv = can_bus.recv();
            pin_mut!(recv);
            match select(deadline.as_mut(), recv).await {
                Either::Left(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("No matching frame within {} ms", timeout_ms);
                    return Ok(None);
                }
                Either::Right((result, _)) => result?,
            }
        };

        if let Some(value) = accept(&frame) {
            return Ok(Some(value));
        }
        #[cfg(feature = "defmt")]
        defmt::trace!("Discarding frame {:x}", frame.id.raw());
    }
}
