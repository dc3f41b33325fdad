//! `CanBus` extension providing a high-level API to send typed records: it encodes
//! the record through its schema and transmits the resulting frame.
use crate::{
    error::SendFrameError, infra::codec::traits::FrameRecord,
    protocol::transport::traits::can_bus::CanBus,
};

/// Trait extending `CanBus` with ergonomic record-sending helpers.
pub trait RecordSender: CanBus
where
    <Self as CanBus>::Error: core::fmt::Debug,
{
    /// Encode and send a record over the CAN bus.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - [`SendFrameError::Build`] when the record does not fit its schema
    /// - [`SendFrameError::Send`] when bus transmission fails
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use ecu_emu::protocol::{
    ///     messages::Lights,
    ///     transport::traits::record_sender::RecordSender,
    /// };
    ///
    /// let lights = Lights::new(true, false, false);
    /// can_bus.send_record(&lights).await?;
    /// ```
    fn send_record<'a, R: FrameRecord>(
        &'a mut self,
        record: &'a R,
    ) -> impl core::future::Future<Output = Result<(), SendFrameError<Self::Error>>> + 'a;
}

impl<C: CanBus> RecordSender for C
where
    C::Error: core::fmt::Debug,
{
    fn send_record<'a, R: FrameRecord>(
        &'a mut self,
        record: &'a R,
    ) -> impl core::future::Future<Output = Result<(), SendFrameError<Self::Error>>> + 'a {
        async move {
            let frame = record.encode().map_err(SendFrameError::Build)?;
            self.send(&frame).await.map_err(SendFrameError::Send)
        }
    }
}
