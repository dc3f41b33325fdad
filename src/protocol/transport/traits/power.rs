//! Digital power lines some adapters expose to energize the device under test.
//!
//! Opaque side channel: nothing in the protocol layers calls it. Test drivers
//! switch the module on (`main` = T30, `accessory` = T15) before a scripted exchange.

/// Contract to drive the adapter's power outputs.
pub trait PowerControl {
    type Error: core::fmt::Debug;
    /// Set both power lines at once.
    fn set_power<'a>(
        &'a mut self,
        main: bool,
        accessory: bool,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + 'a;
}
