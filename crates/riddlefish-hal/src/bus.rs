//! Generic `RegisterBus` trait for byte-addressed register devices.

use riddlefish_types::FishError;

/// A device exposing single-byte registers, such as an I²C slave.
///
/// The puppet controller only ever talks to this trait, so the Linux I²C
/// driver and the simulated firmware are interchangeable.
pub trait RegisterBus: Send {
    /// Read one register.
    ///
    /// # Errors
    ///
    /// Returns [`FishError::HardwareFault`] when the transfer fails.
    fn read_register(&mut self, reg: u8) -> Result<u8, FishError>;

    /// Write one register.
    ///
    /// # Errors
    ///
    /// Returns [`FishError::HardwareFault`] when the transfer fails.
    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), FishError>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn read_register(&mut self, reg: u8) -> Result<u8, FishError> {
        (**self).read_register(reg)
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), FishError> {
        (**self).write_register(reg, value)
    }
}
