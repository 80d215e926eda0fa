/// Non-blocking, interrupt driven I2C master transfers.
///
/// `start_*` only queue the transfer and return. Completion is reported
/// out-of-band by the platform (an interrupt, a callback, a flag), the driver
/// never waits for it. Only one transfer may be in flight at a time.
pub trait I2cInterrupt {
    type Error;

    /// Begins writing `bytes` to `address`
    fn start_write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Begins reading `len` bytes from `address`
    fn start_read(&mut self, address: u8, len: usize) -> Result<(), Self::Error>;

    /// Hands over the bytes of the last completed read.
    ///
    /// Returns `WouldBlock` while the read started by `start_read` is still running.
    fn finish_read(&mut self, buffer: &mut [u8]) -> nb::Result<(), Self::Error>;
}
