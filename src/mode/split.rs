use log::trace;
use crate::bus::I2cInterrupt;
use crate::mode::Aht20Measure;
use crate::{decode, RawSample, Reading, AHT20, MEASURE_CMD};
use crate::error::{AHTError, Result};

/// Trigger and read as separate non-blocking phases, driven by the bus's
/// completion notifications.
///
/// The caller sequences the phases: `start_measurement`, wait for the write to
/// complete and the conversion time to pass, `request_read`, wait for the read
/// to complete, `complete_read`, then `decode`. Only one transfer may be in
/// flight and nothing here checks that the previous phase finished.
#[derive(Default, Copy, Clone, Debug)]
pub struct Split {
    sample: Option<RawSample>,
}

impl Split {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I2C, D> AHT20<Split, I2C, D>
    where
        I2C: I2cInterrupt,
{
    /// Queues the measurement command and returns immediately
    pub fn start_measurement(&mut self) -> Result<()> {
        match self.i2c.start_write(self.address, &MEASURE_CMD) {
            Ok(res) => Ok(res),
            Err(_) => Err(AHTError::WriteI2CError),
        }
    }

    /// Queues a read of a full sample.
    ///
    /// The measurement write must have completed and the conversion time
    /// must have passed, this isn't checked.
    pub fn request_read(&mut self) -> Result<()> {
        match self.i2c.start_read(self.address, core::mem::size_of::<RawSample>()) {
            Ok(res) => Ok(res),
            Err(_) => Err(AHTError::ReadI2CError),
        }
    }

    /// Takes the bytes of a finished read into the owned sample.
    ///
    /// Call after the bus reported completion. The sample is only replaced
    /// when the transfer succeeded.
    pub fn complete_read(&mut self) -> nb::Result<(), AHTError> {
        let mut sample: RawSample = [0u8; 6];
        match self.i2c.finish_read(&mut sample) {
            Ok(()) => {}
            Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(_)) => return Err(nb::Error::Other(AHTError::ReadI2CError)),
        }
        trace!("aht20 sample {:02x?}", sample);
        self.mode.sample = Some(sample);
        Ok(())
    }

    /// Last completed sample, `None` until a read has completed
    pub fn sample(&self) -> Option<&RawSample> {
        self.mode.sample.as_ref()
    }

    /// `None` until a read has completed or while the last sample reports busy
    pub fn decode(&self) -> Option<Reading> {
        self.mode.sample.as_ref().and_then(decode)
    }
}

impl<I2C, D> Aht20Measure for AHT20<Split, I2C, D>
    where
        I2C: I2cInterrupt,
{
    fn measure(&mut self) -> Result<()> {
        self.start_measurement()
    }
}
