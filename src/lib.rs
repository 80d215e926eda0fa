pub mod bus;
pub mod error;
pub mod mode;

use crc::{Algorithm, Crc};
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;
use error::{AHTError, Result};
use log::{debug, trace, warn};
use crate::mode::Blocking;

pub mod prelude {
    pub use super::{
        bus::I2cInterrupt, decode, mode::Aht20Measure, mode::Aht20Reader, mode::Blocking,
        mode::Split, mode::WaitPolicy, RawSample, Reading, SensorStatus, AHT20,
    };
}

/// 8-bit write form of the sensor address, as sent on the wire
pub const SENSOR_WRITE_ADDRESS: u8 = 0x70;
/// 7-bit address the sensor answers at
pub const SENSOR_ADDRESS: u8 = SENSOR_WRITE_ADDRESS >> 1;

pub(crate) const CALIBRATE_CMD: [u8; 3] = [0xBE, 0x08, 0x00];
pub(crate) const MEASURE_CMD: [u8; 3] = [0xAC, 0x33, 0x00];
pub(crate) const SOFT_RESET_CMD: u8 = 0xBA;

/// Time the sensor needs after power-up before it answers
pub const BOOT_DELAY_MS: u32 = 40;
/// Conversion time between a trigger and a valid sample
pub const CONVERSION_DELAY_MS: u32 = 75;
pub const SOFT_RESET_DELAY_MS: u32 = 20;

const STATUS_BUSY: u8 = 0x80;
const STATUS_CALIBRATED: u8 = 0x08;

const CRC_ALGORITHM: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x31,
    init: 0xFF,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x00,
    residue: 0x00,
};

// 2**20
const CONVERSION_DENOM: f32 = 1048576f32;

/// Status byte followed by the packed humidity and temperature fields
pub type RawSample = [u8; 6];

/// The temperature and humidity sensor
#[derive(Copy, Clone, Debug)]
pub struct AHT20<Mode, I2C, D> {
    mode: Mode,
    i2c: I2C,
    delay: D,
    address: u8,
}

/// Represents the reading gotten from the sensor
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent relative humidity
    pub humidity: f32,
}

impl Reading {
    /// Overwrites the reading with the decoded sample, leaving it untouched
    /// when the sensor reported busy. Returns whether an update happened.
    pub fn update(&mut self, sample: &RawSample) -> bool {
        match decode(sample) {
            Some(reading) => {
                *self = reading;
                true
            }
            None => false,
        }
    }
}

/// The sensor's status byte
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorStatus(pub u8);

impl SensorStatus {
    /// A conversion is in progress, data bytes are not valid yet
    pub fn is_busy(self) -> bool {
        self.0 & STATUS_BUSY != 0
    }

    pub fn is_ready(self) -> bool {
        !self.is_busy()
    }

    /// Factory calibration has been loaded, otherwise `init` must send the calibration command
    pub fn is_calibrated(self) -> bool {
        self.0 & STATUS_CALIBRATED != 0
    }
}

/// Unpacks the two 20 bit fields, ex [0x00, 0x80, 0x00, 0x08, 0x00, 0x00] is 50 %RH and 50 °C.
///
/// Returns `None` while the busy bit is set.
pub fn decode(sample: &RawSample) -> Option<Reading> {
    if SensorStatus(sample[0]).is_busy() {
        return None;
    }

    let raw_humidity =
        ((sample[1] as u32) << 12) | ((sample[2] as u32) << 4) | ((sample[3] as u32) >> 4);
    let raw_temp =
        (((sample[3] & 0x0F) as u32) << 16) | ((sample[4] as u32) << 8) | sample[5] as u32;

    let humidity = raw_humidity as f32 * 100f32 / CONVERSION_DENOM;
    let temperature = raw_temp as f32 * 200f32 / CONVERSION_DENOM - 50f32;

    Some(Reading {
        temperature,
        humidity,
    })
}

fn verify_data(sample: &RawSample, checksum: u8) -> Result<()> {
    let crc = Crc::<u8>::new(&CRC_ALGORITHM);
    let calculated = crc.checksum(sample);
    if calculated != checksum {
        warn!("sample {:02x?} failed crc, got {:#x}", sample, calculated);
        return Err(AHTError::InvalidChecksumError {
            status: sample[0],
            expected_checksum: checksum,
            calculated_checksum: calculated,
        });
    }
    Ok(())
}

#[allow(dead_code)]
impl<I2C, D> AHT20<Blocking, I2C, D>
    where
        I2C: i2c::Read + i2c::Write,
        D: DelayMs<u32>,
{
    /// Create a new sensor in blocking mode, `init` must be called before the first reading
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            mode: Blocking::new(),
            i2c,
            delay,
            address: SENSOR_ADDRESS,
        }
    }
}

impl<Mode, I2C, D> AHT20<Mode, I2C, D> {
    /// Changes the AHT20 mode
    pub fn with_mode<NewMode>(self, mode: NewMode) -> AHT20<NewMode, I2C, D> {
        AHT20 {
            mode,
            i2c: self.i2c,
            delay: self.delay,
            address: self.address,
        }
    }

    /// Change the sensor's I2C address
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Gives back the bus and delay
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<Mode, I2C, D> AHT20<Mode, I2C, D>
    where
        I2C: i2c::Read + i2c::Write,
        D: DelayMs<u32>,
{
    /// Waits out the boot time then makes sure the sensor is calibrated,
    /// sending the calibration command only when the status says it isn't
    pub fn init(&mut self) -> Result<()> {
        self.delay.delay_ms(BOOT_DELAY_MS);

        let status = self.status()?;
        if status.is_calibrated() {
            debug!("aht20 at {:#x} already calibrated", self.address);
            return Ok(());
        }

        debug!("aht20 at {:#x} not calibrated, status {:#x}", self.address, status.0);
        self.i2c_write(&CALIBRATE_CMD)
    }

    /// Reads a single status byte
    pub fn status(&mut self) -> Result<SensorStatus> {
        let mut buffer = [0u8; 1];
        self.i2c_read(&mut buffer)?;
        Ok(SensorStatus(buffer[0]))
    }

    /// Restarts the sensor without power cycling it
    pub fn soft_reset(&mut self) -> Result<()> {
        debug!("aht20 at {:#x} soft reset", self.address);
        self.i2c_write(&[SOFT_RESET_CMD])?;
        self.delay.delay_ms(SOFT_RESET_DELAY_MS);
        Ok(())
    }

    fn i2c_write(&mut self, bytes: &[u8]) -> Result<()> {
        match self.i2c.write(self.address, bytes) {
            Ok(res) => Ok(res),
            Err(_) => Err(AHTError::WriteI2CError),
        }
    }

    fn i2c_read(&mut self, buffer: &mut [u8]) -> Result<()> {
        match self.i2c.read(self.address, buffer) {
            Ok(res) => Ok(res),
            Err(_) => Err(AHTError::ReadI2CError),
        }
    }

    /// Blocking read of a full sample, optionally followed by its crc byte
    fn read_sample(&mut self, checked: bool) -> Result<RawSample> {
        let mut sample: RawSample = [0u8; 6];
        if checked {
            let mut buffer = [0u8; 7];
            self.i2c_read(&mut buffer)?;
            sample.copy_from_slice(&buffer[..6]);
            verify_data(&sample, buffer[6])?;
        } else {
            self.i2c_read(&mut sample)?;
        }
        trace!("aht20 sample {:02x?}", sample);
        Ok(sample)
    }
}
