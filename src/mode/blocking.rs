use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;
use log::warn;
use crate::mode::{Aht20Measure, Aht20Reader};
use crate::{decode, RawSample, Reading, AHT20, CONVERSION_DELAY_MS, MEASURE_CMD};
use crate::error::{AHTError, Result};

/// How to wait for a conversion to finish before reading the sample
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitPolicy {
    /// Sleep for a fixed time and read regardless of the busy bit
    Fixed { ms: u32 },
    /// Sleep `initial_ms` and read the status byte. While it reports busy,
    /// sleep `retry_ms` and poll again, at most `max_retries` more times
    PollStatus {
        initial_ms: u32,
        retry_ms: u32,
        max_retries: u8,
    },
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy::Fixed { ms: CONVERSION_DELAY_MS }
    }
}

/// A simple reading that blocks until the measurement is obtained
#[derive(Default, Copy, Clone, Debug)]
pub struct Blocking {
    wait: WaitPolicy,
    crc: bool,
}

impl Blocking {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }
    /// Sets how the conversion time is waited out
    pub fn set_wait(&mut self, wait: WaitPolicy) {self.wait=wait}
    /// Sets how the conversion time is waited out
    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.set_wait(wait);
        self
    }
    /// Also read the trailing crc byte and reject samples that don't match it
    pub fn set_crc(&mut self, crc: bool) {self.crc=crc}
    /// Also read the trailing crc byte and reject samples that don't match it
    pub fn with_crc(mut self, crc: bool) -> Self {
        self.set_crc(crc);
        self
    }
    pub fn wait(&self) -> WaitPolicy {
        self.wait
    }
}

impl<I2C, D> AHT20<Blocking, I2C, D>
    where
        I2C: i2c::Read + i2c::Write,
        D: DelayMs<u32>,
{
    /// Triggers a measurement, waits for the conversion and reads the raw sample
    pub fn read_raw(&mut self) -> Result<RawSample> {
        self.measure()?;
        self.wait_for_conversion()?;
        self.read_sample(self.mode.crc)
    }

    fn wait_for_conversion(&mut self) -> Result<()> {
        match self.mode.wait {
            WaitPolicy::Fixed { ms } => {
                self.delay.delay_ms(ms);
                Ok(())
            }
            WaitPolicy::PollStatus { initial_ms, retry_ms, max_retries } => {
                self.delay.delay_ms(initial_ms);
                for attempt in 0..=max_retries {
                    if self.status()?.is_ready() {
                        return Ok(());
                    }
                    if attempt < max_retries {
                        self.delay.delay_ms(retry_ms);
                    }
                }
                warn!("aht20 at {:#x} still busy after {} retries", self.address, max_retries);
                Err(AHTError::ReadingTimeoutError { retries: max_retries })
            }
        }
    }
}

impl<I2C, D> Aht20Measure for AHT20<Blocking, I2C, D>
    where
        I2C: i2c::Read + i2c::Write,
        D: DelayMs<u32>,
{
    /// Sends the measurement command, blocking until the bus is done with it
    fn measure(&mut self) -> Result<()> {
        self.i2c_write(&MEASURE_CMD)
    }
}

impl<I2C, D> Aht20Reader for AHT20<Blocking, I2C, D>
    where
        I2C: i2c::Read + i2c::Write,
        D: DelayMs<u32>,
{
    fn read(&mut self) -> Result<Option<Reading>> {
        let sample = self.read_raw()?;
        Ok(decode(&sample))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{pack, RecordingDelay};
    use crate::{CRC_ALGORITHM, SENSOR_ADDRESS};
    use crc::Crc;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction};
    use embedded_hal_mock::MockError;
    use rstest::rstest;
    use std::io::ErrorKind;

    const SAMPLE: RawSample = [0x1C, 0x65, 0xB4, 0x25, 0xCD, 0x26];

    fn trigger() -> Transaction {
        Transaction::write(SENSOR_ADDRESS, vec![0xAC, 0x33, 0x00])
    }

    #[test]
    fn fixed_delay_read() {
        let expectations = [trigger(), Transaction::read(SENSOR_ADDRESS, SAMPLE.to_vec())];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay);
        let reading = sensor.read().unwrap();

        i2c.done();
        assert_eq!(delay.calls, vec![75]);
        assert_eq!(reading, decode(&SAMPLE));
        let reading = reading.unwrap();
        assert!((reading.humidity - 39.73).abs() < 0.01);
        assert!((reading.temperature - 22.52).abs() < 0.01);
    }

    #[test]
    fn read_raw_returns_sample_untouched() {
        let busy = pack(0x9C, 0x12345, 0x54321);
        let expectations = [trigger(), Transaction::read(SENSOR_ADDRESS, busy.to_vec())];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay);
        assert_eq!(sensor.read_raw().unwrap(), busy);

        i2c.done();
    }

    #[test]
    fn busy_sample_reads_as_none() {
        let expectations = [
            trigger(),
            Transaction::read(SENSOR_ADDRESS, pack(0x98, 0x12345, 0x54321).to_vec()),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay);
        assert_eq!(sensor.read().unwrap(), None);

        i2c.done();
    }

    #[test]
    fn custom_fixed_delay() {
        let expectations = [trigger(), Transaction::read(SENSOR_ADDRESS, SAMPLE.to_vec())];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay)
            .with_mode(Blocking::new().with_wait(WaitPolicy::Fixed { ms: 80 }));
        assert!(sensor.read().unwrap().is_some());

        i2c.done();
        assert_eq!(delay.calls, vec![80]);
    }

    #[test]
    fn poll_status_until_ready() {
        let expectations = [
            trigger(),
            Transaction::read(SENSOR_ADDRESS, vec![0x98]),
            Transaction::read(SENSOR_ADDRESS, vec![0x98]),
            Transaction::read(SENSOR_ADDRESS, vec![0x18]),
            Transaction::read(SENSOR_ADDRESS, SAMPLE.to_vec()),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let wait = WaitPolicy::PollStatus { initial_ms: 40, retry_ms: 10, max_retries: 5 };
        let mut sensor = AHT20::new(i2c.clone(), &mut delay)
            .with_mode(Blocking::new().with_wait(wait));
        assert_eq!(sensor.read().unwrap(), decode(&SAMPLE));

        i2c.done();
        assert_eq!(delay.calls, vec![40, 10, 10]);
    }

    #[test]
    fn poll_status_gives_up() {
        let expectations = [
            trigger(),
            Transaction::read(SENSOR_ADDRESS, vec![0x98]),
            Transaction::read(SENSOR_ADDRESS, vec![0x98]),
            Transaction::read(SENSOR_ADDRESS, vec![0x98]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let wait = WaitPolicy::PollStatus { initial_ms: 40, retry_ms: 10, max_retries: 2 };
        let mut sensor = AHT20::new(i2c.clone(), &mut delay)
            .with_mode(Blocking::new().with_wait(wait));
        assert_eq!(
            sensor.read().unwrap_err(),
            AHTError::ReadingTimeoutError { retries: 2 }
        );

        i2c.done();
        assert_eq!(delay.calls, vec![40, 10, 10]);
    }

    #[rstest]
    #[case(0x18, true)]
    #[case(0x98, false)]
    fn poll_status_without_retries(#[case] status: u8, #[case] ready: bool) {
        let mut expectations = vec![trigger(), Transaction::read(SENSOR_ADDRESS, vec![status])];
        if ready {
            expectations.push(Transaction::read(SENSOR_ADDRESS, SAMPLE.to_vec()));
        }
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let wait = WaitPolicy::PollStatus { initial_ms: 80, retry_ms: 10, max_retries: 0 };
        let mut sensor = AHT20::new(i2c.clone(), &mut delay)
            .with_mode(Blocking::new().with_wait(wait));
        if ready {
            assert_eq!(sensor.read().unwrap(), decode(&SAMPLE));
        } else {
            assert_eq!(
                sensor.read().unwrap_err(),
                AHTError::ReadingTimeoutError { retries: 0 }
            );
        }

        i2c.done();
        assert_eq!(delay.calls, vec![80]);
    }

    #[test]
    fn crc_checked_read() {
        let crc = Crc::<u8>::new(&CRC_ALGORITHM).checksum(&SAMPLE);
        let mut with_crc = SAMPLE.to_vec();
        with_crc.push(crc);

        let expectations = [trigger(), Transaction::read(SENSOR_ADDRESS, with_crc)];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay)
            .with_mode(Blocking::new().with_crc(true));
        assert_eq!(sensor.read_raw().unwrap(), SAMPLE);

        i2c.done();
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let crc = Crc::<u8>::new(&CRC_ALGORITHM).checksum(&SAMPLE);
        let mut with_crc = SAMPLE.to_vec();
        with_crc.push(crc ^ 0xFF);

        let expectations = [trigger(), Transaction::read(SENSOR_ADDRESS, with_crc)];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay)
            .with_mode(Blocking::new().with_crc(true));
        assert_eq!(
            sensor.read().unwrap_err(),
            AHTError::InvalidChecksumError {
                status: 0x1C,
                expected_checksum: crc ^ 0xFF,
                calculated_checksum: crc,
            }
        );

        i2c.done();
    }

    #[test]
    fn trigger_failure_skips_wait() {
        let expectations = [trigger().with_error(MockError::Io(ErrorKind::Other))];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay);
        assert_eq!(sensor.read().unwrap_err(), AHTError::WriteI2CError);

        i2c.done();
        assert!(delay.calls.is_empty());
    }

    #[test]
    fn read_failure_is_surfaced() {
        let expectations = [
            trigger(),
            Transaction::read(SENSOR_ADDRESS, SAMPLE.to_vec())
                .with_error(MockError::Io(ErrorKind::Other)),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();

        let mut sensor = AHT20::new(i2c.clone(), &mut delay);
        assert_eq!(sensor.read_raw().unwrap_err(), AHTError::ReadI2CError);

        i2c.done();
    }
}
