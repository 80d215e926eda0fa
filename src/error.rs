use thiserror::Error;

pub type Result<T> = core::result::Result<T, AHTError>;
#[derive(Error, Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub enum AHTError {
    #[error("Read I2C Error")]
    ReadI2CError,
    #[error("Write I2C Error")]
    WriteI2CError,
    #[error(
        "Sample bytes [{status:#x}..] expected checksum {expected_checksum:#x} \
         but got {calculated_checksum:#x}"
    )]
    InvalidChecksumError {
        status: u8,
        expected_checksum: u8,
        calculated_checksum: u8,
    },
    #[error("Sensor still busy after {retries} status retries")]
    ReadingTimeoutError { retries: u8 },
}
