use crate::astro_math::{Degrees, Hours};
use ascom_alpaca::{ASCOMError, ASCOMErrorCode, ASCOMResult};
use thiserror::Error;

/// Errors surfaced by the hardware drivers and the command queue.
///
/// The numbering feeds the Alpaca driver-error window (0x500..0x5FF) via
/// [`ASCOMErrorCode::new_for_driver`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("invalid device id")]
    InvalidId,
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("invalid data from mount: {0}")]
    InvalidData(String),
    #[error("serial port busy")]
    SerialPortBusy,
    #[error("mount not found")]
    MountNotFound,
    #[error("no response from axis 1")]
    NoResponseAxis1,
    #[error("no response from axis 2")]
    NoResponseAxis2,
    #[error("axis busy")]
    AxisBusy,
    #[error("maximum pitch exceeded")]
    MaxPitch,
    #[error("minimum pitch exceeded")]
    MinPitch,
    #[error("interrupted by user")]
    UserInterrupt,
    #[error("alignment failed")]
    AlignFailed,
    #[error("command not implemented by this mount")]
    Unimplemented,
    #[error("wrong alignment data")]
    WrongAlignmentData,
    #[error("command queue failed")]
    QueueFailed,
    #[error("queue shut down before the command completed")]
    QueueShutdown,
    #[error("too many retries")]
    TooManyRetries,
    #[error("serial failure: {0}")]
    SerialFailed(String),
}

impl DriverError {
    fn driver_code(&self) -> u16 {
        match self {
            Self::InvalidId => 1,
            Self::AlreadyConnected => 2,
            Self::NotConnected => 3,
            Self::InvalidData(_) => 4,
            Self::SerialPortBusy => 5,
            Self::MountNotFound => 6,
            Self::NoResponseAxis1 => 7,
            Self::NoResponseAxis2 => 8,
            Self::AxisBusy => 9,
            Self::MaxPitch => 10,
            Self::MinPitch => 11,
            Self::UserInterrupt => 12,
            Self::AlignFailed => 13,
            Self::Unimplemented => 14,
            Self::WrongAlignmentData => 15,
            Self::QueueFailed => 16,
            Self::QueueShutdown => 17,
            Self::TooManyRetries => 18,
            Self::SerialFailed(_) => 19,
        }
    }

    /// True for failures that require a Stop/Start cycle to recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SerialPortBusy
                | Self::MountNotFound
                | Self::NoResponseAxis1
                | Self::NoResponseAxis2
                | Self::TooManyRetries
                | Self::SerialFailed(_)
        )
    }
}

impl From<DriverError> for ASCOMError {
    fn from(e: DriverError) -> Self {
        ASCOMError::new(ASCOMErrorCode::new_for_driver(e.driver_code()), e)
    }
}

pub fn check_dec(dec: Degrees) -> ASCOMResult<()> {
    if (-90. ..=90.).contains(&dec) {
        Ok(())
    } else {
        Err(ASCOMError::invalid_value(format_args!(
            "Declination of {} is not valid",
            dec
        )))
    }
}

pub fn check_ra(ra: Hours) -> ASCOMResult<()> {
    if (0. ..24.).contains(&ra) {
        Ok(())
    } else {
        Err(ASCOMError::invalid_value(format_args!(
            "Right Ascension of {} is not valid",
            ra
        )))
    }
}

pub fn check_alt(alt: Degrees) -> ASCOMResult<()> {
    if (-90. ..=90.).contains(&alt) {
        Ok(())
    } else {
        Err(ASCOMError::invalid_value(format_args!(
            "Altitude of {} is not valid",
            alt
        )))
    }
}

pub fn check_az(az: Degrees) -> ASCOMResult<()> {
    if (0. ..360.).contains(&az) {
        Ok(())
    } else {
        Err(ASCOMError::invalid_value(format_args!(
            "Azimuth {} is not valid",
            az
        )))
    }
}
