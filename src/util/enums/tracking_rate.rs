use crate::astro_math::Degrees;
use ascom_alpaca::api::telescope::DriveRate;

/// The sidereal rate, arcseconds per SI second.
pub const SIDEREAL_RATE_ARCSEC: f64 = 15.041_067_178_669_1;

pub trait TrackingRateExt {
    fn arcsec_per_sec(&self) -> f64;
    fn deg_per_sec(&self) -> Degrees;
    fn all() -> Vec<DriveRate>;
}

impl TrackingRateExt for DriveRate {
    fn arcsec_per_sec(&self) -> f64 {
        match self {
            DriveRate::Sidereal => SIDEREAL_RATE_ARCSEC,
            DriveRate::Lunar => 14.685,
            DriveRate::Solar => 15.0,
            DriveRate::King => 15.0369,
        }
    }

    fn deg_per_sec(&self) -> Degrees {
        self.arcsec_per_sec() / 3600.
    }

    fn all() -> Vec<DriveRate> {
        vec![
            DriveRate::Sidereal,
            DriveRate::Lunar,
            DriveRate::Solar,
            DriveRate::King,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidereal_rate_in_degrees() {
        assert!((DriveRate::Sidereal.deg_per_sec() - 0.004178074).abs() < 1e-8);
    }
}
