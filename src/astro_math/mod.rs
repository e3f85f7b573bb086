//! Pure coordinate math: time scales, frame conversions and the mapping
//! between sky coordinates and mount axis angles.
//!
//! Everything here is stateless; functions that depend on the site or the
//! mount geometry take a [`CoordContext`].

use ascom_alpaca::api::telescope::AlignmentMode;
use chrono::{Datelike, Timelike};
use polynomials::poly;
use std::f64::consts::{PI, TAU};

use crate::config::PolarMode;
use crate::util::enums::Hemisphere;

pub type Hours = f64;
pub type Degrees = f64;
pub type Radians = f64;

pub fn deg_to_rad(degrees: Degrees) -> Radians {
    PI * degrees / 180.
}

pub fn rad_to_deg(rad: Radians) -> Degrees {
    180. * rad / PI
}

pub fn hours_to_rad(hours: Hours) -> Radians {
    PI * hours / 12.
}

pub fn rad_to_hours(rad: Radians) -> Hours {
    12. * rad / PI
}

pub fn deg_to_hours(deg: Degrees) -> Hours {
    deg / 15.
}

pub fn hours_to_deg(hours: Hours) -> Degrees {
    hours * 15.
}

pub fn modulo(val: f64, base: f64) -> f64 {
    ((val % base) + base) % base
}

/// Wraps an angle to (-180, 180]. `range_180(180) == 180`,
/// `range_180(-180) == 180`.
pub fn range_180(deg: Degrees) -> Degrees {
    let r = modulo(deg, 360.);
    if r > 180. {
        r - 360.
    } else {
        r
    }
}

/// Local hour angle in [-12, 12).
pub fn ra_to_ha(ra: Hours, lst: Hours) -> Hours {
    let ha = modulo(lst - ra, 24.);
    if ha >= 12. {
        ha - 24.
    } else {
        ha
    }
}

/// Motor steps to axis degrees through the driver's step factor.
pub fn steps_to_degrees(steps: f64, factor_step: f64) -> Degrees {
    steps * factor_step
}

pub fn degrees_to_steps(deg: Degrees, factor_step: f64) -> f64 {
    deg / factor_step
}

/// Julian Date of a UTC instant.
/// see https://scienceworld.wolfram.com/astronomy/JulianDate.html
fn julian_date(time: chrono::DateTime<chrono::Utc>) -> f64 {
    let y = time.year() as f64;
    let m = time.month() as f64;
    let d = time.day() as f64;

    let mut jd = 367. * y;
    jd -= f64::floor(7. * (y + f64::floor((m + 9.) / 12.)) / 4.);
    jd -= f64::floor(3. * (f64::floor((y + (m - 9.) / 7.) / 100.) + 1.) / 4.);
    jd += f64::floor(275. * m / 9.);
    jd += d;
    jd += 1_721_028.5;

    let day_fraction = (time.hour() as f64
        + time.minute() as f64 / 60.
        + (time.second() as f64 + time.nanosecond() as f64 * 1e-9) / 3600.)
        / 24.;
    jd + day_fraction
}

// see https://thecynster.home.blog/2019/11/04/calculating-sidereal-time/
pub fn greenwich_sidereal_time(time: chrono::DateTime<chrono::Utc>) -> Hours {
    // Off by the difference in leap seconds from this count at the given date.
    const LEAP_SECOND_TOTAL: f64 = 27.;

    let jd_utc = julian_date(time);

    let du = jd_utc - 2_451_545.0;
    let theta = rad_to_hours(modulo(
        TAU * (0.779_057_273_264_f64 + 1.002_737_811_911_354_5_f64 * du),
        TAU,
    ));

    let gmst_poly = poly![
        0.014506,
        4612.156534,
        1.3915817,
        -0.00000044,
        -0.000029956,
        -0.0000000368,
    ];
    let jd_tt = jd_utc + ((LEAP_SECOND_TOTAL + 32.184) / 3600.) / 24.;
    let t = (jd_tt - 2_451_545.0) / 36_525.;

    let gmstp = deg_to_hours(modulo(gmst_poly.eval(t).unwrap() / 3600., 360.));

    modulo(theta + gmstp, 24.)
}

/// Local sidereal time (hours) for an east-positive longitude in degrees.
pub fn local_sidereal_time(time: chrono::DateTime<chrono::Utc>, longitude: Degrees) -> Hours {
    modulo(greenwich_sidereal_time(time) + deg_to_hours(longitude), 24.)
}

pub fn alt_from_ha_dec(ha: Hours, dec: Degrees, lat: Degrees) -> Degrees {
    let ha = hours_to_rad(ha);
    let dec = deg_to_rad(dec);
    let lat = deg_to_rad(lat);
    rad_to_deg((dec.sin() * lat.sin() + dec.cos() * lat.cos() * ha.cos()).asin())
}

pub fn az_from_ha_dec(ha: Hours, dec: Degrees, lat: Degrees) -> Degrees {
    let alt = deg_to_rad(alt_from_ha_dec(ha, dec, lat));
    let ha_r = hours_to_rad(ha);
    let dec = deg_to_rad(dec);
    let lat = deg_to_rad(lat);

    let cos_az = (dec.sin() - alt.sin() * lat.sin()) / (alt.cos() * lat.cos());
    let a = rad_to_deg(cos_az.clamp(-1., 1.).acos());

    if 0. < ha_r.sin() {
        360. - a
    } else {
        a
    }
}

pub fn ha_dec_from_alt_az(alt: Degrees, az: Degrees, lat: Degrees) -> (Hours, Degrees) {
    let alt_rad = deg_to_rad(alt);
    let az_rad = deg_to_rad(modulo(az, 360.));
    let lat_rad = deg_to_rad(lat);

    let dec_rad = (lat_rad.sin() * alt_rad.sin() + lat_rad.cos() * alt_rad.cos() * az_rad.cos())
        .asin() as Radians;

    let sin_ha = (-az_rad.sin() * alt_rad.cos() / dec_rad.cos()).clamp(-1., 1.);
    let ha_hours = rad_to_hours(sin_ha.asin());

    // Resolve the asin ambiguity with the sign of cos(ha).
    let cos_ha = (alt_rad.sin() - dec_rad.sin() * lat_rad.sin()) / (dec_rad.cos() * lat_rad.cos());
    let ha_hours = if cos_ha < 0. {
        12. - ha_hours
    } else {
        ha_hours
    };

    (modulo(ha_hours, 24.), rad_to_deg(dec_rad))
}

/// Site and mount geometry needed by the frame conversions.
#[derive(Debug, Copy, Clone)]
pub struct CoordContext {
    pub latitude: Degrees,
    pub longitude: Degrees,
    pub alignment: AlignmentMode,
    pub polar_mode: PolarMode,
    pub hemisphere: Hemisphere,
}

impl CoordContext {
    pub fn local_sidereal_time(&self, time: chrono::DateTime<chrono::Utc>) -> Hours {
        local_sidereal_time(time, self.longitude)
    }
}

/// Axis angles in the application frame, primary then secondary, degrees.
pub type AxesXY = [Degrees; 2];

/// Maps an equatorial target to app-frame axis angles.
///
/// For the German mount the secondary axis carries the "through the pole"
/// encoding: when the hour angle is outside +/-6h the primary is folded
/// back by 180 deg and the secondary becomes `180 - dec`, which is what
/// selects the pier side.
pub fn radec_to_axes_xy(ra: Hours, dec: Degrees, lst: Hours, ctx: &CoordContext) -> AxesXY {
    let ha_deg = hours_to_deg(ra_to_ha(ra, lst));
    match ctx.alignment {
        AlignmentMode::AltAz => {
            let ha = ra_to_ha(ra, lst);
            let alt = alt_from_ha_dec(ha, dec, ctx.latitude);
            let az = az_from_ha_dec(ha, dec, ctx.latitude);
            [az, alt]
        }
        AlignmentMode::Polar => [range_180(ha_deg), dec],
        AlignmentMode::GermanPolar => {
            let x = range_180(ha_deg);
            if x > 90. {
                [x - 180., 180. - dec]
            } else if x < -90. {
                [x + 180., 180. - dec]
            } else {
                [x, dec]
            }
        }
    }
}

/// Inverse of [`radec_to_axes_xy`] for the same `lst`.
pub fn axes_xy_to_radec(axes: AxesXY, lst: Hours, ctx: &CoordContext) -> (Hours, Degrees) {
    match ctx.alignment {
        AlignmentMode::AltAz => {
            let (ha, dec) = ha_dec_from_alt_az(axes[1], axes[0], ctx.latitude);
            (modulo(lst - ha, 24.), dec)
        }
        AlignmentMode::Polar => {
            let ha = deg_to_hours(axes[0]);
            (modulo(lst - ha, 24.), axes[1])
        }
        AlignmentMode::GermanPolar => {
            let (ha_deg, dec) = if axes[1] > 90. || axes[1] < -90. {
                (range_180(axes[0] + 180.), 180. - axes[1])
            } else {
                (axes[0], axes[1])
            };
            let dec = range_180(dec);
            (modulo(lst - deg_to_hours(ha_deg), 24.), dec)
        }
    }
}

/// Maps a horizontal target to app-frame axis angles.
pub fn azalt_to_axes_xy(az: Degrees, alt: Degrees, ctx: &CoordContext) -> AxesXY {
    match ctx.alignment {
        AlignmentMode::AltAz => [modulo(az, 360.), alt],
        AlignmentMode::Polar | AlignmentMode::GermanPolar => {
            let (ha, dec) = ha_dec_from_alt_az(alt, az, ctx.latitude);
            let ha_deg = hours_to_deg(if ha >= 12. { ha - 24. } else { ha });
            match ctx.alignment {
                AlignmentMode::Polar => [range_180(ha_deg), dec],
                _ => {
                    let x = range_180(ha_deg);
                    if x > 90. {
                        [x - 180., 180. - dec]
                    } else if x < -90. {
                        [x + 180., 180. - dec]
                    } else {
                        [x, dec]
                    }
                }
            }
        }
    }
}

/// Current horizontal coordinates from app-frame axis angles.
pub fn axes_xy_to_azalt(axes: AxesXY, lst: Hours, ctx: &CoordContext) -> (Degrees, Degrees) {
    match ctx.alignment {
        AlignmentMode::AltAz => (modulo(axes[0], 360.), axes[1]),
        _ => {
            let (ra, dec) = axes_xy_to_radec(axes, lst, ctx);
            let ha = ra_to_ha(ra, lst);
            (
                az_from_ha_dec(ha, dec, ctx.latitude),
                alt_from_ha_dec(ha, dec, ctx.latitude),
            )
        }
    }
}

/// Application frame to physical mount frame.
///
/// The mount frame is where home and park offsets live. In the southern
/// hemisphere a polar mount is physically rotated half a turn relative to
/// the app frame.
pub fn axes_app_to_mount(axes: AxesXY, ctx: &CoordContext) -> AxesXY {
    match (ctx.alignment, ctx.hemisphere) {
        (AlignmentMode::Polar | AlignmentMode::GermanPolar, Hemisphere::Southern) => {
            [axes[0] - 180., axes[1]]
        }
        _ => axes,
    }
}

pub fn axes_mount_to_app(axes: AxesXY, ctx: &CoordContext) -> AxesXY {
    match (ctx.alignment, ctx.hemisphere) {
        (AlignmentMode::Polar | AlignmentMode::GermanPolar, Hemisphere::Southern) => {
            [axes[0] + 180., axes[1]]
        }
        _ => axes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn german_ctx() -> CoordContext {
        CoordContext {
            latitude: 37.0,
            longitude: -122.0,
            alignment: AlignmentMode::GermanPolar,
            polar_mode: PolarMode::Right,
            hemisphere: Hemisphere::Northern,
        }
    }

    #[test]
    fn range_180_boundaries() {
        assert_eq!(range_180(180.), 180.);
        assert_eq!(range_180(-180.), 180.);
        assert_float_absolute_eq!(range_180(179.999_999), 179.999_999, 1e-9);
        assert_float_absolute_eq!(range_180(181.), -179., 1e-9);
        assert_float_absolute_eq!(range_180(-541.), 179., 1e-9);
    }

    #[test]
    fn ha_range() {
        assert_eq!(ra_to_ha(6., 6.), 0.);
        assert_eq!(ra_to_ha(18., 6.), -12.);
        assert_float_absolute_eq!(ra_to_ha(0., 23.), -1., 1e-12);
        assert_float_absolute_eq!(ra_to_ha(23., 0.), 1., 1e-12);
    }

    #[test]
    fn greenwich_sidereal_time_references() {
        assert_float_relative_eq!(
            greenwich_sidereal_time(Utc.with_ymd_and_hms(1969, 1, 6, 1, 5, 0).unwrap()),
            8.112_742_120_3,
            1e-4
        );
        assert_float_relative_eq!(
            greenwich_sidereal_time(Utc.with_ymd_and_hms(2021, 1, 30, 21, 20, 0).unwrap()),
            6.021_910_893_0,
            1e-4
        );
    }

    #[test]
    fn lst_is_monotonic_mod_24() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut prev = local_sidereal_time(t0, -122.);
        for minutes in 1..120 {
            let t = t0 + chrono::Duration::minutes(minutes);
            let lst = local_sidereal_time(t, -122.);
            let delta = modulo(lst - prev, 24.);
            assert!(delta > 0. && delta < 0.1, "bad delta {}", delta);
            prev = lst;
        }
    }

    #[test]
    fn alt_az_reference_positions() {
        // From the Astronomical Almanac worked example set.
        let alt = alt_from_ha_dec(deg_to_hours(336.683), 19.1824, 43.07833);
        assert_float_absolute_eq!(alt, 59.086, 1e-2);
        let az = az_from_ha_dec(deg_to_hours(336.683), 19.1824, 43.07833);
        assert_float_absolute_eq!(az, 133.308, 1e-2);
    }

    #[test]
    fn ha_dec_alt_az_round_trip() {
        let lat = 51.3;
        for &(ha, dec) in &[(1.5_f64, 20.0_f64), (22.3, -5.), (5.9, 55.), (11.0, -40.)] {
            let alt = alt_from_ha_dec(ha, dec, lat);
            let az = az_from_ha_dec(ha, dec, lat);
            let (ha_back, dec_back) = ha_dec_from_alt_az(alt, az, lat);
            assert_float_absolute_eq!(modulo(ha_back - ha, 24.), 0., 1e-6);
            assert_float_absolute_eq!(dec_back, dec, 1e-6);
        }
    }

    #[test]
    fn german_axes_round_trip() {
        let ctx = german_ctx();
        let lst = 10.0;
        for &(ra, dec) in &[
            (6.0_f64, 0.0_f64),
            (10.0, 89.0),
            (18.5, -30.),
            (0.25, 45.),
            (22.0, -89.),
        ] {
            let axes = radec_to_axes_xy(ra, dec, lst, &ctx);
            let (ra_back, dec_back) = axes_xy_to_radec(axes, lst, &ctx);
            assert_float_absolute_eq!(modulo(ra_back - ra, 24.), 0., 1e-9);
            assert_float_absolute_eq!(dec_back, dec, 1e-9);
        }
    }

    #[test]
    fn altaz_axes_round_trip() {
        let ctx = CoordContext {
            alignment: AlignmentMode::AltAz,
            ..german_ctx()
        };
        let lst = 3.0;
        for &(ra, dec) in &[(2.0_f64, 10.0_f64), (5.0, 60.), (23.0, -20.)] {
            let axes = radec_to_axes_xy(ra, dec, lst, &ctx);
            let (ra_back, dec_back) = axes_xy_to_radec(axes, lst, &ctx);
            assert_float_absolute_eq!(modulo(ra_back - ra, 24.), 0., 1e-6);
            assert_float_absolute_eq!(dec_back, dec, 1e-6);
        }
    }

    #[test]
    fn gem_flip_selects_far_side() {
        let ctx = german_ctx();
        // 8 hours east of the meridian: outside the +/-6h window.
        let axes = radec_to_axes_xy(2.0, 30.0, 10.0, &ctx);
        assert!(axes[1] > 90., "expected flipped secondary, got {:?}", axes);
        let (ra, dec) = axes_xy_to_radec(axes, 10.0, &ctx);
        assert_float_absolute_eq!(ra, 2.0, 1e-9);
        assert_float_absolute_eq!(dec, 30.0, 1e-9);
    }

    #[test]
    fn app_mount_round_trip_southern_polar() {
        let ctx = CoordContext {
            latitude: -33.9,
            hemisphere: Hemisphere::Southern,
            ..german_ctx()
        };
        let axes = [42.0, -10.0];
        let back = axes_mount_to_app(axes_app_to_mount(axes, &ctx), &ctx);
        assert_float_absolute_eq!(back[0], axes[0], 1e-12);
        assert_float_absolute_eq!(back[1], axes[1], 1e-12);
        assert_float_absolute_eq!(axes_app_to_mount(axes, &ctx)[0], axes[0] - 180., 1e-12);
    }

    #[test]
    fn steps_round_trip() {
        let factor = 360. / 11_136_000.;
        let steps = 1_234_567.0;
        let deg = steps_to_degrees(steps, factor);
        assert_float_absolute_eq!(degrees_to_steps(deg, factor), steps, 1e-6);
    }
}
