//! Axis-travel and horizon limit checks, evaluated once per display tick
//! against the freshly read mount-frame angles.

use crate::astro_math::{AxesXY, Degrees, Hours};
use crate::config::{LimitSettings, PolarMode};
use crate::util::{AlignmentMode, ARCSEC};

/// Which travel boundaries the mount is currently past. Computed with one
/// arcsecond of hysteresis so noise on the counters cannot flap a flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitStatus {
    pub at_lower_x: bool,
    pub at_upper_x: bool,
    pub at_lower_y: bool,
    pub at_upper_y: bool,
}

impl LimitStatus {
    pub fn any(&self) -> bool {
        self.at_lower_x || self.at_upper_x || self.at_lower_y || self.at_upper_y
    }
}

/// Evaluates the axis windows for the raw mount-frame angles.
///
/// Polar-Left mounts carry the secondary axis mirrored around 180
/// degrees, so the configured Y window is reflected before comparison.
pub fn check_axis_limits(
    raw: AxesXY,
    limits: &LimitSettings,
    alignment: AlignmentMode,
    polar_mode: PolarMode,
) -> LimitStatus {
    let (upper_y, lower_y) =
        if alignment == AlignmentMode::Polar && polar_mode == PolarMode::Left {
            (
                180. - limits.axis_upper_limit_y,
                180. - limits.axis_lower_limit_y,
            )
        } else {
            (limits.axis_upper_limit_y, limits.axis_lower_limit_y)
        };
    let (upper_y, lower_y) = if upper_y < lower_y {
        (lower_y, upper_y)
    } else {
        (upper_y, lower_y)
    };

    LimitStatus {
        at_lower_x: raw[0] <= -limits.axis_limit_x - ARCSEC,
        at_upper_x: raw[0] >= limits.axis_limit_x + ARCSEC,
        at_lower_y: raw[1] <= lower_y - ARCSEC,
        at_upper_y: raw[1] >= upper_y + ARCSEC,
    }
}

/// Horizon limit for AltAz and Polar modes: tracking below the configured
/// altitude is stopped when `hz_limit_tracking` is set.
pub fn below_horizon_limit(altitude: Degrees, limits: &LimitSettings) -> bool {
    altitude < limits.hz_tracking_limit
}

/// Hour-angle window for German mounts.
pub fn past_hour_angle_limit(lha: Hours, limits: &LimitSettings) -> bool {
    lha.abs() > limits.hour_angle_limit
}

/// `no_sync_past_meridian` forbids syncs that would move the pointing
/// state across the meridian.
pub fn sync_crosses_meridian(current_lha: Hours, target_lha: Hours) -> bool {
    current_lha.signum() != target_lha.signum() && current_lha != 0.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitSettings {
        LimitSettings {
            axis_limit_x: 90.,
            axis_upper_limit_y: 90.,
            axis_lower_limit_y: -90.,
            ..Default::default()
        }
    }

    #[test]
    fn inside_window_is_clear() {
        let status = check_axis_limits(
            [0., 0.],
            &limits(),
            AlignmentMode::GermanPolar,
            PolarMode::Right,
        );
        assert!(!status.any());
    }

    #[test]
    fn hysteresis_holds_at_the_boundary() {
        // Exactly at the limit is still inside the arcsecond band.
        let status = check_axis_limits(
            [90., 0.],
            &limits(),
            AlignmentMode::GermanPolar,
            PolarMode::Right,
        );
        assert!(!status.at_upper_x);

        let status = check_axis_limits(
            [90. + 2. * ARCSEC, 0.],
            &limits(),
            AlignmentMode::GermanPolar,
            PolarMode::Right,
        );
        assert!(status.at_upper_x);
    }

    #[test]
    fn lower_x_breach() {
        let status = check_axis_limits(
            [-91., 0.],
            &limits(),
            AlignmentMode::GermanPolar,
            PolarMode::Right,
        );
        assert!(status.at_lower_x && !status.at_upper_x);
    }

    #[test]
    fn polar_left_mirrors_y_window() {
        let cfg = LimitSettings {
            axis_upper_limit_y: 170.,
            axis_lower_limit_y: 10.,
            ..limits()
        };
        // Mirrored window is [10, 170] around 180: [10, 170] -> [10, 170].
        let status = check_axis_limits([0., 100.], &cfg, AlignmentMode::Polar, PolarMode::Left);
        assert!(!status.any());
        let status = check_axis_limits([0., 171.], &cfg, AlignmentMode::Polar, PolarMode::Left);
        assert!(status.at_upper_y);
    }

    #[test]
    fn park_corner_positions_are_clear_under_defaults() {
        let defaults = LimitSettings::default();
        for raw in [[0., 0.], [359.9 - 360., 89.9]] {
            let status = check_axis_limits(
                raw,
                &defaults,
                AlignmentMode::GermanPolar,
                PolarMode::Right,
            );
            assert!(!status.any(), "{:?} tripped {:?}", raw, status);
        }
    }

    #[test]
    fn hour_angle_window() {
        let cfg = LimitSettings {
            hour_angle_limit: 6.,
            ..Default::default()
        };
        assert!(!past_hour_angle_limit(5.9, &cfg));
        assert!(past_hour_angle_limit(-6.1, &cfg));
        // The default window spans the whole hour-angle range.
        assert!(!past_hour_angle_limit(-11.9, &LimitSettings::default()));
    }

    #[test]
    fn meridian_guard() {
        assert!(sync_crosses_meridian(-2., 3.));
        assert!(!sync_crosses_meridian(2., 3.));
        assert!(!sync_crosses_meridian(0., 3.));
    }
}
