use crate::astro_math::{CoordContext, Degrees, Hours};
use crate::util::enums::{AlignmentMode, Hemisphere};
use serde::{Deserialize, Serialize};

/* Config snapshot consumed by the mount controller.
 * Mutation goes through the settings adapter, which swaps the whole
 * snapshot and notifies the controller. */
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MountConfig {
    pub connection: ConnectionSettings,
    pub site: SiteSettings,
    pub geometry: GeometrySettings,
    pub home_park: HomeParkSettings,
    pub limits: LimitSettings,
    pub rates: RateSettings,
    pub guiding: GuidingSettings,
    pub loops: LoopSettings,
    pub gearing: CustomGearing,
    pub other: OtherSettings,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountKind {
    Simulator,
    SkyWatcher,
}

/* Serial connection */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConnectionSettings {
    pub mount_kind: MountKind,
    pub port: Option<String>, // None for automatic
    pub baud_rate: u32,
    pub timeout_millis: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            mount_kind: MountKind::Simulator,
            port: None,
            baud_rate: 9600,
            timeout_millis: 1000,
        }
    }
}

/* Observing site */
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteSettings {
    pub latitude: Degrees,
    pub longitude: Degrees,
    pub elevation: f64,
}

impl SiteSettings {
    pub fn hemisphere(&self) -> Hemisphere {
        Hemisphere::from_latitude(self.latitude)
    }
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            latitude: 51.47,
            longitude: 0.0,
            elevation: 15.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolarMode {
    Left,
    Right,
}

/* Mount geometry */
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GeometrySettings {
    #[serde(with = "alignment_mode")]
    pub alignment_mode: AlignmentMode,
    pub polar_mode: PolarMode,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            alignment_mode: AlignmentMode::GermanPolar,
            polar_mode: PolarMode::Right,
        }
    }
}

mod alignment_mode {
    use ascom_alpaca::api::telescope::AlignmentMode;
    use core::fmt::Formatter;
    use serde::de::{Error, Visitor};
    use serde::{Deserializer, Serializer};

    struct AlignmentModeVisitor;
    impl<'de> Visitor<'de> for AlignmentModeVisitor {
        type Value = AlignmentMode;

        fn expecting(&self, formatter: &mut Formatter) -> core::fmt::Result {
            formatter.write_str("alt-az, polar or german-polar")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            let lower = v.to_lowercase();
            Ok(match &*lower {
                "alt-az" | "altaz" => AlignmentMode::AltAz,
                "polar" => AlignmentMode::Polar,
                "german-polar" | "german" => AlignmentMode::GermanPolar,
                _ => return Err(E::custom(format!("unknown alignment mode: \"{}\"", v))),
            })
        }
    }

    pub fn serialize<S>(mode: &AlignmentMode, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(match mode {
            AlignmentMode::AltAz => "alt-az",
            AlignmentMode::Polar => "polar",
            AlignmentMode::GermanPolar => "german-polar",
        })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<AlignmentMode, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(AlignmentModeVisitor)
    }
}

/* Home and park positions, mount frame degrees */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HomeParkSettings {
    pub home_axis_x: Degrees,
    pub home_axis_y: Degrees,
    pub park_positions: Vec<ParkPosition>,
    pub selected_park: String,
    /// Park position used when the limit monitor parks the mount.
    pub park_limit_name: String,
    /// Persisted park flag; survives power cycles.
    pub at_park: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParkPosition {
    pub name: String,
    pub x: Degrees,
    pub y: Degrees,
}

impl HomeParkSettings {
    pub fn home_axes(&self) -> [Degrees; 2] {
        [self.home_axis_x, self.home_axis_y]
    }

    pub fn park_position(&self, name: &str) -> Option<&ParkPosition> {
        self.park_positions.iter().find(|p| p.name == name)
    }

    pub fn selected_park_axes(&self) -> [Degrees; 2] {
        self.park_position(&self.selected_park)
            .map(|p| [p.x, p.y])
            .unwrap_or_else(|| self.home_axes())
    }
}

impl Default for HomeParkSettings {
    fn default() -> Self {
        Self {
            home_axis_x: 90.,
            home_axis_y: 90.,
            park_positions: vec![
                ParkPosition {
                    name: "Default".to_string(),
                    x: 0.,
                    y: 90.,
                },
                ParkPosition {
                    name: "Home".to_string(),
                    x: 90.,
                    y: 90.,
                },
            ],
            selected_park: "Default".to_string(),
            park_limit_name: "Default".to_string(),
            at_park: false,
        }
    }
}

/* Travel and tracking limits */
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimitSettings {
    pub axis_limit_x: Degrees,
    pub axis_upper_limit_y: Degrees,
    pub axis_lower_limit_y: Degrees,
    pub hz_tracking_limit: Degrees,
    pub hour_angle_limit: Hours,
    pub limit_tracking: bool,
    pub limit_park: bool,
    pub hz_limit_tracking: bool,
    pub no_sync_past_meridian: bool,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            axis_limit_x: 185.,
            axis_upper_limit_y: 185.,
            axis_lower_limit_y: -185.,
            hz_tracking_limit: 0.,
            hour_angle_limit: 12.,
            limit_tracking: false,
            limit_park: false,
            hz_limit_tracking: false,
            no_sync_past_meridian: false,
        }
    }
}

/* Slew and tracking rates */
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RateSettings {
    pub max_slew_rate: Degrees,
    /// Precision-phase completion window, degrees per axis.
    pub goto_precision: Degrees,
    /// Wait after the coarse phase before the precision loop, seconds.
    pub slew_settle_time: u32,
}

const SLEW_SPEED_FACTORS: [f64; 8] = [0.0034, 0.0068, 0.047, 0.068, 0.2, 0.4, 0.8, 1.0];

impl RateSettings {
    /// The eight discrete hand-controller speeds, slowest first.
    pub fn slew_speeds(&self) -> [Degrees; 8] {
        SLEW_SPEED_FACTORS.map(|f| (self.max_slew_rate * f * 1000.).round() / 1000.)
    }
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            max_slew_rate: 3.4,
            goto_precision: 10. * crate::util::ARCSEC,
            slew_settle_time: 0,
        }
    }
}

/* Pulse guiding */
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GuidingSettings {
    pub min_pulse_ra_millis: u32,
    pub min_pulse_dec_millis: u32,
    /// Guide rate as a fraction of sidereal.
    pub st4_guide_rate: f64,
}

impl Default for GuidingSettings {
    fn default() -> Self {
        Self {
            min_pulse_ra_millis: 20,
            min_pulse_dec_millis: 20,
            st4_guide_rate: 0.5,
        }
    }
}

/* Timer periods */
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoopSettings {
    pub display_interval_millis: u64,
    pub altaz_tracking_interval_millis: u64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            display_interval_millis: 200,
            altaz_tracking_interval_millis: 2500,
        }
    }
}

/* Non-standard worm/wheel ratios */
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CustomGearing {
    pub enabled: bool,
    pub steps_per_rev_x: Option<i64>,
    pub steps_per_rev_y: Option<i64>,
    /// Integer offset applied to the sidereal divisor on both axes.
    pub tracking_offset: i64,
    pub ra_tracking_offset_rate: Degrees,
    pub dec_tracking_offset_rate: Degrees,
}

impl Default for CustomGearing {
    fn default() -> Self {
        Self {
            enabled: false,
            steps_per_rev_x: None,
            steps_per_rev_y: None,
            tracking_offset: 0,
            ra_tracking_offset_rate: 0.,
            dec_tracking_offset_rate: 0.,
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OtherSettings {
    /// Resume tracking automatically when unparking.
    pub auto_track: bool,
    /// Turn PEC corrections on while tracking, if the mount supports it.
    pub pec_on: bool,
    pub pec_offset: f64,
}

impl Default for OtherSettings {
    fn default() -> Self {
        Self {
            auto_track: false,
            pec_on: false,
            pec_offset: 0.,
        }
    }
}

impl MountConfig {
    pub fn load(profile: &str) -> Result<Self, confy::ConfyError> {
        confy::load("skymount-alpaca", profile)
    }

    pub fn store(&self, profile: &str) -> Result<(), confy::ConfyError> {
        confy::store("skymount-alpaca", profile, self)
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.site.hemisphere()
    }

    pub fn coord_context(&self) -> CoordContext {
        CoordContext {
            latitude: self.site.latitude,
            longitude: self.site.longitude,
            alignment: self.geometry.alignment_mode,
            polar_mode: self.geometry.polar_mode,
            hemisphere: self.hemisphere(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slew_speed_table() {
        let rates = RateSettings {
            max_slew_rate: 3.4,
            ..Default::default()
        };
        let speeds = rates.slew_speeds();
        assert_eq!(speeds[0], 0.012);
        assert_eq!(speeds[4], 0.68);
        assert_eq!(speeds[7], 3.4);
        assert!(speeds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn default_context_is_northern_german() {
        let config = MountConfig::default();
        let ctx = config.coord_context();
        assert_eq!(ctx.hemisphere, Hemisphere::Northern);
        assert_eq!(ctx.alignment, AlignmentMode::GermanPolar);
    }

    #[test]
    fn park_lookup_falls_back_to_home() {
        let mut hp = HomeParkSettings::default();
        hp.selected_park = "missing".to_string();
        assert_eq!(hp.selected_park_axes(), hp.home_axes());
    }
}
