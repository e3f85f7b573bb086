//! Thin ASCOM Alpaca adapter: maps the `Telescope` device surface onto
//! the mount controller. No mount logic lives here.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ascom_alpaca::api::{Device, Telescope};
use ascom_alpaca::{ASCOMError, ASCOMResult};
use async_trait::async_trait;

use crate::mount_control::MountController;
use crate::util::{
    AlignmentMode, Axis, DriveRate, EquatorialCoordinateType, GuideDirection, PierSide,
    TelescopeAxis,
};

pub struct MountDevice {
    name: String,
    unique_id: String,
    controller: Arc<MountController>,
}

impl MountDevice {
    pub fn new(controller: Arc<MountController>) -> Self {
        MountDevice {
            name: "SkyMount".to_string(),
            unique_id: "skymount-alpaca-telescope-0".to_string(),
            controller,
        }
    }

    fn map_axis(axis: TelescopeAxis) -> ASCOMResult<Axis> {
        match axis {
            TelescopeAxis::Primary => Ok(Axis::Primary),
            TelescopeAxis::Secondary => Ok(Axis::Secondary),
            TelescopeAxis::Tertiary => Err(ASCOMError::invalid_value(
                "this mount has no tertiary axis",
            )),
        }
    }
}

impl std::fmt::Debug for MountDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountDevice").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Device for MountDevice {
    fn static_name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    async fn connected(&self) -> ASCOMResult<bool> {
        Ok(self.controller.is_running().await)
    }

    async fn set_connected(&self, connected: bool) -> ASCOMResult<()> {
        if connected {
            if !self.controller.connect().await {
                return Err(self
                    .controller
                    .get_last_error()
                    .unwrap_or_else(|| ASCOMError::NOT_CONNECTED));
            }
            self.controller.start().await
        } else {
            self.controller.stop().await?;
            self.controller.disconnect().await;
            Ok(())
        }
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("Two-axis telescope mount server (SkyWatcher protocol or simulator)".to_string())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

#[async_trait]
impl Telescope for MountDevice {
    async fn alignment_mode(&self) -> ASCOMResult<AlignmentMode> {
        Ok(self.controller.config_snapshot().await.geometry.alignment_mode)
    }

    async fn equatorial_system(&self) -> ASCOMResult<EquatorialCoordinateType> {
        Ok(EquatorialCoordinateType::Topocentric)
    }

    async fn altitude(&self) -> ASCOMResult<f64> {
        self.controller.altitude().await
    }

    async fn azimuth(&self) -> ASCOMResult<f64> {
        self.controller.azimuth().await
    }

    async fn right_ascension(&self) -> ASCOMResult<f64> {
        self.controller.right_ascension().await
    }

    async fn declination(&self) -> ASCOMResult<f64> {
        self.controller.declination().await
    }

    async fn at_home(&self) -> ASCOMResult<bool> {
        Ok(self.controller.is_home().await)
    }

    async fn at_park(&self) -> ASCOMResult<bool> {
        Ok(self.controller.at_park().await)
    }

    async fn side_of_pier(&self) -> ASCOMResult<PierSide> {
        self.controller.side_of_pier().await
    }

    async fn destination_side_of_pier(
        &self,
        right_ascension: f64,
        declination: f64,
    ) -> ASCOMResult<PierSide> {
        self.controller
            .destination_side_of_pier(right_ascension, declination)
            .await
    }

    async fn sidereal_time(&self) -> ASCOMResult<f64> {
        self.controller.sidereal_time().await
    }

    async fn utc_date(&self) -> ASCOMResult<SystemTime> {
        Ok(self.controller.utc_date().await)
    }

    async fn set_utc_date(&self, utc_date: SystemTime) -> ASCOMResult<()> {
        self.controller.set_utc_date(utc_date).await
    }

    /* Site */

    async fn site_latitude(&self) -> ASCOMResult<f64> {
        Ok(self.controller.config_snapshot().await.site.latitude)
    }

    async fn set_site_latitude(&self, site_latitude: f64) -> ASCOMResult<()> {
        if !(-90. ..=90.).contains(&site_latitude) {
            return Err(ASCOMError::invalid_value("latitude out of range"));
        }
        let mut config = self.controller.config_snapshot().await;
        config.site.latitude = site_latitude;
        self.controller.update_config(config).await;
        Ok(())
    }

    async fn site_longitude(&self) -> ASCOMResult<f64> {
        Ok(self.controller.config_snapshot().await.site.longitude)
    }

    async fn set_site_longitude(&self, site_longitude: f64) -> ASCOMResult<()> {
        if !(-180. ..=180.).contains(&site_longitude) {
            return Err(ASCOMError::invalid_value("longitude out of range"));
        }
        let mut config = self.controller.config_snapshot().await;
        config.site.longitude = site_longitude;
        self.controller.update_config(config).await;
        Ok(())
    }

    async fn site_elevation(&self) -> ASCOMResult<f64> {
        Ok(self.controller.config_snapshot().await.site.elevation)
    }

    async fn set_site_elevation(&self, site_elevation: f64) -> ASCOMResult<()> {
        let mut config = self.controller.config_snapshot().await;
        config.site.elevation = site_elevation;
        self.controller.update_config(config).await;
        Ok(())
    }

    /* Capabilities */

    async fn can_find_home(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_park(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_unpark(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_park(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_pulse_guide(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_guide_rates(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_tracking(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_right_ascension_rate(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_declination_rate(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_pier_side(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    async fn can_slew(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_slew_async(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_slew_alt_az(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_slew_alt_az_async(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_sync(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_sync_alt_az(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_move_axis(&self, axis: TelescopeAxis) -> ASCOMResult<bool> {
        Ok(axis != TelescopeAxis::Tertiary)
    }

    async fn axis_rates(&self, axis: TelescopeAxis) -> ASCOMResult<Vec<RangeInclusive<f64>>> {
        Self::map_axis(axis)?;
        let speeds = self.controller.slew_speeds().await;
        Ok(vec![0.0..=speeds[7]])
    }

    /* Tracking */

    async fn tracking(&self) -> ASCOMResult<bool> {
        Ok(self.controller.is_tracking().await)
    }

    async fn set_tracking(&self, tracking: bool) -> ASCOMResult<()> {
        self.controller.set_tracking(tracking).await
    }

    async fn tracking_rate(&self) -> ASCOMResult<DriveRate> {
        Ok(self.controller.tracking_rate().await)
    }

    async fn set_tracking_rate(&self, tracking_rate: DriveRate) -> ASCOMResult<()> {
        self.controller.set_tracking_rate(tracking_rate).await
    }

    async fn tracking_rates(&self) -> ASCOMResult<Vec<DriveRate>> {
        Ok(self.controller.tracking_rates())
    }

    async fn right_ascension_rate(&self) -> ASCOMResult<f64> {
        Ok(self.controller.ra_rate_offset().await)
    }

    async fn set_right_ascension_rate(&self, right_ascension_rate: f64) -> ASCOMResult<()> {
        self.controller.set_ra_rate_offset(right_ascension_rate).await
    }

    async fn declination_rate(&self) -> ASCOMResult<f64> {
        Ok(self.controller.dec_rate_offset().await)
    }

    async fn set_declination_rate(&self, declination_rate: f64) -> ASCOMResult<()> {
        self.controller.set_dec_rate_offset(declination_rate).await
    }

    /* Guiding */

    async fn is_pulse_guiding(&self) -> ASCOMResult<bool> {
        self.controller.is_pulse_guiding().await
    }

    async fn pulse_guide(&self, direction: GuideDirection, duration: Duration) -> ASCOMResult<()> {
        self.controller
            .pulse_guide(direction, duration.as_millis() as u32)
            .await
    }

    async fn guide_rate_right_ascension(&self) -> ASCOMResult<f64> {
        Ok(self.controller.guide_rate().await)
    }

    async fn set_guide_rate_right_ascension(
        &self,
        guide_rate_right_ascension: f64,
    ) -> ASCOMResult<()> {
        self.controller.set_guide_rate(guide_rate_right_ascension).await
    }

    async fn guide_rate_declination(&self) -> ASCOMResult<f64> {
        Ok(self.controller.guide_rate().await)
    }

    async fn set_guide_rate_declination(&self, guide_rate_declination: f64) -> ASCOMResult<()> {
        self.controller.set_guide_rate(guide_rate_declination).await
    }

    /* Target */

    async fn target_right_ascension(&self) -> ASCOMResult<f64> {
        self.controller.target_ra().await
    }

    async fn set_target_right_ascension(&self, target_right_ascension: f64) -> ASCOMResult<()> {
        self.controller.set_target_ra(target_right_ascension).await
    }

    async fn target_declination(&self) -> ASCOMResult<f64> {
        self.controller.target_dec().await
    }

    async fn set_target_declination(&self, target_declination: f64) -> ASCOMResult<()> {
        self.controller.set_target_dec(target_declination).await
    }

    /* Slewing */

    async fn slewing(&self) -> ASCOMResult<bool> {
        Ok(self.controller.is_slewing().await)
    }

    async fn slew_settle_time(&self) -> ASCOMResult<Duration> {
        Ok(Duration::from_secs(
            self.controller.config_snapshot().await.rates.slew_settle_time as u64,
        ))
    }

    async fn set_slew_settle_time(&self, slew_settle_time: Duration) -> ASCOMResult<()> {
        let mut config = self.controller.config_snapshot().await;
        config.rates.slew_settle_time = slew_settle_time.as_secs() as u32;
        self.controller.update_config(config).await;
        Ok(())
    }

    async fn slew_to_coordinates(&self, right_ascension: f64, declination: f64) -> ASCOMResult<()> {
        self.controller
            .slew_to_coordinates(right_ascension, declination)
            .await
    }

    async fn slew_to_coordinates_async(
        &self,
        right_ascension: f64,
        declination: f64,
    ) -> ASCOMResult<()> {
        self.controller
            .slew_to_coordinates_async(right_ascension, declination)
            .await
    }

    async fn slew_to_alt_az(&self, azimuth: f64, altitude: f64) -> ASCOMResult<()> {
        self.controller.slew_to_altaz(azimuth, altitude).await
    }

    async fn slew_to_alt_az_async(&self, azimuth: f64, altitude: f64) -> ASCOMResult<()> {
        self.controller.slew_to_altaz_async(azimuth, altitude).await
    }

    async fn slew_to_target(&self) -> ASCOMResult<()> {
        self.controller.slew_to_target().await
    }

    async fn slew_to_target_async(&self) -> ASCOMResult<()> {
        self.controller.slew_to_target_async().await
    }

    async fn abort_slew(&self) -> ASCOMResult<()> {
        self.controller.abort_slew().await
    }

    async fn move_axis(&self, axis: TelescopeAxis, rate: f64) -> ASCOMResult<()> {
        let axis = Self::map_axis(axis)?;
        self.controller.move_axis(axis, rate).await
    }

    /* Sync */

    async fn sync_to_coordinates(&self, right_ascension: f64, declination: f64) -> ASCOMResult<()> {
        self.controller
            .sync_to_coordinates(right_ascension, declination)
            .await
    }

    async fn sync_to_alt_az(&self, azimuth: f64, altitude: f64) -> ASCOMResult<()> {
        self.controller.sync_to_altaz(azimuth, altitude).await
    }

    async fn sync_to_target(&self) -> ASCOMResult<()> {
        self.controller.sync_to_target().await
    }

    /* Park / home */

    async fn park(&self) -> ASCOMResult<()> {
        self.controller.park().await
    }

    async fn unpark(&self) -> ASCOMResult<()> {
        self.controller.unpark().await
    }

    async fn set_park(&self) -> ASCOMResult<()> {
        self.controller.set_park().await
    }

    async fn find_home(&self) -> ASCOMResult<()> {
        self.controller.find_home().await
    }
}
