//! Park, unpark, home and sync operations on top of the slew engine.

use std::sync::Arc;

use ascom_alpaca::{ASCOMError, ASCOMResult};
use tracing::info;

use crate::astro_math::{self, Degrees, Hours};
use crate::config::ParkPosition;
use crate::mount_control::driver::CommandKind;
use crate::mount_control::slew::SlewTarget;
use crate::mount_control::MountController;
use crate::util::{Axis, MountEvent};

impl MountController {
    /// Slews to the selected park position, stops all motion and latches
    /// AtPark. The pre-park tracking flag is remembered for auto-track
    /// unparking.
    pub async fn park(self: &Arc<Self>) -> ASCOMResult<()> {
        self.park_at(None).await
    }

    pub async fn park_at(self: &Arc<Self>, name: Option<String>) -> ASCOMResult<()> {
        {
            let motion = self.motion.read().await;
            if motion.at_park {
                return Ok(());
            }
        }

        let was_tracking = self.is_tracking().await;
        self.motion.write().await.tracking_before_park = was_tracking;
        if was_tracking {
            self.set_tracking(false).await?;
        }

        let handle = self.start_slew(SlewTarget::Park { name }, false).await?;
        handle.wait().await
    }

    /// Called by the slew engine when a park slew lands.
    pub(in crate::mount_control) async fn finish_park(&self) {
        {
            let mut motion = self.motion.write().await;
            motion.at_park = true;
            motion.tracking = false;
        }
        // The settings adapter persists this so park survives power
        // cycles; the in-memory snapshot is updated as well.
        {
            let mut config = self.config.write().await;
            config.home_park.at_park = true;
        }
        self.events.publish(MountEvent::AtPark(true));
        self.events.publish(MountEvent::Tracking(false));
        info!("parked");
    }

    pub async fn unpark(self: &Arc<Self>) -> ASCOMResult<()> {
        let restore_tracking = {
            let mut motion = self.motion.write().await;
            if !motion.at_park {
                return Ok(());
            }
            motion.at_park = false;
            motion.tracking_before_park
        };
        {
            let mut config = self.config.write().await;
            config.home_park.at_park = false;
        }
        self.events.publish(MountEvent::AtPark(false));

        let auto_track = self.config.read().await.other.auto_track;
        if auto_track && restore_tracking {
            self.set_tracking(true).await?;
        }
        info!("unparked");
        Ok(())
    }

    /// Captures the current position as the selected park position.
    pub async fn set_park(&self) -> ASCOMResult<()> {
        if !self.is_running().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        let current = self.axes.degrees_mount().await;
        let mut config = self.config.read().await.clone();
        let name = config.home_park.selected_park.clone();
        match config.home_park.park_positions.iter_mut().find(|p| p.name == name) {
            Some(p) => {
                p.x = current[0];
                p.y = current[1];
            }
            None => config.home_park.park_positions.push(ParkPosition {
                name,
                x: current[0],
                y: current[1],
            }),
        }
        self.update_config(config).await;
        Ok(())
    }

    /// Slews to the home position; AtHome latches when the axes settle
    /// there.
    pub async fn find_home(self: &Arc<Self>) -> ASCOMResult<()> {
        let handle = self.start_slew(SlewTarget::Home, false).await?;
        handle.wait().await
    }

    /* Sync */

    pub async fn sync_to_coordinates(&self, ra: Hours, dec: Degrees) -> ASCOMResult<()> {
        crate::util::check_ra(ra)?;
        crate::util::check_dec(dec)?;
        if !self.is_running().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        {
            let motion = self.motion.read().await;
            if motion.at_park {
                return Err(ASCOMError::INVALID_WHILE_PARKED);
            }
        }

        let config = self.config.read().await.clone();
        let ctx = config.coord_context();
        let lst = ctx.local_sidereal_time(self.utc_now().await);

        if config.limits.no_sync_past_meridian {
            let current_lha = self.motion.read().await.lha;
            let target_lha = astro_math::ra_to_ha(ra, lst);
            if crate::mount_control::limits::sync_crosses_meridian(current_lha, target_lha) {
                return Err(ASCOMError::invalid_operation(
                    "sync would cross the meridian",
                ));
            }
        }

        let app = astro_math::radec_to_axes_xy(ra, dec, lst, &ctx);
        let mount = astro_math::axes_app_to_mount(self.alignment.map_to_synced(app), &ctx);
        self.write_axis_positions(mount).await?;

        {
            let mut motion = self.motion.write().await;
            motion.target.ra = Some(ra);
            motion.target.dec = Some(dec);
            motion.predictor_anchor = None;
        }
        Ok(())
    }

    pub async fn sync_to_altaz(&self, az: Degrees, alt: Degrees) -> ASCOMResult<()> {
        crate::util::check_az(az)?;
        crate::util::check_alt(alt)?;
        if !self.is_running().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        let config = self.config.read().await.clone();
        let ctx = config.coord_context();
        let app = astro_math::azalt_to_axes_xy(az, alt, &ctx);
        let mount = astro_math::axes_app_to_mount(self.alignment.map_to_synced(app), &ctx);
        self.write_axis_positions(mount).await?;
        self.motion.write().await.predictor_anchor = None;
        Ok(())
    }

    pub async fn sync_to_target(&self) -> ASCOMResult<()> {
        let (ra, dec) = {
            let motion = self.motion.read().await;
            match (motion.target.ra, motion.target.dec) {
                (Some(ra), Some(dec)) => (ra, dec),
                _ => return Err(ASCOMError::VALUE_NOT_SET),
            }
        };
        self.sync_to_coordinates(ra, dec).await
    }

    async fn write_axis_positions(&self, mount: astro_math::AxesXY) -> ASCOMResult<()> {
        let queue = self.queue_handle().await?;
        for axis in Axis::BOTH {
            queue
                .execute(CommandKind::SetPosition(axis, mount[axis.index()]))
                .await
                .map_err(ASCOMError::from)?;
        }
        self.axes
            .update_steps(&queue)
            .await
            .map_err(ASCOMError::from)?;
        Ok(())
    }
}
