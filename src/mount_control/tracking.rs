//! The tracking engine: the periodic display tick and the AltAz rate
//! predictor, plus tracking-rate composition and the tracking on/off
//! surface.
//!
//! Two clocks: the display tick refreshes positions, the sidereal clock,
//! the limit monitor and PEC every `display_interval_millis`; the
//! predictor reissues axis rates every `altaz_tracking_interval_millis`
//! when the mount is an AltAz and tracking.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use ascom_alpaca::{ASCOMError, ASCOMResult};
use tokio::time::interval;
use tracing::{debug, warn};

use crate::astro_math::{self, CoordContext, Degrees, Hours};
use crate::config::MountConfig;
use crate::mount_control::driver::{CommandKind, DriverInfo};
use crate::mount_control::pec::{PecMode, PecTable};
use crate::mount_control::{limits, MountController};
use crate::util::{
    AlignmentMode, Axis, DriveRate, DriverError, MountEvent, SlewType, TrackingRateExt,
    SIDEREAL_RATE_ARCSEC,
};

/// Rates closer than this to the last sent value are not reissued.
const RATE_EPSILON: f64 = 1e-7;
/// How close both axes must sit to the home position to report AtHome.
const HOME_WINDOW_DEG: Degrees = 0.01;

pub(in crate::mount_control) async fn display_loop(this: Arc<MountController>) {
    let period = {
        let config = this.config.read().await;
        Duration::from_millis(config.loops.display_interval_millis.max(5))
    };
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;

        // Non-reentrant by policy: a tick that finds the previous one
        // still running is dropped, never queued.
        let Ok(_guard) = this.tick_lock.try_lock() else {
            let overruns = this.axes.note_timer_overrun();
            warn!(overruns, "display tick overrun");
            continue;
        };

        if !this.is_running().await {
            continue;
        }
        if let Err(e) = display_tick(&this).await {
            debug!(error = %e, "display tick failed");
        }
    }
}

async fn display_tick(this: &Arc<MountController>) -> Result<(), DriverError> {
    let Some(queue) = this.queue.read().await.clone() else {
        return Ok(());
    };
    let config = this.config.read().await.clone();
    let ctx = config.coord_context();
    let lst = ctx.local_sidereal_time(this.utc_now().await);

    let mount = this.axes.update_steps(&queue).await?;
    let app = this
        .alignment
        .map_to_unsynced(astro_math::axes_mount_to_app(mount, &ctx));
    let (ra, _dec) = astro_math::axes_xy_to_radec(app, lst, &ctx);
    let home = this.home_axes_mount(&config);

    {
        let mut motion = this.motion.write().await;
        motion.sidereal_time = lst;
        motion.lha = astro_math::ra_to_ha(ra, lst);
        motion.pier_side = MountController::pier_side_for_axes(app, ctx.alignment);
        motion.is_home = (mount[0] - home[0]).abs() < HOME_WINDOW_DEG
            && (mount[1] - home[1]).abs() < HOME_WINDOW_DEG;
    }

    check_limits(this, &queue, &config, mount, app, lst).await;
    check_pec(this, &config).await;

    // Goto slews own the axes; otherwise keep the composed rate current.
    let slew_state = this.motion.read().await.slew_state;
    if !slew_state.is_goto() {
        push_composed_rates(this).await?;
    }

    Ok(())
}

async fn check_limits(
    this: &Arc<MountController>,
    queue: &crate::mount_control::queue::CommandQueue,
    config: &MountConfig,
    mount: astro_math::AxesXY,
    app: astro_math::AxesXY,
    lst: Hours,
) {
    let ctx = config.coord_context();
    let status = limits::check_axis_limits(
        mount,
        &config.limits,
        ctx.alignment,
        config.geometry.polar_mode,
    );

    let mut breach = status.any();

    if !breach
        && config.limits.hz_limit_tracking
        && matches!(ctx.alignment, AlignmentMode::AltAz | AlignmentMode::Polar)
    {
        let (_az, alt) = astro_math::axes_xy_to_azalt(app, lst, &ctx);
        breach = limits::below_horizon_limit(alt, &config.limits);
    }

    if !breach && ctx.alignment == AlignmentMode::GermanPolar {
        let lha = this.motion.read().await.lha;
        breach = limits::past_hour_angle_limit(lha, &config.limits);
    }

    if !breach {
        return;
    }

    let tracking = this.motion.read().await.tracking;
    if config.limits.limit_tracking && tracking {
        {
            let mut motion = this.motion.write().await;
            motion.tracking = false;
        }
        this.events.publish(MountEvent::Tracking(false));
        for axis in Axis::BOTH {
            let _ = queue.execute(CommandKind::Stop(axis)).await;
        }
        this.record_error(ASCOMError::invalid_operation(
            "tracking stopped: axis limit reached",
        ));
    }

    if config.limits.limit_park && !this.motion.read().await.at_park {
        let slewing = this.motion.read().await.slew_state.is_goto();
        if !slewing {
            warn!("limit breach: parking at the configured limit position");
            let name = config.home_park.park_limit_name.clone();
            let this = this.clone();
            tokio::task::spawn(async move {
                let _ = this.park_at(Some(name)).await;
            });
        }
    }
}

async fn check_pec(this: &Arc<MountController>, config: &MountConfig) {
    if !config.other.pec_on {
        return;
    }
    let tracking = this.motion.read().await.tracking;
    if !tracking {
        return;
    }
    let Ok(info) = this.axes.info().await else {
        return;
    };
    let steps = this.axes.steps().await;
    let correction = {
        let mut pec = this.pec.lock().unwrap();
        pec.tick(steps[0], info.steps_per_rev[0] as f64)
    };
    if let Some(correction) = correction {
        let mut motion = this.motion.write().await;
        motion.pec_rate = correction;
        // Bin crossings always reach the driver, however small the
        // rate delta.
        motion.pec_dirty = true;
    }
}

pub(in crate::mount_control) async fn altaz_predictor_loop(this: Arc<MountController>) {
    let period = {
        let config = this.config.read().await;
        Duration::from_millis(config.loops.altaz_tracking_interval_millis.max(100))
    };
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;

        // Compare-and-swap single entry; a slow solve never stacks.
        if this
            .altaz_tick_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            continue;
        }
        if let Err(e) = predictor_tick(&this, period).await {
            debug!(error = %e, "predictor tick failed");
        }
        this.altaz_tick_active.store(false, Ordering::Release);
    }
}

/// Where the anchored RA/Dec target sits in app-frame axis coordinates
/// `horizon` from `now`. The anchor drifts at the client's RA/Dec rate
/// offsets (arcseconds per second). The predictor tick and the
/// precision-slew correction share this solve.
pub(in crate::mount_control) fn predict_axes_app(
    anchor: (Hours, Degrees),
    offsets_arcsec: (f64, f64),
    horizon: Duration,
    now: chrono::DateTime<chrono::Utc>,
    ctx: &CoordContext,
) -> astro_math::AxesXY {
    let dt = horizon.as_secs_f64();
    let ra = anchor.0 + offsets_arcsec.0 * dt / (3600. * 15.);
    let dec = anchor.1 + offsets_arcsec.1 * dt / 3600.;
    let at =
        now + chrono::Duration::from_std(horizon).unwrap_or_else(|_| chrono::Duration::zero());
    astro_math::radec_to_axes_xy(ra, dec, ctx.local_sidereal_time(at), ctx)
}

/// Solves the short-horizon rate: where will the anchor RA/Dec sit in
/// axis coordinates one interval from now, and what constant rate gets
/// there.
async fn predictor_tick(this: &Arc<MountController>, period: Duration) -> Result<(), DriverError> {
    let config = this.config.read().await.clone();
    let ctx = config.coord_context();
    if ctx.alignment != AlignmentMode::AltAz || !this.is_running().await {
        return Ok(());
    }
    {
        let motion = this.motion.read().await;
        if !motion.tracking || motion.slew_state != SlewType::None {
            return Ok(());
        }
    }
    let Some(queue) = this.queue.read().await.clone() else {
        return Ok(());
    };

    // Anchor on the current pointing the first time through.
    let anchor = {
        let motion = this.motion.read().await;
        motion.predictor_anchor
    };
    let (ra, dec) = match anchor {
        Some(a) => a,
        None => {
            let (ra, dec) = this
                .current_radec()
                .await
                .map_err(|_| DriverError::NotConnected)?;
            this.motion.write().await.predictor_anchor = Some((ra, dec));
            (ra, dec)
        }
    };

    let offsets = {
        let motion = this.motion.read().await;
        (motion.ra_rate_offset, motion.dec_rate_offset)
    };

    let dt = period.as_secs_f64();
    let now = this.utc_now().await;
    let axes_now = astro_math::axes_app_to_mount(
        predict_axes_app((ra, dec), offsets, Duration::ZERO, now, &ctx),
        &ctx,
    );
    let axes_future = astro_math::axes_app_to_mount(
        predict_axes_app((ra, dec), offsets, period, now, &ctx),
        &ctx,
    );

    for axis in Axis::BOTH {
        let i = axis.index();
        let rate = astro_math::range_180(axes_future[i] - axes_now[i]) / dt
            + this.motion.read().await.move_axis_rate[i];
        queue.execute(CommandKind::StartMotion(axis, rate)).await?;
    }
    {
        let mut motion = this.motion.write().await;
        // Remember what went to the driver so the equatorial path does
        // not fight the predictor.
        motion.sent_rates = [f64::NAN, f64::NAN];
    }

    Ok(())
}

/// Equatorial tracking-rate composition, sent to the driver whenever it
/// moves by more than the quantisation threshold, and unconditionally
/// on a PEC bin crossing.
pub(in crate::mount_control) async fn push_composed_rates(
    this: &Arc<MountController>,
) -> Result<(), DriverError> {
    let config = this.config.read().await.clone();
    let ctx = config.coord_context();
    let Some(queue) = this.queue.read().await.clone() else {
        return Ok(());
    };
    let info = this.axes.info().await.ok();

    let (rates, previous, pec_dirty) = {
        let motion = this.motion.read().await;
        let altaz = ctx.alignment == AlignmentMode::AltAz;

        // While an AltAz mount tracks, the predictor owns the driver
        // rates (and folds the move rates in itself); pushing the
        // composed zero here would stop it between predictor ticks.
        if altaz && motion.tracking && motion.slew_state == SlewType::None {
            return Ok(());
        }

        let base = if motion.tracking && !altaz {
            motion.tracking_rate.deg_per_sec()
                + custom_gearing_delta(info.as_ref(), &config)
                + motion.pec_rate
        } else {
            0.
        };
        let offsets = if motion.tracking && !altaz {
            (
                -motion.ra_rate_offset / 3600. + config.gearing.ra_tracking_offset_rate,
                motion.dec_rate_offset / 3600. + config.gearing.dec_tracking_offset_rate,
            )
        } else {
            (0., 0.)
        };

        // In AltAz mode the predictor owns the tracking component; only
        // manual move and pulse rates flow through here.
        let x = base + motion.move_axis_rate[0] + motion.pulse_rate[0] + offsets.0;
        let y = motion.move_axis_rate[1] + motion.pulse_rate[1] + offsets.1;
        ([x, y], motion.sent_rates, motion.pec_dirty)
    };

    let mut changed = false;
    for axis in Axis::BOTH {
        let i = axis.index();
        // A PEC bin crossing forces the primary-axis send through the
        // quantisation gate.
        let stale = (pec_dirty && axis == Axis::Primary)
            || previous[i].is_nan()
            || (rates[i] - previous[i]).abs() > RATE_EPSILON;
        if !stale {
            continue;
        }
        changed = true;
        if rates[i] == 0. {
            queue.execute(CommandKind::Stop(axis)).await?;
        } else {
            queue.execute(CommandKind::StartMotion(axis, rates[i])).await?;
        }
    }
    if changed {
        let mut motion = this.motion.write().await;
        motion.sent_rates = rates;
        motion.pec_dirty = false;
    }
    Ok(())
}

fn custom_gearing_delta(info: Option<&DriverInfo>, config: &MountConfig) -> f64 {
    let gearing = &config.gearing;
    if !gearing.enabled || gearing.tracking_offset == 0 {
        return 0.;
    }
    let Some(info) = info else { return 0. };
    // Effective sidereal divisor for the primary axis worm train.
    let divisor =
        (info.steps_time_freq[0] / info.steps_per_rev[0] as f64) * 1_296_000. / SIDEREAL_RATE_ARCSEC;
    let adjusted = divisor + gearing.tracking_offset as f64;
    if adjusted == 0. {
        return 0.;
    }
    (SIDEREAL_RATE_ARCSEC * (divisor / adjusted) - SIDEREAL_RATE_ARCSEC) / 3600.
}

impl MountController {
    /* Tracking surface */

    pub async fn is_tracking(&self) -> bool {
        self.motion.read().await.tracking
    }

    pub async fn set_tracking(self: &Arc<Self>, tracking: bool) -> ASCOMResult<()> {
        if !self.is_running().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        {
            let mut motion = self.motion.write().await;
            if motion.tracking == tracking {
                return Ok(());
            }
            if tracking && motion.at_park {
                return Err(ASCOMError::INVALID_WHILE_PARKED);
            }
            motion.tracking = tracking;
            motion.predictor_anchor = None;
            if !tracking {
                motion.pec_rate = 0.;
            }
        }
        self.events.publish(MountEvent::Tracking(tracking));
        push_composed_rates(self).await.map_err(ASCOMError::from)
    }

    pub async fn tracking_rate(&self) -> DriveRate {
        self.motion.read().await.tracking_rate
    }

    pub async fn set_tracking_rate(self: &Arc<Self>, rate: DriveRate) -> ASCOMResult<()> {
        {
            let mut motion = self.motion.write().await;
            if motion.tracking_rate == rate {
                return Ok(());
            }
            motion.tracking_rate = rate;
        }
        if self.is_running().await {
            push_composed_rates(self).await.map_err(ASCOMError::from)?;
        }
        Ok(())
    }

    pub fn tracking_rates(&self) -> Vec<DriveRate> {
        DriveRate::all()
    }

    /// Client RA offset, arcseconds per second.
    pub async fn ra_rate_offset(&self) -> f64 {
        self.motion.read().await.ra_rate_offset
    }

    pub async fn set_ra_rate_offset(self: &Arc<Self>, rate: f64) -> ASCOMResult<()> {
        self.motion.write().await.ra_rate_offset = rate;
        if self.is_running().await {
            push_composed_rates(self).await.map_err(ASCOMError::from)?;
        }
        Ok(())
    }

    pub async fn dec_rate_offset(&self) -> f64 {
        self.motion.read().await.dec_rate_offset
    }

    pub async fn set_dec_rate_offset(self: &Arc<Self>, rate: f64) -> ASCOMResult<()> {
        self.motion.write().await.dec_rate_offset = rate;
        if self.is_running().await {
            push_composed_rates(self).await.map_err(ASCOMError::from)?;
        }
        Ok(())
    }

    pub fn timer_overruns(&self) -> u64 {
        self.axes.timer_overruns()
    }

    /* PEC */

    pub async fn pec_available(&self) -> bool {
        self.axes
            .info()
            .await
            .map(|i| i.features.has_ppec)
            .unwrap_or(false)
    }

    pub async fn set_pec_enabled(&self, enabled: bool) -> ASCOMResult<()> {
        let queue = self.queue_handle().await?;
        queue
            .execute(CommandKind::SetPec(enabled))
            .await
            .map_err(ASCOMError::from)?;
        self.pec.lock().unwrap().set_enabled(enabled);
        if !enabled {
            self.motion.write().await.pec_rate = 0.;
        }
        Ok(())
    }

    /// Installs a worm-period correction table supplied by the settings
    /// adapter. Corrections apply from the next bin crossing.
    pub async fn install_pec_table(
        &self,
        bins: Vec<f64>,
        offset_steps: f64,
    ) -> ASCOMResult<()> {
        let info = self.axes.info().await.map_err(ASCOMError::from)?;
        let table = PecTable::new(
            PecMode::Worm,
            bins,
            info.worm_steps_per_rev[0],
            offset_steps,
        );
        self.pec.lock().unwrap().install_table(table);
        Ok(())
    }

    pub async fn start_pec_training(&self) -> ASCOMResult<()> {
        let queue = self.queue_handle().await?;
        queue
            .execute(CommandKind::StartPecTraining)
            .await
            .map_err(ASCOMError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount_control::driver::MountFeatures;

    fn info() -> DriverInfo {
        DriverInfo {
            mount_name: "test".to_string(),
            firmware: "1".to_string(),
            steps_per_rev: [11_136_000; 2],
            worm_steps_per_rev: [61_866.7; 2],
            factor_step: [360. / 11_136_000.; 2],
            steps_time_freq: [64_935.; 2],
            features: MountFeatures::default(),
        }
    }

    #[test]
    fn predictor_solve_moves_with_the_sky() {
        use chrono::TimeZone;

        let ctx = CoordContext {
            latitude: 37.,
            longitude: -122.,
            alignment: AlignmentMode::AltAz,
            polar_mode: crate::config::PolarMode::Right,
            hemisphere: crate::util::Hemisphere::Northern,
        };
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let anchor = (5.5, 20.0);

        // Zero horizon reduces to the plain coordinate mapping.
        let at_now = predict_axes_app(anchor, (0., 0.), Duration::ZERO, now, &ctx);
        let direct =
            astro_math::radec_to_axes_xy(anchor.0, anchor.1, ctx.local_sidereal_time(now), &ctx);
        assert_float_absolute_eq!(at_now[0], direct[0], 1e-12);
        assert_float_absolute_eq!(at_now[1], direct[1], 1e-12);

        // One predictor interval later the horizontal target has drifted.
        let later = predict_axes_app(anchor, (0., 0.), Duration::from_millis(2500), now, &ctx);
        let drift = (later[0] - at_now[0]).abs() + (later[1] - at_now[1]).abs();
        assert!(drift > 1e-4 && drift < 0.1, "drift {}", drift);
    }

    #[test]
    fn gearing_delta_zero_when_disabled() {
        let config = MountConfig::default();
        assert_eq!(custom_gearing_delta(Some(&info()), &config), 0.);
    }

    #[test]
    fn gearing_delta_small_and_signed() {
        let mut config = MountConfig::default();
        config.gearing.enabled = true;
        config.gearing.tracking_offset = 50;
        let delta = custom_gearing_delta(Some(&info()), &config);
        assert!(delta < 0., "positive offset slows the rate: {}", delta);
        assert!(delta.abs() < 1e-3, "delta stays well below sidereal: {}", delta);
    }
}
