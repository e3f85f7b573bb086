//! The slew engine: coarse-then-fine gotos, continuous move-axis rates,
//! and abort handling.
//!
//! One goto runs at a time; starting a new one replaces the goto
//! cancellation source, and the superseded task observes its token at
//! the next poll point and stops issuing wire commands.

use std::sync::Arc;
use std::time::Duration;

use ascom_alpaca::{ASCOMError, ASCOMResult};
use tokio::sync::oneshot;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info, warn};

use crate::astro_math::{self, AxesXY, Degrees, Hours};
use crate::config::{MountConfig, MountKind};
use crate::mount_control::driver::CommandKind;
use crate::mount_control::queue::CommandQueue;
use crate::mount_control::{tracking, MountController};
use crate::util::{
    AlignmentMode, Axis, CancelSlot, CancelToken, MountEvent, PierSide, SlewType,
};

/// Poll cadence while a goto is converging.
const GOTO_POLL: Duration = Duration::from_millis(100);
/// Cap on each precision-iteration stop wait.
const PRECISION_POLL_TIMEOUT: Duration = Duration::from_millis(3000);
/// Iterations of the fine-correction loop.
const PRECISION_ITERATIONS: usize = 5;
/// Bounded wait for an aborted slew task to wind down.
const ABORT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// A destination the slew engine can drive to.
#[derive(Debug, Clone, PartialEq)]
pub enum SlewTarget {
    RaDec { ra: Hours, dec: Degrees },
    AltAz { az: Degrees, alt: Degrees },
    Home,
    Park { name: Option<String> },
}

impl SlewTarget {
    fn slew_type(&self) -> SlewType {
        match self {
            SlewTarget::RaDec { .. } => SlewType::RaDec,
            SlewTarget::AltAz { .. } => SlewType::AltAz,
            SlewTarget::Home => SlewType::Home,
            SlewTarget::Park { .. } => SlewType::Park,
        }
    }
}

/// Completion future handed back by the async entry points.
pub struct SlewHandle {
    done: oneshot::Receiver<ASCOMResult<()>>,
}

impl SlewHandle {
    pub async fn wait(self) -> ASCOMResult<()> {
        match self.done.await {
            Ok(result) => result,
            // Task dropped without reporting: treat as cancelled.
            Err(_) => Ok(()),
        }
    }
}

fn goto_timeout(config: &MountConfig) -> Duration {
    match config.connection.mount_kind {
        MountKind::Simulator => {
            Duration::from_secs(crate::mount_control::driver::simulator::SIM_GOTO_TIMEOUT_SECS)
        }
        MountKind::SkyWatcher => Duration::from_secs(
            crate::mount_control::driver::skywatcher::SERIAL_GOTO_TIMEOUT_SECS,
        ),
    }
}

fn damping(config: &MountConfig) -> [f64; 2] {
    match config.connection.mount_kind {
        MountKind::Simulator => [0., 0.],
        MountKind::SkyWatcher => crate::mount_control::driver::skywatcher::SERIAL_DAMPING,
    }
}

impl MountController {
    /* Public slew surface */

    pub async fn slew_to_coordinates(self: &Arc<Self>, ra: Hours, dec: Degrees) -> ASCOMResult<()> {
        let handle = self.begin_slew_radec(ra, dec).await?;
        handle.wait().await
    }

    pub async fn slew_to_coordinates_async(
        self: &Arc<Self>,
        ra: Hours,
        dec: Degrees,
    ) -> ASCOMResult<()> {
        self.begin_slew_radec(ra, dec).await.map(|_| ())
    }

    async fn begin_slew_radec(self: &Arc<Self>, ra: Hours, dec: Degrees) -> ASCOMResult<SlewHandle> {
        crate::util::check_ra(ra)?;
        crate::util::check_dec(dec)?;
        {
            let mut motion = self.motion.write().await;
            motion.target.ra = Some(ra);
            motion.target.dec = Some(dec);
        }
        self.start_slew(SlewTarget::RaDec { ra, dec }, true).await
    }

    pub async fn slew_to_altaz(self: &Arc<Self>, az: Degrees, alt: Degrees) -> ASCOMResult<()> {
        let handle = self.begin_slew_altaz(az, alt).await?;
        handle.wait().await
    }

    pub async fn slew_to_altaz_async(
        self: &Arc<Self>,
        az: Degrees,
        alt: Degrees,
    ) -> ASCOMResult<()> {
        self.begin_slew_altaz(az, alt).await.map(|_| ())
    }

    async fn begin_slew_altaz(
        self: &Arc<Self>,
        az: Degrees,
        alt: Degrees,
    ) -> ASCOMResult<SlewHandle> {
        crate::util::check_az(az)?;
        crate::util::check_alt(alt)?;
        self.start_slew(SlewTarget::AltAz { az, alt }, false).await
    }

    pub async fn slew_to_target(self: &Arc<Self>) -> ASCOMResult<()> {
        let (ra, dec) = self.require_target().await?;
        self.slew_to_coordinates(ra, dec).await
    }

    pub async fn slew_to_target_async(self: &Arc<Self>) -> ASCOMResult<()> {
        let (ra, dec) = self.require_target().await?;
        self.slew_to_coordinates_async(ra, dec).await
    }

    async fn require_target(&self) -> ASCOMResult<(Hours, Degrees)> {
        let motion = self.motion.read().await;
        match (motion.target.ra, motion.target.dec) {
            (Some(ra), Some(dec)) => Ok((ra, dec)),
            _ => Err(ASCOMError::VALUE_NOT_SET),
        }
    }

    /// Cancels the goto slot and waits for the task to stop the axes.
    pub async fn abort_slew(&self) -> ASCOMResult<()> {
        self.handles.cancel(CancelSlot::Goto);

        let deadline = Instant::now() + ABORT_SETTLE_TIMEOUT;
        while self.motion.read().await.slew_state.is_goto() {
            if Instant::now() >= deadline {
                warn!("slew task did not acknowledge abort in time");
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }

        let mut motion = self.motion.write().await;
        if motion.slew_state.is_goto() {
            motion.slew_state = SlewType::None;
        }
        Ok(())
    }

    /// Continuous per-axis motion at the given app-frame rate, composed
    /// with the tracking rate. Zero on both axes ends the move.
    pub async fn move_axis(self: &Arc<Self>, axis: Axis, rate: Degrees) -> ASCOMResult<()> {
        if !self.is_running().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        let config = self.config.read().await.clone();
        let max = config.rates.slew_speeds()[7];
        if rate != 0. && rate.abs() > max {
            return Err(ASCOMError::invalid_value(format_args!(
                "rate {} exceeds the maximum of {}",
                rate, max
            )));
        }

        {
            let motion = self.motion.read().await;
            if motion.at_park {
                return Err(ASCOMError::INVALID_WHILE_PARKED);
            }
            if motion.slew_state.is_goto() {
                return Err(ASCOMError::invalid_operation("goto in progress"));
            }
        }

        let both_zero = {
            let mut motion = self.motion.write().await;
            motion.move_axis_rate[axis.index()] = rate;
            let both_zero = motion.move_axis_rate.iter().all(|r| *r == 0.);
            motion.slew_state = if both_zero {
                SlewType::None
            } else {
                SlewType::MoveAxis
            };
            if both_zero && motion.tracking {
                // Re-anchor the predictor on wherever the move left us.
                motion.predictor_anchor = None;
            }
            both_zero
        };
        self.events.publish(MountEvent::Slewing(!both_zero));

        tracking::push_composed_rates(self).await.map_err(ASCOMError::from)
    }

    /* Core goto machinery */

    /// Validates preconditions, installs a fresh cancel token, spawns the
    /// slew task, and only returns once the task has set the slew state,
    /// so `is_slewing` is already true for the caller.
    pub(in crate::mount_control) async fn start_slew(
        self: &Arc<Self>,
        target: SlewTarget,
        tracking_after: bool,
    ) -> ASCOMResult<SlewHandle> {
        if !self.is_running().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        {
            let motion = self.motion.read().await;
            if motion.at_park && !matches!(target, SlewTarget::Park { .. }) {
                return Err(ASCOMError::INVALID_WHILE_PARKED);
            }
        }

        let token = self.handles.renew(CancelSlot::Goto);
        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let this = self.clone();
        tokio::task::spawn(async move {
            let result = this
                .run_slew(target, tracking_after, token, started_tx)
                .await;
            if let Err(e) = &result {
                this.record_error(e.clone());
            }
            let _ = done_tx.send(result);
        });

        // Reset-event semantics: the caller resumes only after the task
        // has observably begun.
        let _ = started_rx.await;

        Ok(SlewHandle { done: done_rx })
    }

    async fn run_slew(
        self: &Arc<Self>,
        target: SlewTarget,
        tracking_after: bool,
        mut token: CancelToken,
        started_tx: oneshot::Sender<()>,
    ) -> ASCOMResult<()> {
        let slew_type = target.slew_type();
        let queue = self.queue_handle().await?;
        let config = self.config.read().await.clone();

        let generation = {
            let mut motion = self.motion.write().await;
            motion.slew_generation += 1;
            motion.slew_state = slew_type;
            motion.is_home = false;
            motion.slew_generation
        };
        self.events.publish(MountEvent::Slewing(true));
        let _ = started_tx.send(());

        let outcome = self
            .run_slew_inner(&target, &queue, &config, &mut token)
            .await;

        // Leave the axes stationary and the state consistent, unless a
        // newer slew owns them now; its own stop phase takes over.
        let cancelled = token.is_cancelled();
        if self.motion.read().await.slew_generation == generation {
            if cancelled {
                for axis in Axis::BOTH {
                    let _ = queue.execute(CommandKind::StopInstant(axis)).await;
                }
            } else {
                for axis in Axis::BOTH {
                    let _ = queue.execute(CommandKind::Stop(axis)).await;
                }
            }
        }

        let owns_state = {
            let mut motion = self.motion.write().await;
            if motion.slew_generation == generation {
                motion.slew_state = SlewType::None;
                // The axes are stationary now; make the next rate push
                // re-send whatever tracking requires.
                motion.sent_rates = [0., 0.];
                true
            } else {
                false
            }
        };
        if owns_state {
            self.events.publish(MountEvent::Slewing(false));
        }

        match outcome {
            Ok(()) if !cancelled => {
                match &target {
                    SlewTarget::Park { .. } => self.finish_park().await,
                    SlewTarget::Home => {
                        let mut motion = self.motion.write().await;
                        motion.is_home = true;
                    }
                    _ => {}
                }
                if tracking_after && !matches!(target, SlewTarget::Park { .. }) {
                    self.set_tracking(true).await?;
                } else {
                    // Refresh the anchor so AltAz tracking follows the
                    // new pointing.
                    self.motion.write().await.predictor_anchor = None;
                }
                info!(?slew_type, "slew complete");
                Ok(())
            }
            Ok(()) => {
                debug!(?slew_type, "slew cancelled");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_slew_inner(
        self: &Arc<Self>,
        target: &SlewTarget,
        queue: &CommandQueue,
        config: &MountConfig,
        token: &mut CancelToken,
    ) -> ASCOMResult<()> {
        // Hard stop before repointing.
        for axis in Axis::BOTH {
            queue
                .execute(CommandKind::Stop(axis))
                .await
                .map_err(ASCOMError::from)?;
        }
        self.wait_axes_stopped(queue, goto_timeout(config), token)
            .await?;
        if token.is_cancelled() {
            return Ok(());
        }

        // Coarse phase.
        let target_axes = self.map_target_to_axes(target, config, Duration::ZERO).await?;
        debug!(?target_axes, "coarse goto");
        for axis in Axis::BOTH {
            queue
                .execute(CommandKind::GoToTarget(axis, target_axes[axis.index()]))
                .await
                .map_err(ASCOMError::from)?;
        }
        let stopped = self
            .wait_axes_stopped(queue, goto_timeout(config), token)
            .await?;
        if token.is_cancelled() {
            return Ok(());
        }
        if !stopped {
            return Err(ASCOMError::invalid_operation(
                "slew failed: coarse phase timed out",
            ));
        }

        if config.rates.slew_settle_time > 0 {
            let settle = Duration::from_secs(config.rates.slew_settle_time as u64);
            tokio::select! {
                _ = sleep(settle) => {}
                _ = token.cancelled() => return Ok(()),
            }
        }

        // Precision phase for sky targets only; home and park land on
        // fixed axis angles the coarse goto already hit.
        if matches!(target, SlewTarget::RaDec { .. } | SlewTarget::AltAz { .. }) {
            self.precision_phase(target, queue, config, token).await?;
        }

        Ok(())
    }

    async fn precision_phase(
        self: &Arc<Self>,
        target: &SlewTarget,
        queue: &CommandQueue,
        config: &MountConfig,
        token: &mut CancelToken,
    ) -> ASCOMResult<()> {
        let damping = damping(config);
        let precision = config.rates.goto_precision;
        // Only an AltAz mount chases a drifting target; equatorial
        // mounts correct against the current reading.
        let lookahead = if config.geometry.alignment_mode == AlignmentMode::AltAz {
            Duration::from_millis(config.loops.display_interval_millis)
        } else {
            Duration::ZERO
        };

        for iteration in 0..PRECISION_ITERATIONS {
            if token.is_cancelled() {
                return Ok(());
            }

            // Correct against a fresh reading, extrapolated forward for
            // a moving AltAz target.
            let current = self
                .axes
                .update_steps(queue)
                .await
                .map_err(ASCOMError::from)?;
            let target_axes = self.map_target_to_axes(target, config, lookahead).await?;

            let mut done = true;
            for axis in Axis::BOTH {
                let i = axis.index();
                let delta = astro_math::range_180(target_axes[i] - current[i]);
                if delta.abs() < precision {
                    continue;
                }
                done = false;
                let corrected = target_axes[i] + damping[i] * delta;
                debug!(iteration, ?axis, delta, corrected, "precision correction");
                queue
                    .execute(CommandKind::GoToTarget(axis, corrected))
                    .await
                    .map_err(ASCOMError::from)?;
            }
            if done {
                return Ok(());
            }

            self.wait_axes_stopped(queue, PRECISION_POLL_TIMEOUT, token)
                .await?;
        }
        Ok(())
    }

    /// Polls the full-stop flag on both axes. Returns false on timeout;
    /// cancellation resolves the wait immediately.
    async fn wait_axes_stopped(
        &self,
        queue: &CommandQueue,
        timeout: Duration,
        token: &mut CancelToken,
    ) -> ASCOMResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut poll = interval(GOTO_POLL);
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(true),
                _ = poll.tick() => {}
            }
            let mut stopped = true;
            for axis in Axis::BOTH {
                let value = queue
                    .execute(CommandKind::ReadStopped(axis))
                    .await
                    .map_err(ASCOMError::from)?;
                stopped &= value.as_bool().unwrap_or(false);
            }
            if stopped {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    /// Maps a slew target to mount-frame axis angles, applying the
    /// alignment adapter for sky targets. `lookahead` shifts the epoch
    /// forward so a correction aims at where the target will be.
    pub(in crate::mount_control) async fn map_target_to_axes(
        &self,
        target: &SlewTarget,
        config: &MountConfig,
        lookahead: Duration,
    ) -> ASCOMResult<AxesXY> {
        let ctx = config.coord_context();
        let app = match target {
            SlewTarget::RaDec { ra, dec } => {
                // Anchor the predictor on the slew target: the
                // precision loop extrapolates through the predictor's
                // own solve, and AltAz tracking resumes on the same
                // point the goto converged on.
                let offsets = {
                    let mut motion = self.motion.write().await;
                    motion.predictor_anchor = Some((*ra, *dec));
                    (motion.ra_rate_offset, motion.dec_rate_offset)
                };
                let app = tracking::predict_axes_app(
                    (*ra, *dec),
                    offsets,
                    lookahead,
                    self.utc_now().await,
                    &ctx,
                );
                self.alignment.map_to_synced(app)
            }
            SlewTarget::AltAz { az, alt } => astro_math::azalt_to_axes_xy(*az, *alt, &ctx),
            SlewTarget::Home => return Ok(self.home_axes_mount(config)),
            SlewTarget::Park { name } => {
                let axes = match name {
                    Some(n) => config
                        .home_park
                        .park_position(n)
                        .map(|p| [p.x, p.y])
                        .ok_or_else(|| {
                            ASCOMError::invalid_value(format_args!("unknown park position {:?}", n))
                        })?,
                    None => config.home_park.selected_park_axes(),
                };
                return Ok(axes);
            }
        };
        Ok(astro_math::axes_app_to_mount(app, &ctx))
    }

    /// Pier side from the secondary-axis flip encoding.
    pub(in crate::mount_control) fn pier_side_for_axes(
        axes: AxesXY,
        alignment: AlignmentMode,
    ) -> PierSide {
        match alignment {
            AlignmentMode::GermanPolar => {
                if axes[1] > 90. || axes[1] < -90. {
                    PierSide::West
                } else {
                    PierSide::East
                }
            }
            _ => PierSide::Unknown,
        }
    }

    /// Predicted pointing state for a target, per the same flip window
    /// the slew mapping uses.
    pub async fn destination_side_of_pier(
        &self,
        ra: Hours,
        dec: Degrees,
    ) -> ASCOMResult<PierSide> {
        let ctx = self.coord_context().await;
        let lst = ctx.local_sidereal_time(self.utc_now().await);
        let axes = astro_math::radec_to_axes_xy(ra, dec, lst, &ctx);
        Ok(Self::pier_side_for_axes(axes, ctx.alignment))
    }
}
