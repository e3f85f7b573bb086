//! The mount controller: canonical state, lifecycle, and the public
//! contract the Alpaca adapter calls into.
//!
//! Composes the hardware driver (behind its command queue), the axis
//! state, the slew and tracking engines, the limit monitor and the
//! alignment adapter. One value owns everything; adapters hold an `Arc`.

pub mod alignment;
pub mod axes;
pub mod driver;
pub mod guide;
pub mod limits;
pub mod parking;
pub mod pec;
pub mod queue;
pub mod slew;
pub mod tracking;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use ascom_alpaca::{ASCOMError, ASCOMResult};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::astro_math::{self, AxesXY, CoordContext, Degrees, Hours};
use crate::config::{MountConfig, MountKind};
use crate::util::{
    Axis, CancellationHandles, DriveRate, DriverError, EventChannel, MountEvent, PierSide,
    RunState, SlewType,
};
use alignment::{AlignmentAdapter, IdentityAlignment};
use axes::AxesState;
use driver::{CommandKind, DriverInfo, MountDriver, SerialSkyWatcher, Simulator};
use pec::PecState;
use queue::{CommandQueue, SharedDriver};

/// Within this window of raw (0, 0) the mount is assumed to have powered
/// on without being moved, and the configured home position is written
/// back to it.
const POWER_ON_WINDOW_DEG: Degrees = 0.1;
/// Position-read attempts during mount connect before accepting defaults.
const CONNECT_POSITION_RETRIES: usize = 5;
/// Bounded wait for both axes to report stopped during shutdown.
const STOP_VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Overrides the reported gearing for mounts with non-standard worm
/// trains; the step factor follows the replacement count.
fn apply_custom_gearing(info: &mut DriverInfo, config: &MountConfig) {
    if !config.gearing.enabled {
        return;
    }
    let overrides = [
        config.gearing.steps_per_rev_x,
        config.gearing.steps_per_rev_y,
    ];
    for axis in Axis::BOTH {
        if let Some(steps) = overrides[axis.index()] {
            info.steps_per_rev[axis.index()] = steps;
            info.factor_step[axis.index()] = 360. / steps as f64;
        }
    }
}

/// Latched RA/Dec target for slew-to-target and sync-to-target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetCoords {
    pub ra: Option<Hours>,
    pub dec: Option<Degrees>,
}

/// Mutable mount state shared between the engines.
#[derive(Debug)]
pub(in crate::mount_control) struct MotionState {
    pub slew_state: SlewType,
    /// Bumped by each new goto; a superseded slew task recognises that
    /// the state no longer belongs to it and leaves cleanup to its
    /// successor.
    pub slew_generation: u64,
    pub tracking: bool,
    pub tracking_rate: DriveRate,
    /// Client rate offsets, arcseconds per second.
    pub ra_rate_offset: f64,
    pub dec_rate_offset: f64,
    /// Continuous move-axis rates, degrees per second, app frame.
    pub move_axis_rate: [f64; 2],
    /// Active pulse-guide rate deltas, degrees per second.
    pub pulse_rate: [f64; 2],
    /// Rates last written to the driver, mount frame.
    pub sent_rates: [f64; 2],
    pub at_park: bool,
    pub is_home: bool,
    pub pier_side: PierSide,
    pub target: TargetCoords,
    pub sidereal_time: Hours,
    pub lha: Hours,
    /// Latest PEC rate correction, degrees per second.
    pub pec_rate: f64,
    /// Set on a PEC bin crossing; the next rate push goes to the driver
    /// even when the composed value is inside the quantisation epsilon.
    pub pec_dirty: bool,
    /// RA/Dec the AltAz predictor steers toward while tracking.
    pub predictor_anchor: Option<(Hours, Degrees)>,
    /// Tracking state to restore when unparking with auto-track.
    pub tracking_before_park: bool,
    /// Client-set offset of the mount clock from system UTC.
    pub date_offset: chrono::Duration,
}

impl MotionState {
    fn new() -> Self {
        Self {
            slew_state: SlewType::None,
            slew_generation: 0,
            tracking: false,
            tracking_rate: DriveRate::Sidereal,
            ra_rate_offset: 0.,
            dec_rate_offset: 0.,
            move_axis_rate: [0., 0.],
            pulse_rate: [0., 0.],
            sent_rates: [0., 0.],
            at_park: false,
            is_home: false,
            pier_side: PierSide::Unknown,
            target: TargetCoords::default(),
            sidereal_time: 0.,
            lha: 0.,
            pec_rate: 0.,
            pec_dirty: false,
            predictor_anchor: None,
            tracking_before_park: false,
            date_offset: chrono::Duration::zero(),
        }
    }
}

pub struct MountController {
    pub(in crate::mount_control) config: RwLock<MountConfig>,
    pub(in crate::mount_control) events: EventChannel,
    pub(in crate::mount_control) handles: CancellationHandles,
    pub(in crate::mount_control) axes: AxesState,
    pub(in crate::mount_control) motion: RwLock<MotionState>,
    pub(in crate::mount_control) alignment: Box<dyn AlignmentAdapter>,
    pub(in crate::mount_control) pec: StdMutex<PecState>,

    run_state: RwLock<RunState>,
    driver: StdMutex<Option<SharedDriver>>,
    pub(in crate::mount_control) queue: RwLock<Option<CommandQueue>>,
    timers: StdMutex<Vec<JoinHandle<()>>>,
    /// Non-reentrant display-tick guard; overruns are counted, not queued.
    pub(in crate::mount_control) tick_lock: tokio::sync::Mutex<()>,
    pub(in crate::mount_control) altaz_tick_active: AtomicBool,
    last_error: StdMutex<Option<ASCOMError>>,
    alert: AtomicBool,
}

impl MountController {
    pub fn new(config: MountConfig) -> Arc<Self> {
        let events = EventChannel::new();
        Arc::new(MountController {
            config: RwLock::new(config),
            events: events.clone(),
            handles: CancellationHandles::new(),
            axes: AxesState::new(events),
            motion: RwLock::new(MotionState::new()),
            alignment: Box::new(IdentityAlignment),
            pec: StdMutex::new(PecState::new()),
            run_state: RwLock::new(RunState::Disconnected),
            driver: StdMutex::new(None),
            queue: RwLock::new(None),
            timers: StdMutex::new(Vec::new()),
            tick_lock: tokio::sync::Mutex::new(()),
            altaz_tick_active: AtomicBool::new(false),
            last_error: StdMutex::new(None),
            alert: AtomicBool::new(false),
        })
    }

    /* State inspection */

    pub async fn run_state(&self) -> RunState {
        *self.run_state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.run_state().await.is_connected()
    }

    pub async fn is_running(&self) -> bool {
        self.run_state().await.is_running()
    }

    pub async fn is_slewing(&self) -> bool {
        self.motion.read().await.slew_state.is_slewing()
    }

    pub async fn slew_state(&self) -> SlewType {
        self.motion.read().await.slew_state
    }

    pub fn get_last_error(&self) -> Option<ASCOMError> {
        self.last_error.lock().unwrap().clone()
    }

    pub fn alert_latched(&self) -> bool {
        self.alert.load(Ordering::Acquire)
    }

    pub fn clear_alert(&self) {
        self.alert.store(false, Ordering::Release);
    }

    pub(in crate::mount_control) fn record_error(&self, error: ASCOMError) {
        error!(%error, "mount error");
        *self.last_error.lock().unwrap() = Some(error);
        self.alert.store(true, Ordering::Release);
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub async fn config_snapshot(&self) -> MountConfig {
        self.config.read().await.clone()
    }

    /// Installs a new configuration snapshot. Connection-level changes
    /// take effect on the next Start.
    pub async fn update_config(&self, config: MountConfig) {
        *self.config.write().await = config;
    }

    pub async fn coord_context(&self) -> CoordContext {
        self.config.read().await.coord_context()
    }

    pub(in crate::mount_control) async fn queue_handle(&self) -> ASCOMResult<CommandQueue> {
        self.queue
            .read()
            .await
            .clone()
            .ok_or_else(|| ASCOMError::NOT_CONNECTED)
    }

    fn driver_handle(&self) -> Result<SharedDriver, DriverError> {
        self.driver
            .lock()
            .unwrap()
            .clone()
            .ok_or(DriverError::NotConnected)
    }

    /* Lifecycle */

    /// Opens the configured driver and performs the handshake. Returns
    /// false (after recording the error) when the mount cannot be
    /// reached.
    pub async fn connect(&self) -> bool {
        {
            let state = self.run_state.read().await;
            if state.is_connected() {
                return true;
            }
        }

        let config = self.config.read().await.clone();
        let driver: Box<dyn MountDriver> = match config.connection.mount_kind {
            MountKind::Simulator => Box::new(Simulator::new()),
            MountKind::SkyWatcher => Box::new(SerialSkyWatcher::new(
                config.connection.port.clone(),
                config.connection.baud_rate,
                Duration::from_millis(config.connection.timeout_millis as u64),
            )),
        };
        let shared: SharedDriver = Arc::new(StdMutex::new(driver));

        let init_result = {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || {
                let mut driver = shared.lock().unwrap();
                driver.initialize()?;
                driver.info().cloned()
            })
            .await
            .unwrap_or(Err(DriverError::QueueFailed))
        };

        let mut info = match init_result {
            Ok(info) => info,
            Err(e) => {
                self.record_error(e.into());
                return false;
            }
        };
        apply_custom_gearing(&mut info, &config);
        info!(mount = %info.mount_name, firmware = %info.firmware, "connected");

        let low_voltage = {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || shared.lock().unwrap().low_voltage())
                .await
                .unwrap_or(false)
        };
        if low_voltage {
            self.events.publish(MountEvent::Alert(
                "mount reports low supply voltage".to_string(),
            ));
        }

        self.axes.set_info(info).await;
        *self.driver.lock().unwrap() = Some(shared);
        *self.run_state.write().await = RunState::Connected;
        self.events.publish(MountEvent::RunState(RunState::Connected));

        // Park state survives power cycles.
        self.motion.write().await.at_park = config.home_park.at_park;

        true
    }

    pub async fn disconnect(&self) {
        if self.is_running().await {
            let _ = self.stop().await;
        }
        let taken = self.driver.lock().unwrap().take();
        if let Some(shared) = taken {
            let _ = tokio::task::spawn_blocking(move || {
                shared.lock().unwrap().shutdown();
            })
            .await;
        }
        self.axes.clear().await;
        *self.run_state.write().await = RunState::Disconnected;
        self.events
            .publish(MountEvent::RunState(RunState::Disconnected));
    }

    /// Brings the mount to Running: starts the queue, runs the connect
    /// setup, then arms the timers. Any failure rolls back to Stop and
    /// leaves the controller Faulted.
    pub async fn start(self: &Arc<Self>) -> ASCOMResult<()> {
        {
            let state = self.run_state.read().await;
            match *state {
                RunState::Connected => {}
                RunState::Running => return Ok(()),
                RunState::Faulted => {
                    return Err(ASCOMError::invalid_operation(
                        "mount is faulted; stop before starting again",
                    ))
                }
                _ => return Err(ASCOMError::NOT_CONNECTED),
            }
        }

        // A previous Stop shuts the driver down; reopen if needed.
        let shared = self.driver_handle().map_err(ASCOMError::from)?;
        let reinit = {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || {
                let mut driver = shared.lock().unwrap();
                if driver.is_initialized() {
                    return Ok(None);
                }
                driver.initialize()?;
                driver.info().cloned().map(Some)
            })
            .await
            .unwrap_or(Err(DriverError::QueueFailed))
        };
        match reinit {
            Ok(Some(mut info)) => {
                apply_custom_gearing(&mut info, &*self.config.read().await);
                self.axes.set_info(info).await;
            }
            Ok(None) => {}
            Err(e) => {
                *self.run_state.write().await = RunState::Faulted;
                return Err(ASCOMError::from(e));
            }
        }

        let queue = CommandQueue::start(shared, self.events.clone());
        *self.queue.write().await = Some(queue.clone());

        if let Err(e) = self.mount_connect_setup(&queue).await {
            self.record_error(e.clone().into());
            *self.queue.write().await = None;
            queue.stop().await;
            *self.run_state.write().await = RunState::Faulted;
            return Err(e.into());
        }

        self.start_timers();
        *self.run_state.write().await = RunState::Running;
        self.events.publish(MountEvent::RunState(RunState::Running));
        info!("mount running");
        Ok(())
    }

    /// Position bring-up policy: if the mount reads close to raw (0, 0),
    /// or it was parked, install the configured positions; otherwise
    /// trust the counters. Reads are retried before defaults win.
    async fn mount_connect_setup(&self, queue: &CommandQueue) -> Result<(), DriverError> {
        let config = self.config.read().await.clone();

        let mut position: Option<AxesXY> = None;
        for attempt in 1..=CONNECT_POSITION_RETRIES {
            match self.axes.update_steps(queue).await {
                Ok(mount) => {
                    position = Some(mount);
                    break;
                }
                Err(e) if attempt == CONNECT_POSITION_RETRIES => {
                    warn!(error = %e, "position read failed {} times; accepting defaults", attempt);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "position read failed, retrying");
                }
            }
        }

        let at_park = config.home_park.at_park;
        let near_zero = position
            .map(|p| p[0].abs() <= POWER_ON_WINDOW_DEG && p[1].abs() <= POWER_ON_WINDOW_DEG)
            .unwrap_or(true);

        if near_zero || at_park {
            let axes = if at_park {
                config.home_park.selected_park_axes()
            } else {
                self.home_axes_mount(&config)
            };
            for axis in Axis::BOTH {
                queue
                    .execute(CommandKind::SetPosition(axis, axes[axis.index()]))
                    .await?;
            }
            self.axes.update_steps(queue).await?;
        }

        // ST4 rate quantised to the controller's five steps.
        let st4_index = (config.guiding.st4_guide_rate * 4.).round().clamp(0., 4.) as u8;
        match queue.execute(CommandKind::SetSt4GuideRate(st4_index)).await {
            Ok(_) | Err(DriverError::Unimplemented) => {}
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Home position in the mount frame, with the alignment-mode
    /// adjustments applied.
    pub(in crate::mount_control) fn home_axes_mount(&self, config: &MountConfig) -> AxesXY {
        let ctx = config.coord_context();
        let home = config.home_park.home_axes();
        astro_math::axes_app_to_mount(home, &ctx)
    }

    /// Ordered teardown: cancel tokens, stop timers, validate the axes
    /// are stationary, drain the queue, shut the driver.
    pub async fn stop(&self) -> ASCOMResult<()> {
        {
            let mut state = self.run_state.write().await;
            if !matches!(*state, RunState::Running | RunState::Faulted) {
                return Ok(());
            }
            *state = RunState::Stopping;
        }
        self.events.publish(MountEvent::RunState(RunState::Stopping));

        self.motion.write().await.tracking = false;
        self.events.publish(MountEvent::Tracking(false));
        self.handles.cancel_all();

        self.stop_timers();

        if let Some(queue) = self.queue.read().await.clone() {
            if let Err(e) = self.axes_stop_validate(&queue).await {
                warn!(error = %e, "axes did not confirm stopped during shutdown");
            }
            queue.stop().await;
        }
        *self.queue.write().await = None;

        if let Ok(shared) = self.driver_handle() {
            let _ = tokio::task::spawn_blocking(move || {
                shared.lock().unwrap().shutdown();
            })
            .await;
        }

        {
            let mut motion = self.motion.write().await;
            motion.slew_state = SlewType::None;
            motion.move_axis_rate = [0., 0.];
            motion.sent_rates = [0., 0.];
        }

        *self.run_state.write().await = RunState::Connected;
        self.events.publish(MountEvent::RunState(RunState::Connected));
        info!("mount stopped");
        Ok(())
    }

    /// Stops both axes and polls the full-stop flag, retrying the stop,
    /// for up to five seconds.
    pub(in crate::mount_control) async fn axes_stop_validate(
        &self,
        queue: &CommandQueue,
    ) -> Result<(), DriverError> {
        let deadline = Instant::now() + STOP_VALIDATE_TIMEOUT;
        loop {
            for axis in Axis::BOTH {
                let _ = queue.execute(CommandKind::Stop(axis)).await;
            }
            let mut stopped = true;
            for axis in Axis::BOTH {
                match queue.execute(CommandKind::ReadStopped(axis)).await {
                    Ok(v) => stopped &= v.as_bool().unwrap_or(false),
                    Err(e) => return Err(e),
                }
            }
            if stopped {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::AxisBusy);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Re-seats the axis counters on the configured home position.
    pub async fn reset(&self) -> ASCOMResult<()> {
        let queue = self.queue_handle().await?;
        let config = self.config.read().await.clone();
        let home = self.home_axes_mount(&config);
        for axis in Axis::BOTH {
            queue
                .execute(CommandKind::SetPosition(axis, home[axis.index()]))
                .await
                .map_err(ASCOMError::from)?;
        }
        self.axes.update_steps(&queue).await.map_err(ASCOMError::from)?;
        Ok(())
    }

    /// Bypasses the queue: instant stop on the wire, every cancellation
    /// source fired, state latched Faulted until Stop/Start.
    pub async fn emergency_stop(&self) -> ASCOMResult<()> {
        self.handles.cancel_all();

        let shared = self.driver_handle().map_err(ASCOMError::from)?;
        let result = tokio::task::spawn_blocking(move || {
            let mut driver = shared.lock().unwrap();
            driver.send_command(&driver::Command {
                id: 0,
                kind: CommandKind::EmergencyStop,
            })
        })
        .await
        .unwrap_or(Err(DriverError::QueueFailed));

        {
            let mut motion = self.motion.write().await;
            motion.slew_state = SlewType::None;
            motion.tracking = false;
            motion.move_axis_rate = [0., 0.];
            motion.sent_rates = [0., 0.];
        }
        *self.run_state.write().await = RunState::Faulted;
        self.events.publish(MountEvent::RunState(RunState::Faulted));
        self.record_error(ASCOMError::invalid_operation("emergency stop"));

        result.map(|_| ()).map_err(ASCOMError::from)
    }

    fn start_timers(self: &Arc<Self>) {
        let mut timers = self.timers.lock().unwrap();
        timers.push(tokio::task::spawn(tracking::display_loop(self.clone())));
        timers.push(tokio::task::spawn(tracking::altaz_predictor_loop(
            self.clone(),
        )));
    }

    fn stop_timers(&self) {
        for handle in self.timers.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    /* Position reporting */

    /// Current app-frame axis angles, through the alignment adapter.
    pub(in crate::mount_control) async fn current_axes_app(&self) -> AxesXY {
        let ctx = self.coord_context().await;
        let app = self.axes.degrees_app(&ctx).await;
        self.alignment.map_to_unsynced(app)
    }

    pub async fn right_ascension(&self) -> ASCOMResult<Hours> {
        let (ra, _dec) = self.current_radec().await?;
        Ok(ra)
    }

    pub async fn declination(&self) -> ASCOMResult<Degrees> {
        let (_ra, dec) = self.current_radec().await?;
        Ok(dec)
    }

    pub(in crate::mount_control) async fn current_radec(&self) -> ASCOMResult<(Hours, Degrees)> {
        if !self.is_connected().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        let ctx = self.coord_context().await;
        let lst = ctx.local_sidereal_time(self.utc_now().await);
        let axes = self.current_axes_app().await;
        Ok(astro_math::axes_xy_to_radec(axes, lst, &ctx))
    }

    pub async fn altitude(&self) -> ASCOMResult<Degrees> {
        let (_az, alt) = self.current_azalt().await?;
        Ok(alt)
    }

    pub async fn azimuth(&self) -> ASCOMResult<Degrees> {
        let (az, _alt) = self.current_azalt().await?;
        Ok(az)
    }

    pub(in crate::mount_control) async fn current_azalt(&self) -> ASCOMResult<(Degrees, Degrees)> {
        if !self.is_connected().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        let ctx = self.coord_context().await;
        let lst = ctx.local_sidereal_time(self.utc_now().await);
        let axes = self.current_axes_app().await;
        Ok(astro_math::axes_xy_to_azalt(axes, lst, &ctx))
    }

    /// Mount clock: system UTC plus the client-set offset.
    pub async fn utc_now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() + self.motion.read().await.date_offset
    }

    pub async fn utc_date(&self) -> std::time::SystemTime {
        let offset = self.motion.read().await.date_offset;
        let now = std::time::SystemTime::now();
        match offset.to_std() {
            Ok(ahead) => now + ahead,
            Err(_) => now - (-offset).to_std().unwrap_or(Duration::ZERO),
        }
    }

    pub async fn set_utc_date(&self, date: std::time::SystemTime) -> ASCOMResult<()> {
        let target: chrono::DateTime<chrono::Utc> = date.into();
        self.motion.write().await.date_offset = target - chrono::Utc::now();
        Ok(())
    }

    pub async fn sidereal_time(&self) -> ASCOMResult<Hours> {
        let ctx = self.coord_context().await;
        let now = self.utc_now().await;
        Ok(ctx.local_sidereal_time(now))
    }

    pub async fn side_of_pier(&self) -> ASCOMResult<PierSide> {
        Ok(self.motion.read().await.pier_side)
    }

    pub async fn at_park(&self) -> bool {
        self.motion.read().await.at_park
    }

    pub async fn is_home(&self) -> bool {
        self.motion.read().await.is_home
    }

    /* Latched target */

    pub async fn target_ra(&self) -> ASCOMResult<Hours> {
        self.motion
            .read()
            .await
            .target
            .ra
            .ok_or_else(|| ASCOMError::VALUE_NOT_SET)
    }

    pub async fn set_target_ra(&self, ra: Hours) -> ASCOMResult<()> {
        crate::util::check_ra(ra)?;
        self.motion.write().await.target.ra = Some(ra);
        Ok(())
    }

    pub async fn target_dec(&self) -> ASCOMResult<Degrees> {
        self.motion
            .read()
            .await
            .target
            .dec
            .ok_or_else(|| ASCOMError::VALUE_NOT_SET)
    }

    pub async fn set_target_dec(&self, dec: Degrees) -> ASCOMResult<()> {
        crate::util::check_dec(dec)?;
        self.motion.write().await.target.dec = Some(dec);
        Ok(())
    }

    /// The eight discrete hand-controller speeds.
    pub async fn slew_speeds(&self) -> [Degrees; 8] {
        self.config.read().await.rates.slew_speeds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driver::MountFeatures;

    #[test]
    fn custom_gearing_overrides_step_factor() {
        let mut info = DriverInfo {
            mount_name: "test".to_string(),
            firmware: "1".to_string(),
            steps_per_rev: [11_136_000; 2],
            worm_steps_per_rev: [61_866.7; 2],
            factor_step: [360. / 11_136_000.; 2],
            steps_time_freq: [64_935.; 2],
            features: MountFeatures::default(),
        };
        let mut config = MountConfig::default();
        config.gearing.enabled = true;
        config.gearing.steps_per_rev_x = Some(9_024_000);

        apply_custom_gearing(&mut info, &config);
        assert_eq!(info.steps_per_rev[0], 9_024_000);
        assert!((info.factor_step[0] - 360. / 9_024_000.).abs() < 1e-15);
        // The untouched axis keeps the reported gearing.
        assert_eq!(info.steps_per_rev[1], 11_136_000);
    }

    #[test]
    fn custom_gearing_ignored_when_disabled() {
        let mut info = DriverInfo {
            mount_name: "test".to_string(),
            firmware: "1".to_string(),
            steps_per_rev: [11_136_000; 2],
            worm_steps_per_rev: [61_866.7; 2],
            factor_step: [360. / 11_136_000.; 2],
            steps_time_freq: [64_935.; 2],
            features: MountFeatures::default(),
        };
        let mut config = MountConfig::default();
        config.gearing.steps_per_rev_x = Some(9_024_000);

        apply_custom_gearing(&mut info, &config);
        assert_eq!(info.steps_per_rev[0], 11_136_000);
    }
}
