//! Serial driver for SkyWatcher motor controllers.
//!
//! The controller speaks the colon-framed ASCII protocol in
//! [`protocol`]; this module owns the port, the per-axis motion-mode
//! cache and the retry policy. All entry points run on the command-queue
//! worker; the wire itself is additionally guarded by the mutex wrapped
//! around the driver object so an emergency stop can never interleave
//! with a half-written frame.

pub mod protocol;

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::astro_math::Degrees;
use crate::mount_control::driver::{
    Command, CommandKind, DriverInfo, MountDriver, MountFeatures, ResultValue,
};
use crate::util::{Axis, DriverError};
use protocol::{McStatus, TERM};

const NUM_TRIES: usize = 3;
const RETRY_BASE_MILLIS: u64 = 10;
pub const DEFAULT_BAUD: u32 = 9600;

/// Above this rate the controller runs in high-speed (reduced
/// microstepping) mode.
const FAST_THRESHOLD_DEG_S: f64 = 0.4;
/// Gotos shorter than this stay in slow mode for accuracy.
const SLOW_GOTO_WINDOW_DEG: Degrees = 5.0;
/// Bounded wait for an axis to report stopped before a mode change.
const MODE_CHANGE_STOP_TIMEOUT: Duration = Duration::from_secs(3);

pub const SERIAL_GOTO_TIMEOUT_SECS: u64 = 240;
/// Empirical precision-phase damping, primary then secondary.
pub const SERIAL_DAMPING: [f64; 2] = [0.25, 0.10];

#[derive(Debug, Copy, Clone, Default)]
struct MotionSetup {
    tracking: bool,
    ccw: bool,
    fast: bool,
    running: bool,
}

pub struct SerialSkyWatcher {
    port_path: Option<String>,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
    info: Option<DriverInfo>,
    motion: [MotionSetup; 2],
    high_speed_ratio: [f64; 2],
    last_error: Option<DriverError>,
    low_voltage: bool,
}

impl SerialSkyWatcher {
    pub fn new(port_path: Option<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_path,
            baud_rate,
            timeout,
            port: None,
            info: None,
            motion: [MotionSetup::default(); 2],
            high_speed_ratio: [16., 16.],
            last_error: None,
            low_voltage: false,
        }
    }

    fn open_port(&mut self) -> Result<(), DriverError> {
        let path = match &self.port_path {
            Some(p) => p.clone(),
            None => Self::probe_port(self.baud_rate, self.timeout)?,
        };
        let port = serialport::new(&path, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::NoDevice => DriverError::MountNotFound,
                serialport::ErrorKind::Io(_) => DriverError::SerialPortBusy,
                _ => DriverError::SerialFailed(e.description),
            })?;
        self.port = Some(port);
        Ok(())
    }

    /// Tries every serial port on the machine until one answers the
    /// firmware query.
    fn probe_port(baud_rate: u32, timeout: Duration) -> Result<String, DriverError> {
        let ports = serialport::available_ports()
            .map_err(|e| DriverError::SerialFailed(e.description))?;
        for candidate in ports {
            let Ok(mut port) = serialport::new(&candidate.port_name, baud_rate)
                .timeout(timeout)
                .open()
            else {
                continue;
            };
            if Self::transact_on(&mut port, 'e', Axis::Primary, "", timeout).is_ok() {
                warn!(port = %candidate.port_name, "found mount on probed port");
                return Ok(candidate.port_name);
            }
        }
        Err(DriverError::MountNotFound)
    }

    fn transact_on(
        port: &mut Box<dyn serialport::SerialPort>,
        cmd: char,
        axis: Axis,
        payload: &str,
        timeout: Duration,
    ) -> Result<String, DriverError> {
        let frame = protocol::frame(cmd, axis, payload);
        port.write_all(&frame)
            .map_err(|e| DriverError::SerialFailed(e.to_string()))?;

        let mut line = Vec::with_capacity(16);
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(1) => {
                    if byte[0] == TERM {
                        break;
                    }
                    line.push(byte[0]);
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        return Err(DriverError::SerialFailed("response timeout".to_string()));
                    }
                }
                Err(e) => return Err(DriverError::SerialFailed(e.to_string())),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::SerialFailed("response timeout".to_string()));
            }
        }
        protocol::parse_response(&line)
    }

    /// One protocol exchange with transient-failure retry. Mount-reported
    /// errors are not transient and surface immediately.
    fn transact(&mut self, cmd: char, axis: Axis, payload: &str) -> Result<String, DriverError> {
        let port = self.port.as_mut().ok_or(DriverError::NotConnected)?;
        let timeout = self.timeout;

        let result = retry::retry(
            retry::delay::Exponential::from_millis(RETRY_BASE_MILLIS).take(NUM_TRIES - 1),
            || match Self::transact_on(port, cmd, axis, payload, timeout) {
                Ok(v) => retry::OperationResult::Ok(v),
                Err(DriverError::SerialFailed(msg)) => {
                    warn!(command = %cmd, %msg, "serial exchange failed, retrying");
                    retry::OperationResult::Retry(DriverError::SerialFailed(msg))
                }
                Err(e) => retry::OperationResult::Err(e),
            },
        );

        match result {
            Ok(v) => Ok(v),
            Err(retry::Error::Operation { error, .. }) => {
                let error = match error {
                    DriverError::SerialFailed(_) => DriverError::TooManyRetries,
                    other => other,
                };
                self.last_error = Some(error.clone());
                Err(error)
            }
            Err(_) => Err(DriverError::QueueFailed),
        }
    }

    fn read_status(&mut self, axis: Axis) -> Result<McStatus, DriverError> {
        let payload = self.transact('f', axis, "")?;
        let status = protocol::decode_status(&payload)?;
        self.motion[axis.index()].running = status.running;
        Ok(status)
    }

    fn read_steps(&mut self, axis: Axis) -> Result<i64, DriverError> {
        let payload = self.transact('j', axis, "")?;
        protocol::decode_counter(&payload)
    }

    fn info_ref(&self) -> Result<&DriverInfo, DriverError> {
        self.info.as_ref().ok_or(DriverError::NotConnected)
    }

    fn factor(&self, axis: Axis) -> Result<f64, DriverError> {
        Ok(self.info_ref()?.factor_step[axis.index()])
    }

    /// Step-period preset for `:I` producing `rate_deg_s` on this axis.
    fn step_period_preset(
        rate_deg_s: f64,
        steps_per_rev: i64,
        timer_freq: f64,
        high_speed_ratio: f64,
        fast: bool,
    ) -> u32 {
        let steps_per_sec = rate_deg_s.abs() * steps_per_rev as f64 / 360.;
        if steps_per_sec <= 0. {
            return 0xFF_FFFF;
        }
        let commanded = if fast {
            timer_freq * high_speed_ratio / steps_per_sec
        } else {
            timer_freq / steps_per_sec
        };
        (commanded.round() as u32).clamp(1, 0xFF_FFFF)
    }

    /// Ramped stop and bounded wait for the full-stop flag; mode changes
    /// are rejected by the controller while the motor runs.
    fn stop_and_wait(&mut self, axis: Axis) -> Result<(), DriverError> {
        self.transact('K', axis, "")?;
        let deadline = Instant::now() + MODE_CHANGE_STOP_TIMEOUT;
        loop {
            let status = self.read_status(axis)?;
            if !status.running {
                self.motion[axis.index()].running = false;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::AxisBusy);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn start_motion(&mut self, axis: Axis, rate_deg_s: f64) -> Result<(), DriverError> {
        if rate_deg_s == 0. {
            return self.stop_and_wait(axis);
        }
        let info = self.info_ref()?;
        let steps_per_rev = info.steps_per_rev[axis.index()];
        let timer_freq = info.steps_time_freq[axis.index()];
        let ratio = self.high_speed_ratio[axis.index()];
        let fast = rate_deg_s.abs() > FAST_THRESHOLD_DEG_S;
        let ccw = rate_deg_s < 0.;
        let preset = Self::step_period_preset(rate_deg_s, steps_per_rev, timer_freq, ratio, fast);

        let setup = self.motion[axis.index()];
        let same_mode = setup.running && setup.tracking && setup.ccw == ccw && setup.fast == fast;

        if same_mode {
            // Rate tweaks in the same mode are allowed on the fly.
            self.transact('I', axis, &protocol::encode_u24(preset))?;
        } else {
            self.stop_and_wait(axis)?;
            self.transact('G', axis, &protocol::encode_motion_mode(false, fast, ccw))?;
            self.transact('I', axis, &protocol::encode_u24(preset))?;
            self.transact('J', axis, "")?;
        }

        self.motion[axis.index()] = MotionSetup {
            tracking: true,
            ccw,
            fast,
            running: true,
        };
        Ok(())
    }

    fn goto_target(&mut self, axis: Axis, target_deg: Degrees) -> Result<(), DriverError> {
        let factor = self.factor(axis)?;
        let current = self.read_steps(axis)? as f64 * factor;
        let delta = target_deg - current;
        let fast = delta.abs() > SLOW_GOTO_WINDOW_DEG;
        let ccw = delta < 0.;
        let target_steps = (target_deg / factor).round() as i64;

        self.stop_and_wait(axis)?;
        self.transact('G', axis, &protocol::encode_motion_mode(true, fast, ccw))?;
        self.transact('S', axis, &protocol::encode_counter(target_steps))?;
        self.transact('J', axis, "")?;

        self.motion[axis.index()] = MotionSetup {
            tracking: false,
            ccw,
            fast,
            running: true,
        };
        Ok(())
    }

    fn handshake_axis(&mut self, axis: Axis) -> Result<(i64, f64, f64, f64), DriverError> {
        let steps = protocol::decode_u24(&self.transact('a', axis, "")?)? as i64;
        let freq = protocol::decode_u24(&self.transact('b', axis, "")?)? as f64;
        let worm = protocol::decode_u24(&self.transact('s', axis, "")?)? as f64;
        let ratio = protocol::decode_u8(&self.transact('g', axis, "")?)? as f64;
        if steps <= 0 {
            return Err(DriverError::InvalidData(format!(
                "steps per revolution {} on {:?}",
                steps, axis
            )));
        }
        Ok((steps, freq, worm, ratio.max(1.)))
    }
}

impl MountDriver for SerialSkyWatcher {
    fn initialize(&mut self) -> Result<(), DriverError> {
        if self.info.is_some() {
            return Err(DriverError::AlreadyConnected);
        }
        self.open_port()?;

        let firmware = self.transact('e', Axis::Primary, "")?;

        let (steps_x, freq_x, worm_x, ratio_x) =
            self.handshake_axis(Axis::Primary).map_err(|e| match e {
                DriverError::TooManyRetries => DriverError::NoResponseAxis1,
                other => other,
            })?;
        let (steps_y, freq_y, worm_y, ratio_y) =
            self.handshake_axis(Axis::Secondary)
                .map_err(|e| match e {
                    DriverError::TooManyRetries => DriverError::NoResponseAxis2,
                    other => other,
                })?;
        self.high_speed_ratio = [ratio_x, ratio_y];

        // Capability word: PPEC, home sensor, polar LED, snap port bits.
        let features = match self.transact('q', Axis::Primary, "010000") {
            Ok(word) => {
                let bits = protocol::decode_u24(&word)?;
                MountFeatures {
                    has_ppec: bits & 0x2 != 0,
                    has_home_sensor: bits & 0x4 != 0,
                    has_polar_led: bits & 0x8 != 0,
                    has_snap_port: bits & 0x10 != 0,
                }
            }
            Err(_) => MountFeatures::default(),
        };

        // Supply-voltage word; optional on older firmware.
        if let Ok(word) = self.transact('q', Axis::Primary, "000000") {
            if let Ok(bits) = protocol::decode_u24(&word) {
                self.low_voltage = bits & 0x1 != 0;
            }
        }

        for axis in Axis::BOTH {
            self.transact('F', axis, "")?;
        }

        self.info = Some(DriverInfo {
            mount_name: "SkyWatcher".to_string(),
            firmware,
            steps_per_rev: [steps_x, steps_y],
            worm_steps_per_rev: [worm_x, worm_y],
            factor_step: [360. / steps_x as f64, 360. / steps_y as f64],
            steps_time_freq: [freq_x, freq_y],
            features,
        });
        debug!(info = ?self.info, "mount handshake complete");
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.port.is_some() {
            for axis in Axis::BOTH {
                let _ = self.transact('K', axis, "");
            }
        }
        self.port = None;
        self.info = None;
        self.motion = [MotionSetup::default(); 2];
    }

    fn is_initialized(&self) -> bool {
        self.info.is_some()
    }

    fn info(&self) -> Result<&DriverInfo, DriverError> {
        self.info_ref()
    }

    fn send_command(&mut self, cmd: &Command) -> Result<ResultValue, DriverError> {
        match cmd.kind {
            CommandKind::Stop(axis) => {
                self.transact('K', axis, "")?;
                self.motion[axis.index()].running = false;
                Ok(ResultValue::Empty)
            }
            CommandKind::StopInstant(axis) => {
                self.transact('L', axis, "")?;
                self.motion[axis.index()].running = false;
                Ok(ResultValue::Empty)
            }
            CommandKind::EmergencyStop => {
                for axis in Axis::BOTH {
                    self.transact('L', axis, "")?;
                    self.motion[axis.index()].running = false;
                }
                Ok(ResultValue::Empty)
            }
            CommandKind::GoToTarget(axis, target) => {
                self.goto_target(axis, target)?;
                Ok(ResultValue::Empty)
            }
            CommandKind::SetPosition(axis, deg) => {
                let steps = (deg / self.factor(axis)?).round() as i64;
                self.transact('E', axis, &protocol::encode_counter(steps))?;
                Ok(ResultValue::Empty)
            }
            CommandKind::StartMotion(axis, rate) => {
                self.start_motion(axis, rate)?;
                Ok(ResultValue::Empty)
            }
            CommandKind::ReadPosition(axis) => {
                Ok(ResultValue::Steps(self.read_steps(axis)? as f64))
            }
            CommandKind::ReadPositionWithTime(axis) => {
                let steps = self.read_steps(axis)? as f64;
                Ok(ResultValue::StepsAt(steps, Instant::now()))
            }
            CommandKind::ReadStopped(axis) => {
                let status = self.read_status(axis)?;
                Ok(ResultValue::Bool(!status.running))
            }
            CommandKind::ReadFactorStep(axis) => Ok(ResultValue::Number(self.factor(axis)?)),
            CommandKind::ReadStepsPerRev(axis) => {
                Ok(ResultValue::Number(
                    self.info_ref()?.steps_per_rev[axis.index()] as f64,
                ))
            }
            CommandKind::SetSt4GuideRate(rate) => {
                for axis in Axis::BOTH {
                    self.transact('P', axis, &format!("{:X}", rate.min(4)))?;
                }
                Ok(ResultValue::Empty)
            }
            CommandKind::SetPec(on) => {
                if !self.info_ref()?.features.has_ppec {
                    return Err(DriverError::Unimplemented);
                }
                self.transact('W', Axis::Primary, if on { "3" } else { "4" })?;
                Ok(ResultValue::Empty)
            }
            CommandKind::StartPecTraining => {
                if !self.info_ref()?.features.has_ppec {
                    return Err(DriverError::Unimplemented);
                }
                self.transact('W', Axis::Primary, "1")?;
                Ok(ResultValue::Empty)
            }
            CommandKind::SetSnapPort(on) => {
                self.transact('O', Axis::Primary, if on { "1" } else { "0" })?;
                Ok(ResultValue::Empty)
            }
            CommandKind::SetPolarLed(brightness) => {
                self.transact('V', Axis::Primary, &protocol::encode_u8(brightness))?;
                Ok(ResultValue::Empty)
            }
        }
    }

    fn is_moving(&mut self) -> Result<bool, DriverError> {
        let x = self.read_status(Axis::Primary)?.running;
        let y = self.read_status(Axis::Secondary)?.running;
        Ok(x || y)
    }

    fn last_error(&self) -> Option<&DriverError> {
        self.last_error.as_ref()
    }

    fn low_voltage(&self) -> bool {
        self.low_voltage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidereal_preset_matches_gearing() {
        // EQ6-class gearing: the sidereal preset lands in the expected
        // window for a 64935 Hz timer.
        let preset =
            SerialSkyWatcher::step_period_preset(0.004_178_074, 11_136_000, 64_935., 16., false);
        assert!((450..=550).contains(&preset), "preset {}", preset);
    }

    #[test]
    fn zero_rate_preset_saturates() {
        let preset = SerialSkyWatcher::step_period_preset(0., 11_136_000, 64_935., 16., false);
        assert_eq!(preset, 0xFF_FFFF);
    }

    #[test]
    fn fast_mode_scales_preset_by_ratio() {
        let slow = SerialSkyWatcher::step_period_preset(0.3, 11_136_000, 64_935., 16., false);
        let fast = SerialSkyWatcher::step_period_preset(0.3, 11_136_000, 64_935., 16., true);
        assert_eq!(fast, slow * 16);
    }

    #[test]
    fn uninitialized_driver_refuses_commands() {
        let mut driver = SerialSkyWatcher::new(None, DEFAULT_BAUD, Duration::from_millis(50));
        let cmd = Command {
            id: 1,
            kind: CommandKind::ReadPosition(Axis::Primary),
        };
        assert_eq!(
            driver.send_command(&cmd).unwrap_err(),
            DriverError::NotConnected
        );
    }
}
