//! Software model of a two-axis mount: each axis is an ideal integrator
//! with a rate and a position counter. Gotos move at a fixed slew rate
//! and report stopped once the travel time elapses; `SetPosition`
//! teleports the counter without motion.

use std::time::{Duration, Instant};

use crate::astro_math::Degrees;
use crate::mount_control::driver::{
    Command, CommandKind, DriverInfo, MountDriver, MountFeatures, ResultValue,
};
use crate::util::{Axis, DriverError};

const SIM_STEPS_PER_REV: i64 = 11_136_000;
const SIM_WORM_STEPS: f64 = 61_866.666_666_666_664;
const SIM_TIMER_FREQ: f64 = 64_935.0;
/// Goto travel speed of the model, degrees per second.
const SIM_SLEW_RATE: Degrees = 20.0;
pub const SIM_GOTO_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy)]
struct SimAxis {
    /// Position at `updated`, degrees in the mount frame.
    position: Degrees,
    /// Continuous rate, degrees per second.
    rate: f64,
    goto: Option<Goto>,
    updated: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Goto {
    from: Degrees,
    target: Degrees,
    start: Instant,
    arrival: Instant,
}

impl SimAxis {
    fn new() -> Self {
        Self {
            position: 0.,
            rate: 0.,
            goto: None,
            updated: Instant::now(),
        }
    }

    /// Advances the integrator to `now`.
    fn advance(&mut self, now: Instant) {
        if let Some(goto) = self.goto {
            if now >= goto.arrival {
                self.position = goto.target;
                self.goto = None;
                self.rate = 0.;
                self.updated = now;
                return;
            }
            let progress =
                (now - goto.start).as_secs_f64() / (goto.arrival - goto.start).as_secs_f64();
            self.position = goto.from + (goto.target - goto.from) * progress;
            self.updated = now;
            return;
        }

        let dt = (now - self.updated).as_secs_f64();
        self.position += self.rate * dt;
        self.updated = now;
    }

    fn start_goto(&mut self, target: Degrees, now: Instant) {
        self.advance(now);
        let travel = (target - self.position).abs();
        let duration = Duration::from_secs_f64((travel / SIM_SLEW_RATE).max(0.05));
        self.goto = Some(Goto {
            from: self.position,
            target,
            start: now,
            arrival: now + duration,
        });
        self.rate = 0.;
    }

    fn stop(&mut self, now: Instant) {
        self.advance(now);
        self.goto = None;
        self.rate = 0.;
    }

    fn is_moving(&mut self, now: Instant) -> bool {
        self.advance(now);
        self.goto.is_some() || self.rate != 0.
    }
}

pub struct Simulator {
    axes: [SimAxis; 2],
    info: DriverInfo,
    initialized: bool,
    last_error: Option<DriverError>,
}

impl Simulator {
    pub fn new() -> Self {
        let factor = 360. / SIM_STEPS_PER_REV as f64;
        Simulator {
            axes: [SimAxis::new(), SimAxis::new()],
            info: DriverInfo {
                mount_name: "Mount Simulator".to_string(),
                firmware: "01.00".to_string(),
                steps_per_rev: [SIM_STEPS_PER_REV; 2],
                worm_steps_per_rev: [SIM_WORM_STEPS; 2],
                factor_step: [factor; 2],
                steps_time_freq: [SIM_TIMER_FREQ; 2],
                features: MountFeatures::default(),
            },
            initialized: false,
            last_error: None,
        }
    }

    fn axis(&mut self, axis: Axis) -> &mut SimAxis {
        &mut self.axes[axis.index()]
    }

    fn position_steps(&mut self, axis: Axis, now: Instant) -> f64 {
        let factor = self.info.factor_step[axis.index()];
        let ax = self.axis(axis);
        ax.advance(now);
        ax.position / factor
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MountDriver for Simulator {
    fn initialize(&mut self) -> Result<(), DriverError> {
        if self.initialized {
            return Err(DriverError::AlreadyConnected);
        }
        let now = Instant::now();
        for axis in &mut self.axes {
            axis.updated = now;
        }
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        let now = Instant::now();
        for axis in &mut self.axes {
            axis.stop(now);
        }
        self.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn info(&self) -> Result<&DriverInfo, DriverError> {
        if !self.initialized {
            return Err(DriverError::NotConnected);
        }
        Ok(&self.info)
    }

    fn send_command(&mut self, cmd: &Command) -> Result<ResultValue, DriverError> {
        if !self.initialized && !matches!(cmd.kind, CommandKind::EmergencyStop) {
            return Err(DriverError::NotConnected);
        }
        let now = Instant::now();

        let value = match cmd.kind {
            CommandKind::Stop(axis) | CommandKind::StopInstant(axis) => {
                self.axis(axis).stop(now);
                ResultValue::Empty
            }
            CommandKind::GoToTarget(axis, target) => {
                self.axis(axis).start_goto(target, now);
                ResultValue::Empty
            }
            CommandKind::SetPosition(axis, deg) => {
                let ax = self.axis(axis);
                ax.stop(now);
                ax.position = deg;
                ResultValue::Empty
            }
            CommandKind::StartMotion(axis, rate) => {
                let ax = self.axis(axis);
                ax.advance(now);
                ax.goto = None;
                ax.rate = rate;
                ResultValue::Empty
            }
            CommandKind::ReadPosition(axis) => ResultValue::Steps(self.position_steps(axis, now)),
            CommandKind::ReadPositionWithTime(axis) => {
                ResultValue::StepsAt(self.position_steps(axis, now), now)
            }
            CommandKind::ReadStopped(axis) => ResultValue::Bool(!self.axis(axis).is_moving(now)),
            CommandKind::ReadFactorStep(axis) => {
                ResultValue::Number(self.info.factor_step[axis.index()])
            }
            CommandKind::ReadStepsPerRev(axis) => {
                ResultValue::Number(self.info.steps_per_rev[axis.index()] as f64)
            }
            CommandKind::SetSt4GuideRate(_)
            | CommandKind::SetPec(_)
            | CommandKind::SetSnapPort(_)
            | CommandKind::SetPolarLed(_) => ResultValue::Empty,
            CommandKind::StartPecTraining => {
                return Err(DriverError::Unimplemented);
            }
            CommandKind::EmergencyStop => {
                for axis in &mut self.axes {
                    axis.stop(now);
                }
                ResultValue::Empty
            }
        };

        Ok(value)
    }

    fn is_moving(&mut self) -> Result<bool, DriverError> {
        let now = Instant::now();
        Ok(self.axes[0].is_moving(now) || self.axes[1].is_moving(now))
    }

    fn last_error(&self) -> Option<&DriverError> {
        self.last_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn sim() -> Simulator {
        let mut sim = Simulator::new();
        sim.initialize().unwrap();
        sim
    }

    fn cmd(kind: CommandKind) -> Command {
        Command { id: 0, kind }
    }

    #[test]
    fn integrates_rate_over_time() {
        let mut sim = sim();
        sim.send_command(&cmd(CommandKind::StartMotion(Axis::Primary, 10.0)))
            .unwrap();
        sleep(Duration::from_millis(100));
        let steps = sim
            .send_command(&cmd(CommandKind::ReadPosition(Axis::Primary)))
            .unwrap()
            .as_steps()
            .unwrap();
        let deg = steps * sim.info.factor_step[0];
        assert!((0.5..2.0).contains(&deg), "unexpected travel: {}", deg);
    }

    #[test]
    fn goto_reports_stopped_after_travel_time() {
        let mut sim = sim();
        sim.send_command(&cmd(CommandKind::GoToTarget(Axis::Secondary, 0.5)))
            .unwrap();
        let stopped = sim
            .send_command(&cmd(CommandKind::ReadStopped(Axis::Secondary)))
            .unwrap()
            .as_bool()
            .unwrap();
        assert!(!stopped);
        sleep(Duration::from_millis(120));
        let stopped = sim
            .send_command(&cmd(CommandKind::ReadStopped(Axis::Secondary)))
            .unwrap()
            .as_bool()
            .unwrap();
        assert!(stopped);
        let steps = sim
            .send_command(&cmd(CommandKind::ReadPosition(Axis::Secondary)))
            .unwrap()
            .as_steps()
            .unwrap();
        assert!((steps * sim.info.factor_step[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn set_position_teleports_without_motion() {
        let mut sim = sim();
        sim.send_command(&cmd(CommandKind::SetPosition(Axis::Primary, 123.0)))
            .unwrap();
        let steps = sim
            .send_command(&cmd(CommandKind::ReadPosition(Axis::Primary)))
            .unwrap()
            .as_steps()
            .unwrap();
        assert!((steps * sim.info.factor_step[0] - 123.0).abs() < 1e-9);
        assert!(!sim.is_moving().unwrap());
    }

    #[test]
    fn emergency_stop_halts_both_axes() {
        let mut sim = sim();
        sim.send_command(&cmd(CommandKind::StartMotion(Axis::Primary, 1.0)))
            .unwrap();
        sim.send_command(&cmd(CommandKind::GoToTarget(Axis::Secondary, 90.0)))
            .unwrap();
        sim.send_command(&cmd(CommandKind::EmergencyStop)).unwrap();
        assert!(!sim.is_moving().unwrap());
    }
}
