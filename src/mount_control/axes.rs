//! In-memory truth about the two motor axes.
//!
//! Step counters are read through the command queue; everything derived
//! (mount-frame and app-frame degrees) is computed from the driver's
//! capability block at the moment of the read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};

use crate::astro_math::{self, AxesXY, CoordContext, Degrees};
use crate::mount_control::driver::{CommandKind, DriverInfo};
use crate::mount_control::queue::CommandQueue;
use crate::util::{Axis, DriverError, EventChannel, MountEvent};

#[derive(Debug, Clone, Copy)]
pub struct AxisSnapshot {
    pub step_count: f64,
    pub timestamp: Instant,
    /// Axis angle in the mount frame.
    pub degrees_mount: Degrees,
}

#[derive(Debug, Clone, Copy)]
struct AxisData {
    step_count: f64,
    timestamp: Instant,
    degrees_mount: Degrees,
}

impl AxisData {
    fn empty() -> Self {
        Self {
            step_count: 0.,
            timestamp: Instant::now(),
            degrees_mount: 0.,
        }
    }
}

struct Inner {
    info: Option<DriverInfo>,
    axes: [AxisData; 2],
}

pub struct AxesState {
    inner: RwLock<Inner>,
    /// Serialises concurrent position refreshes (display tick vs the
    /// precision-slew forced update).
    update_lock: Mutex<()>,
    timer_overruns: AtomicU64,
    events: EventChannel,
}

impl AxesState {
    pub fn new(events: EventChannel) -> Self {
        Self {
            inner: RwLock::new(Inner {
                info: None,
                axes: [AxisData::empty(), AxisData::empty()],
            }),
            update_lock: Mutex::new(()),
            timer_overruns: AtomicU64::new(0),
            events,
        }
    }

    /// Installs the capability block read during connect. Positions are
    /// meaningless until the first `update_steps`.
    pub async fn set_info(&self, info: DriverInfo) {
        let mut inner = self.inner.write().await;
        inner.info = Some(info);
        inner.axes = [AxisData::empty(), AxisData::empty()];
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.info = None;
    }

    pub async fn info(&self) -> Result<DriverInfo, DriverError> {
        self.inner
            .read()
            .await
            .info
            .clone()
            .ok_or(DriverError::NotConnected)
    }

    /// Reads both counters through the queue and refreshes the derived
    /// angles. Returns the fresh mount-frame angles.
    pub async fn update_steps(&self, queue: &CommandQueue) -> Result<AxesXY, DriverError> {
        let _guard = self.update_lock.lock().await;

        let mut mount = [0.; 2];
        for axis in Axis::BOTH {
            let value = queue
                .execute(CommandKind::ReadPositionWithTime(axis))
                .await?;
            let (steps, at) = match value {
                crate::mount_control::driver::ResultValue::StepsAt(s, t) => (s, t),
                other => {
                    return Err(DriverError::InvalidData(format!(
                        "unexpected position payload {:?}",
                        other
                    )))
                }
            };

            let mut inner = self.inner.write().await;
            let factor = inner
                .info
                .as_ref()
                .ok_or(DriverError::NotConnected)?
                .factor_step[axis.index()];
            let deg = astro_math::steps_to_degrees(steps, factor);
            inner.axes[axis.index()] = AxisData {
                step_count: steps,
                timestamp: at,
                degrees_mount: deg,
            };
            mount[axis.index()] = deg;
        }

        self.events.publish(MountEvent::PositionUpdated);
        Ok(mount)
    }

    pub async fn snapshot(&self, axis: Axis) -> AxisSnapshot {
        let inner = self.inner.read().await;
        let data = inner.axes[axis.index()];
        AxisSnapshot {
            step_count: data.step_count,
            timestamp: data.timestamp,
            degrees_mount: data.degrees_mount,
        }
    }

    /// Last-read axis angles in the mount frame.
    pub async fn degrees_mount(&self) -> AxesXY {
        let inner = self.inner.read().await;
        [inner.axes[0].degrees_mount, inner.axes[1].degrees_mount]
    }

    /// Last-read axis angles mapped to the application frame.
    pub async fn degrees_app(&self, ctx: &CoordContext) -> AxesXY {
        astro_math::axes_mount_to_app(self.degrees_mount().await, ctx)
    }

    pub async fn steps(&self) -> [f64; 2] {
        let inner = self.inner.read().await;
        [inner.axes[0].step_count, inner.axes[1].step_count]
    }

    pub fn note_timer_overrun(&self) -> u64 {
        self.timer_overruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn timer_overruns(&self) -> u64 {
        self.timer_overruns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount_control::driver::{MountDriver, Simulator};
    use crate::mount_control::queue::SharedDriver;
    use std::sync::{Arc, Mutex as StdMutex};

    fn queue_with_sim() -> (CommandQueue, AxesState, DriverInfo) {
        let mut sim = Simulator::new();
        sim.initialize().unwrap();
        let info = sim.info().unwrap().clone();
        let shared: SharedDriver = Arc::new(StdMutex::new(Box::new(sim) as Box<dyn MountDriver>));
        let events = EventChannel::new();
        let queue = CommandQueue::start(shared, events.clone());
        let axes = AxesState::new(events);
        (queue, axes, info)
    }

    #[tokio::test]
    async fn update_steps_derives_degrees() {
        let (queue, axes, info) = queue_with_sim();
        axes.set_info(info).await;

        queue
            .execute(CommandKind::SetPosition(Axis::Primary, 45.))
            .await
            .unwrap();
        let mount = axes.update_steps(&queue).await.unwrap();
        assert!((mount[0] - 45.).abs() < 1e-6);
        let snap = axes.snapshot(Axis::Primary).await;
        assert!((snap.degrees_mount - 45.).abs() < 1e-6);
        assert!(snap.step_count > 0.);
        queue.stop().await;
    }

    #[tokio::test]
    async fn update_requires_info() {
        let (queue, axes, _info) = queue_with_sim();
        let err = axes.update_steps(&queue).await.unwrap_err();
        assert_eq!(err, DriverError::NotConnected);
        queue.stop().await;
    }
}
