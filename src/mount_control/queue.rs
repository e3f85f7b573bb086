//! Single-worker command queue in front of a hardware driver.
//!
//! All driver I/O happens on this queue's worker; callers get a future
//! that resolves with the command's outcome. Ordering is FIFO, except
//! that a stop command for an axis preempts motion commands for the same
//! axis that have not reached the wire yet.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, Notify};
use tokio::task::{self, JoinHandle};
use tracing::{debug, error};

use crate::mount_control::driver::{Command, CommandKind, CommandResult, MountDriver, ResultValue};
use crate::util::{DriverError, EventChannel, MountEvent};

/// The driver behind its wire mutex. The queue worker is the only routine
/// caller; the façade's emergency stop locks it directly.
pub type SharedDriver = Arc<Mutex<Box<dyn MountDriver>>>;

struct Pending {
    cmd: Command,
    tx: oneshot::Sender<CommandResult>,
}

struct QueueInner {
    driver: SharedDriver,
    next_id: AtomicU64,
    pending: Mutex<VecDeque<Pending>>,
    notify: Notify,
    running: AtomicBool,
    shutdown: AtomicBool,
    pulse_ra: AtomicBool,
    pulse_dec: AtomicBool,
    last_steps: Mutex<[f64; 2]>,
    events: EventChannel,
}

#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CommandQueue {
    pub fn start(driver: SharedDriver, events: EventChannel) -> Self {
        let inner = Arc::new(QueueInner {
            driver,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            running: AtomicBool::new(true),
            shutdown: AtomicBool::new(false),
            pulse_ra: AtomicBool::new(false),
            pulse_dec: AtomicBool::new(false),
            last_steps: Mutex::new([0., 0.]),
            events,
        });

        let worker = task::spawn(Self::worker_loop(inner.clone()));

        CommandQueue {
            inner,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    pub fn new_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Enqueues a command and returns a future for its result. A stop
    /// command evicts queued motion commands on the same axis; their
    /// callers see `UserInterrupt`.
    pub fn get_command_result(
        &self,
        kind: CommandKind,
    ) -> impl std::future::Future<Output = CommandResult> {
        let id = self.new_id();
        let cmd = Command { id, kind };
        let (tx, rx) = oneshot::channel();

        if self.inner.shutdown.load(Ordering::Acquire) {
            let _ = tx.send(CommandResult {
                id,
                result: Err(DriverError::QueueShutdown),
            });
        } else {
            let mut pending = self.inner.pending.lock().unwrap();
            if cmd.kind.is_stop() {
                if let Some(axis) = cmd.kind.axis() {
                    let mut kept = VecDeque::with_capacity(pending.len());
                    for p in pending.drain(..) {
                        if p.cmd.kind.is_motion() && p.cmd.kind.axis() == Some(axis) {
                            let _ = p.tx.send(CommandResult {
                                id: p.cmd.id,
                                result: Err(DriverError::UserInterrupt),
                            });
                        } else {
                            kept.push_back(p);
                        }
                    }
                    *pending = kept;
                }
                pending.push_front(Pending { cmd, tx });
            } else {
                pending.push_back(Pending { cmd, tx });
            }
            drop(pending);
            self.inner.notify.notify_one();
        }

        async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => CommandResult {
                    id,
                    result: Err(DriverError::QueueShutdown),
                },
            }
        }
    }

    /// Convenience wrapper collapsing the result envelope.
    pub async fn execute(&self, kind: CommandKind) -> Result<ResultValue, DriverError> {
        self.get_command_result(kind).await.result
    }

    /// Drains the queue and stops the worker. Pending commands complete
    /// with a synthetic `QueueShutdown` failure.
    pub async fn stop(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify.notify_one();
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.inner.running.store(false, Ordering::Release);
    }

    pub fn is_pulse_guiding_ra(&self) -> bool {
        self.inner.pulse_ra.load(Ordering::Acquire)
    }

    pub fn is_pulse_guiding_dec(&self) -> bool {
        self.inner.pulse_dec.load(Ordering::Acquire)
    }

    pub fn set_pulse_guiding(&self, ra: bool, active: bool) {
        if ra {
            self.inner.pulse_ra.store(active, Ordering::Release);
            self.inner.events.publish(MountEvent::PulseGuidingRa(active));
        } else {
            self.inner.pulse_dec.store(active, Ordering::Release);
            self.inner
                .events
                .publish(MountEvent::PulseGuidingDec(active));
        }
    }

    pub fn last_steps(&self) -> [f64; 2] {
        *self.inner.last_steps.lock().unwrap()
    }

    async fn worker_loop(inner: Arc<QueueInner>) {
        loop {
            let next = inner.pending.lock().unwrap().pop_front();

            let Some(Pending { cmd, tx }) = next else {
                if inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                inner.notify.notified().await;
                continue;
            };

            if inner.shutdown.load(Ordering::Acquire) && !cmd.kind.is_stop() {
                let _ = tx.send(CommandResult {
                    id: cmd.id,
                    result: Err(DriverError::QueueShutdown),
                });
                continue;
            }

            let driver = inner.driver.clone();
            let blocking_cmd = cmd.clone();
            let result = task::spawn_blocking(move || {
                let mut driver = driver.lock().unwrap();
                driver.send_command(&blocking_cmd)
            })
            .await
            .unwrap_or(Err(DriverError::QueueFailed));

            if let Err(e) = &result {
                error!(id = cmd.id, kind = ?cmd.kind, error = %e, "command failed");
            }

            if let (CommandKind::ReadPosition(axis) | CommandKind::ReadPositionWithTime(axis), Ok(v)) =
                (&cmd.kind, &result)
            {
                if let Some(steps) = v.as_steps() {
                    let snapshot = {
                        let mut last = inner.last_steps.lock().unwrap();
                        last[axis.index()] = steps;
                        *last
                    };
                    inner.events.publish(MountEvent::Steps(snapshot));
                }
            }

            let _ = tx.send(CommandResult {
                id: cmd.id,
                result,
            });
        }

        // Deliver synthetic failures for anything still queued.
        let drained: Vec<Pending> = inner.pending.lock().unwrap().drain(..).collect();
        debug!(count = drained.len(), "queue shut down with pending commands");
        for p in drained {
            let _ = p.tx.send(CommandResult {
                id: p.cmd.id,
                result: Err(DriverError::QueueShutdown),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount_control::driver::Simulator;
    use crate::util::Axis;

    fn shared_sim() -> SharedDriver {
        let mut sim = Simulator::new();
        sim.initialize().unwrap();
        Arc::new(Mutex::new(Box::new(sim) as Box<dyn MountDriver>))
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let queue = CommandQueue::start(shared_sim(), EventChannel::new());
        let a = queue.new_id();
        let b = queue.new_id();
        assert!(a < b);
        queue.stop().await;
    }

    #[tokio::test]
    async fn commands_complete_in_order() {
        let queue = CommandQueue::start(shared_sim(), EventChannel::new());
        let r1 = queue
            .execute(CommandKind::SetPosition(Axis::Primary, 10.))
            .await;
        assert!(r1.is_ok());
        let pos = queue
            .execute(CommandKind::ReadPosition(Axis::Primary))
            .await
            .unwrap()
            .as_steps()
            .unwrap();
        assert!(pos > 0.);
        queue.stop().await;
    }

    #[tokio::test]
    async fn stop_preempts_queued_motion() {
        let queue = CommandQueue::start(shared_sim(), EventChannel::new());
        // Queue two motions and then a stop before the worker can drain
        // them; the not-yet-sent goto must be evicted.
        let goto1 = queue.get_command_result(CommandKind::GoToTarget(Axis::Primary, 90.));
        let goto2 = queue.get_command_result(CommandKind::GoToTarget(Axis::Primary, 180.));
        let stop = queue.get_command_result(CommandKind::Stop(Axis::Primary));
        let (r1, r2, rs) = tokio::join!(goto1, goto2, stop);
        assert!(rs.successful());
        let interrupted = [r1, r2]
            .iter()
            .filter(|r| r.result == Err(DriverError::UserInterrupt))
            .count();
        assert!(interrupted >= 1, "expected at least one evicted goto");
        queue.stop().await;
    }

    #[tokio::test]
    async fn shutdown_delivers_synthetic_failures() {
        let queue = CommandQueue::start(shared_sim(), EventChannel::new());
        queue.stop().await;
        let result = queue
            .execute(CommandKind::ReadPosition(Axis::Primary))
            .await;
        assert_eq!(result, Err(DriverError::QueueShutdown));
        assert!(!queue.is_running());
    }
}
