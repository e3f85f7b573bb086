use crate::util::enums::RunState;
use tokio::sync::broadcast;

/// Property-change notifications published by the mount controller.
///
/// The settings adapter listens for `AtPark` to persist the park flag;
/// UI layers may subscribe to anything.
#[derive(Clone, Debug, PartialEq)]
pub enum MountEvent {
    RunState(RunState),
    Tracking(bool),
    AtPark(bool),
    Slewing(bool),
    /// Latest raw step counters, primary then secondary.
    Steps([f64; 2]),
    PositionUpdated,
    PulseGuidingRa(bool),
    PulseGuidingDec(bool),
    Alert(String),
}

#[derive(Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<MountEvent>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Fire-and-forget publish; events are dropped when nobody listens.
    pub fn publish(&self, event: MountEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MountEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_events_in_order() {
        let ch = EventChannel::new();
        let mut rx = ch.subscribe();
        ch.publish(MountEvent::Tracking(true));
        ch.publish(MountEvent::AtPark(false));
        assert_eq!(rx.recv().await.unwrap(), MountEvent::Tracking(true));
        assert_eq!(rx.recv().await.unwrap(), MountEvent::AtPark(false));
    }
}
