use std::sync::Mutex;
use tokio::sync::watch;

/// Cooperative cancellation built on a watch channel.
///
/// Each long-running operation holds a [`CancelToken`]; the owner of the
/// matching [`CancelSource`] flips it exactly once. Replacing a source
/// cancels the previous operation.
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the source fires. Already-cancelled tokens resolve
    /// immediately.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // The sender living in CancellationHandles keeps the channel open;
        // if it is dropped anyway, treat that as a cancel.
        let _ = self.rx.changed().await;
    }
}

/// The four cancellation slots held by the mount controller.
pub struct CancellationHandles {
    goto: Mutex<CancelSource>,
    pulse_guide_ra: Mutex<CancelSource>,
    pulse_guide_dec: Mutex<CancelSource>,
    hc_pulse_guide: Mutex<CancelSource>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CancelSlot {
    Goto,
    PulseGuideRa,
    PulseGuideDec,
    HcPulseGuide,
}

impl CancellationHandles {
    pub fn new() -> Self {
        Self {
            goto: Mutex::new(CancelSource::new()),
            pulse_guide_ra: Mutex::new(CancelSource::new()),
            pulse_guide_dec: Mutex::new(CancelSource::new()),
            hc_pulse_guide: Mutex::new(CancelSource::new()),
        }
    }

    fn slot(&self, slot: CancelSlot) -> &Mutex<CancelSource> {
        match slot {
            CancelSlot::Goto => &self.goto,
            CancelSlot::PulseGuideRa => &self.pulse_guide_ra,
            CancelSlot::PulseGuideDec => &self.pulse_guide_dec,
            CancelSlot::HcPulseGuide => &self.hc_pulse_guide,
        }
    }

    /// Cancels whatever operation holds the slot and installs a fresh
    /// source, returning its token for the new operation.
    pub fn renew(&self, slot: CancelSlot) -> CancelToken {
        let mut guard = self.slot(slot).lock().unwrap();
        guard.cancel();
        *guard = CancelSource::new();
        guard.token()
    }

    pub fn cancel(&self, slot: CancelSlot) {
        self.slot(slot).lock().unwrap().cancel();
    }

    pub fn cancel_all(&self) {
        for slot in [
            CancelSlot::Goto,
            CancelSlot::PulseGuideRa,
            CancelSlot::PulseGuideDec,
            CancelSlot::HcPulseGuide,
        ] {
            self.cancel(slot);
        }
    }
}

impl Default for CancellationHandles {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_cancel() {
        let src = CancelSource::new();
        let mut token = src.token();
        assert!(!token.is_cancelled());
        src.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await; // must not hang
    }

    #[tokio::test]
    async fn renew_cancels_previous() {
        let handles = CancellationHandles::new();
        let first = handles.renew(CancelSlot::Goto);
        let second = handles.renew(CancelSlot::Goto);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_all_hits_every_slot() {
        let handles = CancellationHandles::new();
        let goto = handles.renew(CancelSlot::Goto);
        let ra = handles.renew(CancelSlot::PulseGuideRa);
        handles.cancel_all();
        assert!(goto.is_cancelled());
        assert!(ra.is_cancelled());
    }
}
