//! Pulse guiding.
//!
//! A pulse is a bounded-duration rate delta on one axis at the ST4 guide
//! rate. Overlapping pulses on the same axis cancel the earlier one via
//! the per-axis cancellation slot. In AltAz mode the pulse instead nudges
//! the predictor's anchor, which turns it into a moving-target correction
//! rather than a raw axis rate.

use std::sync::Arc;
use std::time::Duration;

use ascom_alpaca::{ASCOMError, ASCOMResult};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::astro_math::Degrees;
use crate::mount_control::{tracking, MountController};
use crate::util::{AlignmentMode, Axis, CancelSlot, GuideDirection, TrackingRateExt};

/// Wake early and spin-sleep the remainder for a tight pulse envelope.
const EARLY_RETURN_MILLIS: u64 = 5;

impl MountController {
    pub async fn is_pulse_guiding(&self) -> ASCOMResult<bool> {
        let queue = self.queue_handle().await?;
        Ok(queue.is_pulse_guiding_ra() || queue.is_pulse_guiding_dec())
    }

    /// Guide rate magnitude, degrees per second.
    pub(in crate::mount_control) async fn guide_rate_deg_s(&self) -> Degrees {
        let config = self.config.read().await;
        let rate = self.motion.read().await.tracking_rate;
        config.guiding.st4_guide_rate * rate.deg_per_sec()
    }

    pub async fn pulse_guide(
        self: &Arc<Self>,
        direction: GuideDirection,
        duration_ms: u32,
    ) -> ASCOMResult<()> {
        if !self.is_running().await {
            return Err(ASCOMError::NOT_CONNECTED);
        }
        {
            let motion = self.motion.read().await;
            if motion.at_park {
                return Err(ASCOMError::INVALID_WHILE_PARKED);
            }
            if motion.slew_state.is_goto() {
                return Err(ASCOMError::invalid_operation("cannot guide while slewing"));
            }
        }

        let (axis, sign) = match direction {
            GuideDirection::West => (Axis::Primary, 1.),
            GuideDirection::East => (Axis::Primary, -1.),
            GuideDirection::North => (Axis::Secondary, 1.),
            GuideDirection::South => (Axis::Secondary, -1.),
        };

        let config = self.config.read().await.clone();
        let min_pulse = match axis {
            Axis::Primary => config.guiding.min_pulse_ra_millis,
            Axis::Secondary => config.guiding.min_pulse_dec_millis,
        };
        if duration_ms == 0 {
            return Ok(());
        }
        // Sub-minimum pulses are quantised up so the mount sees them.
        let duration = Duration::from_millis(duration_ms.max(min_pulse) as u64);

        let rate = sign * self.guide_rate_deg_s().await;

        if config.geometry.alignment_mode == AlignmentMode::AltAz {
            return self.pulse_guide_altaz(axis, rate, duration).await;
        }

        let slot = match axis {
            Axis::Primary => CancelSlot::PulseGuideRa,
            Axis::Secondary => CancelSlot::PulseGuideDec,
        };
        // Replacing the source cancels any in-flight pulse on this axis.
        let mut token = self.handles.renew(slot);

        let queue = self.queue_handle().await?;
        let is_ra = axis == Axis::Primary;
        let finish = Instant::now() + duration;

        {
            let mut motion = self.motion.write().await;
            motion.pulse_rate[axis.index()] = rate;
        }
        queue.set_pulse_guiding(is_ra, true);
        tracking::push_composed_rates(self).await.map_err(ASCOMError::from)?;

        let this = self.clone();
        tokio::task::spawn(async move {
            let cancelled = tokio::select! {
                _ = sleep_until(finish - Duration::from_millis(EARLY_RETURN_MILLIS)) => {
                    // Spin out the sub-tick remainder for a tight envelope.
                    let remaining = finish.saturating_duration_since(Instant::now());
                    spin_sleep::sleep(remaining);
                    false
                }
                _ = token.cancelled() => true,
            };

            {
                let mut motion = this.motion.write().await;
                motion.pulse_rate[axis.index()] = 0.;
            }
            queue.set_pulse_guiding(is_ra, false);
            if let Err(e) = tracking::push_composed_rates(&this).await {
                this.record_error(e.into());
            }
            debug!(?axis, cancelled, "pulse guide finished");
        });

        Ok(())
    }

    /// AltAz pulses shift the predictor target; the predictor's next
    /// solves converge on the corrected position like a miniature
    /// precision phase.
    async fn pulse_guide_altaz(
        self: &Arc<Self>,
        axis: Axis,
        rate: Degrees,
        duration: Duration,
    ) -> ASCOMResult<()> {
        let offset = rate * duration.as_secs_f64();
        let queue = self.queue_handle().await?;
        let is_ra = axis == Axis::Primary;

        let anchor = {
            let motion = self.motion.read().await;
            motion.predictor_anchor
        };
        let (ra, dec) = match anchor {
            Some(a) => a,
            None => self.current_radec().await?,
        };
        let shifted = match axis {
            Axis::Primary => (ra + offset / 15., dec),
            Axis::Secondary => (ra, dec + offset),
        };
        self.motion.write().await.predictor_anchor = Some(shifted);

        queue.set_pulse_guiding(is_ra, true);
        tokio::task::spawn(async move {
            tokio::time::sleep(duration).await;
            queue.set_pulse_guiding(is_ra, false);
        });
        Ok(())
    }

    /// Current guide rate exposed on the Alpaca guide-rate properties,
    /// degrees per second.
    pub async fn guide_rate(&self) -> Degrees {
        self.guide_rate_deg_s().await
    }

    /// Accepts a new guide rate by re-deriving the ST4 fraction.
    pub async fn set_guide_rate(&self, rate_deg_s: Degrees) -> ASCOMResult<()> {
        let sidereal = {
            let motion = self.motion.read().await;
            motion.tracking_rate.deg_per_sec()
        };
        if rate_deg_s <= 0. || rate_deg_s > sidereal {
            return Err(ASCOMError::invalid_value(format_args!(
                "guide rate {} outside (0, {}]",
                rate_deg_s, sidereal
            )));
        }
        let mut config = self.config.read().await.clone();
        config.guiding.st4_guide_rate = rate_deg_s / sidereal;
        self.update_config(config).await;
        Ok(())
    }
}
