//! Runtime periodic-error correction.
//!
//! Two correction tables: a worm-relative one with a fixed bin count and
//! a full-revolution one. Each display tick maps the primary axis step
//! counter onto a bin; when the bin changes the tracking loop folds the
//! bin's rate correction into the composed tracking rate.

use crate::astro_math::modulo;
use tracing::error;

pub const WORM_BINS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PecMode {
    /// Bins span one worm revolution.
    Worm,
    /// Bins span a full axis revolution.
    FullRevolution,
}

#[derive(Debug, Clone)]
pub struct PecTable {
    mode: PecMode,
    /// Rate corrections, degrees per second, one per bin.
    bins: Vec<f64>,
    bin_steps: f64,
    offset_steps: f64,
}

impl PecTable {
    pub fn new(mode: PecMode, bins: Vec<f64>, span_steps: f64, offset_steps: f64) -> Self {
        let bin_steps = if bins.is_empty() {
            1.
        } else {
            span_steps / bins.len() as f64
        };
        Self {
            mode,
            bins,
            bin_steps,
            offset_steps,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bin_for(&self, steps: f64, steps_per_rev: f64) -> usize {
        let position = modulo(steps, steps_per_rev);
        let raw = ((position + self.offset_steps) / self.bin_steps) as usize;
        match self.mode {
            PecMode::Worm => raw % WORM_BINS.max(self.bins.len()),
            PecMode::FullRevolution => raw % self.bins.len().max(1),
        }
    }

    pub fn correction(&self, bin: usize) -> Option<f64> {
        self.bins.get(bin).copied()
    }
}

/// Tracks the active bin so corrections are only re-issued on boundary
/// crossings.
#[derive(Debug)]
pub struct PecState {
    table: Option<PecTable>,
    enabled: bool,
    current_bin: Option<usize>,
}

impl PecState {
    pub fn new() -> Self {
        Self {
            table: None,
            enabled: false,
            current_bin: None,
        }
    }

    pub fn install_table(&mut self, table: PecTable) {
        self.table = Some(table);
        self.current_bin = None;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.current_bin = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Correction for the current tick, or `None` when the bin has not
    /// changed. An empty table disables PEC and keeps tracking alive.
    pub fn tick(&mut self, steps: f64, steps_per_rev: f64) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        let table = self.table.as_ref()?;
        if table.is_empty() {
            error!("PEC enabled with an empty table; disabling correction");
            self.enabled = false;
            return None;
        }
        let bin = table.bin_for(steps, steps_per_rev);
        if self.current_bin == Some(bin) {
            return None;
        }
        self.current_bin = Some(bin);
        table.correction(bin)
    }
}

impl Default for PecState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worm_table() -> PecTable {
        let bins: Vec<f64> = (0..WORM_BINS).map(|i| i as f64 * 1e-6).collect();
        PecTable::new(PecMode::Worm, bins, 50_000., 0.)
    }

    #[test]
    fn bin_advances_with_steps() {
        let table = worm_table();
        let spr = 1_000_000.;
        assert_eq!(table.bin_for(0., spr), 0);
        assert_eq!(table.bin_for(500., spr), 1);
        assert_eq!(table.bin_for(49_999., spr), 99);
        // Wraps at the worm period.
        assert_eq!(table.bin_for(50_000., spr), 0);
    }

    #[test]
    fn tick_fires_only_on_bin_change() {
        let mut state = PecState::new();
        state.install_table(worm_table());
        state.set_enabled(true);
        let spr = 1_000_000.;
        assert!(state.tick(0., spr).is_some());
        assert!(state.tick(100., spr).is_none());
        assert!(state.tick(600., spr).is_some());
    }

    #[test]
    fn empty_table_disables_pec() {
        let mut state = PecState::new();
        state.install_table(PecTable::new(PecMode::Worm, Vec::new(), 50_000., 0.));
        state.set_enabled(true);
        assert!(state.tick(0., 1_000_000.).is_none());
        assert!(!state.is_enabled());
    }
}
