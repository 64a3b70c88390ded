//! Hit-count driven damage multiplier for chain hits.

use std::time::Duration;

use tracing::trace;

/// Parameters of the combo multiplier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComboTuning {
    /// Growth factor per consecutive chain hit. Values below one are raised to one.
    pub base: f32,
    /// Largest exponent applied to the base.
    pub cap_index: u32,
    /// Quiet period after which the combo resets.
    pub timeout: Duration,
}

impl Default for ComboTuning {
    fn default() -> Self {
        Self {
            base: 1.1,
            cap_index: 10,
            timeout: Duration::from_millis(1_500),
        }
    }
}

/// Combo counter: idle at count zero, re-armed by every chain hit.
#[derive(Clone, Debug)]
pub struct ComboState {
    tuning: ComboTuning,
    count: u32,
    multiplier: f32,
    last_hit: Option<Duration>,
    peak_multiplier: f32,
    peak_count: u32,
}

impl Default for ComboState {
    fn default() -> Self {
        Self::new(ComboTuning::default())
    }
}

impl ComboState {
    /// Creates an idle combo.
    #[must_use]
    pub fn new(tuning: ComboTuning) -> Self {
        let base = if tuning.base.is_finite() {
            tuning.base.max(1.0)
        } else {
            1.0
        };
        Self {
            tuning: ComboTuning { base, ..tuning },
            count: 0,
            multiplier: 1.0,
            last_hit: None,
            peak_multiplier: 1.0,
            peak_count: 0,
        }
    }

    /// Records a chain hit at survival time `now` and returns the new multiplier.
    ///
    /// A hit arriving after the timeout starts a fresh combo.
    pub fn register_hit(&mut self, now: Duration) -> f32 {
        let _ = self.expire(now);
        self.count = self.count.saturating_add(1);
        let exponent = (self.count - 1).min(self.tuning.cap_index);
        let multiplier = self
            .tuning
            .base
            .powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        self.multiplier = if multiplier.is_finite() {
            multiplier
        } else {
            self.multiplier
        };
        assert!(self.multiplier >= 1.0, "combo multiplier fell below one");

        self.last_hit = Some(now);
        self.peak_multiplier = self.peak_multiplier.max(self.multiplier);
        self.peak_count = self.peak_count.max(self.count);
        self.multiplier
    }

    /// Resets the combo when no hit landed within the timeout. Returns whether it reset.
    pub fn expire(&mut self, now: Duration) -> bool {
        let Some(last) = self.last_hit else {
            return false;
        };
        if now.saturating_sub(last) < self.tuning.timeout {
            return false;
        }
        trace!(count = self.count, multiplier = self.multiplier, "combo expired");
        self.count = 0;
        self.multiplier = 1.0;
        self.last_hit = None;
        true
    }

    /// Chain hits in the current combo.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Multiplier earned by the current combo.
    #[must_use]
    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Reports whether a combo is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.count > 0
    }

    /// Survival time of the most recent hit in the current combo.
    #[must_use]
    pub fn last_hit(&self) -> Option<Duration> {
        self.last_hit
    }

    /// Largest multiplier reached since creation or the last reset.
    #[must_use]
    pub fn peak_multiplier(&self) -> f32 {
        self.peak_multiplier
    }

    /// Longest combo reached since creation or the last reset.
    #[must_use]
    pub fn peak_count(&self) -> u32 {
        self.peak_count
    }

    /// Returns to idle and forgets the peaks.
    pub fn reset(&mut self) {
        *self = Self::new(self.tuning);
    }
}
