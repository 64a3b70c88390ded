#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Simulation clock that turns raw frame deltas into world ticks.

use std::time::Duration;

use horde_core::{ClockMode, Command};
use tracing::debug;

/// Configuration parameters required to construct the clock.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    max_frame_step: Duration,
    time_scale: f32,
}

impl Config {
    /// Creates a configuration clamping single ticks to `max_frame_step`.
    #[must_use]
    pub const fn new(max_frame_step: Duration, time_scale: f32) -> Self {
        Self {
            max_frame_step,
            time_scale,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 1.0)
    }
}

/// Accumulates survival time and decides whether ticks are emitted.
#[derive(Debug)]
pub struct SimulationClock {
    mode: ClockMode,
    survival: Duration,
    frame_index: u64,
    max_frame_step: Duration,
    time_scale: f32,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl SimulationClock {
    /// Creates a running clock at zero survival time.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            mode: ClockMode::Running,
            survival: Duration::ZERO,
            frame_index: 0,
            max_frame_step: config.max_frame_step,
            time_scale: sanitize_scale(config.time_scale),
        }
    }

    /// Current clock mode.
    #[must_use]
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Switches the clock mode, returning whether it changed.
    pub fn set_mode(&mut self, mode: ClockMode) -> bool {
        if self.mode == mode {
            return false;
        }
        debug!(from = ?self.mode, to = ?mode, "clock mode changed");
        self.mode = mode;
        true
    }

    /// Sets the factor applied to incoming frame deltas.
    ///
    /// Non-finite or negative values freeze time instead of corrupting it.
    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = sanitize_scale(time_scale);
    }

    /// Factor applied to incoming frame deltas.
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Total simulated time since the run started.
    #[must_use]
    pub fn survival(&self) -> Duration {
        self.survival
    }

    /// Number of ticks emitted since the run started.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Starts a new run: zero survival time, running mode.
    pub fn reset(&mut self) {
        self.survival = Duration::ZERO;
        self.frame_index = 0;
        self.mode = ClockMode::Running;
    }

    /// Consumes a frame delta in milliseconds and emits a tick command.
    ///
    /// Nothing is emitted while paused or for deltas that are non-finite,
    /// non-positive, or scaled down to zero.
    pub fn advance(&mut self, frame_delta_ms: f32, out: &mut Vec<Command>) {
        if self.mode == ClockMode::Paused {
            return;
        }
        if !frame_delta_ms.is_finite() || frame_delta_ms <= 0.0 {
            return;
        }

        let scaled_nanos = f64::from(frame_delta_ms) * f64::from(self.time_scale) * 1_000_000.0;
        let max_nanos = self.max_frame_step.as_nanos() as f64;
        let dt = Duration::from_nanos(scaled_nanos.round().min(max_nanos) as u64);
        if dt.is_zero() {
            return;
        }

        self.survival = self.survival.saturating_add(dt);
        self.frame_index = self.frame_index.saturating_add(1);
        out.push(Command::Tick {
            dt,
            survival: self.survival,
        });
    }
}

fn sanitize_scale(time_scale: f32) -> f32 {
    if time_scale.is_finite() && time_scale > 0.0 {
        time_scale
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(commands: &[Command]) -> Vec<(Duration, Duration)> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::Tick { dt, survival } => Some((*dt, *survival)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn accumulates_survival_time() {
        let mut clock = SimulationClock::default();
        let mut out = Vec::new();
        clock.advance(16.0, &mut out);
        clock.advance(34.0, &mut out);

        let emitted = ticks(&out);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[1].1, Duration::from_millis(50));
        assert_eq!(clock.survival(), Duration::from_millis(50));
        assert_eq!(clock.frame_index(), 2);
    }

    #[test]
    fn paused_clock_is_silent() {
        let mut clock = SimulationClock::default();
        assert!(clock.set_mode(ClockMode::Paused));
        assert!(!clock.set_mode(ClockMode::Paused));
        let mut out = Vec::new();
        clock.advance(16.0, &mut out);
        assert!(out.is_empty());
        assert_eq!(clock.survival(), Duration::ZERO);

        assert!(clock.set_mode(ClockMode::Running));
        clock.advance(16.0, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut clock = SimulationClock::new(Config::new(Duration::from_millis(100), 1.0));
        let mut out = Vec::new();
        clock.advance(5_000.0, &mut out);
        assert_eq!(ticks(&out), vec![(Duration::from_millis(100), Duration::from_millis(100))]);
    }

    #[test]
    fn invalid_deltas_are_ignored() {
        let mut clock = SimulationClock::default();
        let mut out = Vec::new();
        for delta in [f32::NAN, f32::INFINITY, -16.0, 0.0] {
            clock.advance(delta, &mut out);
        }
        assert!(out.is_empty());
    }

    #[test]
    fn time_scale_slows_the_run() {
        let mut clock = SimulationClock::default();
        clock.set_time_scale(0.5);
        let mut out = Vec::new();
        clock.advance(20.0, &mut out);
        assert_eq!(clock.survival(), Duration::from_millis(10));

        clock.set_time_scale(f32::NAN);
        assert_eq!(clock.time_scale(), 0.0);
        clock.advance(20.0, &mut out);
        assert_eq!(out.len(), 1, "a frozen clock emits nothing");

        clock.reset();
        assert_eq!(clock.survival(), Duration::ZERO);
    }
}
