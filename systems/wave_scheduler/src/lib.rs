#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Wave scheduler that keeps the arena populated as survival time grows.
//!
//! The scheduler runs in one of two modes. While the live population sits
//! below the active wave's minimum it fires bursts on a short cadence, each
//! filling a fraction of the deficit. Once the minimum is met it falls back to
//! spawning one group per wave interval. A separate timer spawns bosses while
//! the active wave allows them. Every spawn is a scaled copy of a catalog
//! profile placed just outside the anchor's view.

mod table;
mod tuning;

use std::f32::consts::TAU;
use std::time::Duration;

use horde_core::{
    finite_or_zero, ClockMode, Command, EnemyCatalog, EnemyKind, EnemyStats, Event, Rank, Vec2,
};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace, warn};

pub use table::{ActiveWave, WaveRecord, WaveTable};
pub use tuning::{
    CadenceTuning, ConfigError, ExtrapolationTuning, PlacementTuning, ScalingTuning,
    SchedulerConfig,
};

/// Spawning regime the scheduler is currently in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpawnMode {
    /// No tick has been processed yet.
    #[default]
    Idle,
    /// Population is below the wave minimum; bursts top it up.
    Deficit,
    /// Population meets the minimum; groups spawn on the wave interval.
    Steady,
}

/// Population-driven spawn director.
#[derive(Debug)]
pub struct WaveScheduler {
    table: WaveTable,
    catalog: EnemyCatalog,
    cadence: CadenceTuning,
    scaling: ScalingTuning,
    placement: PlacementTuning,
    rng: ChaCha8Rng,
    mode: SpawnMode,
    burst_accumulator: Duration,
    steady_accumulator: Duration,
    boss_accumulator: Duration,
    bursts_fired: u64,
    boss_spawns: u64,
    spawned: u64,
    kinds: Vec<EnemyKind>,
    weights: Vec<f32>,
}

impl WaveScheduler {
    /// Validates the configuration and creates an idle scheduler.
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let SchedulerConfig {
            waves,
            enemies,
            extrapolation,
            cadence,
            scaling,
            placement,
            rng_seed,
        } = config;

        Ok(Self {
            table: WaveTable::new(waves, extrapolation)?,
            catalog: enemies,
            cadence,
            scaling,
            placement,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            mode: SpawnMode::Idle,
            burst_accumulator: Duration::ZERO,
            steady_accumulator: Duration::ZERO,
            boss_accumulator: Duration::ZERO,
            bursts_fired: 0,
            boss_spawns: 0,
            spawned: 0,
            kinds: Vec::new(),
            weights: Vec::new(),
        })
    }

    /// Current spawning regime.
    #[must_use]
    pub fn mode(&self) -> SpawnMode {
        self.mode
    }

    /// Number of non-empty deficit bursts fired so far.
    #[must_use]
    pub fn bursts_fired(&self) -> u64 {
        self.bursts_fired
    }

    /// Number of bosses spawned so far.
    #[must_use]
    pub fn boss_spawns(&self) -> u64 {
        self.boss_spawns
    }

    /// Number of spawn commands emitted so far.
    #[must_use]
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Wave table driving the scheduler.
    #[must_use]
    pub fn table(&self) -> &WaveTable {
        &self.table
    }

    /// Catalog spawns are drawn from.
    #[must_use]
    pub fn catalog(&self) -> &EnemyCatalog {
        &self.catalog
    }

    /// Forgets all timers and counters for a new run.
    pub fn reset(&mut self) {
        self.mode = SpawnMode::Idle;
        self.burst_accumulator = Duration::ZERO;
        self.steady_accumulator = Duration::ZERO;
        self.boss_accumulator = Duration::ZERO;
        self.bursts_fired = 0;
        self.boss_spawns = 0;
        self.spawned = 0;
    }

    /// Consumes world events and emits spawn commands.
    ///
    /// `population` is the pool's active count before this batch of events
    /// was produced. Spawns emitted during the call are added to it locally so
    /// repeated bursts never overshoot the wave minimum.
    pub fn handle(
        &mut self,
        events: &[Event],
        clock: ClockMode,
        population: usize,
        anchor: Vec2,
        out: &mut Vec<Command>,
    ) {
        if clock == ClockMode::Paused {
            return;
        }

        let mut elapsed = Duration::ZERO;
        let mut survival = None;
        for event in events {
            if let Event::TimeAdvanced { dt, survival: now } = event {
                elapsed = elapsed.saturating_add(*dt);
                survival = Some(*now);
            }
        }
        let Some(survival) = survival else {
            return;
        };

        let wave = self.table.resolve(survival);
        let mut live = population;
        self.run_boss_timer(elapsed, survival, wave, anchor, &mut live, out);

        if live < wave.min_population {
            self.run_deficit(elapsed, survival, wave, anchor, &mut live, out);
        } else {
            self.run_steady(elapsed, survival, wave, anchor, &mut live, out);
        }
    }

    fn run_deficit(
        &mut self,
        elapsed: Duration,
        survival: Duration,
        wave: ActiveWave,
        anchor: Vec2,
        live: &mut usize,
        out: &mut Vec<Command>,
    ) {
        let cadence = self.cadence.burst_cadence();
        if self.mode == SpawnMode::Deficit {
            self.burst_accumulator = self.burst_accumulator.saturating_add(elapsed);
        } else {
            debug!(
                live = *live,
                target = wave.min_population,
                "entering deficit mode"
            );
            self.mode = SpawnMode::Deficit;
            self.burst_accumulator = cadence;
        }

        while self.burst_accumulator >= cadence && *live < wave.min_population {
            self.burst_accumulator -= cadence;
            let deficit = wave.min_population - *live;
            let fraction = self.cadence.burst_fraction(survival);
            let size = ((deficit as f32 * fraction).ceil() as usize)
                .clamp(1, deficit)
                .min(self.room(*live));

            let spawned = self.fire_burst(size, wave.index, survival, anchor, out);
            if spawned == 0 {
                self.burst_accumulator = Duration::ZERO;
                break;
            }
            *live += spawned;
            self.bursts_fired += 1;
            trace!(size = spawned, deficit, "burst fired");
        }
    }

    fn run_steady(
        &mut self,
        elapsed: Duration,
        survival: Duration,
        wave: ActiveWave,
        anchor: Vec2,
        live: &mut usize,
        out: &mut Vec<Command>,
    ) {
        if self.mode == SpawnMode::Steady {
            self.steady_accumulator = self.steady_accumulator.saturating_add(elapsed);
        } else {
            debug!(live = *live, "entering steady mode");
            self.mode = SpawnMode::Steady;
            self.steady_accumulator = Duration::ZERO;
        }

        let interval = wave.spawn_interval;
        if interval.is_zero() {
            return;
        }

        while self.steady_accumulator >= interval {
            if self.room(*live) == 0 {
                self.steady_accumulator = Duration::ZERO;
                break;
            }
            self.steady_accumulator -= interval;
            let Some(kind) = self.draw(wave.index, survival, Rank::Regular) else {
                self.steady_accumulator = Duration::ZERO;
                break;
            };
            let group = self
                .catalog
                .get(kind)
                .map_or(1, |profile| profile.group_size.max(1) as usize)
                .min(self.room(*live));

            let base_angle = self.rng.gen_range(0.0..TAU);
            for _ in 0..group {
                let angle = base_angle + symmetric_jitter(&mut self.rng, self.placement.angle_jitter);
                if let Some(command) = self.spawn_command(kind, survival, anchor, angle) {
                    out.push(command);
                    *live += 1;
                }
            }
            trace!(kind = kind.get(), group, "steady group spawned");
        }
    }

    fn run_boss_timer(
        &mut self,
        elapsed: Duration,
        survival: Duration,
        wave: ActiveWave,
        anchor: Vec2,
        live: &mut usize,
        out: &mut Vec<Command>,
    ) {
        if !wave.boss {
            return;
        }
        let interval = self.cadence.boss_interval();
        if interval.is_zero() {
            return;
        }

        self.boss_accumulator = self.boss_accumulator.saturating_add(elapsed);
        while self.boss_accumulator >= interval {
            self.boss_accumulator -= interval;
            if self.room(*live) == 0 {
                continue;
            }
            let Some(kind) = self.draw(wave.index, survival, Rank::Boss) else {
                continue;
            };
            let angle = self.rng.gen_range(0.0..TAU);
            if let Some(command) = self.spawn_command(kind, survival, anchor, angle) {
                out.push(command);
                *live += 1;
                self.boss_spawns += 1;
                debug!(kind = kind.get(), "boss spawned");
            }
        }
    }

    fn fire_burst(
        &mut self,
        size: usize,
        wave_index: usize,
        survival: Duration,
        anchor: Vec2,
        out: &mut Vec<Command>,
    ) -> usize {
        let mut spawned = 0;
        for _ in 0..size {
            let Some(kind) = self.draw(wave_index, survival, Rank::Regular) else {
                break;
            };
            let angle = self.rng.gen_range(0.0..TAU);
            if let Some(command) = self.spawn_command(kind, survival, anchor, angle) {
                out.push(command);
                spawned += 1;
            }
        }
        spawned
    }

    fn room(&self, live: usize) -> usize {
        (self.cadence.max_active as usize).saturating_sub(live)
    }

    /// Weighted draw over profiles of `rank` eligible at `survival`.
    fn draw(&mut self, wave_index: usize, survival: Duration, rank: Rank) -> Option<EnemyKind> {
        self.kinds.clear();
        self.weights.clear();

        let eligible: &[EnemyKind] = match rank {
            Rank::Boss => &[],
            Rank::Regular => self
                .table
                .record(wave_index)
                .map(|record| record.eligible_types.as_slice())
                .unwrap_or_default(),
        };

        for (kind, profile) in self.catalog.iter() {
            if profile.rank != rank || !profile.is_available(survival) {
                continue;
            }
            if !eligible.is_empty() && !eligible.contains(&kind) {
                continue;
            }
            self.kinds.push(kind);
            self.weights.push(profile.spawn_weight);
        }

        if self.kinds.is_empty() {
            trace!(?rank, "no eligible enemy kinds");
            return None;
        }
        let distribution = WeightedIndex::new(&self.weights).ok()?;
        self.kinds.get(distribution.sample(&mut self.rng)).copied()
    }

    fn spawn_command(
        &mut self,
        kind: EnemyKind,
        survival: Duration,
        anchor: Vec2,
        angle: f32,
    ) -> Option<Command> {
        let profile = self.catalog.get(kind)?;
        let mut stats = EnemyStats::from_profile(kind, profile);
        stats.health *= self.scaling.health_multiplier(survival);
        stats.damage += self.scaling.damage_bonus(survival);

        let position = self.place(anchor, angle);
        self.spawned += 1;
        Some(Command::SpawnEnemy { stats, position })
    }

    /// Position on a ring just outside the view radius around `anchor`.
    fn place(&mut self, anchor: Vec2, angle: f32) -> Vec2 {
        let base = self.placement.min_distance();
        let distance = base + extra_distance(&mut self.rng, self.placement.distance_jitter);
        let candidate = anchor + Vec2::from_angle(angle) * distance;
        if candidate.is_finite() {
            return candidate;
        }

        warn!(?anchor, angle, "spawn position not finite, using fallback");
        let fallback = finite_or_zero(anchor) + Vec2::new(base, 0.0);
        finite_or_zero(fallback)
    }
}

fn symmetric_jitter(rng: &mut ChaCha8Rng, amount: f32) -> f32 {
    let amount = amount.abs();
    if amount.is_finite() && amount > 0.0 {
        rng.gen_range(-amount..=amount)
    } else {
        0.0
    }
}

fn extra_distance(rng: &mut ChaCha8Rng, amount: f32) -> f32 {
    if amount.is_finite() && amount > 0.0 {
        rng.gen_range(0.0..=amount)
    } else {
        0.0
    }
}
