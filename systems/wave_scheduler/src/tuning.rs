//! Tuning surface of the wave scheduler, loadable from TOML.

use std::time::Duration;

use horde_core::{EnemyCatalog, EnemyKind, EnemyProfile, Explosion, Rank, WeightClass};
use serde::Deserialize;
use thiserror::Error;

use crate::table::{WaveRecord, WaveTable};

/// Errors raised while loading or validating scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("failed to parse scheduler config: {0}")]
    Parse(#[from] toml::de::Error),
    /// No wave records were supplied.
    #[error("wave table is empty")]
    EmptyWaveTable,
    /// A wave record starts before the record preceding it.
    #[error("wave {index} starts at minute {start_minute}, before the previous wave at {previous}")]
    UnsortedWaves {
        /// Position of the offending record.
        index: usize,
        /// Start minute of the offending record.
        start_minute: f32,
        /// Start minute of the preceding record.
        previous: f32,
    },
    /// A wave record has a negative or non-finite start minute.
    #[error("wave {index} has an invalid start minute")]
    InvalidStartMinute {
        /// Position of the offending record.
        index: usize,
    },
    /// A wave record has a zero spawn interval.
    #[error("wave {index} has a zero spawn interval")]
    ZeroSpawnInterval {
        /// Position of the offending record.
        index: usize,
    },
    /// A wave record references a kind missing from the catalog.
    #[error("wave {index} references unknown enemy kind {kind}")]
    UnknownEnemyKind {
        /// Position of the offending record.
        index: usize,
        /// Kind that has no profile.
        kind: u16,
    },
    /// A tuning value is outside its valid range.
    #[error("invalid tuning value: {0}")]
    InvalidTuning(&'static str),
}

/// Pacing parameters for bursts, bosses and the population cap.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CadenceTuning {
    /// Simulated time between deficit bursts.
    pub burst_cadence_ms: u32,
    /// Share of the deficit filled per burst at the start of a run.
    pub early_burst_fraction: f32,
    /// Share of the deficit filled per burst once the ramp completes.
    pub late_burst_fraction: f32,
    /// Survival minutes over which the burst share ramps from early to late.
    pub fraction_ramp_minutes: f32,
    /// Seconds between boss spawns while the wave allows bosses.
    pub boss_interval_secs: f32,
    /// Hard cap on simultaneously active enemies.
    pub max_active: u32,
}

impl Default for CadenceTuning {
    fn default() -> Self {
        Self {
            burst_cadence_ms: 100,
            early_burst_fraction: 0.25,
            late_burst_fraction: 0.5,
            fraction_ramp_minutes: 10.0,
            boss_interval_secs: 60.0,
            max_active: 500,
        }
    }
}

impl CadenceTuning {
    /// Simulated time between deficit bursts.
    #[must_use]
    pub fn burst_cadence(&self) -> Duration {
        Duration::from_millis(u64::from(self.burst_cadence_ms))
    }

    /// Time between boss spawns; zero disables the boss timer, as does an
    /// interval too long to represent.
    #[must_use]
    pub fn boss_interval(&self) -> Duration {
        if self.boss_interval_secs > 0.0 {
            Duration::try_from_secs_f32(self.boss_interval_secs).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    /// Share of the deficit filled by one burst at the provided survival time.
    #[must_use]
    pub fn burst_fraction(&self, survival: Duration) -> f32 {
        let progress = if self.fraction_ramp_minutes > 0.0 {
            (survival.as_secs_f32() / 60.0 / self.fraction_ramp_minutes).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let fraction = self.early_burst_fraction
            + (self.late_burst_fraction - self.early_burst_fraction) * progress;
        fraction.clamp(f32::EPSILON, 1.0)
    }
}

/// Step functions scaling spawned health and damage with survival time.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScalingTuning {
    /// Seconds per health increment.
    pub health_step_secs: f32,
    /// Multiplier added per health increment.
    pub health_step: f32,
    /// Largest health multiplier.
    pub health_cap: f32,
    /// Seconds per damage increment.
    pub damage_step_secs: f32,
    /// Flat damage added per damage increment.
    pub damage_step: f32,
    /// Largest flat damage bonus.
    pub damage_cap: f32,
}

impl Default for ScalingTuning {
    fn default() -> Self {
        Self {
            health_step_secs: 60.0,
            health_step: 0.1,
            health_cap: 3.0,
            damage_step_secs: 120.0,
            damage_step: 1.0,
            damage_cap: 10.0,
        }
    }
}

impl ScalingTuning {
    /// Health multiplier for enemies spawned at the provided survival time.
    #[must_use]
    pub fn health_multiplier(&self, survival: Duration) -> f32 {
        let steps = whole_steps(survival, self.health_step_secs);
        (1.0 + steps * self.health_step).min(self.health_cap.max(1.0))
    }

    /// Flat damage bonus for enemies spawned at the provided survival time.
    #[must_use]
    pub fn damage_bonus(&self, survival: Duration) -> f32 {
        let steps = whole_steps(survival, self.damage_step_secs);
        (steps * self.damage_step).min(self.damage_cap.max(0.0))
    }
}

fn whole_steps(survival: Duration, step_secs: f32) -> f32 {
    if step_secs.is_finite() && step_secs > 0.0 {
        (survival.as_secs_f32() / step_secs).floor()
    } else {
        0.0
    }
}

/// Geometry of spawn placement around the anchor.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlacementTuning {
    /// Radius of the visible area around the anchor.
    pub view_radius: f32,
    /// Extra distance beyond the view radius.
    pub margin: f32,
    /// Largest random distance added on top of radius and margin.
    pub distance_jitter: f32,
    /// Largest random angular deviation in radians for group members.
    pub angle_jitter: f32,
}

impl Default for PlacementTuning {
    fn default() -> Self {
        Self {
            view_radius: 640.0,
            margin: 64.0,
            distance_jitter: 48.0,
            angle_jitter: 0.2,
        }
    }
}

impl PlacementTuning {
    /// Minimum distance from the anchor at which enemies appear.
    #[must_use]
    pub fn min_distance(&self) -> f32 {
        self.view_radius + self.margin
    }
}

/// Linear growth applied past the last wave record.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExtrapolationTuning {
    /// Population added per whole minute past the last record.
    pub population_growth_per_minute: u32,
    /// Largest extrapolated minimum population.
    pub population_cap: u32,
    /// Interval removed per whole minute past the last record.
    pub interval_step_ms: u32,
    /// Smallest extrapolated spawn interval.
    pub interval_floor_ms: u32,
}

impl Default for ExtrapolationTuning {
    fn default() -> Self {
        Self {
            population_growth_per_minute: 20,
            population_cap: 400,
            interval_step_ms: 25,
            interval_floor_ms: 150,
        }
    }
}

/// Complete scheduler configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wave records sorted by start minute.
    pub waves: Vec<WaveRecord>,
    /// Enemy profiles addressed by kind.
    pub enemies: EnemyCatalog,
    /// Growth past the last wave record.
    pub extrapolation: ExtrapolationTuning,
    /// Burst, boss and cap pacing.
    pub cadence: CadenceTuning,
    /// Health and damage scaling.
    pub scaling: ScalingTuning,
    /// Spawn placement geometry.
    pub placement: PlacementTuning,
    /// Seed for every random draw made by the scheduler.
    pub rng_seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            waves: default_waves(),
            enemies: default_enemies(),
            extrapolation: ExtrapolationTuning::default(),
            cadence: CadenceTuning::default(),
            scaling: ScalingTuning::default(),
            placement: PlacementTuning::default(),
            rng_seed: 0x4d59_5df4_d0f3_3173,
        }
    }
}

impl SchedulerConfig {
    /// Parses and validates a TOML document. Missing sections use defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the wave table, kind references and tuning ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let _ = WaveTable::new(self.waves.clone(), self.extrapolation.clone())?;

        for (index, record) in self.waves.iter().enumerate() {
            if let Some(kind) = record
                .eligible_types
                .iter()
                .find(|kind| self.enemies.get(**kind).is_none())
            {
                return Err(ConfigError::UnknownEnemyKind {
                    index,
                    kind: kind.get(),
                });
            }
        }

        let cadence = &self.cadence;
        if cadence.burst_cadence_ms == 0 {
            return Err(ConfigError::InvalidTuning("burst_cadence_ms must be positive"));
        }
        for fraction in [cadence.early_burst_fraction, cadence.late_burst_fraction] {
            if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) {
                return Err(ConfigError::InvalidTuning("burst fractions must lie in (0, 1]"));
            }
        }
        if !cadence.fraction_ramp_minutes.is_finite() {
            return Err(ConfigError::InvalidTuning("fraction_ramp_minutes must be finite"));
        }
        if Duration::try_from_secs_f32(cadence.boss_interval_secs).is_err() {
            return Err(ConfigError::InvalidTuning(
                "boss_interval_secs must be a non-negative representable duration",
            ));
        }

        let lifetimes = self
            .enemies
            .iter()
            .filter_map(|(_, profile)| profile.lifetime_secs);
        for secs in lifetimes {
            if Duration::try_from_secs_f32(secs).is_err() {
                return Err(ConfigError::InvalidTuning(
                    "lifetime_secs must be a non-negative representable duration",
                ));
            }
        }

        let placement = &self.placement;
        let geometry = [
            placement.view_radius,
            placement.margin,
            placement.distance_jitter,
            placement.angle_jitter,
        ];
        if geometry.iter().any(|value| !value.is_finite() || *value < 0.0) {
            return Err(ConfigError::InvalidTuning(
                "placement values must be finite and non-negative",
            ));
        }

        let scaling = &self.scaling;
        let steps = [
            scaling.health_step,
            scaling.health_cap,
            scaling.damage_step,
            scaling.damage_cap,
        ];
        if steps.iter().any(|value| !value.is_finite()) {
            return Err(ConfigError::InvalidTuning("scaling values must be finite"));
        }
        Ok(())
    }
}

fn default_waves() -> Vec<WaveRecord> {
    let kinds = |values: &[u16]| -> Vec<EnemyKind> {
        values.iter().copied().map(EnemyKind::new).collect()
    };
    vec![
        WaveRecord::new(0.0, 15, 1_000, kinds(&[0])),
        WaveRecord::new(1.0, 30, 900, kinds(&[0, 1])),
        WaveRecord::new(2.0, 50, 800, kinds(&[0, 1, 2])),
        WaveRecord::new(3.0, 70, 700, Vec::new()).with_boss(),
        WaveRecord::new(5.0, 100, 600, Vec::new()),
        WaveRecord::new(8.0, 150, 500, Vec::new()).with_boss(),
    ]
}

fn default_enemies() -> EnemyCatalog {
    let grunt = EnemyProfile::new("grunt", 10.0, 5.0, 10.0);

    let mut bat = EnemyProfile::new("bat", 4.0, 3.0, 6.0);
    bat.weight_class = WeightClass::Light;
    bat.knockback_multiplier = 1.5;
    bat.collision_radius = 8.0;
    bat.group_size = 5;
    bat.available_after_secs = 45.0;
    bat.lifetime_secs = Some(40.0);

    let mut brute = EnemyProfile::new("brute", 40.0, 12.0, 3.0);
    brute.weight_class = WeightClass::Heavy;
    brute.knockback_multiplier = 0.4;
    brute.chain_damage_multiplier = 2.0;
    brute.collision_radius = 20.0;
    brute.available_after_secs = 100.0;

    let mut bomber = EnemyProfile::new("bomber", 15.0, 8.0, 2.0);
    bomber.explosion = Some(Explosion {
        radius: 60.0,
        damage: 20.0,
    });
    bomber.available_after_secs = 150.0;

    let mut warden = EnemyProfile::new("warden", 400.0, 25.0, 1.0);
    warden.rank = Rank::Boss;
    warden.weight_class = WeightClass::Heavy;
    warden.knockback_multiplier = 0.1;
    warden.collision_radius = 36.0;

    EnemyCatalog::new(vec![grunt, bat, brute, bomber, warden])
}
