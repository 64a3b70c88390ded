#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the horde simulation.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters and systems submit
//! [`Command`] values describing desired mutations, the world executes those
//! commands via its `apply` entry point, and then broadcasts [`Event`] values
//! for systems to react to deterministically. Systems consume event streams,
//! query immutable snapshots, and respond exclusively with new command batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use glam::Vec2;

/// Describes whether simulated time is flowing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClockMode {
    /// Time advances and systems react to ticks.
    #[default]
    Running,
    /// Time is frozen, for example while a level-up menu is open.
    Paused,
}

/// Stable handle addressing a pooled enemy record.
///
/// The index selects a slot in the pool arena; the generation is bumped every
/// time the slot is released so stale handles never alias a recycled record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    /// Creates a handle from its raw slot index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the pool arena.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot at the time the handle was issued.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Identifier of an enemy profile inside an [`EnemyCatalog`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EnemyKind(u16);

impl EnemyKind {
    /// Creates a new enemy kind with the provided numeric value.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the kind.
    #[must_use]
    pub const fn get(&self) -> u16 {
        self.0
    }
}

/// Mass category of an enemy, controlling how quickly knockback bleeds off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightClass {
    /// Small, easily flung enemies.
    Light,
    /// Regular enemies.
    #[default]
    Medium,
    /// Bulky enemies that stop almost immediately.
    Heavy,
}

impl WeightClass {
    /// Exponential decay rate (per second) applied to knockback velocity.
    #[must_use]
    pub const fn knockback_decay(self) -> f32 {
        match self {
            Self::Light => 3.0,
            Self::Medium => 4.5,
            Self::Heavy => 7.0,
        }
    }
}

/// Spawn tier of an enemy profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    /// Drawn by the population scheduler.
    #[default]
    Regular,
    /// Only spawned by the boss timer.
    Boss,
}

/// Area effect triggered when an enemy dies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    /// Radius of the blast in world units.
    pub radius: f32,
    /// Flat damage dealt to every enemy inside the radius.
    pub damage: f32,
}

/// Static, read-only template describing an enemy type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyProfile {
    /// Human readable name used in logs.
    pub name: String,
    /// Health before time scaling.
    pub base_health: f32,
    /// Contact damage before time scaling.
    pub base_damage: f32,
    /// Relative weight in the spawn draw. Zero disables the profile.
    pub spawn_weight: f32,
    /// Survival time in seconds before the profile may appear.
    #[serde(default)]
    pub available_after_secs: f32,
    /// Mass category of the enemy.
    #[serde(default)]
    pub weight_class: WeightClass,
    /// Multiplier applied to every knockback this enemy receives.
    #[serde(default = "one")]
    pub knockback_multiplier: f32,
    /// Multiplier applied to chain damage this enemy receives.
    #[serde(default = "one")]
    pub chain_damage_multiplier: f32,
    /// Radius used for entity-entity collisions.
    #[serde(default = "default_collision_radius")]
    pub collision_radius: f32,
    /// Optional blast triggered on death.
    #[serde(default)]
    pub explosion: Option<Explosion>,
    /// Whether the profile belongs to the regular or the boss draw.
    #[serde(default)]
    pub rank: Rank,
    /// Number of enemies spawned together in steady-state mode.
    #[serde(default = "one_u32")]
    pub group_size: u32,
    /// Optional lifetime cap in seconds after which the enemy despawns.
    #[serde(default)]
    pub lifetime_secs: Option<f32>,
}

fn one() -> f32 {
    1.0
}

fn one_u32() -> u32 {
    1
}

fn default_collision_radius() -> f32 {
    12.0
}

impl EnemyProfile {
    /// Creates a regular profile with neutral multipliers and no extras.
    #[must_use]
    pub fn new(name: impl Into<String>, base_health: f32, base_damage: f32, spawn_weight: f32) -> Self {
        Self {
            name: name.into(),
            base_health,
            base_damage,
            spawn_weight,
            available_after_secs: 0.0,
            weight_class: WeightClass::Medium,
            knockback_multiplier: 1.0,
            chain_damage_multiplier: 1.0,
            collision_radius: default_collision_radius(),
            explosion: None,
            rank: Rank::Regular,
            group_size: 1,
            lifetime_secs: None,
        }
    }

    /// Reports whether the profile may be drawn at the provided survival time.
    #[must_use]
    pub fn is_available(&self, survival: Duration) -> bool {
        self.spawn_weight.is_finite()
            && self.spawn_weight > 0.0
            && survival.as_secs_f32() >= self.available_after_secs
    }
}

/// Ordered collection of enemy profiles addressed by [`EnemyKind`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnemyCatalog {
    profiles: Vec<EnemyProfile>,
}

impl EnemyCatalog {
    /// Creates a catalog; the position of each profile becomes its kind.
    #[must_use]
    pub fn new(profiles: Vec<EnemyProfile>) -> Self {
        Self { profiles }
    }

    /// Looks up the profile registered for the provided kind.
    #[must_use]
    pub fn get(&self, kind: EnemyKind) -> Option<&EnemyProfile> {
        self.profiles.get(usize::from(kind.get()))
    }

    /// Iterates over every profile together with its kind.
    pub fn iter(&self) -> impl Iterator<Item = (EnemyKind, &EnemyProfile)> {
        self.profiles
            .iter()
            .enumerate()
            .map(|(index, profile)| (EnemyKind::new(index as u16), profile))
    }

    /// Number of registered profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Reports whether the catalog holds no profiles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Scaled per-spawn copy of a profile stored on the live enemy.
#[derive(Clone, Debug, PartialEq)]
pub struct EnemyStats {
    /// Profile the stats were derived from.
    pub kind: EnemyKind,
    /// Starting health after time scaling.
    pub health: f32,
    /// Contact damage after time scaling.
    pub damage: f32,
    /// Radius used for entity-entity collisions.
    pub collision_radius: f32,
    /// Multiplier applied to received knockback.
    pub knockback_multiplier: f32,
    /// Multiplier applied to received chain damage.
    pub chain_damage_multiplier: f32,
    /// Mass category controlling knockback decay.
    pub weight_class: WeightClass,
    /// Optional blast triggered on death.
    pub explosion: Option<Explosion>,
    /// Optional lifetime cap.
    pub lifetime: Option<Duration>,
}

impl EnemyStats {
    /// Copies a profile without any time scaling applied.
    #[must_use]
    pub fn from_profile(kind: EnemyKind, profile: &EnemyProfile) -> Self {
        Self {
            kind,
            health: profile.base_health,
            damage: profile.base_damage,
            collision_radius: profile.collision_radius,
            knockback_multiplier: profile.knockback_multiplier,
            chain_damage_multiplier: profile.chain_damage_multiplier,
            weight_class: profile.weight_class,
            explosion: profile.explosion,
            lifetime: profile
                .lifetime_secs
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f32(secs).ok()),
        }
    }
}

/// Technique used by a weapon to shape the knockback it imparts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KnockbackVariant {
    /// Straight push away from the instigator.
    Basic,
    /// Push with an extra upward component, as from an overhead swing.
    Arc {
        /// Strength of the upward bias relative to the unit direction.
        vertical_bias: f32,
    },
    /// Push whose strength falls off with distance from the instigator.
    Radial {
        /// Distance at which the push reaches its minimum strength.
        falloff: f32,
    },
    /// Push with a small random angular deviation, as from a ground slam.
    Ground {
        /// Maximum deviation in radians on either side.
        jitter: f32,
    },
}

/// Weapon collision reported by the weapon layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimaryHit {
    /// Enemy that was struck.
    pub target: EntityHandle,
    /// Damage carried by the hit.
    pub damage: f32,
    /// World position the hit originated from.
    pub instigator: Vec2,
    /// Knockback technique of the weapon.
    pub variant: KnockbackVariant,
}

/// Upgrade-driven multipliers supplied by the caller for each resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpactContext {
    /// Scales primary and explosion knockback.
    pub knockback_multiplier: f32,
    /// Scales knockback imparted by chain hits.
    pub chain_force_multiplier: f32,
}

impl Default for ImpactContext {
    fn default() -> Self {
        Self {
            knockback_multiplier: 1.0,
            chain_force_multiplier: 1.0,
        }
    }
}

/// Axis-aligned rectangle that bounces knocked-back enemies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArenaBounds {
    min: Vec2,
    max: Vec2,
}

impl ArenaBounds {
    /// Creates bounds from two opposite corners in any order.
    #[must_use]
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates bounds centred on the origin with the provided half extents.
    #[must_use]
    pub fn centered(half_width: f32, half_height: f32) -> Self {
        let half = Vec2::new(half_width.abs(), half_height.abs());
        Self::new(-half, half)
    }

    /// Lower-left corner.
    #[must_use]
    pub const fn min(&self) -> Vec2 {
        self.min
    }

    /// Upper-right corner.
    #[must_use]
    pub const fn max(&self) -> Vec2 {
        self.max
    }

    /// Centre of the rectangle.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Reports whether the point lies inside the rectangle, edges included.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Strategy used to keep the spatial index in sync with enemy positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexStrategy {
    /// Moved enemies are re-bucketed individually.
    #[default]
    Incremental,
    /// The index is cleared and rebuilt from scratch every tick.
    Rebuild,
}

/// Arena-wide tuning applied by the world.
#[derive(Clone, Debug, PartialEq)]
pub struct ArenaConfig {
    /// Optional walls that reflect knocked-back enemies.
    pub bounds: Option<ArenaBounds>,
    /// Side length of a spatial index cell in world units.
    pub cell_size: f32,
    /// Fraction of velocity kept after bouncing off a wall.
    pub restitution: f32,
    /// Speed under which a knockback is considered finished.
    pub settle_speed: f32,
    /// Time a dead enemy lingers before being released to the pool.
    pub death_grace: Duration,
    /// How the spatial index is refreshed each tick.
    pub index_strategy: IndexStrategy,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bounds: Some(ArenaBounds::centered(2_000.0, 2_000.0)),
            cell_size: 64.0,
            restitution: 0.6,
            settle_speed: 12.0,
            death_grace: Duration::from_millis(300),
            index_strategy: IndexStrategy::Incremental,
        }
    }
}

/// Origin of a damage application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DamageSource {
    /// Direct weapon hit.
    Primary,
    /// Collision with a knocked-back enemy.
    Chain,
    /// Blast from an exploding enemy.
    Explosion,
}

/// Reason an enemy returned to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseReason {
    /// Health reached zero and the death grace elapsed.
    Died,
    /// The enemy outlived its lifetime cap.
    Expired,
    /// Every enemy was released at once.
    Cleared,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Replaces the arena configuration and rebuilds the spatial index.
    Configure {
        /// Configuration to install.
        config: ArenaConfig,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
        /// Total survival time after this tick.
        survival: Duration,
    },
    /// Requests that an enemy be taken from the pool and placed in the world.
    SpawnEnemy {
        /// Scaled stats for the new enemy.
        stats: EnemyStats,
        /// World position of the new enemy.
        position: Vec2,
    },
    /// Reports a new position computed by the external movement layer.
    MoveEnemy {
        /// Enemy that moved.
        enemy: EntityHandle,
        /// Position after movement.
        position: Vec2,
    },
    /// Subtracts health from an enemy.
    ApplyDamage {
        /// Enemy receiving the damage.
        enemy: EntityHandle,
        /// Amount of health removed.
        amount: f32,
        /// Origin of the damage.
        source: DamageSource,
    },
    /// Puts an enemy into the knocked-back state.
    ApplyKnockback {
        /// Enemy being pushed.
        enemy: EntityHandle,
        /// Initial knockback velocity in units per second.
        velocity: Vec2,
    },
    /// Releases every active enemy back to the pool.
    ReleaseAll,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
        /// Total survival time after the tick.
        survival: Duration,
    },
    /// Confirms that an enemy entered the world.
    EnemySpawned {
        /// Handle assigned to the enemy.
        enemy: EntityHandle,
        /// Profile the enemy was built from.
        kind: EnemyKind,
        /// Spawn position.
        position: Vec2,
    },
    /// Reports damage dealt to an enemy.
    EnemyDamaged {
        /// Enemy that took the damage.
        enemy: EntityHandle,
        /// Health actually removed.
        amount: f32,
        /// Origin of the damage.
        source: DamageSource,
        /// Health left after the hit.
        remaining: f32,
    },
    /// Confirms that an enemy entered the knocked-back state.
    EnemyKnockedBack {
        /// Enemy being pushed.
        enemy: EntityHandle,
        /// Initial knockback velocity.
        velocity: Vec2,
    },
    /// Reports that a knockback bled off and normal movement resumes.
    KnockbackSettled {
        /// Enemy that came to rest.
        enemy: EntityHandle,
    },
    /// Reports that an enemy's health reached zero. Emitted once per life.
    EnemyDied {
        /// Enemy that died.
        enemy: EntityHandle,
        /// Profile of the enemy.
        kind: EnemyKind,
        /// Position at the moment of death.
        position: Vec2,
        /// Blast to trigger, if the profile defines one.
        explosion: Option<Explosion>,
    },
    /// Confirms that an enemy returned to the pool.
    EnemyReleased {
        /// Handle the enemy held while active.
        enemy: EntityHandle,
        /// Why the enemy was released.
        reason: ReleaseReason,
    },
}

/// Immutable representation of a single enemy's state used for queries.
#[derive(Clone, Debug, PartialEq)]
pub struct EnemySnapshot {
    /// Handle of the enemy.
    pub handle: EntityHandle,
    /// Profile the enemy was built from.
    pub kind: EnemyKind,
    /// Current world position.
    pub position: Vec2,
    /// Current knockback velocity, if knocked back.
    pub knockback: Option<Vec2>,
    /// Remaining health.
    pub health: f32,
    /// Health the enemy spawned with.
    pub max_health: f32,
    /// Contact damage dealt by the enemy.
    pub contact_damage: f32,
    /// Indicates that the enemy died and awaits release.
    pub dying: bool,
    /// Radius used for entity-entity collisions.
    pub collision_radius: f32,
    /// Multiplier applied to received knockback.
    pub knockback_multiplier: f32,
    /// Multiplier applied to received chain damage.
    pub chain_damage_multiplier: f32,
}

impl EnemySnapshot {
    /// Reports whether the enemy is currently knocked back.
    #[must_use]
    pub fn is_knocked_back(&self) -> bool {
        self.knockback.is_some()
    }
}

/// Read-only snapshot describing all active enemies.
#[derive(Clone, Debug, Default)]
pub struct EnemyView {
    snapshots: Vec<EnemySnapshot>,
    max_collision_radius: f32,
}

impl EnemyView {
    /// Creates a new enemy view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<EnemySnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.handle);
        let max_collision_radius = snapshots
            .iter()
            .map(|snapshot| snapshot.collision_radius)
            .fold(0.0_f32, f32::max);
        Self {
            snapshots,
            max_collision_radius,
        }
    }

    /// Iterator over the captured snapshots in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &EnemySnapshot> {
        self.snapshots.iter()
    }

    /// Looks up the snapshot captured for the provided handle.
    #[must_use]
    pub fn get(&self, handle: EntityHandle) -> Option<&EnemySnapshot> {
        self.snapshots
            .binary_search_by_key(&handle, |snapshot| snapshot.handle)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// Largest collision radius among the captured enemies.
    #[must_use]
    pub fn max_collision_radius(&self) -> f32 {
        self.max_collision_radius
    }

    /// Number of captured snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<EnemySnapshot> {
        self.snapshots
    }
}

/// Replaces non-finite components with zero.
#[must_use]
pub fn finite_or_zero(vector: Vec2) -> Vec2 {
    if vector.is_finite() {
        vector
    } else {
        Vec2::ZERO
    }
}
