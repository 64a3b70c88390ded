#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the horde simulation.
//!
//! The world owns the enemy pool and the spatial index. It mutates state only
//! through [`apply`] and exposes read-only access through [`query`].

pub mod pool;
pub mod spatial;

use std::time::Duration;

use horde_core::{
    finite_or_zero, ArenaBounds, ArenaConfig, Command, DamageSource, EnemyKind, EnemySnapshot,
    EnemyStats, EntityHandle, Event, Explosion, IndexStrategy, ReleaseReason, Vec2, WeightClass,
};
use tracing::{debug, trace, warn};

pub use pool::{Pool, ResetError, Reusable};
pub use spatial::{CellKey, SpatialIndex};

/// Represents the authoritative simulation state.
#[derive(Debug)]
pub struct World {
    config: ArenaConfig,
    pool: Pool<Enemy>,
    index: SpatialIndex<EntityHandle>,
    survival: Duration,
    damage_dealt: f64,
    scratch: Vec<EntityHandle>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world using the default arena configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ArenaConfig::default())
    }

    /// Creates a world using the provided arena configuration.
    #[must_use]
    pub fn with_config(config: ArenaConfig) -> Self {
        Self {
            index: SpatialIndex::new(config.cell_size),
            config,
            pool: Pool::new(),
            survival: Duration::ZERO,
            damage_dealt: 0.0,
            scratch: Vec::new(),
        }
    }

    fn advance(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        let dt_secs = dt.as_secs_f32();

        // Releasing mutates the active list, so walk a copy of it.
        let mut handles = std::mem::take(&mut self.scratch);
        handles.clear();
        handles.extend(self.pool.handles());

        for &handle in &handles {
            let Some(enemy) = self.pool.get_mut(handle) else {
                continue;
            };
            match enemy.step(dt, dt_secs, &self.config) {
                StepOutcome::Idle => {}
                StepOutcome::Release(reason) => self.release(handle, reason, out_events),
                StepOutcome::Moved { position, settled } => {
                    if self.config.index_strategy == IndexStrategy::Incremental {
                        let _ = self.index.update(handle, position);
                    }
                    if settled {
                        out_events.push(Event::KnockbackSettled { enemy: handle });
                    }
                }
            }
        }

        self.scratch = handles;

        if self.config.index_strategy == IndexStrategy::Rebuild {
            self.index
                .rebuild(self.pool.iter().map(|(handle, enemy)| (handle, enemy.position)));
        }
    }

    fn spawn(&mut self, stats: EnemyStats, position: Vec2, out_events: &mut Vec<Event>) {
        if !position.is_finite() {
            warn!(?position, kind = stats.kind.get(), "spawn rejected: non-finite position");
            return;
        }
        if !stats.health.is_finite() || stats.health <= 0.0 {
            warn!(health = stats.health, kind = stats.kind.get(), "spawn rejected: invalid health");
            return;
        }

        let handle = self.pool.acquire();
        let kind = stats.kind;
        if let Some(enemy) = self.pool.get_mut(handle) {
            enemy.activate(stats, position);
        }
        let _ = self.index.insert(handle, position);
        debug!(?handle, kind = kind.get(), "enemy spawned");
        out_events.push(Event::EnemySpawned {
            enemy: handle,
            kind,
            position,
        });
    }

    fn damage(
        &mut self,
        handle: EntityHandle,
        amount: f32,
        source: DamageSource,
        out_events: &mut Vec<Event>,
    ) {
        if !amount.is_finite() || amount < 0.0 {
            warn!(?handle, amount, ?source, "damage rejected: invalid amount");
            return;
        }
        let grace = self.config.death_grace;
        let Some(enemy) = self.pool.get_mut(handle) else {
            trace!(?handle, "damage for inactive enemy ignored");
            return;
        };
        if enemy.dying.is_some() || amount == 0.0 {
            return;
        }

        let before = enemy.health;
        enemy.health = (before - amount).max(0.0);
        let dealt = before - enemy.health;
        self.damage_dealt += f64::from(dealt);
        out_events.push(Event::EnemyDamaged {
            enemy: handle,
            amount: dealt,
            source,
            remaining: enemy.health,
        });

        if enemy.health <= 0.0 && !enemy.death_reported {
            enemy.death_reported = true;
            enemy.dying = Some(grace);
            debug!(?handle, ?source, "enemy died");
            out_events.push(Event::EnemyDied {
                enemy: handle,
                kind: enemy.kind,
                position: enemy.position,
                explosion: enemy.explosion,
            });
        }
    }

    fn knock_back(&mut self, handle: EntityHandle, velocity: Vec2, out_events: &mut Vec<Event>) {
        if !velocity.is_finite() || velocity == Vec2::ZERO {
            warn!(?handle, ?velocity, "knockback rejected: invalid velocity");
            return;
        }
        let Some(enemy) = self.pool.get_mut(handle) else {
            return;
        };
        enemy.knockback = Some(velocity);
        out_events.push(Event::EnemyKnockedBack {
            enemy: handle,
            velocity,
        });
    }

    fn move_enemy(&mut self, handle: EntityHandle, position: Vec2) {
        if !position.is_finite() {
            warn!(?handle, ?position, "movement rejected: non-finite position");
            return;
        }
        let Some(enemy) = self.pool.get_mut(handle) else {
            return;
        };
        if enemy.knockback.is_some() || enemy.dying.is_some() {
            return;
        }
        enemy.position = position;
        let _ = self.index.update(handle, position);
    }

    fn release(&mut self, handle: EntityHandle, reason: ReleaseReason, out_events: &mut Vec<Event>) {
        let _ = self.index.remove(handle);
        if self.pool.release(handle) {
            debug!(?handle, ?reason, "enemy released");
            out_events.push(Event::EnemyReleased {
                enemy: handle,
                reason,
            });
        }
    }

    fn release_all(&mut self, out_events: &mut Vec<Event>) {
        let handles: Vec<EntityHandle> = self.pool.handles().collect();
        let released = self.pool.release_all();
        debug_assert_eq!(released, handles.len());
        self.index.clear();
        for enemy in handles {
            out_events.push(Event::EnemyReleased {
                enemy,
                reason: ReleaseReason::Cleared,
            });
        }
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Configure { config } => {
            world.index = SpatialIndex::new(config.cell_size);
            world
                .index
                .rebuild(world.pool.iter().map(|(handle, enemy)| (handle, enemy.position)));
            world.config = config;
        }
        Command::Tick { dt, survival } => {
            world.survival = survival;
            out_events.push(Event::TimeAdvanced { dt, survival });
            world.advance(dt, out_events);
        }
        Command::SpawnEnemy { stats, position } => world.spawn(stats, position, out_events),
        Command::MoveEnemy { enemy, position } => world.move_enemy(enemy, position),
        Command::ApplyDamage {
            enemy,
            amount,
            source,
        } => world.damage(enemy, amount, source, out_events),
        Command::ApplyKnockback { enemy, velocity } => world.knock_back(enemy, velocity, out_events),
        Command::ReleaseAll => world.release_all(out_events),
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use horde_core::{ArenaConfig, EnemySnapshot, EnemyView, EntityHandle};

    use super::{SpatialIndex, World};

    /// Number of enemies currently simulated.
    #[must_use]
    pub fn active_count(world: &World) -> usize {
        world.pool.active_count()
    }

    /// Number of pooled enemies waiting for reuse.
    #[must_use]
    pub fn available_count(world: &World) -> usize {
        world.pool.available_count()
    }

    /// Total number of enemy records ever constructed.
    #[must_use]
    pub fn pool_capacity(world: &World) -> usize {
        world.pool.capacity()
    }

    /// Captures a read-only view of every active enemy.
    #[must_use]
    pub fn enemy_view(world: &World) -> EnemyView {
        EnemyView::from_snapshots(
            world
                .pool
                .iter()
                .map(|(handle, enemy)| enemy.snapshot(handle))
                .collect(),
        )
    }

    /// Captures the snapshot of a single active enemy.
    #[must_use]
    pub fn enemy(world: &World, handle: EntityHandle) -> Option<EnemySnapshot> {
        world.pool.get(handle).map(|enemy| enemy.snapshot(handle))
    }

    /// Provides read-only access to the spatial index.
    #[must_use]
    pub fn spatial_index(world: &World) -> &SpatialIndex<EntityHandle> {
        &world.index
    }

    /// Survival time recorded by the latest tick.
    #[must_use]
    pub fn survival(world: &World) -> Duration {
        world.survival
    }

    /// Total health removed from enemies since the world was created.
    #[must_use]
    pub fn damage_dealt(world: &World) -> f64 {
        world.damage_dealt
    }

    /// Arena configuration currently installed.
    #[must_use]
    pub fn arena_config(world: &World) -> &ArenaConfig {
        &world.config
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum StepOutcome {
    Idle,
    Moved { position: Vec2, settled: bool },
    Release(ReleaseReason),
}

#[derive(Clone, Debug, Default)]
struct Enemy {
    kind: EnemyKind,
    position: Vec2,
    health: f32,
    max_health: f32,
    contact_damage: f32,
    collision_radius: f32,
    knockback_multiplier: f32,
    chain_damage_multiplier: f32,
    weight_class: WeightClass,
    explosion: Option<Explosion>,
    lifetime: Option<Duration>,
    age: Duration,
    knockback: Option<Vec2>,
    dying: Option<Duration>,
    death_reported: bool,
}

impl Reusable for Enemy {
    fn reset(&mut self) -> Result<(), ResetError> {
        *self = Self::default();
        Ok(())
    }
}

impl Enemy {
    fn activate(&mut self, stats: EnemyStats, position: Vec2) {
        *self = Self {
            kind: stats.kind,
            position,
            health: stats.health,
            max_health: stats.health,
            contact_damage: finite_scalar(stats.damage, 0.0),
            collision_radius: finite_scalar(stats.collision_radius, 0.0).max(0.0),
            knockback_multiplier: finite_scalar(stats.knockback_multiplier, 1.0),
            chain_damage_multiplier: finite_scalar(stats.chain_damage_multiplier, 1.0),
            weight_class: stats.weight_class,
            explosion: stats.explosion,
            lifetime: stats.lifetime,
            ..Self::default()
        };
    }

    fn step(&mut self, dt: Duration, dt_secs: f32, config: &ArenaConfig) -> StepOutcome {
        self.age = self.age.saturating_add(dt);

        if let Some(remaining) = self.dying {
            let left = remaining.saturating_sub(dt);
            if left.is_zero() {
                return StepOutcome::Release(ReleaseReason::Died);
            }
            self.dying = Some(left);
        } else if self.lifetime.is_some_and(|cap| self.age >= cap) {
            return StepOutcome::Release(ReleaseReason::Expired);
        }

        let Some(velocity) = self.knockback else {
            return StepOutcome::Idle;
        };

        let mut position = self.position + velocity * dt_secs;
        let mut velocity = velocity;
        if let Some(bounds) = config.bounds {
            reflect(&mut position, &mut velocity, bounds, config.restitution);
        }
        velocity *= (-self.weight_class.knockback_decay() * dt_secs).exp();

        if !position.is_finite() {
            position = self.position;
        }
        let velocity = finite_or_zero(velocity);
        self.position = position;

        let settled = velocity.length() < config.settle_speed;
        self.knockback = (!settled).then_some(velocity);
        StepOutcome::Moved { position, settled }
    }

    fn snapshot(&self, handle: EntityHandle) -> EnemySnapshot {
        EnemySnapshot {
            handle,
            kind: self.kind,
            position: self.position,
            knockback: self.knockback,
            health: self.health,
            max_health: self.max_health,
            contact_damage: self.contact_damage,
            dying: self.dying.is_some(),
            collision_radius: self.collision_radius,
            knockback_multiplier: self.knockback_multiplier,
            chain_damage_multiplier: self.chain_damage_multiplier,
        }
    }
}

fn finite_scalar(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Bounces a position back inside the bounds, keeping part of the speed.
fn reflect(position: &mut Vec2, velocity: &mut Vec2, bounds: ArenaBounds, restitution: f32) {
    let keep = finite_scalar(restitution, 0.0).clamp(0.0, 1.0);
    let (min, max) = (bounds.min(), bounds.max());

    if position.x < min.x {
        position.x = min.x;
        velocity.x = velocity.x.abs() * keep;
    } else if position.x > max.x {
        position.x = max.x;
        velocity.x = -velocity.x.abs() * keep;
    }

    if position.y < min.y {
        position.y = min.y;
        velocity.y = velocity.y.abs() * keep;
    } else if position.y > max.y {
        position.y = max.y;
        velocity.y = -velocity.y.abs() * keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_bounces_with_partial_energy() {
        let bounds = ArenaBounds::centered(10.0, 10.0);
        let mut position = Vec2::new(12.0, 0.0);
        let mut velocity = Vec2::new(100.0, 5.0);
        reflect(&mut position, &mut velocity, bounds, 0.5);
        assert_eq!(position, Vec2::new(10.0, 0.0));
        assert_eq!(velocity, Vec2::new(-50.0, 5.0));
    }

    #[test]
    fn dying_enemy_releases_after_grace() {
        let mut enemy = Enemy {
            health: 0.0,
            dying: Some(Duration::from_millis(100)),
            ..Enemy::default()
        };
        let config = ArenaConfig::default();
        assert_eq!(
            enemy.step(Duration::from_millis(60), 0.06, &config),
            StepOutcome::Idle
        );
        assert_eq!(
            enemy.step(Duration::from_millis(60), 0.06, &config),
            StepOutcome::Release(ReleaseReason::Died)
        );
    }

    #[test]
    fn reset_restores_default_record() {
        let mut enemy = Enemy {
            health: 4.0,
            knockback: Some(Vec2::X),
            death_reported: true,
            ..Enemy::default()
        };
        assert!(enemy.reset().is_ok());
        assert_eq!(enemy.health, 0.0);
        assert!(enemy.knockback.is_none());
        assert!(!enemy.death_reported);
    }
}
