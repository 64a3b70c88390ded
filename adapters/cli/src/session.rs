//! Headless run loop wiring the clock, world, scheduler and resolver.

use std::fmt;
use std::time::Duration;

use horde_core::{
    Command, EntityHandle, Event, ImpactContext, KnockbackVariant, PrimaryHit,
    ReleaseReason, Vec2,
};
use horde_system_clock::SimulationClock;
use horde_system_impact::ImpactResolver;
use horde_system_wave_scheduler::WaveScheduler;
use horde_world::{self as world, query, World};
use tracing::{debug, info};

/// Speed at which the stand-in movement walks enemies toward the anchor.
const WALK_SPEED: f32 = 60.0;
/// Distance from the anchor at which walking enemies stop.
const CONTACT_DISTANCE: f32 = 24.0;

const VARIANTS: [KnockbackVariant; 4] = [
    KnockbackVariant::Basic,
    KnockbackVariant::Arc { vertical_bias: 0.5 },
    KnockbackVariant::Radial { falloff: 160.0 },
    KnockbackVariant::Ground { jitter: 0.35 },
];

/// Stand-in weapon striking the enemy nearest to the anchor.
#[derive(Debug)]
pub(crate) struct Weapon {
    cooldown: Duration,
    range: f32,
    damage: f32,
    timer: Duration,
    shots: usize,
}

impl Default for Weapon {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(250),
            range: 180.0,
            damage: 6.0,
            timer: Duration::ZERO,
            shots: 0,
        }
    }
}

/// Totals gathered from the world's event stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Summary {
    pub(crate) survival: Duration,
    pub(crate) spawned: u64,
    pub(crate) died: u64,
    pub(crate) released: u64,
    pub(crate) expired: u64,
    pub(crate) primary_hits: u64,
    pub(crate) chain_hits: u64,
    pub(crate) explosions: u64,
    pub(crate) bursts: u64,
    pub(crate) bosses: u64,
    pub(crate) peak_combo: f32,
    pub(crate) damage_dealt: f64,
    pub(crate) active: usize,
    pub(crate) pool_capacity: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "survived:      {:.1}s", self.survival.as_secs_f32())?;
        writeln!(f, "spawned:       {}", self.spawned)?;
        writeln!(f, "died:          {}", self.died)?;
        writeln!(f, "released:      {} ({} expired)", self.released, self.expired)?;
        writeln!(f, "primary hits:  {}", self.primary_hits)?;
        writeln!(f, "chain hits:    {}", self.chain_hits)?;
        writeln!(f, "explosions:    {}", self.explosions)?;
        writeln!(f, "bursts:        {}", self.bursts)?;
        writeln!(f, "bosses:        {}", self.bosses)?;
        writeln!(f, "peak combo:    x{:.2}", self.peak_combo)?;
        writeln!(f, "damage dealt:  {:.0}", self.damage_dealt)?;
        write!(
            f,
            "active:        {} of {} pooled",
            self.active, self.pool_capacity
        )
    }
}

/// Owns every piece of a headless run.
#[derive(Debug)]
pub(crate) struct Session {
    world: World,
    clock: SimulationClock,
    scheduler: WaveScheduler,
    resolver: ImpactResolver,
    context: ImpactContext,
    weapon: Weapon,
    anchor: Vec2,
    summary: Summary,
    scratch: Vec<EntityHandle>,
}

impl Session {
    pub(crate) fn new(
        scheduler: WaveScheduler,
        resolver: ImpactResolver,
        context: ImpactContext,
    ) -> Self {
        Self {
            world: World::new(),
            clock: SimulationClock::default(),
            scheduler,
            resolver,
            context,
            weapon: Weapon::default(),
            anchor: Vec2::ZERO,
            summary: Summary::default(),
            scratch: Vec::new(),
        }
    }

    /// Simulates `frames` frames of `frame_ms` milliseconds each.
    pub(crate) fn run(&mut self, frames: u64, frame_ms: f32) {
        for frame in 0..frames {
            self.frame(frame_ms);
            if frame % 600 == 0 {
                debug!(
                    frame,
                    active = query::active_count(&self.world),
                    "progress"
                );
            }
        }
        info!(
            survival = ?self.clock.survival(),
            active = query::active_count(&self.world),
            "run finished"
        );
    }

    pub(crate) fn summary(&self) -> Summary {
        Summary {
            survival: self.clock.survival(),
            chain_hits: self.resolver.chain_hits(),
            explosions: self.resolver.explosions(),
            bursts: self.scheduler.bursts_fired(),
            bosses: self.scheduler.boss_spawns(),
            peak_combo: self.resolver.combo().peak_multiplier(),
            damage_dealt: query::damage_dealt(&self.world),
            active: query::active_count(&self.world),
            pool_capacity: query::pool_capacity(&self.world),
            ..self.summary.clone()
        }
    }

    fn frame(&mut self, frame_ms: f32) {
        let mut commands = Vec::new();
        self.clock.advance(frame_ms, &mut commands);
        let mut events = self.execute(commands);
        let Some(dt) = events.iter().find_map(|event| match event {
            Event::TimeAdvanced { dt, .. } => Some(*dt),
            _ => None,
        }) else {
            return;
        };

        let mut spawns = Vec::new();
        self.scheduler.handle(
            &events,
            self.clock.mode(),
            query::active_count(&self.world),
            self.anchor,
            &mut spawns,
        );
        events.extend(self.execute(spawns));

        self.walk(dt);
        self.pump(events);
        self.fire(dt);
    }

    /// Stand-in movement: every resting enemy walks toward the anchor.
    fn walk(&mut self, dt: Duration) {
        let step = WALK_SPEED * dt.as_secs_f32();
        let view = query::enemy_view(&self.world);
        let mut moves = Vec::new();
        for enemy in view.iter() {
            if enemy.is_knocked_back() || enemy.dying {
                continue;
            }
            let offset = self.anchor - enemy.position;
            let distance = offset.length();
            if distance <= CONTACT_DISTANCE {
                continue;
            }
            let travel = step.min(distance - CONTACT_DISTANCE);
            moves.push(Command::MoveEnemy {
                enemy: enemy.handle,
                position: enemy.position + offset / distance * travel,
            });
        }
        let _ = self.execute(moves);
    }

    /// Stand-in weapon: strikes the nearest enemy in range on a cooldown.
    fn fire(&mut self, dt: Duration) {
        self.weapon.timer = self.weapon.timer.saturating_add(dt);
        while self.weapon.timer >= self.weapon.cooldown {
            self.weapon.timer -= self.weapon.cooldown;

            let view = query::enemy_view(&self.world);
            self.scratch.clear();
            query::spatial_index(&self.world).query_radius(
                self.anchor,
                self.weapon.range,
                &mut self.scratch,
            );
            let anchor = self.anchor;
            let target = self
                .scratch
                .iter()
                .filter_map(|handle| view.get(*handle))
                .filter(|enemy| !enemy.dying)
                .map(|enemy| (enemy.handle, enemy.position.distance(anchor)))
                .filter(|(_, distance)| *distance <= self.weapon.range)
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            let Some((target, _)) = target else {
                continue;
            };

            let hit = PrimaryHit {
                target,
                damage: self.weapon.damage,
                instigator: anchor,
                variant: VARIANTS[self.weapon.shots % VARIANTS.len()],
            };
            self.weapon.shots += 1;
            self.summary.primary_hits += 1;

            let mut commands = Vec::new();
            self.resolver
                .resolve_hit(&hit, &view, &self.context, &mut commands);
            let events = self.execute(commands);
            self.pump(events);
        }
    }

    /// Feeds events to the resolver until the cascade dies down.
    fn pump(&mut self, mut events: Vec<Event>) {
        while !events.is_empty() {
            let view = query::enemy_view(&self.world);
            let mut commands = Vec::new();
            self.resolver.handle(
                &events,
                self.clock.mode(),
                &view,
                query::spatial_index(&self.world),
                &self.context,
                &mut commands,
            );
            events = self.execute(commands);
        }
    }

    fn execute(&mut self, commands: Vec<Command>) -> Vec<Event> {
        let mut events = Vec::new();
        for command in commands {
            world::apply(&mut self.world, command, &mut events);
        }
        for event in &events {
            match event {
                Event::EnemySpawned { .. } => self.summary.spawned += 1,
                Event::EnemyDied { .. } => self.summary.died += 1,
                Event::EnemyReleased { reason, .. } => {
                    self.summary.released += 1;
                    if *reason == ReleaseReason::Expired {
                        self.summary.expired += 1;
                    }
                }
                _ => {}
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horde_core::ClockMode;
    use horde_system_impact::ImpactConfig;
    use horde_system_wave_scheduler::SchedulerConfig;

    fn session(seed: u64) -> Session {
        let scheduler = WaveScheduler::new(SchedulerConfig {
            rng_seed: seed,
            ..SchedulerConfig::default()
        })
        .expect("default config is valid");
        let resolver = ImpactResolver::new(ImpactConfig {
            rng_seed: seed,
            ..ImpactConfig::default()
        });
        Session::new(scheduler, resolver, ImpactContext::default())
    }

    #[test]
    fn short_run_spawns_fights_and_stays_finite() {
        let mut session = session(11);
        session.run(60 * 20, 1000.0 / 60.0);

        let summary = session.summary();
        assert!(summary.spawned >= 15);
        assert!(summary.primary_hits > 0);
        assert!(summary.died > 0);
        assert_eq!(
            summary.active as u64,
            summary.spawned - summary.released,
            "every spawn is either active or released"
        );
        for enemy in query::enemy_view(&session.world).iter() {
            assert!(enemy.position.is_finite());
            assert!(enemy.health.is_finite() && enemy.health >= 0.0);
        }
    }

    #[test]
    fn identical_seeds_replay_identically() {
        let mut first = session(3);
        let mut second = session(3);
        first.run(600, 1000.0 / 60.0);
        second.run(600, 1000.0 / 60.0);
        assert_eq!(first.summary(), second.summary());
    }

    #[test]
    fn paused_session_does_not_advance() {
        let mut session = session(5);
        let _ = session.clock.set_mode(ClockMode::Paused);
        session.run(120, 1000.0 / 60.0);
        let summary = session.summary();
        assert_eq!(summary.survival, Duration::ZERO);
        assert_eq!(summary.spawned, 0);
    }
}
