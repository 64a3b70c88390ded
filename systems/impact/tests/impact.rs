use std::time::Duration;

use horde_core::{
    ClockMode, Command, DamageSource, EnemyKind, EnemyProfile, EnemyStats, EntityHandle, Event,
    Explosion, ImpactContext, KnockbackVariant, PrimaryHit, Vec2,
};
use horde_system_clock::SimulationClock;
use horde_system_impact::{ImpactConfig, ImpactResolver};
use horde_world::{self as world, query, World};

struct Arena {
    world: World,
    clock: SimulationClock,
    resolver: ImpactResolver,
    context: ImpactContext,
    log: Vec<Event>,
}

impl Arena {
    fn new() -> Self {
        Self {
            world: World::new(),
            clock: SimulationClock::default(),
            resolver: ImpactResolver::new(ImpactConfig::default()),
            context: ImpactContext::default(),
            log: Vec::new(),
        }
    }

    fn spawn(&mut self, profile: EnemyProfile, position: Vec2) -> EntityHandle {
        let events = self.apply(vec![Command::SpawnEnemy {
            stats: EnemyStats::from_profile(EnemyKind::new(0), &profile),
            position,
        }]);
        events
            .iter()
            .find_map(|event| match event {
                Event::EnemySpawned { enemy, .. } => Some(*enemy),
                _ => None,
            })
            .expect("spawned")
    }

    fn apply(&mut self, commands: Vec<Command>) -> Vec<Event> {
        let mut events = Vec::new();
        for command in commands {
            world::apply(&mut self.world, command, &mut events);
        }
        self.log.extend(events.iter().cloned());
        events
    }

    /// Feeds events to the resolver until no further commands result.
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
            events = self.apply(commands);
        }
    }

    fn hit(&mut self, target: EntityHandle, damage: f32, instigator: Vec2) {
        let view = query::enemy_view(&self.world);
        let mut commands = Vec::new();
        self.resolver.resolve_hit(
            &PrimaryHit {
                target,
                damage,
                instigator,
                variant: KnockbackVariant::Basic,
            },
            &view,
            &self.context,
            &mut commands,
        );
        let events = self.apply(commands);
        self.pump(events);
    }

    fn frame(&mut self, millis: f32) {
        let mut commands = Vec::new();
        self.clock.advance(millis, &mut commands);
        let events = self.apply(commands);
        self.pump(events);
    }

    fn health(&self, enemy: EntityHandle) -> f32 {
        query::enemy(&self.world, enemy).expect("active").health
    }
}

fn grunt(health: f32) -> EnemyProfile {
    let mut profile = EnemyProfile::new("grunt", health, 1.0, 1.0);
    profile.collision_radius = 10.0;
    profile
}

#[test]
fn knocked_back_enemy_chains_into_neighbour() {
    let mut arena = Arena::new();
    let a = arena.spawn(grunt(50.0), Vec2::ZERO);
    let b = arena.spawn(grunt(10.0), Vec2::new(18.0, 0.0));

    arena.hit(a, 5.0, Vec2::new(-50.0, 0.0));
    assert!(query::enemy(&arena.world, a).expect("a").is_knocked_back());
    assert_eq!(arena.health(b), 10.0);

    arena.frame(16.0);

    let expected = ImpactConfig::default().base_chain_damage * 1.0;
    assert!((arena.health(b) - (10.0 - expected)).abs() < 1e-6);
    assert_eq!(arena.resolver.combo().count(), 1);
    assert_eq!(arena.resolver.chain_hits(), 1);

    let b_state = query::enemy(&arena.world, b).expect("b");
    let push = b_state.knockback.expect("b knocked back");
    assert!(push.x > 0.0 && push.y.abs() < 1e-4, "pushed away from the instigator");
}

#[test]
fn chain_damage_follows_the_striking_enemy_multiplier() {
    let mut arena = Arena::new();
    let mut heavy_hitter = grunt(50.0);
    heavy_hitter.chain_damage_multiplier = 2.0;
    let a = arena.spawn(heavy_hitter, Vec2::ZERO);
    let b = arena.spawn(grunt(10.0), Vec2::new(18.0, 0.0));

    arena.hit(a, 5.0, Vec2::new(-50.0, 0.0));
    arena.frame(16.0);

    let expected = ImpactConfig::default().base_chain_damage * 2.0;
    assert!((arena.health(b) - (10.0 - expected)).abs() < 1e-6);
}

#[test]
fn chain_does_not_repeat_on_already_flying_neighbour() {
    let mut arena = Arena::new();
    let a = arena.spawn(grunt(50.0), Vec2::ZERO);
    let b = arena.spawn(grunt(10.0), Vec2::new(18.0, 0.0));

    arena.hit(a, 1.0, Vec2::new(-50.0, 0.0));
    for _ in 0..5 {
        arena.frame(16.0);
    }

    let chain_damage: usize = arena
        .log
        .iter()
        .filter(|event| {
            matches!(
                event,
                Event::EnemyDamaged {
                    enemy,
                    source: DamageSource::Chain,
                    ..
                } if *enemy == b
            )
        })
        .count();
    assert_eq!(chain_damage, 1);
}

#[test]
fn combo_expires_after_quiet_period() {
    let mut arena = Arena::new();
    let a = arena.spawn(grunt(50.0), Vec2::ZERO);
    let _b = arena.spawn(grunt(10.0), Vec2::new(18.0, 0.0));

    arena.hit(a, 1.0, Vec2::new(0.0, -50.0));
    arena.frame(16.0);
    assert_eq!(arena.resolver.combo().count(), 1);

    for _ in 0..20 {
        arena.frame(100.0);
    }
    assert_eq!(arena.resolver.combo().count(), 0);
    assert_eq!(arena.resolver.combo().multiplier(), 1.0);
}

#[test]
fn explosion_damages_everything_inside_radius_once() {
    let mut arena = Arena::new();
    let mut bomber = grunt(1.0);
    bomber.explosion = Some(Explosion {
        radius: 50.0,
        damage: 20.0,
    });
    let keg = arena.spawn(bomber, Vec2::ZERO);
    let east = arena.spawn(grunt(100.0), Vec2::new(30.0, 0.0));
    let north = arena.spawn(grunt(100.0), Vec2::new(0.0, -49.0));
    let outside = arena.spawn(grunt(100.0), Vec2::new(51.0, 0.0));
    let distant = arena.spawn(grunt(100.0), Vec2::new(80.0, 80.0));

    let events = arena.apply(vec![Command::ApplyDamage {
        enemy: keg,
        amount: 5.0,
        source: DamageSource::Primary,
    }]);
    arena.pump(events);

    assert_eq!(arena.health(east), 80.0);
    assert_eq!(arena.health(north), 80.0);
    assert_eq!(arena.health(outside), 100.0);
    assert_eq!(arena.health(distant), 100.0);

    let east_push = query::enemy(&arena.world, east)
        .expect("east")
        .knockback
        .expect("pushed");
    assert!(east_push.x > 0.0);
    let north_push = query::enemy(&arena.world, north)
        .expect("north")
        .knockback
        .expect("pushed");
    assert!(north_push.y < 0.0);
    assert!(query::enemy(&arena.world, outside)
        .expect("outside")
        .knockback
        .is_none());

    let deaths = arena
        .log
        .iter()
        .filter(|event| matches!(event, Event::EnemyDied { .. }))
        .count();
    assert_eq!(deaths, 1);
    assert_eq!(arena.resolver.explosions(), 1);
}

#[test]
fn explosions_cascade_through_explosive_neighbours() {
    let mut arena = Arena::new();
    let mut bomber = grunt(1.0);
    bomber.explosion = Some(Explosion {
        radius: 40.0,
        damage: 20.0,
    });
    let first = arena.spawn(bomber.clone(), Vec2::ZERO);
    let _second = arena.spawn(bomber, Vec2::new(35.0, 0.0));
    let victim = arena.spawn(grunt(100.0), Vec2::new(70.0, 0.0));

    arena.hit(first, 5.0, Vec2::new(-10.0, 0.0));

    assert_eq!(arena.resolver.explosions(), 2);
    assert_eq!(arena.health(victim), 80.0);
}

#[test]
fn non_finite_primary_damage_leaves_target_untouched() {
    let mut arena = Arena::new();
    let target = arena.spawn(grunt(10.0), Vec2::new(5.0, 0.0));

    arena.hit(target, f32::NAN, Vec2::ZERO);
    arena.hit(target, f32::INFINITY, Vec2::ZERO);

    let state = query::enemy(&arena.world, target).expect("target");
    assert_eq!(state.health, 10.0);
    assert!(!state.is_knocked_back());
}

#[test]
fn coincident_hit_damages_without_knockback() {
    let mut arena = Arena::new();
    let target = arena.spawn(grunt(10.0), Vec2::new(5.0, 5.0));

    arena.hit(target, 3.0, Vec2::new(5.0, 5.0));

    let state = query::enemy(&arena.world, target).expect("target");
    assert_eq!(state.health, 7.0);
    assert!(!state.is_knocked_back());
}

#[test]
fn paused_clock_freezes_chains() {
    let mut arena = Arena::new();
    let a = arena.spawn(grunt(50.0), Vec2::ZERO);
    let b = arena.spawn(grunt(10.0), Vec2::new(18.0, 0.0));
    arena.hit(a, 1.0, Vec2::new(-50.0, 0.0));

    let _ = arena.clock.set_mode(ClockMode::Paused);
    for _ in 0..10 {
        arena.frame(16.0);
    }
    assert_eq!(arena.health(b), 10.0);
    assert_eq!(query::survival(&arena.world), Duration::ZERO);
}
