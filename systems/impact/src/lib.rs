#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Impact resolution: knockback, chain hits, combo and death explosions.
//!
//! Primary hits arrive from the weapon layer through
//! [`ImpactResolver::resolve_hit`]. Every tick afterwards the resolver scans
//! the knocked-back enemies for overlaps with resting ones and turns each
//! overlap into a chain hit scaled by the running combo. Deaths of explosive
//! enemies damage and push everything inside the blast radius.

mod combo;
mod knockback;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use horde_core::{
    ClockMode, Command, DamageSource, EnemySnapshot, EnemyView, EntityHandle, Event, Explosion,
    ImpactContext, KnockbackVariant, PrimaryHit, Vec2,
};
use horde_world::SpatialIndex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace, warn};

pub use combo::{ComboState, ComboTuning};
pub use knockback::{compute_knockback, RADIAL_MIN_SCALE};

/// Force constants and combo parameters of the resolver.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpactConfig {
    /// Knockback speed imparted by a primary hit before multipliers.
    pub base_force: f32,
    /// Knockback speed imparted by a chain hit before multipliers.
    pub chain_force: f32,
    /// Damage of a chain hit before the enemy and combo multipliers.
    pub base_chain_damage: f32,
    /// Knockback speed at the centre of a death explosion.
    pub explosion_force: f32,
    /// Combo multiplier parameters.
    pub combo: ComboTuning,
    /// Seed for jittered knockback variants.
    pub rng_seed: u64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            base_force: 320.0,
            chain_force: 220.0,
            base_chain_damage: 1.0,
            explosion_force: 260.0,
            combo: ComboTuning::default(),
            rng_seed: 0x1a2b_3c4d_5e6f_7081,
        }
    }
}

/// Resolves primary hits into knockback and chain reactions.
#[derive(Debug)]
pub struct ImpactResolver {
    config: ImpactConfig,
    combo: ComboState,
    rng: ChaCha8Rng,
    survival: Duration,
    origins: HashMap<EntityHandle, Vec2>,
    struck: HashSet<EntityHandle>,
    sources: Vec<ChainSource>,
    candidates: Vec<EntityHandle>,
    chain_hits: u64,
    explosions: u64,
}

impl Default for ImpactResolver {
    fn default() -> Self {
        Self::new(ImpactConfig::default())
    }
}

impl ImpactResolver {
    /// Creates a resolver with an idle combo.
    #[must_use]
    pub fn new(config: ImpactConfig) -> Self {
        Self {
            combo: ComboState::new(config.combo),
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            config,
            survival: Duration::ZERO,
            origins: HashMap::new(),
            struck: HashSet::new(),
            sources: Vec::new(),
            candidates: Vec::new(),
            chain_hits: 0,
            explosions: 0,
        }
    }

    /// Running combo.
    #[must_use]
    pub fn combo(&self) -> &ComboState {
        &self.combo
    }

    /// Chain hits resolved so far.
    #[must_use]
    pub fn chain_hits(&self) -> u64 {
        self.chain_hits
    }

    /// Death explosions resolved so far.
    #[must_use]
    pub fn explosions(&self) -> u64 {
        self.explosions
    }

    /// Number of knocked-back enemies whose instigator is remembered.
    #[must_use]
    pub fn tracked_origins(&self) -> usize {
        self.origins.len()
    }

    /// Forgets combo, origins and counters for a new run.
    pub fn reset(&mut self) {
        self.combo.reset();
        self.survival = Duration::ZERO;
        self.origins.clear();
        self.chain_hits = 0;
        self.explosions = 0;
    }

    /// Turns a weapon hit into knockback and primary damage commands.
    ///
    /// Hits carrying non-finite or negative damage are dropped whole. When the
    /// instigator sits exactly on the target only the damage is applied.
    pub fn resolve_hit(
        &mut self,
        hit: &PrimaryHit,
        view: &EnemyView,
        context: &ImpactContext,
        out: &mut Vec<Command>,
    ) {
        if !hit.damage.is_finite() || hit.damage < 0.0 {
            warn!(target = ?hit.target, damage = hit.damage, "primary hit rejected: invalid damage");
            return;
        }
        let Some(target) = view.get(hit.target) else {
            trace!(target = ?hit.target, "primary hit on inactive enemy ignored");
            return;
        };
        if target.dying {
            return;
        }

        let magnitude =
            self.config.base_force * context.knockback_multiplier * target.knockback_multiplier;
        let velocity = compute_knockback(
            hit.variant,
            hit.instigator,
            target.position,
            magnitude,
            &mut self.rng,
        );
        if velocity != Vec2::ZERO {
            out.push(Command::ApplyKnockback {
                enemy: target.handle,
                velocity,
            });
            let _ = self.origins.insert(target.handle, hit.instigator);
        }
        out.push(Command::ApplyDamage {
            enemy: target.handle,
            amount: hit.damage,
            source: DamageSource::Primary,
        });
        trace!(target = ?target.handle, damage = hit.damage, ?velocity, "primary hit resolved");
    }

    /// Reacts to world events, emitting chain, explosion and cleanup effects.
    ///
    /// `view` and `index` must reflect the world after the events were
    /// produced. Chain collisions are scanned once per call that contains a
    /// tick; explosions fire for every death carrying a blast.
    pub fn handle(
        &mut self,
        events: &[Event],
        clock: ClockMode,
        view: &EnemyView,
        index: &SpatialIndex<EntityHandle>,
        context: &ImpactContext,
        out: &mut Vec<Command>,
    ) {
        let mut ticked = false;
        for event in events {
            match event {
                Event::TimeAdvanced { survival, .. } => {
                    self.survival = *survival;
                    ticked = true;
                }
                Event::EnemyDied {
                    enemy,
                    position,
                    explosion: Some(blast),
                    ..
                } => self.explode(*enemy, *position, *blast, view, index, context, out),
                Event::KnockbackSettled { enemy } | Event::EnemyReleased { enemy, .. } => {
                    let _ = self.origins.remove(enemy);
                }
                _ => {}
            }
        }

        if ticked && clock == ClockMode::Running {
            if self.combo.expire(self.survival) {
                debug!("combo ended");
            }
            self.resolve_chains(view, index, context, out);
        }
    }

    fn resolve_chains(
        &mut self,
        view: &EnemyView,
        index: &SpatialIndex<EntityHandle>,
        context: &ImpactContext,
        out: &mut Vec<Command>,
    ) {
        self.struck.clear();
        self.sources.clear();
        self.sources.extend(
            view.iter()
                .filter(|snapshot| snapshot.is_knocked_back())
                .map(ChainSource::of),
        );
        let reach = view.max_collision_radius();

        for slot in 0..self.sources.len() {
            let source = self.sources[slot];
            let (position, radius) = (source.position, source.collision_radius);
            let origin = self.origins.get(&source.handle).copied().unwrap_or(position);

            self.candidates.clear();
            index.query_radius(position, radius + reach, &mut self.candidates);
            self.candidates.sort_unstable();
            self.candidates.dedup();

            for candidate_slot in 0..self.candidates.len() {
                let handle = self.candidates[candidate_slot];
                if handle == source.handle || self.struck.contains(&handle) {
                    continue;
                }
                let Some(candidate) = view.get(handle) else {
                    continue;
                };
                if candidate.is_knocked_back() || candidate.dying {
                    continue;
                }
                let distance = candidate.position.distance(position);
                if !(distance < radius + candidate.collision_radius) {
                    continue;
                }

                let _ = self.struck.insert(handle);
                self.chain_hit(source, candidate, origin, context, out);
            }
        }
    }

    /// Damage scales with the striking source's chain multiplier; the push
    /// goes to the resting candidate.
    fn chain_hit(
        &mut self,
        source: ChainSource,
        candidate: &EnemySnapshot,
        origin: Vec2,
        context: &ImpactContext,
        out: &mut Vec<Command>,
    ) {
        let multiplier = self.combo.register_hit(self.survival);
        self.chain_hits += 1;

        let magnitude = self.config.chain_force
            * context.chain_force_multiplier
            * candidate.knockback_multiplier;
        let mut velocity = compute_knockback(
            KnockbackVariant::Basic,
            origin,
            candidate.position,
            magnitude,
            &mut self.rng,
        );
        if velocity == Vec2::ZERO {
            velocity = compute_knockback(
                KnockbackVariant::Basic,
                source.position,
                candidate.position,
                magnitude,
                &mut self.rng,
            );
        }
        if velocity != Vec2::ZERO {
            out.push(Command::ApplyKnockback {
                enemy: candidate.handle,
                velocity,
            });
            let _ = self.origins.insert(candidate.handle, origin);
        }

        let amount =
            self.config.base_chain_damage * source.chain_damage_multiplier * multiplier;
        if amount.is_finite() && amount > 0.0 {
            out.push(Command::ApplyDamage {
                enemy: candidate.handle,
                amount,
                source: DamageSource::Chain,
            });
        } else {
            warn!(enemy = ?candidate.handle, amount, "chain damage dropped: invalid amount");
        }
        trace!(
            source = ?source.handle,
            target = ?candidate.handle,
            amount,
            combo = self.combo.count(),
            "chain hit"
        );
    }

    /// Damage is flat inside the radius while the push decays linearly to
    /// zero at the rim. Targets on the rim or at the exact centre have no
    /// push direction or strength, so they take damage without knockback.
    #[allow(clippy::too_many_arguments)]
    fn explode(
        &mut self,
        dead: EntityHandle,
        center: Vec2,
        blast: Explosion,
        view: &EnemyView,
        index: &SpatialIndex<EntityHandle>,
        context: &ImpactContext,
        out: &mut Vec<Command>,
    ) {
        let valid_radius = blast.radius.is_finite() && blast.radius > 0.0;
        let valid_damage = blast.damage.is_finite() && blast.damage >= 0.0;
        if !valid_radius || !valid_damage || !center.is_finite() {
            warn!(?dead, ?blast, ?center, "explosion skipped: invalid blast");
            return;
        }
        self.explosions += 1;

        self.candidates.clear();
        index.query_radius(center, blast.radius, &mut self.candidates);
        self.candidates.sort_unstable();
        self.candidates.dedup();

        let mut caught = 0_usize;
        for slot in 0..self.candidates.len() {
            let handle = self.candidates[slot];
            if handle == dead {
                continue;
            }
            let Some(candidate) = view.get(handle) else {
                continue;
            };
            if candidate.dying {
                continue;
            }
            let distance = candidate.position.distance(center);
            if distance > blast.radius {
                continue;
            }
            caught += 1;

            if blast.damage > 0.0 {
                out.push(Command::ApplyDamage {
                    enemy: handle,
                    amount: blast.damage,
                    source: DamageSource::Explosion,
                });
            }

            let falloff = 1.0 - distance / blast.radius;
            let magnitude = self.config.explosion_force
                * context.knockback_multiplier
                * candidate.knockback_multiplier
                * falloff;
            let velocity = compute_knockback(
                KnockbackVariant::Basic,
                center,
                candidate.position,
                magnitude,
                &mut self.rng,
            );
            if velocity != Vec2::ZERO {
                out.push(Command::ApplyKnockback {
                    enemy: handle,
                    velocity,
                });
                let _ = self.origins.insert(handle, center);
            }
        }
        debug!(?dead, radius = blast.radius, caught, "explosion resolved");
    }
}

/// Knocked-back enemy as seen at the start of a chain pass.
#[derive(Clone, Copy, Debug)]
struct ChainSource {
    handle: EntityHandle,
    position: Vec2,
    collision_radius: f32,
    chain_damage_multiplier: f32,
}

impl ChainSource {
    fn of(snapshot: &EnemySnapshot) -> Self {
        Self {
            handle: snapshot.handle,
            position: snapshot.position,
            collision_radius: snapshot.collision_radius,
            chain_damage_multiplier: snapshot.chain_damage_multiplier,
        }
    }
}
