//! Simulation context
//!
//! `World` owns everything one play session needs: the three homogeneous
//! pools, the dynamic registry, the spatial grid and selection map, the wave
//! queue, the progression machine and the destructible sectors. Each frame
//! runs three strictly ordered phases:
//!
//! 1. spawn decisions (progression machine, wave queue)
//! 2. updates of every live object, collision resolution, deferred commands
//! 3. reaping of objects flagged dead
//!
//! Nothing is removed before phase 3, so an object killed mid-frame stays
//! visible to every query issued later in the same frame.

use std::cell::Cell;
use std::f32::consts::TAU;
use std::rc::Rc;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::boss::{Boss, BossKind};
use super::bullet::Bullet;
use super::collision::circles_overlap;
use super::context::{Command, Controls, FrameContext, GameEvent, Target};
use super::enemy::Enemy;
use super::entity::{DamageType, Entity, EntityClass, EntityFlags, Hit};
use super::grid::SpatialGrid;
use super::player::Player;
use super::pool::{Pool, Poolable};
use super::powerup::{Powerup, PowerupKind};
use super::registry::{EntityId, Registry};
use super::round::{Progression, RoundHost, RoundMachine, RoundState};
use super::sector::{self, SectorGrid, SectorWreck};
use super::selection::{CollisionQuery, Owner, SelectionId, SelectionMap};
use super::survival::SurvivalMachine;
use super::wave::{SpawnRequest, Wave, WaveQueue, WaveSink};
use crate::audio::{AudioSink, Channel, PlayFlags, SoundId};
use crate::consts::BULLET_RADIUS;
use crate::error::{ErrorPolicy, SimResult};
use crate::persistence::Archive;
use crate::renderer::RenderSink;
use crate::settings::{GameMode, Settings};

/// Seconds of slow motion granted by the powerup
pub const SLOW_MOTION_TIME: f32 = 5.0;
const SLOW_MOTION_SCALE: f32 = 0.5;
/// Time dilation while a shock is running
const SHOCK_SCALE: f32 = 0.25;
const BOMB_DAMAGE: f32 = 10.0;
const CONTACT_DAMAGE: f32 = 1.0;
/// Grid slack for radius queries, covers the largest body radius
const BODY_REACH: f32 = 64.0;
/// Command batches applied per pass; anything queued later waits a frame
const MAX_COMMAND_ROUNDS: usize = 8;

/// Session phase as seen by the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Playing,
    Paused,
    GameOver,
}

/// Bosses currently in the registry, kept by the registry's remove hook
#[derive(Debug, Clone, Copy, Default)]
struct LiveBosses {
    mini: u32,
    maxi: u32,
}

impl LiveBosses {
    fn count(&self, kind: BossKind) -> u32 {
        match kind {
            BossKind::Mini => self.mini,
            BossKind::Maxi => self.maxi,
        }
    }

    fn slot(&mut self, kind: BossKind) -> &mut u32 {
        match kind {
            BossKind::Mini => &mut self.mini,
            BossKind::Maxi => &mut self.maxi,
        }
    }
}

/// Progression machine selected by the game mode
#[derive(Debug, Clone)]
pub enum Director {
    Campaign(RoundMachine),
    Survival(SurvivalMachine),
}

impl Director {
    fn new(settings: &Settings) -> Self {
        let tuning = settings.tuning();
        match settings.mode {
            GameMode::Campaign => Director::Campaign(RoundMachine::new(
                tuning,
                settings.wave_gate,
                settings.error_policy,
            )),
            GameMode::Survival => {
                Director::Survival(SurvivalMachine::new(tuning, settings.error_policy))
            }
        }
    }

    pub fn progress(&self) -> &Progression {
        match self {
            Director::Campaign(m) => &m.progress,
            Director::Survival(m) => &m.progress,
        }
    }

    fn progress_mut(&mut self) -> &mut Progression {
        match self {
            Director::Campaign(m) => &mut m.progress,
            Director::Survival(m) => &mut m.progress,
        }
    }

    fn start(&mut self, host: &mut dyn RoundHost) {
        match self {
            Director::Campaign(m) => m.start(host),
            Director::Survival(m) => m.start(host),
        }
    }

    fn resume(&mut self, progress: Progression, host: &mut dyn RoundHost) {
        match self {
            Director::Campaign(m) => m.resume(progress, host),
            Director::Survival(m) => {
                // Survival has no levels to resume; only the score carries over
                m.start(host);
                m.progress.score = progress.score;
            }
        }
    }

    fn update(&mut self, dt: f32, host: &mut dyn RoundHost) {
        match self {
            Director::Campaign(m) => m.update(dt, host),
            Director::Survival(m) => m.update(dt, host),
        }
    }
}

/// Read-only inputs shared by every frame context of a pass
#[derive(Debug, Clone, Copy)]
struct FrameInfo {
    time: f32,
    speed: f32,
    extent: Vec2,
    target: Option<Target>,
    controls: Controls,
    policy: ErrorPolicy,
}

/// World state entities may touch through a `FrameContext`
struct Shared {
    selection: SelectionMap,
    grid: SpatialGrid<SelectionId>,
    rng: Pcg32,
    audio: Box<dyn AudioSink>,
    commands: Vec<Command>,
    events: Vec<GameEvent>,
}

impl Shared {
    fn ctx(&mut self, info: &FrameInfo) -> FrameContext<'_> {
        FrameContext {
            time: info.time,
            speed: info.speed,
            extent: info.extent,
            target: info.target,
            controls: info.controls,
            policy: info.policy,
            selection: &mut self.selection,
            grid: &mut self.grid,
            rng: &mut self.rng,
            audio: self.audio.as_mut(),
            commands: &mut self.commands,
            events: &mut self.events,
        }
    }
}

/// Allocate and configure one small-fry enemy. False when the pool is full.
fn spawn_enemy(
    pool: &mut Pool<Enemy>,
    rng: &mut Pcg32,
    policy: ErrorPolicy,
    class: EntityClass,
    pos: Vec2,
    vel: Vec2,
) -> bool {
    let phase = rng.random::<f32>() * TAU;
    let Some((handle, enemy)) = pool.allocate() else {
        log::debug!("enemy pool exhausted, {} dropped", class.as_str());
        return false;
    };
    match enemy.setup(class, pos, vel, phase) {
        Ok(()) => {
            enemy.core.owner = Some(Owner::Enemy(handle));
            true
        }
        Err(err) => {
            policy.check(pool.free(handle));
            policy.check(Err(err));
            false
        }
    }
}

/// Wave queue side of the world
struct Spawns<'a> {
    enemies: &'a mut Pool<Enemy>,
    rng: &'a mut Pcg32,
    policy: ErrorPolicy,
    target: Vec2,
}

impl WaveSink for Spawns<'_> {
    fn spawn(&mut self, request: SpawnRequest) -> bool {
        spawn_enemy(
            self.enemies,
            self.rng,
            self.policy,
            request.class,
            request.pos,
            Vec2::ZERO,
        )
    }

    fn target_position(&self) -> Vec2 {
        self.target
    }
}

/// Progression machine side of the world
struct Stage<'a> {
    spawns: Spawns<'a>,
    registry: &'a mut Registry,
    waves: &'a mut WaveQueue,
    sectors: &'a SectorGrid,
    audio: &'a mut dyn AudioSink,
    events: &'a mut Vec<GameEvent>,
    bosses: &'a Cell<LiveBosses>,
    checkpoint: &'a mut Option<Archive>,
    extent: Vec2,
    /// Level at the start of the frame, scales boss hit points
    level: u32,
}

impl RoundHost for Stage<'_> {
    fn alive_enemies(&self) -> usize {
        self.spawns
            .enemies
            .iter()
            .filter(|(_, e)| e.core.alive && e.core.class.counts_for_wave())
            .count()
    }

    fn wave_queue_empty(&self) -> bool {
        self.waves.is_empty()
    }

    fn queue_wave(&mut self, wave: Wave) {
        self.waves.push(wave);
    }

    fn spawn_boss(&mut self, kind: BossKind) -> bool {
        let mut live = self.bosses.get();
        if live.count(kind) > 0 {
            return false;
        }
        let pos = self.extent * Vec2::new(0.5, 0.2);
        self.registry
            .add(Box::new(Boss::new(kind, pos, self.level.max(1))));
        *live.slot(kind) += 1;
        self.bosses.set(live);
        self.audio.play(SoundId::BossWarning, PlayFlags::ONCE);
        log::info!("{:?} boss spawned at level {}", kind, self.level);
        true
    }

    fn boss_alive(&self, kind: BossKind) -> bool {
        self.bosses.get().count(kind) > 0
    }

    fn spawn_enemy(&mut self, class: EntityClass, pos: Vec2) -> bool {
        let s = &mut self.spawns;
        spawn_enemy(s.enemies, s.rng, s.policy, class, pos, Vec2::ZERO)
    }

    fn random(&mut self) -> f32 {
        self.spawns.rng.random::<f32>()
    }

    fn extent(&self) -> Vec2 {
        self.extent
    }

    fn target_position(&self) -> Vec2 {
        self.spawns.target
    }

    fn save_progress(&mut self, progress: &Progression) {
        let mut archive = Archive::new();
        match write_save(&mut archive, progress, self.sectors) {
            Ok(()) => {
                log::info!("Progress saved (level {})", progress.level);
                *self.checkpoint = Some(archive);
            }
            Err(err) => self.spawns.policy.check(Err(err)),
        }
    }

    fn play_music(&mut self, theme: u8) {
        self.audio.stop(Channel::Music);
        self.audio.play(SoundId::Music(theme), PlayFlags::LOOP);
    }

    fn notify(&mut self, event: GameEvent) {
        match event {
            GameEvent::WaveStarted { .. } => self.audio.play(SoundId::WaveStart, PlayFlags::ONCE),
            GameEvent::LevelCleared { .. } => self.audio.play(SoundId::LevelClear, PlayFlags::ONCE),
            _ => {}
        }
        self.events.push(event);
    }
}

fn write_save(archive: &mut Archive, progress: &Progression, sectors: &SectorGrid) -> SimResult<()> {
    let session = archive.section_mut("session");
    session.write("level", &progress.level)?;
    session.write("wave", &progress.wave_index)?;
    session.write("boss_count", &progress.boss_count)?;
    session.write("score", &progress.score)?;
    session.write("theme", &progress.theme)?;
    session.write("speed", &progress.speed_multiplier)?;
    session.write("level_won", &progress.level_won)?;
    sectors.save(archive.section_mut("sectors"))
}

fn read_save(archive: &Archive) -> SimResult<Progression> {
    let session = archive.section("session")?;
    Ok(Progression {
        level: session.read("level")?,
        wave_index: session.read_or("wave", 0)?,
        boss_count: session.read_or("boss_count", 0)?,
        score: session.read("score")?,
        theme: session.read_or("theme", 0)?,
        speed_multiplier: session.read_or("speed", 1.0)?,
        level_won: session.read_or("level_won", false)?,
        ..Progression::default()
    })
}

/// Damage one object, firing `handle_damage_begin` at the start of a streak
fn strike(entity: &mut dyn Entity, ctx: &mut FrameContext<'_>, hit: &Hit) -> bool {
    if !entity.core().is_active() {
        return false;
    }
    if entity.core().begins_damage() {
        entity.handle_damage_begin(ctx, hit);
    }
    entity.core_mut().damaged_now = true;
    entity.handle_damage(ctx, hit)
}

/// Run `handle_die` on every flagged slot and return it to the free list
fn reap_pool<T: Entity + Poolable>(
    pool: &mut Pool<T>,
    ctx: &mut FrameContext<'_>,
    policy: ErrorPolicy,
) -> usize {
    let mut reaped = 0;
    for index in 0..pool.capacity() {
        let Some(handle) = pool.handle_at(index) else {
            continue;
        };
        let Some(object) = pool.get_mut(handle) else {
            continue;
        };
        if !object.core().must_reap() {
            continue;
        }
        object.handle_die(ctx);
        ctx.untrack(object.core_mut());
        policy.check(pool.free(handle));
        reaped += 1;
    }
    reaped
}

fn draw(entity: &dyn Entity, out: &mut dyn RenderSink, additive: bool) {
    if additive {
        entity.render_additive(out);
    } else {
        entity.render(out);
    }
}

pub struct World {
    settings: Settings,
    policy: ErrorPolicy,
    extent: Vec2,

    pub enemies: Pool<Enemy>,
    pub bullets: Pool<Bullet>,
    pub wrecks: Pool<SectorWreck>,
    pub registry: Registry,
    pub sectors: SectorGrid,
    waves: WaveQueue,
    director: Director,
    shared: Shared,

    player: Option<EntityId>,
    bosses: Rc<Cell<LiveBosses>>,
    /// Snapshot written when a level is cleared
    checkpoint: Option<Archive>,

    pub phase: Phase,
    /// Simulated seconds, after time scaling
    pub time: f32,
    pub frame: u64,
    slow_motion: f32,
    shock: f32,

    // Scratch buffers reused every frame
    hits: Vec<(Owner, Hit)>,
    crossed: Vec<(SelectionId, Vec2)>,
    touching: Vec<SelectionId>,
}

impl World {
    /// Set up a session and start it at level 1
    pub fn new(settings: Settings, audio: Box<dyn AudioSink>) -> Self {
        let extent = Vec2::new(settings.world_width, settings.world_height);
        let bosses = Rc::new(Cell::new(LiveBosses::default()));
        let mut registry = Registry::new();
        let counter = Rc::clone(&bosses);
        registry.set_on_remove(Box::new(move |_: EntityId, entity: &dyn Entity| {
            if let Some(boss) = entity.as_any().downcast_ref::<Boss>() {
                let mut live = counter.get();
                let slot = live.slot(boss.kind);
                *slot = slot.saturating_sub(1);
                counter.set(live);
            }
        }));

        log::info!(
            "World {}x{} ({} mode, {}, seed {:#x})",
            extent.x,
            extent.y,
            match settings.mode {
                GameMode::Campaign => "campaign",
                GameMode::Survival => "survival",
            },
            settings.difficulty.as_str(),
            settings.seed
        );

        let mut world = Self {
            policy: settings.error_policy,
            extent,
            enemies: Pool::setup(settings.enemy_pool_size),
            bullets: Pool::setup(settings.bullet_pool_size),
            wrecks: Pool::setup(settings.sector_pool_size),
            registry,
            sectors: SectorGrid::new(settings.sector_columns, settings.sector_rows, extent),
            waves: WaveQueue::new(settings.error_policy),
            director: Director::new(&settings),
            shared: Shared {
                selection: SelectionMap::new(),
                grid: SpatialGrid::setup(
                    extent.x,
                    extent.y,
                    settings.grid_cell_size,
                    settings.grid_cell_size,
                ),
                rng: Pcg32::seed_from_u64(settings.seed),
                audio,
                commands: Vec::new(),
                events: Vec::new(),
            },
            player: None,
            bosses,
            checkpoint: None,
            phase: Phase::Playing,
            time: 0.0,
            frame: 0,
            slow_motion: 0.0,
            shock: 0.0,
            hits: Vec::new(),
            crossed: Vec::new(),
            touching: Vec::new(),
            settings,
        };
        world.start();
        world
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn extent(&self) -> Vec2 {
        self.extent
    }

    pub fn director(&self) -> &Director {
        &self.director
    }

    pub fn progress(&self) -> &Progression {
        self.director.progress()
    }

    /// Campaign state, `None` in survival mode
    pub fn round_state(&self) -> Option<RoundState> {
        match &self.director {
            Director::Campaign(m) => Some(m.state()),
            Director::Survival(_) => None,
        }
    }

    pub fn waves(&self) -> &WaveQueue {
        &self.waves
    }

    pub fn selection(&self) -> &SelectionMap {
        &self.shared.selection
    }

    pub fn grid(&self) -> &SpatialGrid<SelectionId> {
        &self.shared.grid
    }

    /// Events raised during the last frame
    pub fn events(&self) -> &[GameEvent] {
        &self.shared.events
    }

    pub fn checkpoint(&self) -> Option<&Archive> {
        self.checkpoint.as_ref()
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player
    }

    pub fn player(&self) -> Option<&Player> {
        self.registry.get_as::<Player>(self.player?)
    }

    pub fn boss_alive(&self, kind: BossKind) -> bool {
        self.bosses.get().count(kind) > 0
    }

    /// What enemies chase: the live player
    pub fn target(&self) -> Option<Target> {
        let core = self.registry.get(self.player?)?.core();
        core.is_active().then_some(Target {
            pos: core.pos,
            vel: core.vel,
            selection: core.selection,
        })
    }

    pub fn toggle_pause(&mut self) {
        self.phase = match self.phase {
            Phase::Playing => Phase::Paused,
            Phase::Paused => Phase::Playing,
            Phase::GameOver => Phase::GameOver,
        };
    }

    /// Pause because the frontend lost focus
    pub fn auto_pause(&mut self) {
        if self.phase == Phase::Playing {
            self.phase = Phase::Paused;
            log::info!("Auto-paused");
        }
    }

    fn start(&mut self) {
        self.spawn_player();
        let (director, mut stage) = self.stage();
        director.start(&mut stage);
    }

    /// Tear everything down and begin again at level 1
    pub fn restart(&mut self) {
        self.reset();
        self.start();
    }

    fn reset(&mut self) {
        let info = self.info(Controls::default());
        let mut ctx = self.shared.ctx(&info);
        self.registry.clear(&mut ctx);

        self.enemies = Pool::setup(self.settings.enemy_pool_size);
        self.bullets = Pool::setup(self.settings.bullet_pool_size);
        self.wrecks = Pool::setup(self.settings.sector_pool_size);
        self.shared.selection.clear();
        self.shared.grid.clear();
        self.shared.commands.clear();
        self.shared.events.clear();
        self.waves.clear();
        self.sectors.reset();
        self.director = Director::new(&self.settings);
        self.player = None;
        self.phase = Phase::Playing;
        self.time = 0.0;
        self.frame = 0;
        self.slow_motion = 0.0;
        self.shock = 0.0;
    }

    fn spawn_player(&mut self) {
        let pos = self.extent * Vec2::new(0.5, 0.8);
        self.player = Some(self.registry.add(Box::new(Player::new(pos))));
    }

    fn stage(&mut self) -> (&mut Director, Stage<'_>) {
        let target = self.target().map_or(self.extent * 0.5, |t| t.pos);
        let level = self.director.progress().level;
        let stage = Stage {
            spawns: Spawns {
                enemies: &mut self.enemies,
                rng: &mut self.shared.rng,
                policy: self.policy,
                target,
            },
            registry: &mut self.registry,
            waves: &mut self.waves,
            sectors: &self.sectors,
            audio: self.shared.audio.as_mut(),
            events: &mut self.shared.events,
            bosses: &self.bosses,
            checkpoint: &mut self.checkpoint,
            extent: self.extent,
            level,
        };
        (&mut self.director, stage)
    }

    fn info(&self, controls: Controls) -> FrameInfo {
        FrameInfo {
            time: self.time,
            speed: self.director.progress().speed_multiplier,
            extent: self.extent,
            target: self.target(),
            controls,
            policy: self.policy,
        }
    }

    /// Slow motion and shock dilution, counted down in real time
    fn time_scale(&mut self, dt: f32) -> f32 {
        let mut scale = 1.0;
        if self.slow_motion > 0.0 {
            self.slow_motion = (self.slow_motion - dt).max(0.0);
            scale *= SLOW_MOTION_SCALE;
        }
        if self.shock > 0.0 {
            self.shock = (self.shock - dt).max(0.0);
            scale *= SHOCK_SCALE;
        }
        scale
    }

    /// Advance one frame
    pub fn step(&mut self, controls: Controls, dt: f32) {
        self.shared.events.clear();

        // Phase 1: spawn decisions
        self.decide_spawns(dt);

        // Phase 2: updates and collisions
        let dt = dt * self.time_scale(dt);
        self.time += dt;
        let info = self.update_objects(controls, dt);
        self.resolve_bullets(&info, dt);
        self.resolve_contacts(&info);
        self.apply_commands(&info);

        // Phase 3: reap, then hand out what the dead left behind. Death
        // blasts can kill more, so repeat until nothing new is flagged.
        for _ in 0..MAX_COMMAND_ROUNDS {
            let reaped = self.reap(&info);
            self.apply_commands(&info);
            if reaped == 0 {
                break;
            }
        }
        self.end_frame(dt);

        if self.player.is_some_and(|id| !self.registry.contains(id)) {
            self.player = None;
        }
        if self.shared.events.contains(&GameEvent::PlayerDied) {
            log::info!(
                "Game over at level {} with {} points",
                self.progress().level,
                self.progress().score
            );
            self.phase = Phase::GameOver;
        }
        self.frame += 1;
    }

    fn decide_spawns(&mut self, dt: f32) {
        let (director, mut stage) = self.stage();
        director.update(dt, &mut stage);

        let target = self.target().map_or(self.extent * 0.5, |t| t.pos);
        let mut spawns = Spawns {
            enemies: &mut self.enemies,
            rng: &mut self.shared.rng,
            policy: self.policy,
            target,
        };
        self.waves.update(dt, &mut spawns);
    }

    fn update_objects(&mut self, controls: Controls, dt: f32) -> FrameInfo {
        let info = self.info(controls);
        let shared = &mut self.shared;
        self.registry.for_each_mut(|_, entity| {
            let mut ctx = shared.ctx(&info);
            entity.update(&mut ctx, dt);
            if !entity.core().flags.contains(EntityFlags::POWERUP) {
                ctx.track(entity.core_mut());
            }
        });

        // The player has moved; pooled objects chase the new position
        let info = FrameInfo {
            target: self.target(),
            ..info
        };
        for (_, enemy) in self.enemies.iter_mut() {
            let mut ctx = self.shared.ctx(&info);
            enemy.update(&mut ctx, dt);
            ctx.track(&mut enemy.core);
        }
        for (_, wreck) in self.wrecks.iter_mut() {
            let mut ctx = self.shared.ctx(&info);
            wreck.update(&mut ctx, dt);
        }
        info
    }

    /// Sweep every bullet from its previous position and damage the first
    /// opposing body it crossed (every one, for piercing bullets)
    fn resolve_bullets(&mut self, info: &FrameInfo, dt: f32) {
        let mut hits = std::mem::take(&mut self.hits);
        let mut crossed = std::mem::take(&mut self.crossed);
        for (_, bullet) in self.bullets.iter_mut() {
            let mut ctx = self.shared.ctx(info);
            bullet.update(&mut ctx, dt);
            if !bullet.core.is_active() {
                continue;
            }
            let selection = &self.shared.selection;
            selection.query_line(bullet.prev, bullet.core.pos, BULLET_RADIUS * 2.0, &mut crossed);
            let friendly = bullet.core.is_friendly();
            for &(id, point) in &crossed {
                if Some(id) == bullet.core.ignore_id {
                    continue;
                }
                let Some(body) = selection.get(id) else {
                    continue;
                };
                if body.friendly == friendly {
                    continue;
                }
                hits.push((
                    body.owner,
                    Hit {
                        part: body.part,
                        ..Hit::new(point, bullet.core.vel, bullet.damage, DamageType::Bullet)
                    },
                ));
                if !bullet.piercing {
                    bullet.core.retire();
                    break;
                }
            }
        }
        for (owner, hit) in hits.drain(..) {
            self.deliver(info, owner, &hit);
        }
        self.hits = hits;
        self.crossed = crossed;
    }

    /// Player touching hostile bodies: the player loses a life, small fry
    /// take contact damage back
    fn resolve_contacts(&mut self, info: &FrameInfo) {
        let Some(id) = self.player else { return };
        let Some(player) = self.registry.get(id) else {
            return;
        };
        let core = player.core();
        if !core.is_active() {
            return;
        }
        let (pos, radius) = (core.pos, core.radius);

        let mut touching = std::mem::take(&mut self.touching);
        let mut hits = std::mem::take(&mut self.hits);
        let reach = Vec2::splat(radius);
        self.shared.selection.query_rect(pos - reach, pos + reach, &mut touching);
        for &sid in &touching {
            let Some(body) = self.shared.selection.get(sid) else {
                continue;
            };
            if body.friendly
                || !circles_overlap(pos, radius, body.pos, body.radius)
                || !self.is_live(body.owner)
            {
                continue;
            }
            let push = (pos - body.pos).normalize_or_zero();
            hits.push((
                Owner::Dynamic(id),
                Hit::new(pos, push, CONTACT_DAMAGE, DamageType::Contact),
            ));
            if let Owner::Enemy(_) = body.owner {
                hits.push((
                    body.owner,
                    Hit::new(body.pos, -push, CONTACT_DAMAGE, DamageType::Contact),
                ));
            }
        }
        for (owner, hit) in hits.drain(..) {
            self.deliver(info, owner, &hit);
        }
        self.hits = hits;
        self.touching = touching;
    }

    /// Active and not in a death sequence: can touch and be targeted
    pub(crate) fn is_live(&self, owner: Owner) -> bool {
        let core = match owner {
            Owner::Enemy(handle) => self.enemies.get(handle).map(|e| &e.core),
            Owner::Dynamic(id) => self.registry.get(id).map(|e| e.core()),
        };
        core.is_some_and(|c| c.is_active() && !c.is_transient())
    }

    /// Route a hit to the object behind a selection owner
    fn deliver(&mut self, info: &FrameInfo, owner: Owner, hit: &Hit) -> bool {
        let mut ctx = self.shared.ctx(info);
        match owner {
            Owner::Enemy(handle) => self
                .enemies
                .get_mut(handle)
                .is_some_and(|enemy| strike(enemy, &mut ctx, hit)),
            Owner::Dynamic(id) => self
                .registry
                .get_mut(id)
                .is_some_and(|entity| strike(entity, &mut ctx, hit)),
        }
    }

    fn apply_commands(&mut self, info: &FrameInfo) {
        for _ in 0..MAX_COMMAND_ROUNDS {
            if self.shared.commands.is_empty() {
                return;
            }
            let mut batch = std::mem::take(&mut self.shared.commands);
            for command in batch.drain(..) {
                self.apply(command, info);
            }
            if self.shared.commands.is_empty() {
                self.shared.commands = batch;
            }
        }
        if !self.shared.commands.is_empty() {
            log::debug!("{} commands deferred to the next frame", self.shared.commands.len());
        }
    }

    fn apply(&mut self, command: Command, info: &FrameInfo) {
        match command {
            Command::SpawnBullet(spec) => match self.bullets.allocate() {
                Some((_, bullet)) => bullet.setup(&spec),
                None => log::debug!("bullet pool exhausted, shot dropped"),
            },
            Command::SpawnEnemy { class, pos, vel } => {
                spawn_enemy(&mut self.enemies, &mut self.shared.rng, self.policy, class, pos, vel);
            }
            Command::SpawnPowerup { kind, pos } => {
                self.registry.add(Box::new(Powerup::new(kind, pos)));
            }
            Command::RadiusDamage {
                center,
                radius,
                amount,
                friendly,
                kind,
            } => self.radius_damage(info, center, radius, amount, friendly, kind),
            Command::DestroySector { pos } => self.destroy_sector(info, pos),
            Command::AddScore(points) => self.director.progress_mut().score += points,
            Command::Shock { seconds } => self.shock = self.shock.max(seconds),
            Command::ApplyPowerup(kind) => self.apply_powerup(kind),
        }
    }

    fn radius_damage(
        &mut self,
        info: &FrameInfo,
        center: Vec2,
        radius: f32,
        amount: f32,
        friendly: bool,
        kind: DamageType,
    ) {
        let mut hits = std::mem::take(&mut self.hits);
        let selection = &self.shared.selection;
        let reach = Vec2::splat(radius + BODY_REACH);
        self.shared.grid.for_each_in_area(center - reach, center + reach, |id| {
            let Some(body) = selection.get(id) else {
                return;
            };
            if body.friendly != friendly && circles_overlap(center, radius, body.pos, body.radius) {
                let away = (body.pos - center).normalize_or_zero();
                hits.push((
                    body.owner,
                    Hit {
                        part: body.part,
                        ..Hit::new(body.pos, away, amount, kind)
                    },
                ));
            }
        });
        // Registry bodies the grid does not index (the player)
        for (id, entity) in self.registry.iter() {
            let core = entity.core();
            if core.flags.contains(EntityFlags::POSITION_TRACKED)
                || core.flags.contains(EntityFlags::POWERUP)
                || core.is_friendly() == friendly
                || !core.is_active()
                || !circles_overlap(center, radius, core.pos, core.radius)
            {
                continue;
            }
            let away = (core.pos - center).normalize_or_zero();
            hits.push((Owner::Dynamic(id), Hit::new(core.pos, away, amount, kind)));
        }
        for (owner, hit) in hits.drain(..) {
            self.deliver(info, owner, &hit);
        }
        self.hits = hits;

        if kind == DamageType::Explosion {
            self.destroy_sector(info, center);
        }
    }

    /// Destroy the sector under `pos`; only the first destruction leaves a wreck
    fn destroy_sector(&mut self, info: &FrameInfo, pos: Vec2) {
        let Some(cell) = self.sectors.cell_at(pos) else {
            return;
        };
        if !self.sectors.destroy(cell.0, cell.1) {
            return;
        }
        let center = self.sectors.center(cell.0, cell.1);
        match self.wrecks.allocate() {
            Some((_, wreck)) => wreck.setup(cell, center, self.sectors.cell_radius()),
            None => log::debug!("sector pool exhausted, wreck at {cell:?} dropped"),
        }
        let mut ctx = self.shared.ctx(info);
        sector::announce(&mut ctx, cell);
    }

    fn apply_powerup(&mut self, kind: PowerupKind) {
        match kind {
            PowerupKind::SlowMotion => self.slow_motion = SLOW_MOTION_TIME,
            PowerupKind::Bomb => {
                if let Some(target) = self.target() {
                    self.shared.commands.push(Command::RadiusDamage {
                        center: target.pos,
                        radius: self.extent.length(),
                        amount: BOMB_DAMAGE,
                        friendly: true,
                        kind: DamageType::Explosion,
                    });
                }
            }
            _ => {
                if let Some(player) = self
                    .player
                    .and_then(|id| self.registry.get_as_mut::<Player>(id))
                {
                    player.apply_powerup(kind);
                }
            }
        }
    }

    fn reap(&mut self, info: &FrameInfo) -> usize {
        let policy = self.policy;
        let mut ctx = self.shared.ctx(info);
        reap_pool(&mut self.enemies, &mut ctx, policy)
            + reap_pool(&mut self.bullets, &mut ctx, policy)
            + reap_pool(&mut self.wrecks, &mut ctx, policy)
            + self.registry.reap(&mut ctx)
    }

    fn end_frame(&mut self, dt: f32) {
        for (_, enemy) in self.enemies.iter_mut() {
            enemy.core.end_frame(dt);
        }
        for (_, bullet) in self.bullets.iter_mut() {
            bullet.core.end_frame(dt);
        }
        for (_, wreck) in self.wrecks.iter_mut() {
            wreck.core.end_frame(dt);
        }
        self.registry.for_each_mut(|_, entity| entity.core_mut().end_frame(dt));
    }

    /// Normal pass, then additive pass. Never mutates the world.
    pub fn render(&self, out: &mut dyn RenderSink) {
        for additive in [false, true] {
            for (_, wreck) in self.wrecks.iter() {
                draw(wreck, out, additive);
            }
            for (_, enemy) in self.enemies.iter() {
                draw(enemy, out, additive);
            }
            for (_, entity) in self.registry.iter() {
                draw(entity, out, additive);
            }
            for (_, bullet) in self.bullets.iter() {
                draw(bullet, out, additive);
            }
        }
    }

    /// Persist the session counters and the sector grid
    pub fn save(&self, archive: &mut Archive) -> SimResult<()> {
        write_save(archive, self.director.progress(), &self.sectors)
    }

    /// Restore a saved session. Nothing changes if the archive is unreadable.
    pub fn load(&mut self, archive: &Archive) -> SimResult<()> {
        let progress = read_save(archive)?;
        let mut sectors = self.sectors.clone();
        sectors.load(archive.section("sectors")?)?;

        self.reset();
        self.sectors = sectors;
        self.spawn_player();
        let (director, mut stage) = self.stage();
        director.resume(progress, &mut stage);
        log::info!(
            "Loaded session at level {} ({} sectors destroyed)",
            self.progress().level,
            self.sectors.destroyed_count()
        );
        Ok(())
    }
}
