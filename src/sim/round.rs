//! Round progression
//!
//! Top-level controller of a campaign session:
//! `Idle -> PlayWaves -> PlayMaxiBoss -> LevelCleared -> Idle`.
//! `PlayWaves` and `PlayMaxiBoss` each run a nested spawn sub-machine
//! (`Idle -> CoolDown -> Spawn -> Wait -> Done`). Every transition is driven
//! by countdown timers sampled once per update, so a fixed dt sequence and
//! fixed random draws reproduce the same session.

use std::f32::consts::TAU;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::boss::BossKind;
use super::context::GameEvent;
use super::entity::EntityClass;
use super::wave::{Formation, Wave};
use crate::error::{ErrorPolicy, SimError, SimResult};
use crate::settings::{Tuning, WaveGate};

/// Number of music themes the levels cycle through
pub const THEME_COUNT: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoundState {
    #[default]
    Idle,
    PlayWaves,
    PlayMaxiBoss,
    LevelCleared,
}

impl RoundState {
    pub const ALL: [RoundState; 4] = [
        RoundState::Idle,
        RoundState::PlayWaves,
        RoundState::PlayMaxiBoss,
        RoundState::LevelCleared,
    ];

    /// Whether `self -> to` is a legal transition
    pub fn can_enter(self, to: RoundState) -> bool {
        matches!(
            (self, to),
            (RoundState::Idle, RoundState::PlayWaves)
                | (RoundState::PlayWaves, RoundState::PlayMaxiBoss)
                | (RoundState::PlayWaves, RoundState::LevelCleared)
                | (RoundState::PlayMaxiBoss, RoundState::LevelCleared)
                | (RoundState::LevelCleared, RoundState::Idle)
        )
    }

    pub fn check(self, to: RoundState) -> SimResult<()> {
        if self.can_enter(to) {
            Ok(())
        } else {
            Err(SimError::IllegalTransition { from: self, to })
        }
    }
}

/// Phase of a wave or boss spawn sub-machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpawnPhase {
    #[default]
    Idle,
    CoolDown,
    Spawn,
    Wait,
    Done,
}

/// Progression counters, persisted between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progression {
    pub level: u32,
    /// Waves spawned so far this level
    pub wave_index: u32,
    pub wave_count: u32,
    /// Maxi bosses defeated this session
    pub boss_count: u32,
    pub alive_threshold: u32,
    pub theme: u8,
    pub speed_multiplier: f32,
    pub level_won: bool,
    pub score: u64,
    /// Classes waves may draw from this level
    pub enemy_pool: Vec<EntityClass>,
}

impl Default for Progression {
    fn default() -> Self {
        Self {
            level: 0,
            wave_index: 0,
            wave_count: 0,
            boss_count: 0,
            alive_threshold: 0,
            theme: 0,
            speed_multiplier: 1.0,
            level_won: false,
            score: 0,
            enemy_pool: Vec::new(),
        }
    }
}

/// Small-fry classes unlocked by the given level
pub fn enemy_pool_for_level(level: u32) -> Vec<EntityClass> {
    const UNLOCKS: [(u32, EntityClass); 9] = [
        (1, EntityClass::Grunt),
        (1, EntityClass::Weaver),
        (2, EntityClass::Spinner),
        (2, EntityClass::Mine),
        (3, EntityClass::Splitter),
        (3, EntityClass::Bouncer),
        (4, EntityClass::Sniper),
        (4, EntityClass::Seeker),
        (5, EntityClass::Bandit),
    ];
    UNLOCKS
        .iter()
        .filter(|(from, _)| *from <= level.max(1))
        .map(|(_, class)| *class)
        .collect()
}

/// World services the round machine drives
pub trait RoundHost {
    /// Live small-fry that hold back the alive-count gate
    fn alive_enemies(&self) -> usize;
    fn wave_queue_empty(&self) -> bool;
    fn queue_wave(&mut self, wave: Wave);
    /// Returns false if the boss could not be placed
    fn spawn_boss(&mut self, kind: BossKind) -> bool;
    fn boss_alive(&self, kind: BossKind) -> bool;
    /// Direct spawn outside a wave (boss escorts)
    fn spawn_enemy(&mut self, class: EntityClass, pos: Vec2) -> bool;
    /// Uniform draw in `[0, 1)`
    fn random(&mut self) -> f32;
    fn extent(&self) -> Vec2;
    fn target_position(&self) -> Vec2;
    fn save_progress(&mut self, progress: &Progression);
    fn play_music(&mut self, theme: u8);
    fn notify(&mut self, event: GameEvent);
}

#[derive(Debug, Clone)]
pub struct RoundMachine {
    state: RoundState,
    /// Cooldown of `Idle` and `LevelCleared`
    timer: f32,
    wave_phase: SpawnPhase,
    wave_timer: f32,
    boss_phase: SpawnPhase,
    boss_timer: f32,
    /// Wave number after which the mini boss shows up
    mini_boss_wave: u32,
    mini_boss_spawned: bool,
    gate: WaveGate,
    tuning: Tuning,
    policy: ErrorPolicy,
    pub progress: Progression,
}

impl RoundMachine {
    pub fn new(tuning: Tuning, gate: WaveGate, policy: ErrorPolicy) -> Self {
        Self {
            state: RoundState::Idle,
            timer: 0.0,
            wave_phase: SpawnPhase::Idle,
            wave_timer: 0.0,
            boss_phase: SpawnPhase::Idle,
            boss_timer: 0.0,
            mini_boss_wave: 0,
            mini_boss_spawned: false,
            gate,
            tuning,
            policy,
            progress: Progression::default(),
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn wave_phase(&self) -> SpawnPhase {
        self.wave_phase
    }

    pub fn boss_phase(&self) -> SpawnPhase {
        self.boss_phase
    }

    /// Begin a session at level 1
    pub fn start(&mut self, host: &mut dyn RoundHost) {
        self.progress = Progression::default();
        self.enter_idle(host);
    }

    /// Continue a saved session. A won level resumes at the next one.
    pub fn resume(&mut self, mut progress: Progression, host: &mut dyn RoundHost) {
        if !progress.level_won {
            progress.level = progress.level.saturating_sub(1);
        }
        self.progress = progress;
        self.enter_idle(host);
    }

    /// Move to `to`, running its entry action
    pub fn transition(&mut self, to: RoundState, host: &mut dyn RoundHost) -> SimResult<()> {
        self.state.check(to)?;
        log::info!("round {:?} -> {:?} (level {})", self.state, to, self.progress.level);
        match to {
            RoundState::Idle => self.enter_idle(host),
            RoundState::PlayWaves => {
                self.state = RoundState::PlayWaves;
                self.wave_phase = SpawnPhase::Idle;
            }
            RoundState::PlayMaxiBoss => {
                self.state = RoundState::PlayMaxiBoss;
                self.boss_phase = SpawnPhase::Idle;
            }
            RoundState::LevelCleared => {
                self.state = RoundState::LevelCleared;
                self.timer = self.tuning.level_clear_cooldown;
                self.progress.level_won = true;
                host.notify(GameEvent::LevelCleared {
                    level: self.progress.level,
                });
            }
        }
        Ok(())
    }

    fn enter_idle(&mut self, host: &mut dyn RoundHost) {
        self.state = RoundState::Idle;
        self.timer = self.tuning.idle_cooldown;

        let p = &mut self.progress;
        p.level += 1;
        p.wave_index = 0;
        p.wave_count = self.tuning.wave_count(p.level);
        p.alive_threshold = self.tuning.alive_threshold;
        p.speed_multiplier = self.tuning.speed(p.level);
        p.theme = ((p.level - 1) % THEME_COUNT as u32) as u8;
        p.level_won = false;
        p.enemy_pool = enemy_pool_for_level(p.level);

        self.wave_phase = SpawnPhase::Idle;
        self.boss_phase = SpawnPhase::Idle;
        self.mini_boss_wave = (p.wave_count / 2).max(1);
        self.mini_boss_spawned = false;
        log::info!(
            "level {} ready: {} waves, speed x{:.2}",
            p.level,
            p.wave_count,
            p.speed_multiplier
        );
        host.play_music(p.theme);
    }

    fn go(&mut self, to: RoundState, host: &mut dyn RoundHost) {
        let result = self.transition(to, host);
        self.policy.check(result);
    }

    pub fn update(&mut self, dt: f32, host: &mut dyn RoundHost) {
        match self.state {
            RoundState::Idle => {
                self.timer -= dt;
                if self.timer <= 0.0 {
                    self.go(RoundState::PlayWaves, host);
                }
            }
            RoundState::PlayWaves => {
                if self.update_waves(dt, host) {
                    let next = if self.tuning.has_maxi_boss(self.progress.level) {
                        RoundState::PlayMaxiBoss
                    } else {
                        RoundState::LevelCleared
                    };
                    self.go(next, host);
                }
            }
            RoundState::PlayMaxiBoss => {
                if self.update_boss(dt, host) {
                    self.progress.boss_count += 1;
                    self.go(RoundState::LevelCleared, host);
                }
            }
            RoundState::LevelCleared => {
                self.timer -= dt;
                if self.timer <= 0.0 {
                    host.save_progress(&self.progress);
                    self.go(RoundState::Idle, host);
                }
            }
        }
    }

    fn gate_open(&self, host: &dyn RoundHost) -> bool {
        if !host.wave_queue_empty() {
            return false;
        }
        match self.gate {
            WaveGate::AliveCount => host.alive_enemies() <= self.progress.alive_threshold as usize,
            WaveGate::Timed => self.wave_timer <= 0.0,
        }
    }

    /// Wave sub-machine. Returns true once the last wave is cleared.
    fn update_waves(&mut self, dt: f32, host: &mut dyn RoundHost) -> bool {
        match self.wave_phase {
            SpawnPhase::Idle => {
                self.wave_phase = SpawnPhase::CoolDown;
                self.wave_timer = self.tuning.wave_cooldown;
            }
            SpawnPhase::CoolDown => {
                self.wave_timer -= dt;
                if self.wave_timer <= 0.0 {
                    self.wave_phase = SpawnPhase::Spawn;
                }
            }
            SpawnPhase::Spawn => {
                self.spawn_wave(host);
                self.wave_timer = self.tuning.wave_timer;
                self.wave_phase = SpawnPhase::Wait;
            }
            SpawnPhase::Wait => {
                self.wave_timer -= dt;
                if self.gate_open(host) {
                    if self.progress.wave_index >= self.progress.wave_count {
                        self.wave_phase = SpawnPhase::Done;
                    } else {
                        self.wave_phase = SpawnPhase::CoolDown;
                        self.wave_timer = self.tuning.wave_cooldown;
                    }
                }
            }
            SpawnPhase::Done => {
                let mini_alive = self.mini_boss_spawned && host.boss_alive(BossKind::Mini);
                return host.alive_enemies() == 0 && host.wave_queue_empty() && !mini_alive;
            }
        }
        false
    }

    fn spawn_wave(&mut self, host: &mut dyn RoundHost) {
        self.progress.wave_index += 1;
        let wave = random_wave(
            host,
            &self.progress.enemy_pool,
            self.tuning.wave_size(self.progress.level),
            self.tuning.spawn_interval,
        );
        match wave {
            Ok(wave) => host.queue_wave(wave),
            Err(err) => self.policy.check(Err(err)),
        }
        host.notify(GameEvent::WaveStarted {
            level: self.progress.level,
            wave: self.progress.wave_index,
        });

        if !self.mini_boss_spawned && self.progress.wave_index >= self.mini_boss_wave {
            self.mini_boss_spawned = host.spawn_boss(BossKind::Mini);
            if self.mini_boss_spawned {
                host.notify(GameEvent::BossArrived {
                    kind: BossKind::Mini,
                });
            }
        }
    }

    /// Boss sub-machine. Returns true once the maxi boss is gone.
    fn update_boss(&mut self, dt: f32, host: &mut dyn RoundHost) -> bool {
        match self.boss_phase {
            SpawnPhase::Idle => {
                self.boss_phase = SpawnPhase::CoolDown;
                self.boss_timer = self.tuning.boss_cooldown;
            }
            SpawnPhase::CoolDown => {
                self.boss_timer -= dt;
                if self.boss_timer <= 0.0 {
                    self.boss_phase = SpawnPhase::Spawn;
                }
            }
            SpawnPhase::Spawn => {
                if host.spawn_boss(BossKind::Maxi) {
                    host.notify(GameEvent::BossArrived {
                        kind: BossKind::Maxi,
                    });
                } else {
                    log::warn!("maxi boss could not be placed");
                }
                let support = self.tuning.support_units(self.progress.level);
                let extent = host.extent();
                for i in 0..support {
                    let angle = i as f32 / support.max(1) as f32 * TAU;
                    let pos = extent * Vec2::new(0.5, 0.25) + Vec2::from_angle(angle) * 160.0;
                    host.spawn_enemy(EntityClass::Drone, pos);
                }
                self.boss_phase = SpawnPhase::Wait;
            }
            SpawnPhase::Wait => {
                if !host.boss_alive(BossKind::Maxi) {
                    self.boss_phase = SpawnPhase::Done;
                }
            }
            SpawnPhase::Done => return true,
        }
        false
    }
}

/// Random wave of `count` enemies drawn from `pool`, in a random formation
pub fn random_wave(
    host: &mut dyn RoundHost,
    pool: &[EntityClass],
    count: usize,
    interval: f32,
) -> SimResult<Wave> {
    if pool.is_empty() {
        return Err(SimError::unreachable("enemy pool", "empty"));
    }
    let class = pool[((host.random() * pool.len() as f32) as usize).min(pool.len() - 1)];
    let extent = host.extent();
    let margin = 60.0;
    let formation = if class == EntityClass::Mine {
        let corner = Vec2::new(host.random(), host.random()) * (extent - 300.0);
        Formation::Cluster {
            min: corner,
            max: corner + 200.0,
        }
    } else {
        match (host.random() * 5.0) as u32 {
            0 => {
                let angle = host.random() * TAU;
                Formation::Circle {
                    center: host.target_position(),
                    radius1: 260.0,
                    radius2: 380.0,
                    angle1: angle,
                    angle2: angle + TAU,
                }
            }
            1 => {
                let y = margin + host.random() * (extent.y - 2.0 * margin);
                let (x1, x2) = if host.random() < 0.5 {
                    (margin, margin + 150.0)
                } else {
                    (extent.x - margin - 150.0, extent.x - margin)
                };
                Formation::Cluster {
                    min: Vec2::new(x1, y - 75.0),
                    max: Vec2::new(x2, y + 75.0),
                }
            }
            2 => Formation::Line {
                start: Vec2::new(margin, margin),
                end: Vec2::new(extent.x - margin, margin),
            },
            3 => Formation::PlayerRelative {
                offset_start: Vec2::new(-300.0, -350.0),
                offset_end: Vec2::new(300.0, -350.0),
            },
            _ => Formation::PrePlaced {
                points: (0..count)
                    .map(|i| {
                        let corner = match i % 4 {
                            0 => Vec2::new(margin, margin),
                            1 => Vec2::new(extent.x - margin, margin),
                            2 => Vec2::new(extent.x - margin, extent.y - margin),
                            _ => Vec2::new(margin, extent.y - margin),
                        };
                        let ring = (i / 4) as f32 * 30.0;
                        corner + (extent * 0.5 - corner).normalize_or_zero() * ring
                    })
                    .collect(),
            },
        }
    };
    Wave::new(class, formation, count, interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockHost {
        alive: usize,
        queue_busy: bool,
        waves: Vec<Wave>,
        bosses: Vec<BossKind>,
        bosses_alive: bool,
        escorts: usize,
        saves: Vec<Progression>,
        music: Vec<u8>,
        events: Vec<GameEvent>,
        draws: u32,
    }

    impl RoundHost for MockHost {
        fn alive_enemies(&self) -> usize {
            self.alive
        }
        fn wave_queue_empty(&self) -> bool {
            !self.queue_busy
        }
        fn queue_wave(&mut self, wave: Wave) {
            self.waves.push(wave);
        }
        fn spawn_boss(&mut self, kind: BossKind) -> bool {
            self.bosses.push(kind);
            true
        }
        fn boss_alive(&self, _kind: BossKind) -> bool {
            self.bosses_alive
        }
        fn spawn_enemy(&mut self, _class: EntityClass, _pos: Vec2) -> bool {
            self.escorts += 1;
            true
        }
        fn random(&mut self) -> f32 {
            self.draws += 1;
            (self.draws as f32 * 0.37).fract()
        }
        fn extent(&self) -> Vec2 {
            Vec2::new(1600.0, 1200.0)
        }
        fn target_position(&self) -> Vec2 {
            Vec2::new(800.0, 900.0)
        }
        fn save_progress(&mut self, progress: &Progression) {
            self.saves.push(progress.clone());
        }
        fn play_music(&mut self, theme: u8) {
            self.music.push(theme);
        }
        fn notify(&mut self, event: GameEvent) {
            self.events.push(event);
        }
    }

    fn machine() -> RoundMachine {
        RoundMachine::new(Tuning::default(), WaveGate::AliveCount, ErrorPolicy::Strict)
    }

    fn run_until(m: &mut RoundMachine, host: &mut MockHost, mut done: impl FnMut(&RoundMachine) -> bool) {
        for _ in 0..10_000 {
            if done(m) {
                return;
            }
            m.update(0.1, host);
        }
        panic!("condition never reached");
    }

    #[test]
    fn test_transition_table() {
        let legal = [
            (RoundState::Idle, RoundState::PlayWaves),
            (RoundState::PlayWaves, RoundState::PlayMaxiBoss),
            (RoundState::PlayWaves, RoundState::LevelCleared),
            (RoundState::PlayMaxiBoss, RoundState::LevelCleared),
            (RoundState::LevelCleared, RoundState::Idle),
        ];
        for from in RoundState::ALL {
            for to in RoundState::ALL {
                assert_eq!(from.can_enter(to), legal.contains(&(from, to)), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut host = MockHost::default();
        let mut m = machine();
        m.start(&mut host);
        let err = m.transition(RoundState::PlayMaxiBoss, &mut host);
        assert_eq!(
            err,
            Err(SimError::IllegalTransition {
                from: RoundState::Idle,
                to: RoundState::PlayMaxiBoss
            })
        );
        assert_eq!(m.state(), RoundState::Idle);
    }

    #[test]
    fn test_start_prepares_level_one() {
        let mut host = MockHost::default();
        let mut m = machine();
        m.start(&mut host);
        assert_eq!(m.progress.level, 1);
        assert_eq!(m.progress.wave_count, 4);
        assert_eq!(m.progress.enemy_pool, vec![EntityClass::Grunt, EntityClass::Weaver]);
        assert_eq!(host.music, vec![0]);
    }

    #[test]
    fn test_alive_gate_holds_then_opens() {
        let mut host = MockHost {
            alive: 3,
            queue_busy: true,
            ..Default::default()
        };
        let mut m = machine();
        m.start(&mut host);
        run_until(&mut m, &mut host, |m| m.wave_phase() == SpawnPhase::Wait);
        assert_eq!(m.progress.alive_threshold, 2);

        for _ in 0..50 {
            m.update(0.1, &mut host);
            assert_eq!(m.wave_phase(), SpawnPhase::Wait);
        }
        // Queue drained but still too many alive
        host.queue_busy = false;
        m.update(0.1, &mut host);
        assert_eq!(m.wave_phase(), SpawnPhase::Wait);

        host.alive = 2;
        m.update(0.1, &mut host);
        assert_eq!(m.wave_phase(), SpawnPhase::CoolDown);
        run_until(&mut m, &mut host, |m| m.wave_phase() != SpawnPhase::CoolDown);
        assert_eq!(m.wave_phase(), SpawnPhase::Spawn);
        m.update(0.1, &mut host);
        assert_eq!(host.waves.len(), 2);
    }

    #[test]
    fn test_timed_gate() {
        let mut host = MockHost {
            alive: 50,
            ..Default::default()
        };
        let mut m = RoundMachine::new(Tuning::default(), WaveGate::Timed, ErrorPolicy::Strict);
        m.start(&mut host);
        run_until(&mut m, &mut host, |m| m.wave_phase() == SpawnPhase::Wait);
        // 8s wave timer at 0.1s steps
        for _ in 0..79 {
            m.update(0.1, &mut host);
        }
        assert_eq!(m.wave_phase(), SpawnPhase::Wait);
        run_until(&mut m, &mut host, |m| m.wave_phase() == SpawnPhase::CoolDown);
    }

    #[test]
    fn test_full_cycle() {
        let mut host = MockHost::default();
        let mut m = machine();
        m.start(&mut host);

        let mut visited = vec![m.state()];
        run_until(&mut m, &mut host, |m| {
            if visited.last() != Some(&m.state()) {
                visited.push(m.state());
            }
            m.progress.level == 2
        });
        assert_eq!(
            visited,
            vec![
                RoundState::Idle,
                RoundState::PlayWaves,
                RoundState::PlayMaxiBoss,
                RoundState::LevelCleared,
                RoundState::Idle,
            ]
        );
        assert_eq!(host.waves.len(), 4);
        assert_eq!(host.bosses, vec![BossKind::Mini, BossKind::Maxi]);
        assert_eq!(host.escorts, 2);
        assert_eq!(host.saves.len(), 1);
        assert!(host.saves[0].level_won);
        assert_eq!(m.progress.boss_count, 1);
        assert_eq!(host.music, vec![0, 1]);
        assert!(host.events.contains(&GameEvent::LevelCleared { level: 1 }));
    }

    #[test]
    fn test_boss_wait_holds_while_alive() {
        let mut host = MockHost {
            bosses_alive: true,
            ..Default::default()
        };
        let mut m = machine();
        m.start(&mut host);
        // The mini boss holds back the end of the waves while alive
        run_until(&mut m, &mut host, |m| m.wave_phase() == SpawnPhase::Done);
        for _ in 0..20 {
            m.update(0.1, &mut host);
        }
        assert_eq!(m.state(), RoundState::PlayWaves);

        host.bosses_alive = false;
        run_until(&mut m, &mut host, |m| m.boss_phase() == SpawnPhase::Wait);
        host.bosses_alive = true;
        for _ in 0..20 {
            m.update(0.1, &mut host);
        }
        assert_eq!(m.state(), RoundState::PlayMaxiBoss);
        host.bosses_alive = false;
        run_until(&mut m, &mut host, |m| m.state() == RoundState::LevelCleared);
    }

    #[test]
    fn test_resume() {
        let mut host = MockHost::default();
        let mut m = machine();
        let saved = Progression {
            level: 3,
            level_won: true,
            score: 900,
            ..Progression::default()
        };
        m.resume(saved.clone(), &mut host);
        assert_eq!(m.progress.level, 4);
        assert_eq!(m.progress.score, 900);

        m.resume(
            Progression {
                level_won: false,
                ..saved
            },
            &mut host,
        );
        assert_eq!(m.progress.level, 3);
    }
}
