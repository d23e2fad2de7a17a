//! Survival mode progression
//!
//! Runs instead of the round machine: `Idle -> Swarm -> Surge -> Swarm ...`.
//! Swarms trickle waves in while the field is thin; every surge dumps extra
//! waves at once and raises the speed multiplier for the rest of the session.
//! There are no bosses.

use serde::{Deserialize, Serialize};

use super::context::GameEvent;
use super::round::{Progression, RoundHost, enemy_pool_for_level, random_wave};
use crate::error::{ErrorPolicy, SimError, SimResult};
use crate::settings::Tuning;

/// Waves dumped at the start of a surge
const SURGE_WAVES: usize = 2;
/// Speed added by every surge
const SURGE_SPEEDUP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SurvivalState {
    #[default]
    Idle,
    Swarm,
    Surge,
}

impl SurvivalState {
    pub fn can_enter(self, to: SurvivalState) -> bool {
        matches!(
            (self, to),
            (SurvivalState::Idle, SurvivalState::Swarm)
                | (SurvivalState::Swarm, SurvivalState::Surge)
                | (SurvivalState::Surge, SurvivalState::Swarm)
        )
    }
}

#[derive(Debug, Clone)]
pub struct SurvivalMachine {
    state: SurvivalState,
    /// Time left in the current state
    timer: f32,
    /// Time until the next trickle wave may spawn
    spawn_timer: f32,
    surges: u32,
    tuning: Tuning,
    policy: ErrorPolicy,
    pub progress: Progression,
}

impl SurvivalMachine {
    pub fn new(tuning: Tuning, policy: ErrorPolicy) -> Self {
        Self {
            state: SurvivalState::Idle,
            timer: 0.0,
            spawn_timer: 0.0,
            surges: 0,
            tuning,
            policy,
            progress: Progression::default(),
        }
    }

    pub fn state(&self) -> SurvivalState {
        self.state
    }

    pub fn surges(&self) -> u32 {
        self.surges
    }

    pub fn start(&mut self, host: &mut dyn RoundHost) {
        self.state = SurvivalState::Idle;
        self.timer = self.tuning.idle_cooldown;
        self.surges = 0;
        self.progress = Progression {
            level: 1,
            alive_threshold: self.tuning.alive_threshold,
            speed_multiplier: self.tuning.speed(1),
            enemy_pool: enemy_pool_for_level(1),
            ..Progression::default()
        };
        host.play_music(0);
    }

    fn transition(&mut self, to: SurvivalState) -> SimResult<()> {
        if !self.state.can_enter(to) {
            return Err(SimError::unreachable(
                "survival transition",
                format!("{:?} -> {to:?}", self.state),
            ));
        }
        log::info!("survival {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    fn go(&mut self, to: SurvivalState) {
        let result = self.transition(to);
        self.policy.check(result);
    }

    fn queue(&mut self, host: &mut dyn RoundHost, count: usize) {
        self.progress.wave_index += 1;
        match random_wave(host, &self.progress.enemy_pool, count, self.tuning.spawn_interval) {
            Ok(wave) => host.queue_wave(wave),
            Err(err) => self.policy.check(Err(err)),
        }
        host.notify(GameEvent::WaveStarted {
            level: self.progress.level,
            wave: self.progress.wave_index,
        });
    }

    pub fn update(&mut self, dt: f32, host: &mut dyn RoundHost) {
        self.timer -= dt;
        match self.state {
            SurvivalState::Idle => {
                if self.timer <= 0.0 {
                    self.timer = self.tuning.swarm_time;
                    self.spawn_timer = 0.0;
                    self.go(SurvivalState::Swarm);
                }
            }
            SurvivalState::Swarm => {
                self.spawn_timer -= dt;
                let thin = host.alive_enemies() <= self.progress.alive_threshold as usize * 4;
                if self.spawn_timer <= 0.0 && host.wave_queue_empty() && thin {
                    self.spawn_timer = self.tuning.wave_cooldown * 2.0;
                    let size = self.tuning.wave_size(self.progress.level);
                    self.queue(host, size);
                }
                if self.timer <= 0.0 {
                    self.begin_surge(host);
                }
            }
            SurvivalState::Surge => {
                if self.timer <= 0.0 {
                    self.timer = self.tuning.swarm_time;
                    self.go(SurvivalState::Swarm);
                }
            }
        }
    }

    fn begin_surge(&mut self, host: &mut dyn RoundHost) {
        self.surges += 1;
        self.timer = self.tuning.surge_time;
        let p = &mut self.progress;
        p.level = self.surges + 1;
        p.speed_multiplier = (p.speed_multiplier + SURGE_SPEEDUP).min(self.tuning.max_speed);
        p.enemy_pool = enemy_pool_for_level(p.level);
        let size = self.tuning.wave_size(p.level) * 3 / 2;
        self.go(SurvivalState::Surge);
        for _ in 0..SURGE_WAVES {
            self.queue(host, size);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::sim::boss::BossKind;
    use crate::sim::entity::EntityClass;
    use crate::sim::wave::Wave;

    #[derive(Default)]
    struct Host {
        alive: usize,
        waves: Vec<Wave>,
        bosses: usize,
    }

    impl RoundHost for Host {
        fn alive_enemies(&self) -> usize {
            self.alive
        }
        fn wave_queue_empty(&self) -> bool {
            true
        }
        fn queue_wave(&mut self, wave: Wave) {
            self.waves.push(wave);
        }
        fn spawn_boss(&mut self, _kind: BossKind) -> bool {
            self.bosses += 1;
            true
        }
        fn boss_alive(&self, _kind: BossKind) -> bool {
            false
        }
        fn spawn_enemy(&mut self, _class: EntityClass, _pos: Vec2) -> bool {
            true
        }
        fn random(&mut self) -> f32 {
            0.5
        }
        fn extent(&self) -> Vec2 {
            Vec2::new(1600.0, 1200.0)
        }
        fn target_position(&self) -> Vec2 {
            Vec2::new(800.0, 600.0)
        }
        fn save_progress(&mut self, _progress: &Progression) {}
        fn play_music(&mut self, _theme: u8) {}
        fn notify(&mut self, _event: GameEvent) {}
    }

    fn step(m: &mut SurvivalMachine, host: &mut Host, seconds: f32) {
        let steps = (seconds / 0.1).round() as usize;
        for _ in 0..steps {
            m.update(0.1, host);
        }
    }

    #[test]
    fn test_cycle_and_escalation() {
        let tuning = Tuning::default();
        let mut host = Host::default();
        let mut m = SurvivalMachine::new(tuning, ErrorPolicy::Strict);
        m.start(&mut host);
        assert_eq!(m.state(), SurvivalState::Idle);

        step(&mut m, &mut host, tuning.idle_cooldown + 0.1);
        assert_eq!(m.state(), SurvivalState::Swarm);
        let speed = m.progress.speed_multiplier;

        step(&mut m, &mut host, tuning.swarm_time);
        assert_eq!(m.state(), SurvivalState::Surge);
        assert_eq!(m.surges(), 1);
        assert!(m.progress.speed_multiplier > speed);

        step(&mut m, &mut host, tuning.surge_time);
        assert_eq!(m.state(), SurvivalState::Swarm);
        assert_eq!(host.bosses, 0);
        assert!(host.waves.len() > SURGE_WAVES);
    }

    #[test]
    fn test_crowded_field_holds_trickle() {
        let mut host = Host {
            alive: 1_000,
            ..Default::default()
        };
        let tuning = Tuning::default();
        let mut m = SurvivalMachine::new(tuning, ErrorPolicy::Strict);
        m.start(&mut host);
        step(&mut m, &mut host, tuning.idle_cooldown + 5.0);
        assert_eq!(m.state(), SurvivalState::Swarm);
        assert!(host.waves.is_empty());
    }

    #[test]
    fn test_transition_table() {
        assert!(SurvivalState::Idle.can_enter(SurvivalState::Swarm));
        assert!(SurvivalState::Surge.can_enter(SurvivalState::Swarm));
        assert!(!SurvivalState::Idle.can_enter(SurvivalState::Surge));
        assert!(!SurvivalState::Surge.can_enter(SurvivalState::Idle));
    }
}
