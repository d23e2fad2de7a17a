//! Fixed timestep simulation tick
//!
//! Frontend entry point: turns one tick of input into a `World::step`, and
//! accumulates variable frame times into fixed ticks.

use glam::Vec2;

use super::context::Controls;
use super::entity::EntityFlags;
use super::world::{Phase, World};
use crate::consts::*;

/// Autopilot backs off from hostiles closer than this
const KEEP_AWAY: f32 = 220.0;
/// Autopilot only fetches pickups when nothing is closer than this
const SAFE_DISTANCE: f32 = 320.0;

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Movement direction, clamped to unit length by the ship
    pub move_dir: Vec2,
    /// Aim direction (mouse/right stick); keeps the last aim when `None`
    pub aim_dir: Option<Vec2>,
    pub fire: bool,
    /// Pause toggle
    pub pause: bool,
    /// Idle/demo mode - autopilot plays the game
    pub idle_mode: bool,
}

/// Advance the world by one fixed timestep
pub fn tick(world: &mut World, input: &TickInput, dt: f32) {
    if input.pause {
        match world.phase {
            Phase::Playing => {
                world.phase = Phase::Paused;
                return;
            }
            Phase::Paused => world.phase = Phase::Playing,
            Phase::GameOver => {}
        }
    }

    // Don't tick if paused or game over
    if world.phase != Phase::Playing {
        return;
    }

    let controls = if input.idle_mode {
        autopilot(world)
    } else {
        Controls {
            move_dir: input.move_dir,
            aim_dir: input.aim_dir,
            fire: input.fire,
        }
    };
    world.step(controls, dt);
}

/// Demo-mode pilot: shoot the nearest hostile while strafing around it,
/// and collect pickups when nothing is close
fn autopilot(world: &World) -> Controls {
    let Some(me) = world.target() else {
        return Controls::default();
    };

    let nearest = world
        .selection()
        .iter()
        .filter(|(_, b)| !b.friendly && world.is_live(b.owner))
        .min_by(|(_, a), (_, b)| {
            a.pos
                .distance_squared(me.pos)
                .partial_cmp(&b.pos.distance_squared(me.pos))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(_, b)| b.pos);
    let threat = nearest.map(|p| p.distance(me.pos)).unwrap_or(f32::INFINITY);

    // If safe, go grab the nearest pickup
    let mut pickup: Option<Vec2> = None;
    if threat > SAFE_DISTANCE {
        world.registry.for_each(|_, entity| {
            let core = entity.core();
            if !core.flags.contains(EntityFlags::POWERUP) || !core.is_active() {
                return;
            }
            let closer = pickup
                .is_none_or(|p| core.pos.distance_squared(me.pos) < p.distance_squared(me.pos));
            if closer {
                pickup = Some(core.pos);
            }
        });
    }

    // Drift toward the middle so the ship does not pin itself on a wall
    let home = world.extent() * Vec2::new(0.5, 0.75);
    let homing = (home - me.pos) / world.extent().length();

    let Some(foe) = nearest else {
        let goal = pickup.unwrap_or(home);
        return Controls {
            move_dir: (goal - me.pos).normalize_or_zero() * (goal.distance(me.pos) / 50.0).min(1.0),
            aim_dir: None,
            fire: false,
        };
    };

    let dir = (foe - me.pos).normalize_or_zero();
    let move_dir = if let Some(goal) = pickup {
        (goal - me.pos).normalize_or_zero()
    } else {
        // Strafe with an oscillating offset to avoid perfect orbits
        let t = world.time;
        let wobble = (t * 0.9).sin() + (t * 0.37).sin() * 0.5;
        let radial = if threat < KEEP_AWAY {
            -1.0
        } else if threat > KEEP_AWAY * 2.0 {
            0.5
        } else {
            0.0
        };
        dir.perp() * wobble + dir * radial + homing
    };

    Controls {
        move_dir,
        aim_dir: Some(dir),
        fire: true,
    }
}

/// Fixed-step accumulator for variable frame times
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    accumulator: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run as many fixed ticks as `frame_dt` covers, at most `MAX_SUBSTEPS`.
    /// One-shot inputs are cleared after the first tick consumes them.
    pub fn advance(&mut self, world: &mut World, input: &mut TickInput, frame_dt: f32) -> u32 {
        // Clamp to avoid a spiral of death after a long stall
        self.accumulator += frame_dt.min(0.1);

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            tick(world, input, SIM_DT);
            self.accumulator -= SIM_DT;
            substeps += 1;

            input.pause = false;
        }
        substeps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudio;
    use crate::settings::Settings;
    use crate::sim::boss::{Boss, BossKind};

    fn world() -> World {
        World::new(
            Settings {
                error_policy: crate::ErrorPolicy::Strict,
                ..Settings::default()
            },
            Box::new(NullAudio),
        )
    }

    #[test]
    fn test_tick_pause() {
        let mut w = world();
        let pause = TickInput {
            pause: true,
            ..Default::default()
        };
        tick(&mut w, &pause, SIM_DT);
        assert_eq!(w.phase, Phase::Paused);
        assert_eq!(w.frame, 0);

        // Paused worlds do not advance
        tick(&mut w, &TickInput::default(), SIM_DT);
        assert_eq!(w.frame, 0);

        // Unpausing resumes in the same tick
        tick(&mut w, &pause, SIM_DT);
        assert_eq!(w.phase, Phase::Playing);
        assert_eq!(w.frame, 1);
    }

    #[test]
    fn test_player_moves_and_fires() {
        let mut w = world();
        let start = w.target().unwrap().pos;
        let input = TickInput {
            move_dir: Vec2::new(1.0, 0.0),
            aim_dir: Some(Vec2::NEG_Y),
            fire: true,
            ..Default::default()
        };
        tick(&mut w, &input, SIM_DT);
        assert!(w.target().unwrap().pos.x > start.x);
        assert!(w.bullets.live_count() > 0);
        assert!(w.bullets.iter().all(|(_, b)| b.core.vel.y < 0.0));
    }

    #[test]
    fn test_idle_mode_shoots_at_hostiles() {
        let mut w = world();
        let input = TickInput {
            idle_mode: true,
            ..Default::default()
        };
        // Let the first waves arrive
        let mut fired = false;
        for _ in 0..600 {
            tick(&mut w, &input, SIM_DT);
            fired |= w.bullets.iter().any(|(_, b)| b.core.is_friendly());
            if w.phase == Phase::GameOver {
                break;
            }
        }
        assert!(fired);
        assert!(w.progress().score > 0 || w.enemies.live_count() > 0);
    }

    #[test]
    fn test_idle_mode_holds_fire_on_empty_field() {
        let mut w = world();
        let input = TickInput {
            idle_mode: true,
            ..Default::default()
        };
        tick(&mut w, &input, SIM_DT);
        assert_eq!(w.bullets.live_count(), 0);
        assert_eq!(w.enemies.live_count(), 0);
    }

    #[test]
    fn test_autopilot_ignores_dying_boss() {
        let mut w = world();
        let pos = w.extent() * Vec2::new(0.5, 0.3);
        let id = w.registry.add(Box::new(Boss::new(BossKind::Mini, pos, 1)));
        tick(&mut w, &TickInput::default(), SIM_DT);
        assert!(autopilot(&w).fire);

        w.registry
            .get_mut(id)
            .unwrap()
            .core_mut()
            .flags
            .insert(EntityFlags::TRANSIENT);
        let controls = autopilot(&w);
        assert!(!controls.fire);
        assert_eq!(controls.aim_dir, None);
    }

    #[test]
    fn test_frame_clock_caps_substeps() {
        let mut w = world();
        let mut clock = FrameClock::new();
        let mut input = TickInput::default();
        assert_eq!(clock.advance(&mut w, &mut input, SIM_DT * 0.5), 0);
        assert_eq!(clock.advance(&mut w, &mut input, SIM_DT * 0.6), 1);
        // A long stall is clamped and capped
        assert_eq!(clock.advance(&mut w, &mut input, 5.0), MAX_SUBSTEPS);
        assert_eq!(w.frame, 1 + MAX_SUBSTEPS as u64);
    }

    #[test]
    fn test_frame_clock_clears_pause() {
        let mut w = world();
        let mut clock = FrameClock::new();
        let mut input = TickInput {
            pause: true,
            ..Default::default()
        };
        clock.advance(&mut w, &mut input, SIM_DT * 3.0);
        assert!(!input.pause);
        assert_eq!(w.phase, Phase::Paused);
    }
}
