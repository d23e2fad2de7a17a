//! Wave spawn queue
//!
//! A wave spawns `count` enemies of one class, one every `interval` seconds,
//! at positions given by a closed-form formation function of the spawn
//! progress `i / (count - 1)`. Several waves can run at once.

use glam::Vec2;

use super::entity::EntityClass;
use crate::error::{ErrorPolicy, SimError, SimResult};
use crate::{lerp, polar_to_cartesian};

/// Where the enemies of a wave appear
#[derive(Debug, Clone, PartialEq)]
pub enum Formation {
    /// Spiral from (`radius1`, `angle1`) to (`radius2`, `angle2`) around `center`
    Circle {
        center: Vec2,
        radius1: f32,
        radius2: f32,
        angle1: f32,
        angle2: f32,
    },
    /// Tight clump along the `min`..`max` diagonal
    Cluster { min: Vec2, max: Vec2 },
    Line { start: Vec2, end: Vec2 },
    /// Line relative to the target at spawn time
    PlayerRelative { offset_start: Vec2, offset_end: Vec2 },
    /// One fixed point per enemy
    PrePlaced { points: Vec<Vec2> },
}

impl Formation {
    pub fn name(&self) -> &'static str {
        match self {
            Formation::Circle { .. } => "circle",
            Formation::Cluster { .. } => "cluster",
            Formation::Line { .. } => "line",
            Formation::PlayerRelative { .. } => "player_relative",
            Formation::PrePlaced { .. } => "pre_placed",
        }
    }

    /// Spawn position of enemy `index` at `progress` in `[0, 1]`
    pub fn position(&self, index: usize, progress: f32, target: Vec2) -> SimResult<Vec2> {
        match self {
            Formation::Circle {
                center,
                radius1,
                radius2,
                angle1,
                angle2,
            } => {
                let radius = lerp(*radius1, *radius2, progress);
                let angle = lerp(*angle1, *angle2, progress);
                Ok(*center + polar_to_cartesian(radius, angle))
            }
            Formation::Cluster { min, max } => {
                let along = min.lerp(*max, progress);
                // Alternate sides of the diagonal so the clump has some width
                let side = (*max - *min).perp() * 0.1;
                let offset = match index % 3 {
                    0 => 0.0,
                    1 => 1.0,
                    _ => -1.0,
                };
                Ok(along + side * offset)
            }
            Formation::Line { start, end } => Ok(start.lerp(*end, progress)),
            Formation::PlayerRelative {
                offset_start,
                offset_end,
            } => Ok(target + offset_start.lerp(*offset_end, progress)),
            Formation::PrePlaced { points } => points
                .get(index)
                .copied()
                .ok_or_else(|| SimError::unreachable("pre-placed point", index.to_string())),
        }
    }
}

/// One spawn the queue asks the world for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub class: EntityClass,
    pub pos: Vec2,
    pub index: usize,
    pub progress: f32,
}

/// World side of the queue
pub trait WaveSink {
    /// Spawn one enemy. Returns false if the pool was full (the spawn is
    /// dropped).
    fn spawn(&mut self, request: SpawnRequest) -> bool;
    /// Current target position for player-relative formations
    fn target_position(&self) -> Vec2;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    pub class: EntityClass,
    pub formation: Formation,
    pub count: usize,
    pub interval: f32,
    timer: f32,
    spawned: usize,
}

impl Wave {
    pub fn new(class: EntityClass, formation: Formation, count: usize, interval: f32) -> SimResult<Self> {
        if !class.is_small_fry() {
            return Err(SimError::unreachable("wave class", class.as_str()));
        }
        if count == 0 {
            return Err(SimError::unreachable("wave size", "0"));
        }
        if let Formation::PrePlaced { points } = &formation {
            if points.len() < count {
                return Err(SimError::unreachable(
                    "pre-placed wave",
                    format!("{} points for {count} enemies", points.len()),
                ));
            }
        }
        Ok(Self {
            class,
            formation,
            count,
            interval: interval.max(0.0),
            timer: interval.max(0.0),
            spawned: 0,
        })
    }

    pub fn spawned(&self) -> usize {
        self.spawned
    }

    pub fn is_done(&self) -> bool {
        self.spawned >= self.count
    }

    /// Progress of spawn `index`
    pub fn progress(&self, index: usize) -> f32 {
        if self.count <= 1 {
            0.0
        } else {
            index as f32 / (self.count - 1) as f32
        }
    }

    /// Tick the interval timer, spawning as many enemies as have come due
    fn update(&mut self, dt: f32, sink: &mut dyn WaveSink, policy: ErrorPolicy) {
        self.timer -= dt;
        while self.timer <= 0.0 && !self.is_done() {
            let index = self.spawned;
            let progress = self.progress(index);
            let target = sink.target_position();
            let pos = policy.settle(self.formation.position(index, progress, target), target);
            if !sink.spawn(SpawnRequest {
                class: self.class,
                pos,
                index,
                progress,
            }) {
                log::debug!("{} spawn dropped, pool full", self.class.as_str());
            }
            self.spawned += 1;
            self.timer += self.interval;
            if self.interval <= 0.0 {
                // Zero interval spawns the whole wave at once
                self.timer = 0.0;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct WaveQueue {
    waves: Vec<Wave>,
    policy: ErrorPolicy,
}

impl WaveQueue {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self {
            waves: Vec::new(),
            policy,
        }
    }

    pub fn push(&mut self, wave: Wave) {
        log::debug!(
            "queued {} x{} in {} formation",
            wave.class.as_str(),
            wave.count,
            wave.formation.name()
        );
        self.waves.push(wave);
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    pub fn clear(&mut self) {
        self.waves.clear();
    }

    /// Tick every active wave once, dropping the ones that are exhausted
    pub fn update(&mut self, dt: f32, sink: &mut dyn WaveSink) {
        let policy = self.policy;
        self.waves.retain_mut(|wave| {
            wave.update(dt, sink, policy);
            !wave.is_done()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        requests: Vec<SpawnRequest>,
        target: Vec2,
        capacity: Option<usize>,
    }

    impl WaveSink for Recorder {
        fn spawn(&mut self, request: SpawnRequest) -> bool {
            if self.capacity.is_some_and(|c| self.requests.len() >= c) {
                return false;
            }
            self.requests.push(request);
            true
        }

        fn target_position(&self) -> Vec2 {
            self.target
        }
    }

    #[test]
    fn test_circle_wave_scenario() {
        let formation = Formation::Circle {
            center: Vec2::new(800.0, 600.0),
            radius1: 80.0,
            radius2: 160.0,
            angle1: 0.0,
            angle2: std::f32::consts::TAU,
        };
        let mut queue = WaveQueue::new(ErrorPolicy::Strict);
        queue.push(Wave::new(EntityClass::Grunt, formation, 12, 0.15).unwrap());
        let mut sink = Recorder::default();

        for tick in 1..=12 {
            queue.update(0.15, &mut sink);
            assert_eq!(sink.requests.len(), tick);
            assert_eq!(queue.is_empty(), tick == 12);
        }
        let progress: Vec<f32> = sink.requests.iter().map(|r| r.progress).collect();
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        for (i, r) in sink.requests.iter().enumerate() {
            assert_eq!(r.progress, i as f32 / 11.0);
        }
        let first = sink.requests[0].pos.distance(Vec2::new(800.0, 600.0));
        let last = sink.requests[11].pos.distance(Vec2::new(800.0, 600.0));
        assert!((first - 80.0).abs() < 1e-3);
        assert!((last - 160.0).abs() < 1e-3);

        queue.update(0.15, &mut sink);
        assert_eq!(sink.requests.len(), 12);
    }

    #[test]
    fn test_concurrent_waves_removed_cleanly() {
        let mut queue = WaveQueue::new(ErrorPolicy::Strict);
        let line = Formation::Line {
            start: Vec2::ZERO,
            end: Vec2::new(100.0, 0.0),
        };
        queue.push(Wave::new(EntityClass::Mine, line.clone(), 1, 0.1).unwrap());
        queue.push(Wave::new(EntityClass::Grunt, line.clone(), 3, 0.1).unwrap());
        queue.push(Wave::new(EntityClass::Weaver, line, 2, 0.1).unwrap());
        let mut sink = Recorder::default();

        queue.update(0.1, &mut sink);
        // The first wave finished; its neighbor still spawned this tick
        assert_eq!(queue.len(), 2);
        assert_eq!(sink.requests.len(), 3);
        queue.update(0.1, &mut sink);
        queue.update(0.1, &mut sink);
        assert!(queue.is_empty());

        let count = |class| sink.requests.iter().filter(|r| r.class == class).count();
        assert_eq!(count(EntityClass::Mine), 1);
        assert_eq!(count(EntityClass::Grunt), 3);
        assert_eq!(count(EntityClass::Weaver), 2);
    }

    #[test]
    fn test_large_step_spawns_several() {
        let mut queue = WaveQueue::new(ErrorPolicy::Strict);
        let line = Formation::Line {
            start: Vec2::ZERO,
            end: Vec2::new(90.0, 0.0),
        };
        queue.push(Wave::new(EntityClass::Grunt, line, 4, 0.25).unwrap());
        let mut sink = Recorder::default();
        queue.update(0.6, &mut sink);
        assert_eq!(sink.requests.len(), 2);
        assert!(sink.requests[1].pos.distance(Vec2::new(30.0, 0.0)) < 1e-3);
    }

    #[test]
    fn test_player_relative_and_pre_placed() {
        let points = vec![Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0)];
        let pre = Formation::PrePlaced {
            points: points.clone(),
        };
        assert_eq!(pre.position(1, 1.0, Vec2::ZERO), Ok(points[1]));
        assert!(pre.position(2, 1.0, Vec2::ZERO).is_err());

        let rel = Formation::PlayerRelative {
            offset_start: Vec2::new(-100.0, -200.0),
            offset_end: Vec2::new(100.0, -200.0),
        };
        assert_eq!(
            rel.position(0, 0.5, Vec2::new(500.0, 500.0)),
            Ok(Vec2::new(500.0, 300.0))
        );
    }

    #[test]
    fn test_full_pool_drops_spawns_but_finishes() {
        let mut queue = WaveQueue::new(ErrorPolicy::Strict);
        let line = Formation::Line {
            start: Vec2::ZERO,
            end: Vec2::ONE,
        };
        queue.push(Wave::new(EntityClass::Grunt, line, 5, 0.0).unwrap());
        let mut sink = Recorder {
            capacity: Some(2),
            ..Default::default()
        };
        queue.update(0.016, &mut sink);
        assert_eq!(sink.requests.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_invalid_waves_rejected() {
        let line = Formation::Line {
            start: Vec2::ZERO,
            end: Vec2::ONE,
        };
        assert!(Wave::new(EntityClass::MaxiBoss, line.clone(), 3, 0.1).is_err());
        assert!(Wave::new(EntityClass::Grunt, line, 0, 0.1).is_err());
        let pre = Formation::PrePlaced {
            points: vec![Vec2::ZERO],
        };
        assert!(Wave::new(EntityClass::Mine, pre, 2, 0.1).is_err());
    }
}
