//! Mini and maxi bosses
//!
//! A boss is one registry entity made of a root body and a list of segments.
//! Segments form a tree through parent indices (`None` hangs off the root)
//! and each one owns its own selection slot so bullets can hit it directly.
//! The root cannot be damaged while any segment is still standing.

use std::any::Any;
use std::f32::consts::TAU;

use glam::Vec2;

use super::context::{BulletSpec, Command, FrameContext, GameEvent};
use super::entity::{Entity, EntityClass, EntityCore, EntityFlags, Hit, Layer};
use super::powerup::PowerupKind;
use super::selection::{Body, SelectionId};
use crate::audio::SoundId;
use crate::consts::{BULLET_RADIUS, ENEMY_BULLET_SPEED, HIT_FLASH_TIME};
use crate::renderer::{RenderSink, Sprite};

/// Seconds of explosions between the killing blow and removal
pub const DEATH_SEQUENCE_TIME: f32 = 1.5;
/// Time dilation triggered by a boss kill
pub const DEFEAT_SHOCK_TIME: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BossKind {
    Mini,
    Maxi,
}

impl BossKind {
    pub fn root_class(self) -> EntityClass {
        match self {
            BossKind::Mini => EntityClass::MiniBoss,
            BossKind::Maxi => EntityClass::MaxiBoss,
        }
    }

    pub fn segment_class(self) -> EntityClass {
        match self {
            BossKind::Mini => EntityClass::MiniBossSegment,
            BossKind::Maxi => EntityClass::MaxiBossSegment,
        }
    }

    fn flag(self) -> EntityFlags {
        match self {
            BossKind::Mini => EntityFlags::MINI_BOSS,
            BossKind::Maxi => EntityFlags::MAXI_BOSS,
        }
    }

    /// Parent index of every segment. The mini boss trails one tail, the maxi
    /// boss two arms.
    fn layout(self) -> &'static [Option<u16>] {
        match self {
            BossKind::Mini => &[None, Some(0), Some(1), Some(2)],
            BossKind::Maxi => &[
                None,
                Some(0),
                Some(1),
                Some(2),
                None,
                Some(4),
                Some(5),
                Some(6),
            ],
        }
    }

    fn fire_interval(self) -> f32 {
        match self {
            BossKind::Mini => 1.4,
            BossKind::Maxi => 0.9,
        }
    }

    /// Bullets per volley
    fn volley(self) -> usize {
        match self {
            BossKind::Mini => 3,
            BossKind::Maxi => 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    /// Index of the segment this one trails, `None` for the root
    pub parent: Option<u16>,
    pub pos: Vec2,
    pub radius: f32,
    pub hit_points: f32,
    pub alive: bool,
    hit_flash: f32,
    selection: Option<SelectionId>,
}

#[derive(Debug)]
pub struct Boss {
    pub core: EntityCore,
    pub kind: BossKind,
    segments: Vec<Segment>,
    /// Center of the hover pattern
    anchor: Vec2,
    age: f32,
    fire_timer: f32,
    /// Counts down once the root is destroyed
    dying: Option<f32>,
    defeated: bool,
}

impl Boss {
    /// Hit points scale with the level
    pub fn new(kind: BossKind, pos: Vec2, level: u32) -> Self {
        let scale = 1.0 + 0.25 * level.saturating_sub(1) as f32;
        let mut core = EntityCore::spawn(kind.root_class(), pos);
        core.layer = Layer::Boss;
        core.hit_points *= scale;
        core.flags.insert(kind.flag() | EntityFlags::POSITION_TRACKED);

        let segment_class = kind.segment_class();
        let link = core.radius + segment_class.radius();
        let segments = kind
            .layout()
            .iter()
            .enumerate()
            .map(|(i, &parent)| Segment {
                parent,
                pos: pos + Vec2::new(0.0, -link * (1.0 + (i % 4) as f32)),
                radius: segment_class.radius(),
                hit_points: segment_class.base_hit_points() * scale,
                alive: true,
                hit_flash: 0.0,
                selection: None,
            })
            .collect();

        let mut boss = Self {
            core,
            kind,
            segments,
            anchor: pos,
            age: 0.0,
            fire_timer: kind.fire_interval(),
            dying: None,
            defeated: false,
        };
        boss.refresh_invincibility();
        boss
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn live_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.alive).count()
    }

    pub fn is_dying(&self) -> bool {
        self.dying.is_some()
    }

    fn refresh_invincibility(&mut self) {
        let shielded = self.live_segments() > 0;
        self.core.flags.set(EntityFlags::INVINCIBLE, shielded);
    }

    fn segment_body(&self, index: usize) -> Option<Body> {
        let owner = self.core.owner?;
        let seg = &self.segments[index];
        Some(Body {
            owner,
            part: index as u16 + 1,
            class: self.kind.segment_class(),
            pos: seg.pos,
            radius: seg.radius,
            friendly: false,
            gridded: true,
        })
    }

    fn parent_pos(&self, parent: Option<u16>) -> Vec2 {
        match parent {
            Some(p) => self.segments[p as usize].pos,
            None => self.core.pos,
        }
    }

    /// Destroy `index` and everything hanging off it
    fn destroy_segment(&mut self, ctx: &mut FrameContext<'_>, index: usize) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            if !self.segments[i].alive {
                continue;
            }
            self.segments[i].alive = false;
            self.segments[i].hit_points = 0.0;
            ctx.push(Command::AddScore(self.kind.segment_class().score()));
            ctx.play(SoundId::SegmentExplode);
            stack.extend(
                self.segments
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.parent == Some(i as u16) && s.alive)
                    .map(|(child, _)| child),
            );
        }
        self.refresh_invincibility();
    }

    fn hover_target(&self) -> Vec2 {
        let t = self.age;
        match self.kind {
            BossKind::Mini => self.anchor + Vec2::new((t * 0.6).sin() * 260.0, (t * 1.3).sin() * 40.0),
            BossKind::Maxi => {
                self.anchor + Vec2::new((t * 0.4).sin() * 320.0, (t * 0.8).sin() * 90.0)
            }
        }
    }

    fn fire(&mut self, ctx: &mut FrameContext<'_>) {
        let Some(aim) = ctx.aim_at_target(self.core.pos) else {
            return;
        };
        let count = self.kind.volley();
        let arc = 0.5;
        let base = aim.to_angle() - arc / 2.0;
        for i in 0..count {
            let angle = base + arc * i as f32 / (count - 1) as f32;
            let dir = Vec2::from_angle(angle);
            ctx.push(Command::SpawnBullet(BulletSpec {
                pos: self.core.pos + dir * (self.core.radius + BULLET_RADIUS),
                vel: dir * ENEMY_BULLET_SPEED,
                damage: 1.0,
                friendly: false,
                ignore: self.core.selection,
                piercing: false,
                lifetime: 4.0,
            }));
        }
        ctx.play(SoundId::EnemyShoot);
    }

    fn update_dying(&mut self, ctx: &mut FrameContext<'_>, dt: f32) {
        let Some(left) = self.dying.as_mut() else {
            return;
        };
        *left -= dt;
        if *left <= 0.0 {
            self.dying = None;
            self.core.kill();
            return;
        }
        // Scattered blasts around the hull
        if ctx.random() < dt * 8.0 {
            let angle = ctx.random() * TAU;
            let pos = self.core.pos + Vec2::from_angle(angle) * self.core.radius * ctx.random();
            ctx.push(Command::DestroySector { pos });
            ctx.play(SoundId::Explode);
        }
    }
}

impl Entity for Boss {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>, dt: f32) {
        if !self.core.is_active() {
            return;
        }
        // Segments destroyed last frame leave the selection map now
        for i in 0..self.segments.len() {
            if !self.segments[i].alive {
                ctx.untrack_part(&mut self.segments[i].selection);
            }
        }
        if self.dying.is_some() {
            self.update_dying(ctx, dt);
            return;
        }

        self.age += dt;
        let goal = self.hover_target();
        self.core.vel = (goal - self.core.pos) * 1.5;
        self.core.pos += self.core.vel * dt;
        self.core.clamp_to(ctx.extent);
        self.core.rotation += dt * 0.5;
        ctx.track(&mut self.core);

        let link = self.core.radius * 0.6 + self.kind.segment_class().radius();
        for i in 0..self.segments.len() {
            let seg = &self.segments[i];
            if !seg.alive {
                continue;
            }
            let anchor = self.parent_pos(seg.parent);
            let away = (seg.pos - anchor).normalize_or(Vec2::NEG_Y);
            let pos = anchor + away * link;
            let seg = &mut self.segments[i];
            seg.pos = pos;
            seg.hit_flash = (seg.hit_flash - dt).max(0.0);
            if let Some(body) = self.segment_body(i) {
                let mut slot = self.segments[i].selection;
                ctx.track_part(&mut slot, body);
                self.segments[i].selection = slot;
            }
        }

        self.fire_timer -= dt * ctx.speed.max(1.0);
        if self.fire_timer <= 0.0 {
            self.fire_timer += self.kind.fire_interval();
            self.fire(ctx);
        }
    }

    fn render(&self, out: &mut dyn RenderSink) {
        let class = self.kind.segment_class();
        for seg in self.segments.iter().filter(|s| s.alive) {
            out.draw(Sprite {
                class,
                pos: seg.pos,
                rotation: self.core.rotation,
                scale: seg.radius,
                flash: seg.hit_flash > 0.0,
            });
        }
        out.draw(self.core.sprite());
    }

    fn render_additive(&self, out: &mut dyn RenderSink) {
        if self.is_dying() {
            out.draw_additive(Sprite {
                scale: self.core.radius * 1.5,
                ..self.core.sprite()
            });
        }
    }

    fn handle_damage(&mut self, ctx: &mut FrameContext<'_>, hit: &Hit) -> bool {
        if !self.core.is_active() || self.dying.is_some() || hit.amount <= 0.0 {
            return false;
        }
        if hit.part > 0 {
            let index = hit.part as usize - 1;
            let Some(seg) = self.segments.get_mut(index) else {
                return false;
            };
            if !seg.alive {
                return false;
            }
            seg.hit_flash = HIT_FLASH_TIME;
            seg.hit_points = (seg.hit_points - hit.amount).max(0.0);
            if seg.hit_points <= 0.0 {
                self.destroy_segment(ctx, index);
            }
            return false;
        }
        if self.core.is_invincible() {
            return false;
        }
        self.core.hit_flash = HIT_FLASH_TIME;
        self.core.hit_points = (self.core.hit_points - hit.amount).max(0.0);
        if self.core.hit_points > 0.0 {
            return false;
        }
        log::info!("{} destroyed", self.core.class.as_str());
        self.defeated = true;
        self.dying = Some(DEATH_SEQUENCE_TIME);
        self.core.flags.insert(EntityFlags::TRANSIENT | EntityFlags::RENDER_ADDITIVE);
        true
    }

    fn handle_damage_begin(&mut self, ctx: &mut FrameContext<'_>, _hit: &Hit) {
        ctx.play(SoundId::Hit);
    }

    fn handle_die(&mut self, ctx: &mut FrameContext<'_>) {
        for seg in &mut self.segments {
            ctx.untrack_part(&mut seg.selection);
        }
        if !self.defeated {
            return;
        }
        let pos = self.core.pos;
        ctx.push(Command::AddScore(self.kind.root_class().score()));
        ctx.push(Command::Shock {
            seconds: DEFEAT_SHOCK_TIME,
        });
        ctx.push(Command::SpawnPowerup {
            kind: PowerupKind::WeaponUp,
            pos,
        });
        if self.kind == BossKind::Maxi {
            ctx.push(Command::SpawnPowerup {
                kind: PowerupKind::ExtraLife,
                pos: pos + Vec2::new(40.0, 0.0),
            });
        }
        ctx.emit(GameEvent::BossDefeated { kind: self.kind });
        ctx.play(SoundId::BossExplode);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
