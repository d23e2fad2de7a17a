//! Shmup Core headless runner
//!
//! Plays a demo session with the autopilot and logs how it went.
//!
//! Usage: `shmup-core [settings.json] [seconds]`

use shmup_core::Settings;
use shmup_core::audio::NullAudio;
use shmup_core::consts::SIM_DT;
use shmup_core::persistence::Archive;
use shmup_core::renderer::DrawList;
use shmup_core::sim::{FrameClock, GameEvent, Phase, TickInput, World};

/// Demo length when no duration is given
const DEFAULT_SECONDS: f32 = 60.0;

fn main() {
    env_logger::init();
    log::info!("Shmup Core (headless) starting...");

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => Settings::load(path),
        None => Settings::default(),
    };
    let seconds = args
        .next()
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(DEFAULT_SECONDS);

    let mut world = World::new(settings, Box::new(NullAudio));
    let mut input = TickInput {
        idle_mode: true,
        ..Default::default()
    };
    let mut clock = FrameClock::new();
    let mut draw_list = DrawList::new();

    let frames = (seconds / SIM_DT).ceil() as u32;
    let mut kills = 0usize;
    for _ in 0..frames {
        if clock.advance(&mut world, &mut input, SIM_DT) == 0 {
            continue;
        }
        kills += world
            .events()
            .iter()
            .filter(|e| matches!(e, GameEvent::EnemyKilled { .. }))
            .count();
        if world.phase == Phase::GameOver {
            break;
        }
    }

    draw_list.clear();
    world.render(&mut draw_list);
    let progress = world.progress();
    log::info!(
        "{:.1}s simulated: level {}, score {}, {} kills, {} sprites on screen",
        world.time,
        progress.level,
        progress.score,
        kills,
        draw_list.len()
    );

    let mut archive = Archive::new();
    match world.save(&mut archive).and_then(|()| archive.to_json()) {
        Ok(json) => println!("{json}"),
        Err(err) => log::error!("Failed to save session: {err}"),
    }
}
