use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use pagewalk_core::{
    Controls, ElementGeometry, ElementHandle, Engine, EngineEvent, Key, NullPresenter, Params, Rect,
    RegistrationConfig, StaticPage,
};

#[derive(Deserialize)]
struct Page {
    width: f32,
    height: f32,
}

#[derive(Deserialize)]
struct Platform {
    id: u32,
    rect: Rect,
    #[serde(default)]
    fragments: Vec<Rect>,
    #[serde(default = "RegistrationConfig::platform")]
    config: RegistrationConfig,
}

#[derive(Deserialize)]
struct Scenario {
    page: Page,
    #[serde(default)]
    params: Params,
    #[serde(default = "default_dt")]
    dt: f32,
    #[serde(default)]
    platforms: Vec<Platform>,
    /// Held controls per frame, as `Controls` bits.
    inputs: Vec<u8>,
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

const KEYS: [(Controls, Key); 4] = [
    (Controls::LEFT, Key::Left),
    (Controls::RIGHT, Key::Right),
    (Controls::WALK, Key::Walk),
    (Controls::JUMP, Key::Jump),
];

fn apply_controls(engine: &mut Engine, held: Controls, next: Controls) {
    for (control, key) in KEYS {
        match (held.contains(control), next.contains(control)) {
            (false, true) => engine.key_down(key),
            (true, false) => engine.key_up(key),
            _ => {}
        }
    }
}

fn describe(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Sound(payload) => format!("sound:{}", payload.event),
        EngineEvent::Platform { payload, .. } => {
            format!("{:?}:{}", payload.event, payload.platform.handle.0).to_lowercase()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: cargo run -p pagewalk_core --bin replay -- <scenario.json>")?;
    let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let scenario: Scenario =
        serde_json::from_str(&raw).with_context(|| format!("invalid scenario {}", path.display()))?;

    let mut page = StaticPage::new(scenario.page.width, scenario.page.height);
    for platform in &scenario.platforms {
        let geometry = ElementGeometry {
            bounds: platform.rect,
            fragments: platform.fragments.clone(),
        };
        page.insert(ElementHandle(platform.id), geometry);
    }

    let mut engine = Engine::new(scenario.params, &page);
    for platform in scenario.platforms {
        engine.add_element(ElementHandle(platform.id), platform.config, &page);
    }

    println!("frame,x,y,vx,vy,grounded,state,support,events");
    let mut held = Controls::empty();
    for (frame, bits) in scenario.inputs.iter().enumerate() {
        let next = Controls::from_bits_truncate(*bits);
        apply_controls(&mut engine, held, next);
        held = next;

        let outcome = engine.tick(scenario.dt, &page, &mut NullPresenter);
        let events: Vec<String> = outcome.events().iter().map(describe).collect();
        outcome.dispatch();

        let body = engine.body();
        let support = engine.support().map(|s| s.handle.0.to_string()).unwrap_or_default();
        println!(
            "{},{},{},{},{},{},{},{},{}",
            frame,
            body.x,
            body.y,
            body.vx,
            body.vy,
            body.grounded as u8,
            engine.state().as_str(),
            support,
            events.join("|")
        );
    }

    Ok(())
}
