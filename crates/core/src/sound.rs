//! Discrete sound events emitted by the simulation and the handler seam that
//! turns them into audio.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::events::SupportDescriptor;
use crate::geom::{clamp, Vec2};
use crate::registry::Metadata;
use crate::soundscape::{AudioBackend, VoicePool};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundEvent {
    Land,
    Jump,
    Fall,
    Footstep,
    Collide,
}

impl SoundEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            SoundEvent::Land => "land",
            SoundEvent::Jump => "jump",
            SoundEvent::Fall => "fall",
            SoundEvent::Footstep => "footstep",
            SoundEvent::Collide => "collide",
        }
    }
}

impl fmt::Display for SoundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Material tag a platform declares for sound lookup.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    #[default]
    Default,
    Wood,
    Carpet,
    Concrete,
    Grass,
    Snow,
    Metal,
    Glass,
    Plate,
    Bell,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundPayload {
    pub event: SoundEvent,
    pub dt: f32,
    pub position: Vec2,
    pub velocity: Vec2,
    /// In `[0, 1]` when present.
    pub intensity: Option<f32>,
    pub metadata: Option<Metadata>,
    /// `None` means the world floor.
    pub support: Option<SupportDescriptor>,
}

impl SoundPayload {
    pub fn surface(&self) -> Surface {
        self.support.as_ref().map(|s| s.surface).unwrap_or_default()
    }
}

pub trait SoundHandler {
    fn handle(&self, event: SoundEvent, payload: &SoundPayload);
}

impl<F> SoundHandler for F
where
    F: Fn(SoundEvent, &SoundPayload),
{
    fn handle(&self, event: SoundEvent, payload: &SoundPayload) {
        self(event, payload)
    }
}

/// Drops every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct Silent;

impl SoundHandler for Silent {
    fn handle(&self, _event: SoundEvent, _payload: &SoundPayload) {}
}

/// Event → single source, as supplied through the `soundMap` option.
pub type SoundMap = BTreeMap<SoundEvent, String>;

pub fn sound_map_from_json(json: &str) -> Result<SoundMap, ConfigError> {
    serde_json::from_str(json).map_err(ConfigError::SoundMap)
}

/// Volume for a voice: base volume scaled by the event intensity.
pub fn scaled_volume(base: f32, intensity: Option<f32>) -> f32 {
    match intensity {
        Some(i) => clamp(base * clamp(i, 0.0, 1.0), 0.0, 1.0),
        None => clamp(base, 0.0, 1.0),
    }
}

/// Plays the one source mapped to each event at unit rate.
pub struct SoundMapHandler<B: AudioBackend> {
    map: SoundMap,
    pool: RefCell<VoicePool<B>>,
}

impl<B: AudioBackend> SoundMapHandler<B> {
    pub fn new(map: SoundMap, backend: B) -> Self {
        Self {
            map,
            pool: RefCell::new(VoicePool::new(backend)),
        }
    }

    pub fn map(&self) -> &SoundMap {
        &self.map
    }
}

impl<B: AudioBackend> SoundHandler for SoundMapHandler<B> {
    fn handle(&self, event: SoundEvent, payload: &SoundPayload) {
        let Some(src) = self.map.get(&event) else {
            return;
        };
        self.pool
            .borrow_mut()
            .play_best_effort(src, scaled_volume(1.0, payload.intensity), 1.0);
    }
}
