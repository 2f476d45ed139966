//! Default sound handler: per-surface variant libraries with randomised
//! pitch, intensity-scaled volume and pooled voices.

use std::cell::RefCell;
use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PlaybackError};
use crate::sound::{scaled_volume, SoundEvent, SoundHandler, SoundMap, SoundPayload, Surface};

/// Something that can play short clips by source name.
///
/// A voice is one reusable playback instance of a source. Implementations
/// report failures; callers here only log them.
pub trait AudioBackend {
    type Voice;

    fn create_voice(&self, src: &str) -> Result<Self::Voice, PlaybackError>;
    fn duplicate(&self, voice: &Self::Voice) -> Result<Self::Voice, PlaybackError>;
    /// Finished or never started.
    fn is_idle(&self, voice: &Self::Voice) -> bool;
    fn play(&self, voice: &Self::Voice, volume: f32, rate: f32) -> Result<(), PlaybackError>;
}

/// Voices grouped by source. A busy source grows by one duplicate at a time;
/// idle voices are always reused first.
pub struct VoicePool<B: AudioBackend> {
    backend: B,
    voices: HashMap<String, Vec<B::Voice>>,
}

impl<B: AudioBackend> VoicePool<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            voices: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn voice_count(&self, src: &str) -> usize {
        self.voices.get(src).map_or(0, Vec::len)
    }

    fn acquire(&mut self, src: &str) -> Result<usize, PlaybackError> {
        let backend = &self.backend;
        match self.voices.get_mut(src) {
            None => {
                let voice = backend.create_voice(src)?;
                self.voices.insert(src.to_owned(), vec![voice]);
                Ok(0)
            }
            Some(bucket) => {
                if let Some(idle) = bucket.iter().position(|v| backend.is_idle(v)) {
                    return Ok(idle);
                }
                let fresh = backend.duplicate(&bucket[0])?;
                bucket.push(fresh);
                Ok(bucket.len() - 1)
            }
        }
    }

    pub fn play(&mut self, src: &str, volume: f32, rate: f32) -> Result<(), PlaybackError> {
        let index = self.acquire(src)?;
        let voice = &self.voices[src][index];
        self.backend.play(voice, volume, rate)
    }

    /// Like [`VoicePool::play`], but failures end here.
    pub fn play_best_effort(&mut self, src: &str, volume: f32, rate: f32) {
        if let Err(error) = self.play(src, volume, rate) {
            tracing::debug!(%error, "sound skipped");
        }
    }
}

/// Either a fixed playback rate or a range to pick from uniformly.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaybackRate {
    Fixed(f32),
    Range(f32, f32),
}

impl Default for PlaybackRate {
    fn default() -> Self {
        PlaybackRate::Fixed(1.0)
    }
}

impl PlaybackRate {
    pub fn sample(self, rng: &mut impl Rng) -> f32 {
        match self {
            PlaybackRate::Fixed(rate) => rate,
            PlaybackRate::Range(min, max) => min + rng.gen::<f32>() * (max - min),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundVariant {
    pub src: String,
    #[serde(default = "unit_volume")]
    pub volume: f32,
    #[serde(default)]
    pub playback_rate: PlaybackRate,
}

fn unit_volume() -> f32 {
    1.0
}

pub type SurfaceEventMap = HashMap<SoundEvent, Vec<SoundVariant>>;

/// Variants for each (surface, event) pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceSoundLibrary(pub HashMap<Surface, SurfaceEventMap>);

impl SurfaceSoundLibrary {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::SoundLibrary)
    }

    pub fn insert(&mut self, surface: Surface, event: SoundEvent, variants: Vec<SoundVariant>) {
        self.0.entry(surface).or_default().insert(event, variants);
    }

    fn variants(&self, surface: Surface, event: SoundEvent) -> Option<&[SoundVariant]> {
        self.0
            .get(&surface)
            .and_then(|events| events.get(&event))
            .map(Vec::as_slice)
            .filter(|v| !v.is_empty())
    }

    /// The surface's own variants, else the default surface's.
    pub fn resolve(&self, surface: Surface, event: SoundEvent) -> Option<&[SoundVariant]> {
        self.variants(surface, event)
            .or_else(|| self.variants(Surface::Default, event))
    }

    /// The stock library: five recordings per clip family. `resolve` turns an
    /// asset file name into a playable source.
    pub fn standard(resolve: impl Fn(&str) -> String) -> Self {
        let family = |stem: &str, volume: f32, rate: (f32, f32)| -> Vec<SoundVariant> {
            (0..5)
                .map(|i| SoundVariant {
                    src: resolve(&format!("{stem}_{i:03}.ogg")),
                    volume,
                    playback_rate: PlaybackRate::Range(rate.0, rate.1),
                })
                .collect()
        };

        let footstep_carpet = family("footstep_carpet", 0.5, (0.95, 1.05));
        let footstep_concrete = family("footstep_concrete", 0.6, (0.95, 1.05));
        let footstep_grass = family("footstep_grass", 0.55, (0.9, 1.05));
        let footstep_snow = family("footstep_snow", 0.6, (0.9, 1.1));
        let footstep_wood = family("footstep_wood", 0.6, (0.95, 1.05));
        let impact_bell = family("impactBell_heavy", 0.7, (0.9, 1.05));
        let impact_concrete = family("impactGeneric_light", 0.65, (0.9, 1.05));
        let impact_glass = family("impactGlass_medium", 0.6, (0.95, 1.1));
        let impact_metal = family("impactMetal_medium", 0.6, (0.9, 1.1));
        let impact_plate = family("impactPlate_medium", 0.65, (0.9, 1.1));
        let impact_soft = family("impactSoft_medium", 0.55, (0.9, 1.05));
        let impact_snow = family("impactSoft_medium", 0.5, (0.85, 1.05));
        let impact_wood = family("impactWood_medium", 0.7, (0.95, 1.05));

        let mut library = SurfaceSoundLibrary::default();
        let mut surface = |s: Surface, footstep: Option<&Vec<SoundVariant>>, impact: &Vec<SoundVariant>| {
            if let Some(steps) = footstep {
                library.insert(s, SoundEvent::Footstep, steps.clone());
            }
            library.insert(s, SoundEvent::Land, impact.clone());
            library.insert(s, SoundEvent::Collide, impact.clone());
        };

        surface(Surface::Default, Some(&footstep_wood), &impact_wood);
        surface(Surface::Wood, Some(&footstep_wood), &impact_wood);
        surface(Surface::Carpet, Some(&footstep_carpet), &impact_soft);
        surface(Surface::Concrete, Some(&footstep_concrete), &impact_concrete);
        surface(Surface::Grass, Some(&footstep_grass), &impact_soft);
        surface(Surface::Snow, Some(&footstep_snow), &impact_snow);
        surface(Surface::Metal, Some(&footstep_concrete), &impact_metal);
        surface(Surface::Glass, Some(&footstep_concrete), &impact_glass);
        surface(Surface::Plate, Some(&footstep_concrete), &impact_plate);
        surface(Surface::Bell, None, &impact_bell);

        library
    }
}

/// Jump and fall have no per-surface clips; they use generic light impacts.
pub fn standard_fallback_map(resolve: impl Fn(&str) -> String) -> SoundMap {
    let mut map = SoundMap::new();
    map.insert(SoundEvent::Jump, resolve("impactGeneric_light_000.ogg"));
    map.insert(SoundEvent::Fall, resolve("impactGeneric_light_001.ogg"));
    map
}

/// Resolution order: the support's surface, the default surface, then the
/// fallback map. Events with no match anywhere are dropped.
pub struct SurfaceSoundDispatcher<B: AudioBackend> {
    library: SurfaceSoundLibrary,
    fallback: SoundMap,
    pool: RefCell<VoicePool<B>>,
    rng: RefCell<Pcg32>,
}

impl<B: AudioBackend> SurfaceSoundDispatcher<B> {
    pub fn new(library: SurfaceSoundLibrary, fallback: SoundMap, backend: B, seed: u64) -> Self {
        Self {
            library,
            fallback,
            pool: RefCell::new(VoicePool::new(backend)),
            rng: RefCell::new(Pcg32::seed_from_u64(seed)),
        }
    }

    pub fn library(&self) -> &SurfaceSoundLibrary {
        &self.library
    }

    pub fn voice_count(&self, src: &str) -> usize {
        self.pool.borrow().voice_count(src)
    }

    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(self.pool.borrow().backend())
    }
}

impl<B: AudioBackend> SoundHandler for SurfaceSoundDispatcher<B> {
    fn handle(&self, event: SoundEvent, payload: &SoundPayload) {
        if let Some(variants) = self.library.resolve(payload.surface(), event) {
            let (src, volume, rate) = {
                let mut rng = self.rng.borrow_mut();
                let variant = &variants[rng.gen_range(0..variants.len())];
                (
                    variant.src.as_str(),
                    scaled_volume(variant.volume, payload.intensity),
                    variant.playback_rate.sample(&mut *rng),
                )
            };
            self.pool.borrow_mut().play_best_effort(src, volume, rate);
            return;
        }

        if let Some(src) = self.fallback.get(&event) {
            self.pool
                .borrow_mut()
                .play_best_effort(src, scaled_volume(1.0, payload.intensity), 1.0);
        }
    }
}
