use std::fmt;
use std::rc::Rc;

use crate::sound::{SoundHandler, SoundMap};

pub const DEFAULT_FOOTSTEP_INTERVAL: f32 = 0.3;
pub const MIN_FOOTSTEP_INTERVAL: f32 = 0.05;

/// Runtime-tunable options. Every field is optional; updates merge field by
/// field onto what the engine already has.
#[derive(Clone, Default)]
pub struct GameOptions {
    /// Seconds between footsteps at walking speed.
    pub footstep_interval: Option<f32>,
    pub on_sound: Option<Rc<dyn SoundHandler>>,
    /// Used to build a handler when `on_sound` is not given; the host decides
    /// how (see [`GameOptions::normalized`]).
    pub sound_map: Option<SoundMap>,
}

impl fmt::Debug for GameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameOptions")
            .field("footstep_interval", &self.footstep_interval)
            .field("on_sound", &self.on_sound.is_some())
            .field("sound_map", &self.sound_map)
            .finish()
    }
}

impl GameOptions {
    pub fn with_footstep_interval(mut self, seconds: f32) -> Self {
        self.footstep_interval = Some(seconds);
        self
    }

    pub fn with_sound(mut self, handler: impl SoundHandler + 'static) -> Self {
        self.on_sound = Some(Rc::new(handler));
        self
    }

    /// When only a sound map is given, build the handler for it with
    /// `from_map`.
    pub fn normalized(mut self, from_map: impl FnOnce(&SoundMap) -> Rc<dyn SoundHandler>) -> Self {
        if self.on_sound.is_none() {
            if let Some(map) = &self.sound_map {
                self.on_sound = Some(from_map(map));
            }
        }
        self
    }
}

/// Clamp a requested interval into the supported range.
pub fn sanitize_footstep_interval(seconds: f32) -> f32 {
    if !seconds.is_finite() {
        tracing::warn!(seconds, "non-finite footstep interval ignored");
        return DEFAULT_FOOTSTEP_INTERVAL;
    }
    if seconds < MIN_FOOTSTEP_INTERVAL {
        tracing::warn!(seconds, min = MIN_FOOTSTEP_INTERVAL, "footstep interval clamped");
        return MIN_FOOTSTEP_INTERVAL;
    }
    seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::{Silent, SoundEvent};

    #[test]
    fn interval_is_clamped_not_rejected() {
        assert_eq!(sanitize_footstep_interval(0.0), MIN_FOOTSTEP_INTERVAL);
        assert_eq!(sanitize_footstep_interval(-3.0), MIN_FOOTSTEP_INTERVAL);
        assert_eq!(sanitize_footstep_interval(f32::NAN), DEFAULT_FOOTSTEP_INTERVAL);
        assert_eq!(sanitize_footstep_interval(0.4), 0.4);
    }

    #[test]
    fn sound_map_builds_handler_only_when_missing() {
        let mut map = SoundMap::new();
        map.insert(SoundEvent::Jump, "jump.ogg".into());

        let opts = GameOptions {
            sound_map: Some(map.clone()),
            ..Default::default()
        }
        .normalized(|_| Rc::new(Silent));
        assert!(opts.on_sound.is_some());

        let mut built = false;
        let _ = GameOptions {
            sound_map: Some(map),
            ..Default::default()
        }
        .with_sound(Silent)
        .normalized(|_| {
            built = true;
            Rc::new(Silent)
        });
        assert!(!built);
    }
}
