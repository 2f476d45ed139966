//! Platformer character that walks, jumps and lands on elements of a
//! scrolling document.
//!
//! The crate holds the whole simulation and nothing page-specific: hosts feed
//! it element geometry through [`PageHost`], keyboard input through
//! [`Engine::key_down`]/[`Engine::key_up`], and drive it with
//! [`Engine::tick`] once per display frame. Output goes to a [`Presenter`]
//! (sprite transform and animation state) and to a [`SoundHandler`].

use serde::Deserialize;

pub mod collision;
pub mod engine;
pub mod error;
pub mod events;
pub mod geom;
pub mod host;
pub mod input;
pub mod options;
pub mod registry;
pub mod sound;
pub mod soundscape;
pub mod sweep;
pub mod world;

pub use collision::{CollisionMask, CollisionSides, ElementKind, PassThrough};
pub use engine::{Body, Engine, EngineEvent, TickOutcome};
pub use error::{ConfigError, PlaybackError};
pub use events::{Direction, PlatformEventKind, PlatformEventPayload, SupportDescriptor};
pub use geom::{Rect, Vec2};
pub use host::{ElementGeometry, ElementHandle, Extents, NullPresenter, PageHost, Presenter, StaticPage};
pub use input::{Controls, Key};
pub use options::GameOptions;
pub use registry::{Metadata, RegistrationConfig, Support};
pub use sound::{SoundEvent, SoundHandler, SoundMap, SoundPayload, Surface};
pub use world::World;

/// Tuning constants. Speeds are px/s, accelerations px/s², sizes px.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Params {
    pub gravity: f32,
    /// Downward speed cap.
    pub terminal_velocity: f32,
    pub acceleration: f32,
    pub air_acceleration: f32,
    /// Ground braking with no direction held.
    pub friction: f32,
    /// Air braking with no direction held.
    pub air_drag: f32,
    pub max_run_speed: f32,
    pub max_walk_speed: f32,
    /// Below this the character counts as standing.
    pub walk_threshold: f32,
    /// At or above this the character counts as running.
    pub run_threshold: f32,
    pub jump_velocity: f32,

    pub character_width: f32,
    pub character_height: f32,
    /// Floor distance from the bottom of the document.
    pub ground_offset: f32,
    pub spawn_x: f32,

    /// Longest frame the integrator will take, in seconds.
    pub max_frame_step: f32,
    /// Tolerance for "feet on surface".
    pub collision_epsilon: f32,
    pub min_support_overlap: f32,
    pub min_side_overlap: f32,

    /// Extra footstep cadence at full run; 0 keeps walking cadence.
    pub run_cadence_boost: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            gravity: 1920.0,
            terminal_velocity: 2800.0,
            acceleration: 720.0,
            air_acceleration: 480.0,
            friction: 960.0,
            air_drag: 120.0,
            max_run_speed: 260.0,
            max_walk_speed: 120.0,
            walk_threshold: 18.0,
            run_threshold: 150.0,
            jump_velocity: 1000.0,

            character_width: 80.0,
            character_height: 80.0,
            ground_offset: 80.0,
            spawn_x: 80.0,

            max_frame_step: 0.033,
            collision_epsilon: 1.0,
            min_support_overlap: 4.0,
            min_side_overlap: 4.0,

            run_cadence_boost: 0.6,
        }
    }
}

impl Params {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Params)
    }
}

/// Animation state, recomputed every frame from `(grounded, vx)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlayerState {
    Standing,
    WalkingLeft,
    WalkingRight,
    RunningLeft,
    RunningRight,
    JumpingLeft,
    JumpingRight,
    Jumping,
}

impl PlayerState {
    pub fn derive(grounded: bool, vx: f32, params: &Params) -> PlayerState {
        if !grounded {
            return if vx < 0.0 {
                PlayerState::JumpingLeft
            } else if vx > 0.0 {
                PlayerState::JumpingRight
            } else {
                PlayerState::Jumping
            };
        }

        let speed = vx.abs();
        let left = vx < 0.0;
        if speed < params.walk_threshold {
            PlayerState::Standing
        } else if speed < params.run_threshold {
            if left { PlayerState::WalkingLeft } else { PlayerState::WalkingRight }
        } else if left {
            PlayerState::RunningLeft
        } else {
            PlayerState::RunningRight
        }
    }

    /// Airborne states reuse the running and standing images.
    pub fn sprite(self) -> Sprite {
        match self {
            PlayerState::Standing | PlayerState::Jumping => Sprite::Standing,
            PlayerState::WalkingLeft => Sprite::WalkingLeft,
            PlayerState::WalkingRight => Sprite::WalkingRight,
            PlayerState::RunningLeft | PlayerState::JumpingLeft => Sprite::RunningLeft,
            PlayerState::RunningRight | PlayerState::JumpingRight => Sprite::RunningRight,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerState::Standing => "STANDING",
            PlayerState::WalkingLeft => "WALKING_LEFT",
            PlayerState::WalkingRight => "WALKING_RIGHT",
            PlayerState::RunningLeft => "RUNNING_LEFT",
            PlayerState::RunningRight => "RUNNING_RIGHT",
            PlayerState::JumpingLeft => "JUMPING_LEFT",
            PlayerState::JumpingRight => "JUMPING_RIGHT",
            PlayerState::Jumping => "JUMPING",
        }
    }
}

/// Images the presenter can show.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Sprite {
    Standing,
    WalkingLeft,
    WalkingRight,
    RunningLeft,
    RunningRight,
}

impl Sprite {
    pub const ALL: [Sprite; 5] = [
        Sprite::Standing,
        Sprite::WalkingLeft,
        Sprite::WalkingRight,
        Sprite::RunningLeft,
        Sprite::RunningRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Sprite::Standing => "STANDING",
            Sprite::WalkingLeft => "WALKING_LEFT",
            Sprite::WalkingRight => "WALKING_RIGHT",
            Sprite::RunningLeft => "RUNNING_LEFT",
            Sprite::RunningRight => "RUNNING_RIGHT",
        }
    }
}
