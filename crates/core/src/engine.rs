//! Per-frame simulation.
//!
//! [`Engine::tick`] advances the character by one display frame and returns a
//! [`TickOutcome`] holding every callback and sound the frame produced. The
//! outcome is dispatched separately so hosts can release any borrow of the
//! engine first; callbacks are then free to register or remove elements.

use std::fmt;
use std::rc::Rc;

use crate::collision::ElementKind;
use crate::events::{Direction, PlatformEventKind, PlatformEventPayload, SupportDescriptor};
use crate::geom::{almost_equal, clamp, Rect, Vec2};
use crate::host::{ElementHandle, PageHost, Presenter};
use crate::input::{Controls, InputState, Key};
use crate::options::{sanitize_footstep_interval, GameOptions, DEFAULT_FOOTSTEP_INTERVAL};
use crate::registry::{PlatformCallback, RegisteredElement, RegistrationConfig, Registry, Support};
use crate::sound::{Silent, SoundEvent, SoundHandler, SoundPayload};
use crate::sweep::{can_stand_on, sweep_down, sweep_left, sweep_right, sweep_up};
use crate::world::World;
use crate::{Params, PlayerState};

/// Below this, a decelerating velocity snaps to zero.
const VELOCITY_EPSILON: f32 = 0.01;

/// A side hit this close to the current x is continued contact, not a new one.
const CONTACT_EPSILON: f32 = 1e-3;

/// Character kinematics.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Body {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
}

impl Body {
    pub fn rect(&self, params: &Params) -> Rect {
        Rect::new(self.x, self.y, params.character_width, params.character_height)
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.vx, self.vy)
    }
}

/// Something a tick produced for the outside world.
#[derive(Clone)]
pub enum EngineEvent {
    Sound(SoundPayload),
    Platform {
        payload: PlatformEventPayload,
        callback: Option<PlatformCallback>,
    },
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::Sound(payload) => f.debug_tuple("Sound").field(payload).finish(),
            EngineEvent::Platform { payload, callback } => f
                .debug_struct("Platform")
                .field("payload", payload)
                .field("callback", &callback.is_some())
                .finish(),
        }
    }
}

/// Events of one tick, in the order they happened.
#[must_use = "call `dispatch` to deliver callbacks and sounds"]
pub struct TickOutcome {
    events: Vec<EngineEvent>,
    removed: Vec<ElementHandle>,
    sound: Rc<dyn SoundHandler>,
}

impl fmt::Debug for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickOutcome")
            .field("events", &self.events)
            .field("removed", &self.removed)
            .finish()
    }
}

impl TickOutcome {
    fn new(sound: Rc<dyn SoundHandler>) -> Self {
        Self { events: Vec::new(), removed: Vec::new(), sound }
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Elements dropped this tick because they left the document. Hosts
    /// release whatever they hold for these handles.
    pub fn removed(&self) -> &[ElementHandle] {
        &self.removed
    }

    pub fn sounds(&self) -> impl Iterator<Item = &SoundPayload> {
        self.events.iter().filter_map(|e| match e {
            EngineEvent::Sound(payload) => Some(payload),
            EngineEvent::Platform { .. } => None,
        })
    }

    pub fn platform_events(&self) -> impl Iterator<Item = &PlatformEventPayload> {
        self.events.iter().filter_map(|e| match e {
            EngineEvent::Platform { payload, .. } => Some(payload),
            EngineEvent::Sound(_) => None,
        })
    }

    /// Run element callbacks and the sound handler.
    pub fn dispatch(self) {
        for event in self.events {
            match event {
                EngineEvent::Sound(payload) => self.sound.handle(payload.event, &payload),
                EngineEvent::Platform { payload, callback } => {
                    if let Some(callback) = callback {
                        callback(&payload);
                    }
                }
            }
        }
    }

    fn sound(&mut self, payload: SoundPayload) {
        tracing::trace!(event = %payload.event, intensity = ?payload.intensity, "sound");
        self.events.push(EngineEvent::Sound(payload));
    }

    fn platform(&mut self, payload: PlatformEventPayload, callback: Option<PlatformCallback>) {
        self.events.push(EngineEvent::Platform { payload, callback });
    }
}

fn speed_ratio(speed: f32, max: f32) -> f32 {
    if max > 0.0 {
        clamp(speed.abs() / max, 0.0, 1.0)
    } else {
        0.0
    }
}

fn metadata_of(entry: &RegisteredElement) -> Option<crate::Metadata> {
    (!entry.metadata.is_empty()).then(|| entry.metadata.clone())
}

/// Character state carried from tick to tick.
#[derive(Clone, Debug, Default)]
struct Character {
    body: Body,
    support: Option<Support>,
    /// Support as last reported through enter/leave.
    reported: Option<Support>,
    input: InputState,
    footstep_timer: f32,
    last_state: Option<PlayerState>,
}

impl Character {
    fn sound(
        &self,
        event: SoundEvent,
        dt: f32,
        intensity: Option<f32>,
        support: Option<(&RegisteredElement, Rect)>,
    ) -> SoundPayload {
        SoundPayload {
            event,
            dt,
            position: self.body.position(),
            velocity: self.body.velocity(),
            intensity: intensity.map(|i| clamp(i, 0.0, 1.0)),
            metadata: support.and_then(|(entry, _)| metadata_of(entry)),
            support: support.map(|(entry, rect)| SupportDescriptor::of(entry, rect)),
        }
    }

    fn platform_event(
        &self,
        event: PlatformEventKind,
        entry: &RegisteredElement,
        rect: Rect,
        direction: Option<Direction>,
        speed: f32,
    ) -> PlatformEventPayload {
        PlatformEventPayload {
            event,
            platform: SupportDescriptor::of(entry, rect),
            metadata: entry.metadata.clone(),
            position: self.body.position(),
            velocity: self.body.velocity(),
            direction,
            speed,
        }
    }

    fn apply_input(&mut self, dt: f32, params: &Params) {
        let body = &mut self.body;
        let direction = self.input.direction();

        if direction != 0.0 {
            let top_speed = if self.input.is_held(Controls::WALK) {
                params.max_walk_speed
            } else {
                params.max_run_speed
            };
            let accel = if body.grounded { params.acceleration } else { params.air_acceleration };
            let target = direction * top_speed;
            body.vx += direction * accel * dt;
            if (direction > 0.0 && body.vx > target) || (direction < 0.0 && body.vx < target) {
                body.vx = target;
            }
        } else {
            let decel = (if body.grounded { params.friction } else { params.air_drag }) * dt;
            if body.vx > 0.0 {
                body.vx = (body.vx - decel).max(0.0);
            } else if body.vx < 0.0 {
                body.vx = (body.vx + decel).min(0.0);
            }
            if body.vx.abs() < VELOCITY_EPSILON {
                body.vx = 0.0;
            }
        }

        body.vx = clamp(body.vx, -params.max_run_speed, params.max_run_speed);
    }

    /// Honour a queued jump. A press that arrives while airborne is dropped
    /// rather than carried to the next landing.
    fn apply_jump(&mut self, dt: f32, registry: &Registry, params: &Params, out: &mut TickOutcome) -> bool {
        if !self.input.take_jump() {
            return false;
        }
        if !self.body.grounded {
            tracing::trace!("jump ignored while airborne");
            return false;
        }

        let from = self.support.and_then(|s| registry.segment(s));
        self.body.vy = -params.jump_velocity;
        self.body.grounded = false;
        self.support = None;

        let intensity = 0.5 + 0.5 * speed_ratio(self.body.vx, params.max_run_speed);
        out.sound(self.sound(SoundEvent::Jump, dt, Some(intensity), from));
        true
    }

    fn apply_gravity(&mut self, dt: f32, params: &Params) {
        self.body.vy = (self.body.vy + params.gravity * dt).min(params.terminal_velocity);
    }

    fn resolve_horizontal(&mut self, dt: f32, solids: &[&RegisteredElement], params: &Params, out: &mut TickOutcome) {
        let vx = self.body.vx;
        if vx == 0.0 {
            return;
        }

        let rect = self.body.rect(params);
        let next_x = self.body.x + vx * dt;
        let (hit, direction) = if vx > 0.0 {
            (sweep_right(rect, next_x, solids, params), Direction::Right)
        } else {
            (sweep_left(rect, next_x, solids, params), Direction::Left)
        };

        let Some(hit) = hit else {
            self.body.x = next_x;
            return;
        };

        let speed = vx.abs();
        let touching = almost_equal(self.body.x, hit.resolved, CONTACT_EPSILON);
        self.body.x = hit.resolved;
        self.body.vx = 0.0;
        if touching {
            return;
        }
        tracing::trace!(handle = hit.entry.handle.0, ?direction, speed, "side collision");

        let payload = self.platform_event(PlatformEventKind::Collide, hit.entry, hit.rect, Some(direction), speed);
        out.platform(payload, hit.entry.events.on_player_collide.clone());
        let intensity = speed_ratio(speed, params.max_run_speed);
        out.sound(self.sound(SoundEvent::Collide, dt, Some(intensity), Some((hit.entry, hit.rect))));
    }

    /// Returns the element landed on this tick, if any, and whether the body
    /// came to rest on anything (element or floor).
    fn resolve_vertical<'a>(
        &mut self,
        dt: f32,
        solids: &'a [&'a RegisteredElement],
        world: &World,
        params: &Params,
        out: &mut TickOutcome,
    ) -> (Option<(&'a RegisteredElement, Rect)>, bool) {
        let vy = self.body.vy;
        let rect = self.body.rect(params);
        let mut next_y = self.body.y + vy * dt;
        let mut landed_on = None;
        let mut grounded = false;

        if vy > 0.0 {
            if let Some(hit) = sweep_down(rect, next_y, solids, params) {
                next_y = hit.resolved;
                self.body.vy = 0.0;
                self.support = Some(Support { handle: hit.entry.handle, segment: hit.segment });
                landed_on = Some((hit.entry, hit.rect));
                grounded = true;
            }
        } else if vy < 0.0 {
            if let Some(hit) = sweep_up(rect, next_y, solids, params) {
                next_y = hit.resolved;
                self.body.vy = 0.0;
                let speed = vy.abs();
                tracing::trace!(handle = hit.entry.handle.0, speed, "ceiling collision");

                let payload = self.platform_event(PlatformEventKind::Collide, hit.entry, hit.rect, Some(Direction::Up), speed);
                out.platform(payload, hit.entry.events.on_player_collide.clone());
                let intensity = speed_ratio(speed, params.jump_velocity);
                out.sound(self.sound(SoundEvent::Collide, dt, Some(intensity), Some((hit.entry, hit.rect))));
            }
        }

        let ground_y = world.ground_y(params.character_height);
        if next_y > ground_y {
            next_y = ground_y;
            self.body.vy = 0.0;
            self.support = None;
            landed_on = None;
            grounded = true;
        }

        self.body.y = next_y;
        (landed_on, grounded)
    }

    /// Feet resting on the tracked support, any other solid, or the floor.
    fn find_support(&mut self, registry: &Registry, solids: &[&RegisteredElement], world: &World, params: &Params) -> bool {
        let rect = self.body.rect(params);

        if let Some(support) = self.support {
            if let Some(entry) = registry.get(support.handle) {
                if can_stand_on(entry, support.segment, rect, params) {
                    return true;
                }
            }
            self.support = None;
        }

        for entry in solids {
            for segment in 0..entry.segments.len() {
                if can_stand_on(entry, segment, rect, params) {
                    self.support = Some(Support { handle: entry.handle, segment });
                    return true;
                }
            }
        }

        almost_equal(rect.bottom(), world.ground_top, params.collision_epsilon)
    }

    /// Leave/enter on support change, keyed by element.
    fn diff_support(&mut self, registry: &Registry, out: &mut TickOutcome) {
        let before = self.reported.map(|s| s.handle);
        let after = self.support.map(|s| s.handle);
        if before == after {
            self.reported = self.support;
            return;
        }

        if let Some(old) = self.reported {
            if let Some(entry) = registry.get(old.handle) {
                let rect = entry.segments.get(old.segment).copied().unwrap_or(entry.rect);
                tracing::debug!(handle = old.handle.0, "support left");
                let payload = self.platform_event(PlatformEventKind::Leave, entry, rect, None, self.body.vx.abs());
                out.platform(payload, entry.events.on_player_leave.clone());
            }
        }

        if let Some((entry, rect)) = self.support.and_then(|s| registry.segment(s)) {
            tracing::debug!(handle = entry.handle.0, "support entered");
            let payload = self.platform_event(PlatformEventKind::Enter, entry, rect, None, self.body.vx.abs());
            out.platform(payload, entry.events.on_player_enter.clone());
        }

        self.reported = self.support;
    }

    fn step_footsteps(&mut self, dt: f32, interval: f32, registry: &Registry, params: &Params, out: &mut TickOutcome) {
        let speed = self.body.vx.abs();
        if !self.body.grounded || speed <= params.walk_threshold {
            self.footstep_timer = 0.0;
            return;
        }

        let span = params.max_run_speed - params.max_walk_speed;
        let run_share = if span > 0.0 {
            clamp((speed - params.max_walk_speed) / span, 0.0, 1.0)
        } else {
            0.0
        };
        let cadence = 1.0 + params.run_cadence_boost * run_share;

        self.footstep_timer += dt * cadence;
        if self.footstep_timer >= interval {
            self.footstep_timer = 0.0;
            let on = self.support.and_then(|s| registry.segment(s));
            let intensity = speed_ratio(speed, params.max_run_speed);
            out.sound(self.sound(SoundEvent::Footstep, dt, Some(intensity), on));
        }
    }

    fn present(&mut self, presenter: &mut dyn Presenter, params: &Params) {
        presenter.set_transform(self.body.x, self.body.y);
        let state = PlayerState::derive(self.body.grounded, self.body.vx, params);
        if self.last_state != Some(state) {
            presenter.set_sprite(state);
            self.last_state = Some(state);
        }
    }
}

/// One character in one document.
pub struct Engine {
    params: Params,
    world: World,
    registry: Registry,
    character: Character,
    footstep_interval: f32,
    sound: Rc<dyn SoundHandler>,
    disposed: bool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("body", &self.character.body)
            .field("support", &self.character.support)
            .field("world", &self.world)
            .field("elements", &self.registry.len())
            .field("footstep_interval", &self.footstep_interval)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl Engine {
    /// Measure the document and place the character on the floor.
    pub fn new(params: Params, host: &dyn PageHost) -> Self {
        let world = World::measured(host.document_extents(), &params);
        let (x, y) = world.clamp(
            params.spawn_x,
            world.ground_y(params.character_height),
            params.character_width,
            params.character_height,
        );
        let character = Character {
            body: Body { x, y, grounded: true, ..Body::default() },
            ..Character::default()
        };
        tracing::debug!(width = world.width, height = world.height, ground_top = world.ground_top, "engine created");

        Self {
            params,
            world,
            registry: Registry::new(),
            character,
            footstep_interval: DEFAULT_FOOTSTEP_INTERVAL,
            sound: Rc::new(Silent),
            disposed: false,
        }
    }

    pub fn with_options(mut self, options: GameOptions) -> Self {
        self.update_options(options);
        self
    }

    /// Merge `options` onto the current ones. Takes effect on the next tick.
    ///
    /// A bare `sound_map` is not turned into a handler here; hosts call
    /// [`GameOptions::normalized`] with their audio backend first.
    pub fn update_options(&mut self, options: GameOptions) {
        if let Some(seconds) = options.footstep_interval {
            self.footstep_interval = sanitize_footstep_interval(seconds);
        }
        match options.on_sound {
            Some(handler) => self.sound = handler,
            None if options.sound_map.is_some() => {
                tracing::warn!("sound map given without a handler; keeping the current one");
            }
            None => {}
        }
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params;
        self.world.mark_dirty();
    }

    /// Register (or re-register) an element for collision.
    pub fn add_element(&mut self, handle: ElementHandle, config: RegistrationConfig, host: &dyn PageHost) {
        if self.disposed {
            return;
        }
        self.registry.register(handle, config, host);
        self.world.mark_dirty();
        self.registry.mark_all_dirty();
    }

    /// Returns whether the element was registered. Safe to call repeatedly.
    pub fn remove_element(&mut self, handle: ElementHandle) -> bool {
        if self.registry.unregister(handle).is_none() {
            return false;
        }
        if self.character.support.is_some_and(|s| s.handle == handle) {
            self.character.support = None;
        }
        self.world.mark_dirty();
        self.registry.mark_all_dirty();
        true
    }

    /// The element's box may have changed (resize or visibility).
    pub fn mark_element_dirty(&mut self, handle: ElementHandle) {
        self.registry.mark_dirty(handle);
    }

    /// Window resize, scroll or document resize.
    pub fn notify_environment_changed(&mut self) {
        self.world.mark_dirty();
        self.registry.mark_all_dirty();
    }

    pub fn key_down(&mut self, key: Key) {
        if !self.disposed {
            self.character.input.key_down(key);
        }
    }

    pub fn key_up(&mut self, key: Key) {
        if !self.disposed {
            self.character.input.key_up(key);
        }
    }

    /// Focus lost: release every control.
    pub fn blur(&mut self) {
        self.character.input.reset();
    }

    /// Advance by `dt` seconds.
    pub fn tick(&mut self, dt: f32, host: &dyn PageHost, presenter: &mut dyn Presenter) -> TickOutcome {
        let mut out = TickOutcome::new(Rc::clone(&self.sound));
        if self.disposed {
            return out;
        }

        let Engine { params, world, registry, character, footstep_interval, .. } = self;
        let dt = if dt.is_finite() { clamp(dt, 0.0, params.max_frame_step) } else { 0.0 };

        if world.take_dirty() {
            world.measure(host.document_extents(), params);
        }
        let report = registry.refresh_dirty(host, &mut character.support);
        if !report.removed.is_empty() || report.support_invalidated {
            tracing::debug!(
                removed = report.removed.len(),
                remeasured = report.remeasured,
                support_invalidated = report.support_invalidated,
                "registry refreshed"
            );
        }
        out.removed = report.removed;

        let was_grounded = character.body.grounded;
        let lost_from = character.support;

        character.apply_input(dt, params);
        let jumped = character.apply_jump(dt, registry, params, &mut out);
        character.apply_gravity(dt, params);

        let solids = registry.solids();
        character.resolve_horizontal(dt, &solids, params, &mut out);
        let impact = character.body.vy;
        let (landed_on, mut grounded) = character.resolve_vertical(dt, &solids, world, params, &mut out);

        let (x, y) = world.clamp(character.body.x, character.body.y, params.character_width, params.character_height);
        character.body.x = x;
        character.body.y = y;

        // a rising body never rests, even with its feet level with a top it passes
        if !grounded && character.body.vy >= 0.0 {
            grounded = character.find_support(registry, &solids, world, params);
        }
        character.body.grounded = grounded;
        if !grounded {
            character.support = None;
        }

        if grounded && !was_grounded {
            let intensity = speed_ratio(impact, params.jump_velocity);
            if let Some((entry, rect)) = landed_on {
                let payload = character.platform_event(PlatformEventKind::Collide, entry, rect, Some(Direction::Down), impact.abs());
                out.platform(payload, entry.events.on_player_collide.clone());
            }
            let on = landed_on.or_else(|| character.support.and_then(|s| registry.segment(s)));
            out.sound(character.sound(SoundEvent::Land, dt, Some(intensity), on));
        } else if was_grounded && !grounded && !jumped {
            let from = lost_from.and_then(|s| registry.segment(s));
            out.sound(character.sound(SoundEvent::Fall, dt, None, from));
        }

        character.diff_support(registry, &mut out);
        character.step_footsteps(dt, *footstep_interval, registry, params, &mut out);
        character.present(presenter, params);

        out
    }

    /// Tick and dispatch in one go, for hosts that hold the engine directly.
    pub fn run_frame(&mut self, dt: f32, host: &dyn PageHost, presenter: &mut dyn Presenter) {
        self.tick(dt, host, presenter).dispatch();
    }

    /// Drop all registrations and controls; later calls do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.registry.clear();
        self.character.support = None;
        self.character.reported = None;
        self.character.input.reset();
        self.disposed = true;
        tracing::debug!("engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn body(&self) -> Body {
        self.character.body
    }

    pub fn support(&self) -> Option<Support> {
        self.character.support
    }

    pub fn state(&self) -> PlayerState {
        PlayerState::derive(self.character.body.grounded, self.character.body.vx, &self.params)
    }

    pub fn controls(&self) -> Controls {
        self.character.input.held()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn footstep_interval(&self) -> f32 {
        self.footstep_interval
    }

    pub fn elements_of(&self, kind: ElementKind) -> Vec<ElementHandle> {
        self.registry.handles_of(kind)
    }
}
