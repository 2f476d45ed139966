//! Browser binding: runs the character over the live document.
//!
//! `Game` owns the engine, measures registered elements through [`DomHost`],
//! draws through [`SpritePresenter`] and plays sounds with `HTMLAudioElement`.
//! It drives itself with `requestAnimationFrame` until disposed.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use js_sys::Function;
use pagewalk_core::soundscape::{standard_fallback_map, SurfaceSoundDispatcher, SurfaceSoundLibrary};
use pagewalk_core::sound::{sound_map_from_json, SoundMapHandler};
use pagewalk_core::{
    ElementHandle, ElementKind, Engine, GameOptions, Key, Params, PlatformEventPayload, RegistrationConfig,
    SoundHandler,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, EventTarget, HtmlImageElement, IntersectionObserver, KeyboardEvent, ResizeObserver};

mod audio;
mod dom;
mod present;

pub use audio::{HtmlAudioBackend, JsSoundHandler};
pub use dom::DomHost;
pub use present::{SpritePresenter, SpriteSheet};

#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Serialise through JSON so payloads reach JS as plain objects.
pub(crate) fn to_js<T: Serialize>(value: &T) -> JsValue {
    match serde_json::to_string(value) {
        Ok(json) => js_sys::JSON::parse(&json).unwrap_or(JsValue::NULL),
        Err(e) => {
            web_sys::console::error_1(&format!("pagewalk: could not serialise payload: {e}").into());
            JsValue::NULL
        }
    }
}

fn to_json(value: &JsValue) -> Result<String, JsValue> {
    js_sys::JSON::stringify(value)?
        .as_string()
        .ok_or_else(|| JsValue::from_str("value is not JSON-serialisable"))
}

fn error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn field(object: &JsValue, name: &str) -> Option<JsValue> {
    let value = js_sys::Reflect::get(object, &JsValue::from_str(name)).ok()?;
    (!value.is_undefined() && !value.is_null()).then_some(value)
}

fn js_callback(function: Function) -> impl Fn(&PlatformEventPayload) + 'static {
    move |payload| {
        if let Err(e) = function.call1(&JsValue::NULL, &to_js(payload)) {
            web_sys::console::error_2(&"pagewalk: element callback threw".into(), &e);
        }
    }
}

/// Attach `{ onPlayerEnter, onPlayerLeave, onPlayerCollide }` from JS.
fn with_js_events(mut config: RegistrationConfig, events: &JsValue) -> RegistrationConfig {
    let get = |name: &str| field(events, name).and_then(|v| v.dyn_into::<Function>().ok());
    if let Some(f) = get("onPlayerEnter") {
        config = config.on_enter(js_callback(f));
    }
    if let Some(f) = get("onPlayerLeave") {
        config = config.on_leave(js_callback(f));
    }
    if let Some(f) = get("onPlayerCollide") {
        config = config.on_collide(js_callback(f));
    }
    config
}

fn asset_resolver(base: &str) -> impl Fn(&str) -> String + '_ {
    move |file| format!("{}/{file}", base.trim_end_matches('/'))
}

fn soundscape(library: SurfaceSoundLibrary, sound_base: &str) -> Rc<dyn SoundHandler> {
    let fallback = standard_fallback_map(asset_resolver(sound_base));
    let seed = (js_sys::Math::random() * u32::MAX as f64) as u64;
    Rc::new(SurfaceSoundDispatcher::new(library, fallback, HtmlAudioBackend::default(), seed))
}

/// One registered element and the observers watching it.
struct Tracked {
    element: Element,
    config: RegistrationConfig,
    resize: ResizeObserver,
    visibility: IntersectionObserver,
    _on_change: Closure<dyn FnMut()>,
}

impl Tracked {
    fn disconnect(&self) {
        self.resize.disconnect();
        self.visibility.disconnect();
    }
}

struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

struct Shared {
    engine: RefCell<Engine>,
    host: RefCell<DomHost>,
    presenter: RefCell<SpritePresenter>,
    tracked: RefCell<BTreeMap<ElementHandle, Tracked>>,
    next_handle: Cell<u32>,
    options: RefCell<GameOptions>,
    sound_base: String,
    listeners: RefCell<Vec<Listener>>,
    document_observer: RefCell<Option<(ResizeObserver, Closure<dyn FnMut()>)>>,
    frame: RefCell<Option<Closure<dyn FnMut(f64)>>>,
    frame_id: Cell<Option<i32>>,
    last_frame: Cell<Option<f64>>,
    disposed: Cell<bool>,
}

impl Shared {
    fn step(&self, now: f64) {
        if self.disposed.get() {
            return;
        }
        let dt = match self.last_frame.replace(Some(now)) {
            Some(previous) => ((now - previous) / 1000.0) as f32,
            None => 0.0,
        };

        let outcome = {
            let Ok(mut engine) = self.engine.try_borrow_mut() else {
                return;
            };
            let host = self.host.borrow();
            let mut presenter = self.presenter.borrow_mut();
            engine.tick(dt, &*host, &mut *presenter)
        };
        for handle in outcome.removed() {
            self.release(*handle);
        }
        outcome.dispatch();
    }

    fn schedule(&self) {
        if self.disposed.get() {
            return;
        }
        let Some(window) = web_sys::window() else {
            return;
        };
        let frame = self.frame.borrow();
        let Some(callback) = frame.as_ref() else {
            return;
        };
        match window.request_animation_frame(callback.as_ref().unchecked_ref()) {
            Ok(id) => self.frame_id.set(Some(id)),
            Err(e) => web_sys::console::error_2(&"pagewalk: requestAnimationFrame failed".into(), &e),
        }
    }

    fn with_engine(&self, f: impl FnOnce(&mut Engine)) {
        match self.engine.try_borrow_mut() {
            Ok(mut engine) => f(&mut engine),
            Err(_) => web_sys::console::warn_1(&"pagewalk: engine busy, input dropped".into()),
        }
    }

    fn on_key(&self, event: &Event, down: bool) {
        let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
            return;
        };
        let Some(key) = Key::from_dom_key(&event.key()) else {
            return;
        };
        event.prevent_default();
        self.with_engine(|engine| if down { engine.key_down(key) } else { engine.key_up(key) });
    }

    /// Drop the observers and DOM reference held for `handle`.
    fn release(&self, handle: ElementHandle) -> bool {
        let Some(tracked) = self.tracked.borrow_mut().remove(&handle) else {
            return false;
        };
        tracked.disconnect();
        self.host.borrow_mut().remove(handle);
        tracing::debug!(handle = handle.0, "element released");
        true
    }

    fn remove(&self, handle: ElementHandle) {
        if self.release(handle) {
            self.with_engine(|engine| {
                engine.remove_element(handle);
            });
        }
    }

    fn listen(self: &Rc<Self>, target: EventTarget, kind: &'static str, f: fn(&Shared, &Event)) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        let callback = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            if let Some(shared) = weak.upgrade() {
                f(&shared, &event);
            }
        });
        target.add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())?;
        self.listeners.borrow_mut().push(Listener { target, kind, callback });
        Ok(())
    }

    fn environment_changed(&self) {
        self.with_engine(Engine::notify_environment_changed);
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let (Some(window), Some(id)) = (web_sys::window(), self.frame_id.take()) {
            let _ = window.cancel_animation_frame(id);
        }
        for listener in self.listeners.borrow().iter() {
            let _ = listener
                .target
                .remove_event_listener_with_callback(listener.kind, listener.callback.as_ref().unchecked_ref());
        }
        if let Some((observer, _)) = self.document_observer.borrow().as_ref() {
            observer.disconnect();
        }
        for tracked in self.tracked.borrow().values() {
            tracked.disconnect();
        }
        self.with_engine(Engine::dispose);
    }
}

/// The character plus everything it walks on.
#[wasm_bindgen]
pub struct Game {
    shared: Rc<Shared>,
}

#[wasm_bindgen]
impl Game {
    /// `sprites` maps sprite names (`STANDING`, `WALKING_LEFT`, ...) to image
    /// URLs; `soundBase` is the directory holding the stock sound files.
    #[wasm_bindgen(constructor)]
    pub fn new(player: HtmlImageElement, sprites: JsValue, sound_base: String) -> Result<Game, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;

        let sheet: SpriteSheet = serde_json::from_str(&to_json(&sprites)?).map_err(error)?;
        let missing = sheet.missing();
        if !missing.is_empty() {
            web_sys::console::warn_1(&format!("pagewalk: no image for {}", missing.join(", ")).into());
        }

        let host = DomHost::default();
        let sound = soundscape(SurfaceSoundLibrary::standard(asset_resolver(&sound_base)), &sound_base);
        let options = GameOptions {
            on_sound: Some(sound),
            ..GameOptions::default()
        };
        let engine = Engine::new(Params::default(), &host).with_options(options.clone());

        let shared = Rc::new(Shared {
            engine: RefCell::new(engine),
            host: RefCell::new(host),
            presenter: RefCell::new(SpritePresenter::new(player, sheet)),
            tracked: RefCell::new(BTreeMap::new()),
            next_handle: Cell::new(1),
            options: RefCell::new(options),
            sound_base,
            listeners: RefCell::new(Vec::new()),
            document_observer: RefCell::new(None),
            frame: RefCell::new(None),
            frame_id: Cell::new(None),
            last_frame: Cell::new(None),
            disposed: Cell::new(false),
        });

        let target: EventTarget = window.clone().into();
        shared.listen(target.clone(), "keydown", |s, e| s.on_key(e, true))?;
        shared.listen(target.clone(), "keyup", |s, e| s.on_key(e, false))?;
        shared.listen(target.clone(), "blur", |s, _| s.with_engine(Engine::blur))?;
        shared.listen(target.clone(), "resize", |s, _| s.environment_changed())?;
        shared.listen(target, "scroll", |s, _| s.environment_changed())?;

        if let Some(root) = document.document_element() {
            let weak = Rc::downgrade(&shared);
            let on_resize = Closure::<dyn FnMut()>::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.environment_changed();
                }
            });
            let observer = ResizeObserver::new(on_resize.as_ref().unchecked_ref())?;
            observer.observe(&root);
            *shared.document_observer.borrow_mut() = Some((observer, on_resize));
        }

        let weak = Rc::downgrade(&shared);
        *shared.frame.borrow_mut() = Some(Closure::new(move |now: f64| {
            if let Some(shared) = weak.upgrade() {
                shared.step(now);
                shared.schedule();
            }
        }));
        shared.schedule();

        Ok(Game { shared })
    }

    /// Register `element`. `config` follows the registration contract
    /// (`{ type: "platform", collisionMask: "TOP | BOTTOM", ... }`); `events`
    /// may hold `onPlayerEnter`, `onPlayerLeave` and `onPlayerCollide`.
    /// Returns a function that unregisters it; calling it again does nothing.
    #[wasm_bindgen(js_name = addElement)]
    pub fn add_element(&self, element: Element, config: JsValue, events: JsValue) -> Result<Function, JsValue> {
        let shared = &self.shared;
        if shared.disposed.get() {
            return Err(JsValue::from_str("game disposed"));
        }

        let config = RegistrationConfig::from_json(&to_json(&config)?).map_err(error)?;
        let config = with_js_events(config, &events);

        let existing = shared.host.borrow().handle_of(&element);
        if let Some(handle) = existing {
            shared.remove(handle);
        }
        let handle = ElementHandle(shared.next_handle.get());
        shared.next_handle.set(handle.0 + 1);

        let weak = Rc::downgrade(shared);
        let on_change = Closure::<dyn FnMut()>::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.with_engine(|engine| engine.mark_element_dirty(handle));
            }
        });
        let resize = ResizeObserver::new(on_change.as_ref().unchecked_ref())?;
        let visibility = IntersectionObserver::new(on_change.as_ref().unchecked_ref())?;
        resize.observe(&element);
        visibility.observe(&element);

        shared.host.borrow_mut().insert(handle, element.clone());
        {
            let host = shared.host.borrow();
            shared.with_engine(|engine| engine.add_element(handle, config.clone(), &*host));
        }
        shared.tracked.borrow_mut().insert(
            handle,
            Tracked { element, config, resize, visibility, _on_change: on_change },
        );

        Ok(disposer(Rc::downgrade(shared), handle))
    }

    /// Merge `{ footstepInterval?, onSound?, soundMap? }` onto the current options.
    #[wasm_bindgen(js_name = updateOptions)]
    pub fn update_options(&self, options: JsValue) -> Result<(), JsValue> {
        let mut update = GameOptions::default();
        if let Some(seconds) = field(&options, "footstepInterval").and_then(|v| v.as_f64()) {
            update.footstep_interval = Some(seconds as f32);
        }
        if let Some(f) = field(&options, "onSound").and_then(|v| v.dyn_into::<Function>().ok()) {
            update.on_sound = Some(Rc::new(JsSoundHandler(f)));
        }
        if let Some(map) = field(&options, "soundMap") {
            update.sound_map = Some(sound_map_from_json(&to_json(&map)?).map_err(error)?);
        }
        let update = update.normalized(|map| {
            Rc::new(SoundMapHandler::new(map.clone(), HtmlAudioBackend::default())) as Rc<dyn SoundHandler>
        });

        let shared = &self.shared;
        {
            let mut current = shared.options.borrow_mut();
            if update.footstep_interval.is_some() {
                current.footstep_interval = update.footstep_interval;
            }
            if update.on_sound.is_some() {
                current.on_sound = update.on_sound.clone();
            }
        }
        shared.with_engine(|engine| engine.update_options(update));
        Ok(())
    }

    /// Replace the per-surface sound library (JSON keyed by surface, then event).
    #[wasm_bindgen(js_name = setSoundLibraryJson)]
    pub fn set_sound_library_json(&self, json: &str) -> Result<(), JsValue> {
        let library = SurfaceSoundLibrary::from_json(json).map_err(error)?;
        let sound = soundscape(library, &self.shared.sound_base);
        self.shared.options.borrow_mut().on_sound = Some(Rc::clone(&sound));
        self.shared.with_engine(|engine| {
            engine.update_options(GameOptions {
                on_sound: Some(sound),
                ..GameOptions::default()
            })
        });
        Ok(())
    }

    /// Override tuning constants; missing fields keep their defaults.
    #[wasm_bindgen(js_name = setParamsJson)]
    pub fn set_params_json(&self, json: &str) -> Result<(), JsValue> {
        let params = Params::from_json(json).map_err(error)?;
        self.shared.with_engine(|engine| engine.set_params(params));
        Ok(())
    }

    /// Swap in a new player image. The character restarts on the floor and
    /// every element is registered again.
    #[wasm_bindgen(js_name = attachPlayer)]
    pub fn attach_player(&self, player: HtmlImageElement, sprites: JsValue) -> Result<(), JsValue> {
        let shared = &self.shared;
        if shared.disposed.get() {
            return Err(JsValue::from_str("game disposed"));
        }
        let sheet: SpriteSheet = serde_json::from_str(&to_json(&sprites)?).map_err(error)?;
        *shared.presenter.borrow_mut() = SpritePresenter::new(player, sheet);

        let host = shared.host.borrow();
        let params = *shared.engine.try_borrow().map_err(error)?.params();
        let mut engine = Engine::new(params, &*host).with_options(shared.options.borrow().clone());
        for (handle, tracked) in shared.tracked.borrow().iter() {
            engine.add_element(*handle, tracked.config.clone(), &*host);
        }
        *shared.engine.try_borrow_mut().map_err(error)? = engine;
        shared.last_frame.set(None);
        Ok(())
    }

    /// Elements registered under `kind` (`"platform"`).
    #[wasm_bindgen(js_name = elementsOf)]
    pub fn elements_of(&self, kind: &str) -> Result<js_sys::Array, JsValue> {
        let kind: ElementKind = serde_json::from_value(serde_json::Value::from(kind)).map_err(error)?;
        let handles = self.shared.engine.try_borrow().map_err(error)?.elements_of(kind);
        let tracked = self.shared.tracked.borrow();
        Ok(handles
            .iter()
            .filter_map(|h| tracked.get(h))
            .map(|t| JsValue::from(t.element.clone()))
            .collect())
    }

    /// Current position, velocity and animation state, for debugging overlays.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        #[derive(Serialize)]
        struct Snapshot {
            x: f32,
            y: f32,
            vx: f32,
            vy: f32,
            grounded: bool,
            state: &'static str,
            support: Option<u32>,
        }

        let engine = self.shared.engine.try_borrow().map_err(error)?;
        let body = engine.body();
        Ok(to_js(&Snapshot {
            x: body.x,
            y: body.y,
            vx: body.vx,
            vy: body.vy,
            grounded: body.grounded,
            state: engine.state().as_str(),
            support: engine.support().map(|s| s.handle.0),
        }))
    }

    /// Stop the frame loop and detach every listener and observer. Safe to
    /// call more than once.
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

fn disposer(shared: Weak<Shared>, handle: ElementHandle) -> Function {
    Closure::<dyn FnMut()>::new(move || {
        if let Some(shared) = shared.upgrade() {
            shared.remove(handle);
        }
    })
    .into_js_value()
    .unchecked_into()
}
