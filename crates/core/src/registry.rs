//! Registered page elements and their current collision geometry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;

use crate::collision::{resolve_behavior, Behavior, CollisionMask, CollisionSides, ElementKind, PassThrough};
use crate::error::ConfigError;
use crate::events::PlatformEventPayload;
use crate::geom::Rect;
use crate::host::{ElementGeometry, ElementHandle, PageHost};
use crate::sound::Surface;

/// Opaque key/value data echoed back in event payloads.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub type PlatformCallback = Rc<dyn Fn(&PlatformEventPayload)>;

/// Optional per-element callbacks.
#[derive(Clone, Default)]
pub struct PlatformEvents {
    pub on_player_enter: Option<PlatformCallback>,
    pub on_player_leave: Option<PlatformCallback>,
    pub on_player_collide: Option<PlatformCallback>,
}

impl fmt::Debug for PlatformEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformEvents")
            .field("on_player_enter", &self.on_player_enter.is_some())
            .field("on_player_leave", &self.on_player_leave.is_some())
            .field("on_player_collide", &self.on_player_collide.is_some())
            .finish()
    }
}

/// What a UI component hands over when it registers itself.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationConfig {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub collision_sides: Option<CollisionSides>,
    /// Wins over `collision_sides` when both are present.
    pub collision_mask: Option<CollisionMask>,
    pub pass_through: Option<PassThrough>,
    pub solid: Option<bool>,
    #[serde(default)]
    pub surface: Surface,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip)]
    pub events: PlatformEvents,
}

impl RegistrationConfig {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            collision_sides: None,
            collision_mask: None,
            pass_through: None,
            solid: None,
            surface: Surface::Default,
            metadata: Metadata::new(),
            events: PlatformEvents::default(),
        }
    }

    pub fn platform() -> Self {
        Self::new(ElementKind::Platform)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Registration)
    }

    pub fn with_sides(mut self, sides: CollisionSides) -> Self {
        self.collision_sides = Some(sides);
        self
    }

    pub fn with_mask(mut self, mask: CollisionMask) -> Self {
        self.collision_mask = Some(mask);
        self
    }

    pub fn with_pass_through(mut self, pass_through: PassThrough) -> Self {
        self.pass_through = Some(pass_through);
        self
    }

    pub fn with_solid(mut self, solid: bool) -> Self {
        self.solid = Some(solid);
        self
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn on_enter(mut self, f: impl Fn(&PlatformEventPayload) + 'static) -> Self {
        self.events.on_player_enter = Some(Rc::new(f));
        self
    }

    pub fn on_leave(mut self, f: impl Fn(&PlatformEventPayload) + 'static) -> Self {
        self.events.on_player_leave = Some(Rc::new(f));
        self
    }

    pub fn on_collide(mut self, f: impl Fn(&PlatformEventPayload) + 'static) -> Self {
        self.events.on_player_collide = Some(Rc::new(f));
        self
    }

    pub fn behavior(&self) -> Behavior {
        resolve_behavior(
            self.kind,
            self.collision_sides,
            self.collision_mask,
            self.pass_through,
            self.solid,
        )
    }
}

#[derive(Clone, Debug)]
pub struct RegisteredElement {
    pub handle: ElementHandle,
    pub kind: ElementKind,
    pub behavior: Behavior,
    pub rect: Rect,
    /// Never empty.
    pub segments: Vec<Rect>,
    pub surface: Surface,
    pub metadata: Metadata,
    pub events: PlatformEvents,
}

impl RegisteredElement {
    fn apply(&mut self, geometry: &ElementGeometry) {
        self.rect = geometry.bounds;
        self.segments = geometry.segments();
    }
}

/// The platform segment currently bearing the character.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Support {
    pub handle: ElementHandle,
    pub segment: usize,
}

/// What a dirty refresh changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub removed: Vec<ElementHandle>,
    pub remeasured: usize,
    pub support_invalidated: bool,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<ElementHandle, RegisteredElement>,
    dirty: BTreeSet<ElementHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` with freshly measured geometry, replacing any earlier
    /// registration of the same handle.
    pub fn register(
        &mut self,
        handle: ElementHandle,
        config: RegistrationConfig,
        host: &dyn PageHost,
    ) -> Option<RegisteredElement> {
        let behavior = config.behavior();
        let geometry = host.measure_element(handle).unwrap_or_default();
        let entry = RegisteredElement {
            handle,
            kind: config.kind,
            behavior,
            rect: geometry.bounds,
            segments: geometry.segments(),
            surface: config.surface,
            metadata: config.metadata,
            events: config.events,
        };
        tracing::debug!(
            handle = handle.0,
            kind = ?entry.kind,
            mask = ?behavior.mask,
            segments = entry.segments.len(),
            "element registered"
        );
        self.entries.insert(handle, entry)
    }

    pub fn unregister(&mut self, handle: ElementHandle) -> Option<RegisteredElement> {
        self.dirty.remove(&handle);
        let removed = self.entries.remove(&handle);
        if removed.is_some() {
            tracing::debug!(handle = handle.0, "element unregistered");
        }
        removed
    }

    pub fn mark_dirty(&mut self, handle: ElementHandle) {
        if self.entries.contains_key(&handle) {
            self.dirty.insert(handle);
        }
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.extend(self.entries.keys().copied());
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Re-measure everything marked dirty since the last call. Elements the
    /// host reports as detached are dropped; `support` is cleared when it
    /// pointed at a dropped element or at a segment that no longer exists.
    pub fn refresh_dirty(&mut self, host: &dyn PageHost, support: &mut Option<Support>) -> RefreshReport {
        let mut report = RefreshReport::default();
        if self.dirty.is_empty() {
            return report;
        }

        for handle in std::mem::take(&mut self.dirty) {
            if !self.entries.contains_key(&handle) {
                continue;
            }
            match host.measure_element(handle) {
                None => {
                    self.entries.remove(&handle);
                    report.removed.push(handle);
                    if support.is_some_and(|s| s.handle == handle) {
                        *support = None;
                        report.support_invalidated = true;
                    }
                    tracing::debug!(handle = handle.0, "detached element dropped");
                }
                Some(geometry) => {
                    let Some(entry) = self.entries.get_mut(&handle) else {
                        continue;
                    };
                    entry.apply(&geometry);
                    report.remeasured += 1;
                    if support.is_some_and(|s| s.handle == handle && s.segment >= entry.segments.len()) {
                        *support = None;
                        report.support_invalidated = true;
                    }
                }
            }
        }

        report
    }

    /// Registered elements that take part in collision, in handle order.
    pub fn solids(&self) -> Vec<&RegisteredElement> {
        self.entries.values().filter(|e| e.behavior.solid).collect()
    }

    pub fn get(&self, handle: ElementHandle) -> Option<&RegisteredElement> {
        self.entries.get(&handle)
    }

    pub fn contains(&self, handle: ElementHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Segment rectangle for a support reference, if it is still valid.
    pub fn segment(&self, support: Support) -> Option<(&RegisteredElement, Rect)> {
        let entry = self.entries.get(&support.handle)?;
        let rect = *entry.segments.get(support.segment)?;
        Some((entry, rect))
    }

    pub fn handles_of(&self, kind: ElementKind) -> Vec<ElementHandle> {
        self.entries
            .values()
            .filter(|e| e.kind == kind)
            .map(|e| e.handle)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty.clear();
    }
}
