//! Payloads handed to element callbacks and sound handlers.

use serde::Serialize;

use crate::collision::ElementKind;
use crate::geom::{Rect, Vec2};
use crate::host::ElementHandle;
use crate::registry::{Metadata, RegisteredElement};
use crate::sound::Surface;

/// Direction the character was travelling when it hit something.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformEventKind {
    Enter,
    Leave,
    Collide,
}

/// The platform segment involved in an event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportDescriptor {
    pub handle: ElementHandle,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub rect: Rect,
    pub surface: Surface,
}

impl SupportDescriptor {
    pub fn of(entry: &RegisteredElement, rect: Rect) -> Self {
        Self {
            handle: entry.handle,
            kind: entry.kind,
            rect,
            surface: entry.surface,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEventPayload {
    pub event: PlatformEventKind,
    pub platform: SupportDescriptor,
    pub metadata: Metadata,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Set for collisions only.
    pub direction: Option<Direction>,
    /// Speed along the blocked axis just before impact. For enter/leave, the
    /// horizontal speed at the moment support changed.
    pub speed: f32,
}
