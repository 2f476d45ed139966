//! Seams between the simulation and whatever page it runs on.
//!
//! The engine never touches a document directly: it asks a [`PageHost`] for
//! extents and element geometry, and writes its output through a
//! [`Presenter`]. The browser binding implements both against the live DOM;
//! [`StaticPage`] is an in-memory page for headless runs and tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geom::Rect;
use crate::PlayerState;

/// Opaque identifier the host hands out for a page element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub u32);

/// Scrollable size of the document.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    pub width: f32,
    pub height: f32,
}

/// One measurement of an element: its bounding box plus the boxes of each
/// fragment (several when inline content wraps across lines).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementGeometry {
    pub bounds: Rect,
    #[serde(default)]
    pub fragments: Vec<Rect>,
}

impl ElementGeometry {
    pub fn single(bounds: Rect) -> Self {
        Self {
            bounds,
            fragments: vec![bounds],
        }
    }

    /// Collision segments: the fragments with area, or the bounding box when
    /// none qualify. Never empty.
    pub fn segments(&self) -> Vec<Rect> {
        let mut segments: Vec<Rect> = self
            .fragments
            .iter()
            .copied()
            .filter(Rect::has_area)
            .collect();
        if segments.is_empty() {
            segments.push(self.bounds);
        }
        segments
    }
}

pub trait PageHost {
    fn document_extents(&self) -> Extents;

    /// `None` once the element is no longer attached to the document.
    fn measure_element(&self, handle: ElementHandle) -> Option<ElementGeometry>;
}

/// Receives the character's per-frame output.
pub trait Presenter {
    fn set_transform(&mut self, x: f32, y: f32);
    fn set_sprite(&mut self, state: PlayerState);
}

/// Presenter for runs that only care about simulation state.
#[derive(Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn set_transform(&mut self, _x: f32, _y: f32) {}
    fn set_sprite(&mut self, _state: PlayerState) {}
}

/// In-memory page. Elements are attached with [`StaticPage::insert`] and
/// detached with [`StaticPage::detach`].
#[derive(Clone, Debug, Default)]
pub struct StaticPage {
    pub extents: Extents,
    pub elements: BTreeMap<ElementHandle, ElementGeometry>,
}

impl StaticPage {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            extents: Extents { width, height },
            elements: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, handle: ElementHandle, geometry: ElementGeometry) {
        self.elements.insert(handle, geometry);
    }

    pub fn detach(&mut self, handle: ElementHandle) -> Option<ElementGeometry> {
        self.elements.remove(&handle)
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.extents = Extents { width, height };
    }
}

impl PageHost for StaticPage {
    fn document_extents(&self) -> Extents {
        self.extents
    }

    fn measure_element(&self, handle: ElementHandle) -> Option<ElementGeometry> {
        self.elements.get(&handle).cloned()
    }
}
