use crate::geom::clamp;
use crate::host::Extents;
use crate::Params;

/// Playable bounds derived from the document's scroll extents.
///
/// Re-measured lazily: notifications only set the dirty flag, and the engine
/// measures at most once per tick.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct World {
    pub width: f32,
    pub height: f32,
    /// Top edge of the implicit floor.
    pub ground_top: f32,
    dirty: bool,
}

impl World {
    pub fn measured(extents: Extents, params: &Params) -> Self {
        let mut world = World::default();
        world.measure(extents, params);
        world
    }

    pub fn measure(&mut self, extents: Extents, params: &Params) {
        self.width = extents.width;
        self.height = extents.height;
        self.ground_top = (extents.height - params.ground_offset).max(params.character_height);
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the flag, returning whether it was set.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Resting y for a body of `height` standing on the floor.
    #[inline]
    pub fn ground_y(&self, height: f32) -> f32 {
        self.ground_top - height
    }

    pub fn clamp(&self, x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
        let max_x = (self.width - width).max(0.0);
        let max_y = self.ground_y(height).max(0.0);
        (clamp(x, 0.0, max_x), clamp(y, 0.0, max_y))
    }
}
