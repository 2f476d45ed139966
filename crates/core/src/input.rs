//! Keyboard → control-state mapping.

bitflags::bitflags! {
    /// Held controls.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct Controls: u8 {
        const LEFT  = 1 << 0;
        const RIGHT = 1 << 1;
        const WALK  = 1 << 2;
        const JUMP  = 1 << 3;
    }
}

/// Logical movement key, independent of layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Jump,
    Walk,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value. Arrows, WASD-style letters,
    /// space and shift are movement keys; everything else is ignored.
    pub fn from_dom_key(key: &str) -> Option<Key> {
        match key {
            "ArrowLeft" | "a" | "A" => Some(Key::Left),
            "ArrowRight" | "d" | "D" => Some(Key::Right),
            "ArrowUp" | "w" | "W" | " " | "Space" | "Spacebar" => Some(Key::Jump),
            "Shift" | "ShiftLeft" | "ShiftRight" => Some(Key::Walk),
            _ => None,
        }
    }

    fn control(self) -> Controls {
        match self {
            Key::Left => Controls::LEFT,
            Key::Right => Controls::RIGHT,
            Key::Jump => Controls::JUMP,
            Key::Walk => Controls::WALK,
        }
    }
}

/// Held controls plus the jump queue.
///
/// A jump is queued on the key-down edge only, so holding the key never
/// re-fires. Releasing the key drops any queued jump.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    held: Controls,
    jump_queued: bool,
}

impl InputState {
    pub fn key_down(&mut self, key: Key) {
        if key == Key::Jump && !self.held.contains(Controls::JUMP) {
            self.jump_queued = true;
        }
        self.held.insert(key.control());
    }

    pub fn key_up(&mut self, key: Key) {
        self.held.remove(key.control());
        if key == Key::Jump {
            self.jump_queued = false;
        }
    }

    /// Focus loss: forget everything so no key stays stuck.
    pub fn reset(&mut self) {
        *self = InputState::default();
    }

    pub fn held(&self) -> Controls {
        self.held
    }

    pub fn is_held(&self, controls: Controls) -> bool {
        self.held.contains(controls)
    }

    pub fn jump_queued(&self) -> bool {
        self.jump_queued
    }

    /// Consume the queued press.
    pub fn take_jump(&mut self) -> bool {
        std::mem::take(&mut self.jump_queued)
    }

    /// -1, 0 or 1. Opposite keys cancel.
    pub fn direction(&self) -> f32 {
        let left = self.held.contains(Controls::LEFT) as i32;
        let right = self.held.contains(Controls::RIGHT) as i32;
        (right - left) as f32
    }
}
