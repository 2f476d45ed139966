//! Collision behaviour attached to registered elements: which sides block the
//! character, per-direction pass-through overrides, and the per-kind defaults.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Sides of a platform that can stop the character.
    ///
    /// `TOP` stops a falling character landing on it, `BOTTOM` stops a rising
    /// character hitting its underside, `LEFT`/`RIGHT` stop horizontal entry
    /// from that side.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CollisionMask: u8 {
        const TOP    = 1 << 0;
        const BOTTOM = 1 << 1;
        const LEFT   = 1 << 2;
        const RIGHT  = 1 << 3;

        const VERTICAL   = Self::TOP.bits() | Self::BOTTOM.bits();
        const HORIZONTAL = Self::LEFT.bits() | Self::RIGHT.bits();
        const ALL        = Self::VERTICAL.bits() | Self::HORIZONTAL.bits();
    }
}

impl CollisionMask {
    pub const NONE: Self = Self::empty();
}

/// Boolean form of a collision mask, as UI components usually write it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionSides {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl From<CollisionSides> for CollisionMask {
    fn from(sides: CollisionSides) -> Self {
        let mut mask = CollisionMask::NONE;
        mask.set(CollisionMask::TOP, sides.top);
        mask.set(CollisionMask::BOTTOM, sides.bottom);
        mask.set(CollisionMask::LEFT, sides.left);
        mask.set(CollisionMask::RIGHT, sides.right);
        mask
    }
}

/// Per-direction overrides letting the character travel through a side the
/// mask would otherwise block. Directions are the character's travel
/// direction, so `upward` is the classic one-way platform.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassThrough {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upward: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downward: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leftward: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rightward: Option<bool>,
}

impl PassThrough {
    pub const NONE: Self = Self {
        upward: None,
        downward: None,
        leftward: None,
        rightward: None,
    };

    pub const UPWARD: Self = Self {
        upward: Some(true),
        ..Self::NONE
    };

    /// Fields set on `over` win; unset fields inherit from `self`.
    pub fn merged(self, over: Option<PassThrough>) -> PassThrough {
        let Some(over) = over else { return self };
        PassThrough {
            upward: over.upward.or(self.upward),
            downward: over.downward.or(self.downward),
            leftward: over.leftward.or(self.leftward),
            rightward: over.rightward.or(self.rightward),
        }
    }

    #[inline]
    pub fn upward(&self) -> bool {
        self.upward.unwrap_or(false)
    }

    #[inline]
    pub fn downward(&self) -> bool {
        self.downward.unwrap_or(false)
    }

    #[inline]
    pub fn leftward(&self) -> bool {
        self.leftward.unwrap_or(false)
    }

    #[inline]
    pub fn rightward(&self) -> bool {
        self.rightward.unwrap_or(false)
    }
}

/// Resolved collision behaviour of one registered element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Behavior {
    pub solid: bool,
    pub mask: CollisionMask,
    pub pass_through: PassThrough,
}

impl Behavior {
    /// Can land on it while falling.
    #[inline]
    pub fn blocks_falling(&self) -> bool {
        self.mask.contains(CollisionMask::TOP) && !self.pass_through.downward()
    }

    /// Can bump its underside while rising.
    #[inline]
    pub fn blocks_rising(&self) -> bool {
        self.mask.contains(CollisionMask::BOTTOM) && !self.pass_through.upward()
    }

    /// Stops the character moving right into its left edge.
    #[inline]
    pub fn blocks_rightward(&self) -> bool {
        self.mask.contains(CollisionMask::LEFT) && !self.pass_through.rightward()
    }

    /// Stops the character moving left into its right edge.
    #[inline]
    pub fn blocks_leftward(&self) -> bool {
        self.mask.contains(CollisionMask::RIGHT) && !self.pass_through.leftward()
    }
}

/// Kinds of elements UI components can register.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    #[serde(alias = "PLATFORM")]
    Platform,
}

impl ElementKind {
    /// Default behaviour for each kind; registrations override per field.
    pub const fn default_behavior(self) -> Behavior {
        match self {
            ElementKind::Platform => Behavior {
                solid: true,
                mask: CollisionMask::TOP,
                pass_through: PassThrough::UPWARD,
            },
        }
    }
}

/// Merge a registration's overrides onto its kind's defaults. An explicit
/// mask beats one derived from sides, which beats the kind default.
pub fn resolve_behavior(
    kind: ElementKind,
    sides: Option<CollisionSides>,
    mask: Option<CollisionMask>,
    pass_through: Option<PassThrough>,
    solid: Option<bool>,
) -> Behavior {
    let base = kind.default_behavior();
    let mask = mask
        .or_else(|| sides.map(CollisionMask::from))
        .unwrap_or(base.mask);
    Behavior {
        solid: solid.unwrap_or(base.solid),
        mask,
        pass_through: base.pass_through.merged(pass_through),
    }
}
