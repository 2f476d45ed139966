//! Swept collision tests against registered segments.
//!
//! Each test compares the leading edge before and after the move, so a
//! segment crossed within one step is caught even if the body ends up past
//! it. Among blocking segments the nearest one wins.

use crate::geom::{almost_equal, overlap, Rect};
use crate::registry::RegisteredElement;
use crate::Params;

/// A blocking segment and the coordinate the body snaps to.
#[derive(Copy, Clone, Debug)]
pub struct Hit<'a> {
    pub entry: &'a RegisteredElement,
    pub segment: usize,
    pub rect: Rect,
    /// New x for horizontal sweeps, new y for vertical ones.
    pub resolved: f32,
}

fn segments<'a>(
    solids: &'a [&'a RegisteredElement],
    blocks: impl Fn(&RegisteredElement) -> bool + 'a,
) -> impl Iterator<Item = (&'a RegisteredElement, usize, Rect)> + 'a {
    solids
        .iter()
        .copied()
        .filter(move |e| blocks(*e))
        .flat_map(|e| e.segments.iter().enumerate().map(move |(i, r)| (e, i, *r)))
}

/// Moving right from `body.x` to `next_x`.
pub fn sweep_right<'a>(body: Rect, next_x: f32, solids: &'a [&'a RegisteredElement], params: &Params) -> Option<Hit<'a>> {
    let before = body.right();
    let after = next_x + body.w;
    let mut best: Option<Hit<'a>> = None;
    for (entry, segment, rect) in segments(solids, |e| e.behavior.blocks_rightward()) {
        if overlap(body.top(), body.bottom(), rect.top(), rect.bottom()) < params.min_side_overlap {
            continue;
        }
        let edge = rect.left();
        if before <= edge && after > edge {
            let resolved = edge - body.w;
            if best.map_or(true, |b| resolved < b.resolved) {
                best = Some(Hit { entry, segment, rect, resolved });
            }
        }
    }
    best
}

/// Moving left from `body.x` to `next_x`.
pub fn sweep_left<'a>(body: Rect, next_x: f32, solids: &'a [&'a RegisteredElement], params: &Params) -> Option<Hit<'a>> {
    let before = body.left();
    let after = next_x;
    let mut best: Option<Hit<'a>> = None;
    for (entry, segment, rect) in segments(solids, |e| e.behavior.blocks_leftward()) {
        if overlap(body.top(), body.bottom(), rect.top(), rect.bottom()) < params.min_side_overlap {
            continue;
        }
        let edge = rect.right();
        if before >= edge && after < edge {
            if best.map_or(true, |b| edge > b.resolved) {
                best = Some(Hit { entry, segment, rect, resolved: edge });
            }
        }
    }
    best
}

/// Falling from `body.y` to `next_y`; lands on the highest top crossed.
pub fn sweep_down<'a>(body: Rect, next_y: f32, solids: &'a [&'a RegisteredElement], params: &Params) -> Option<Hit<'a>> {
    let before = body.bottom();
    let after = next_y + body.h;
    let mut best: Option<Hit<'a>> = None;
    for (entry, segment, rect) in segments(solids, |e| e.behavior.blocks_falling()) {
        if overlap(body.left(), body.right(), rect.left(), rect.right()) < params.min_support_overlap {
            continue;
        }
        let top = rect.top();
        if before <= top && after >= top {
            let resolved = top - body.h;
            if best.map_or(true, |b| resolved < b.resolved) {
                best = Some(Hit { entry, segment, rect, resolved });
            }
        }
    }
    best
}

/// Rising from `body.y` to `next_y`; stops under the lowest bottom crossed.
pub fn sweep_up<'a>(body: Rect, next_y: f32, solids: &'a [&'a RegisteredElement], params: &Params) -> Option<Hit<'a>> {
    let before = body.top();
    let after = next_y;
    let mut best: Option<Hit<'a>> = None;
    for (entry, segment, rect) in segments(solids, |e| e.behavior.blocks_rising()) {
        if overlap(body.left(), body.right(), rect.left(), rect.right()) < params.min_support_overlap {
            continue;
        }
        let bottom = rect.bottom();
        if before >= bottom && after <= bottom {
            if best.map_or(true, |b| bottom > b.resolved) {
                best = Some(Hit { entry, segment, rect, resolved: bottom });
            }
        }
    }
    best
}

/// Feet resting on the top of `entry.segments[segment]` within tolerance.
pub fn can_stand_on(entry: &RegisteredElement, segment: usize, body: Rect, params: &Params) -> bool {
    let Some(rect) = entry.segments.get(segment) else {
        return false;
    };
    if !entry.behavior.blocks_falling() {
        return false;
    }
    if overlap(body.left(), body.right(), rect.left(), rect.right()) < params.min_support_overlap {
        return false;
    }
    almost_equal(body.bottom(), rect.top(), params.collision_epsilon)
}
