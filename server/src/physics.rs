//! Collision response between pods and the other arena bodies.
//!
//! Two shapes of response exist: equal-mass elastic collision between two
//! pods, and deflection off an immovable body (asteroid or bomb). Both leave
//! the bodies exactly touching; [`separate`] then steps the mover clear.

use arena_shared::vec2::{self, Vec2};

use crate::objects::{Arena, Body, Pod};

/// Upper bound on velocity-driven separation steps before pushing directly.
pub const MAX_SEPARATION_STEPS: u32 = 64;

/// Extra gap left by the direct push so the overlap test is strictly false.
const SEPARATION_EPSILON: f32 = 1e-3;

/// How [`separate`] cleared an overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separation {
    /// Bodies were already apart.
    Clear,
    /// The mover's own motion cleared the overlap after this many steps.
    Stepped(u32),
    /// Stepping did not help (no relative motion); the mover was pushed out.
    Pushed,
}

/// Unit vector from `from` towards `to`, or `fallback` direction when the
/// points coincide, or +x when that is zero too.
fn unit_normal(from: Vec2, to: Vec2, fallback: Vec2) -> Vec2 {
    vec2::try_normalize(vec2::sub(to, from))
        .or_else(|| vec2::try_normalize(fallback))
        .unwrap_or(Vec2::new(1.0, 0.0))
}

/// Elastic collision of two pods of equal mass.
///
/// Normal components of the velocities are swapped, tangential components
/// kept. `other` is moved along the normal until the centres are exactly
/// `half_side + half_side` apart.
pub fn collide_equal_mass(mover: &mut Pod, other: &mut Pod) {
    let n = unit_normal(mover.body.pos, other.body.pos, mover.velocity);
    let t = vec2::perp(n);

    let v1n = vec2::dot(mover.velocity, n);
    let v1t = vec2::dot(mover.velocity, t);
    let v2n = vec2::dot(other.velocity, n);
    let v2t = vec2::dot(other.velocity, t);

    mover.velocity = vec2::add(vec2::scale(n, v2n), vec2::scale(t, v1t));
    other.velocity = vec2::add(vec2::scale(n, v1n), vec2::scale(t, v2t));

    let reach = mover.body.half_side() + other.body.half_side();
    other.body.pos = vec2::add(mover.body.pos, vec2::scale(n, reach));
}

/// Bounce a pod off an immovable body: `v' = v - 2(v.n)n`, then place the pod
/// exactly touching the body along the normal. The body never moves.
pub fn deflect_infinite_mass(pod: &mut Pod, fixed: &Body) {
    let n = unit_normal(fixed.pos, pod.body.pos, vec2::scale(pod.velocity, -1.0));

    let vn = vec2::dot(pod.velocity, n);
    pod.velocity = vec2::sub(pod.velocity, vec2::scale(n, 2.0 * vn));

    let reach = fixed.half_side() + pod.body.half_side();
    pod.body.pos = vec2::add(fixed.pos, vec2::scale(n, reach));
}

/// Advance `mover` by its own velocity until it no longer overlaps `other`.
///
/// Stepping is capped at [`MAX_SEPARATION_STEPS`]. If the pods are still in
/// contact after that (zero relative velocity, or motion back into the other
/// body), the mover is pushed straight out along the normal.
pub fn separate(mover: &mut Pod, other: &Body, arena: &Arena) -> Separation {
    if !mover.body.overlaps(other) {
        return Separation::Clear;
    }

    for step in 1..=MAX_SEPARATION_STEPS {
        mover.advance(arena);
        if !mover.body.overlaps(other) {
            return Separation::Stepped(step);
        }
    }

    let n = unit_normal(other.pos, mover.body.pos, mover.velocity);
    let reach = mover.body.half_side() + other.half_side();
    let gap = reach + SEPARATION_EPSILON * reach.max(1.0);
    mover.body.pos = arena.wrap(vec2::add(other.pos, vec2::scale(n, gap)));
    Separation::Pushed
}
