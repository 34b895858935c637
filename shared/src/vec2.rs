/// 2D vector utilities for the arena plane.
/// +x points right, +y points up; headings are measured counter-clockwise from +x.

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Shorthand constructor
pub fn vec2(x: f32, y: f32) -> Vec2 {
    Vec2::new(x, y)
}

/// Dot product
pub fn dot(a: Vec2, b: Vec2) -> f32 {
    a.x * b.x + a.y * b.y
}

/// Vector length
pub fn length(v: Vec2) -> f32 {
    (v.x * v.x + v.y * v.y).sqrt()
}

/// Squared distance between two points
pub fn distance_sq(a: Vec2, b: Vec2) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx * dx + dy * dy
}

/// Normalize vector to unit length. Returns `None` for a (near) zero vector.
pub fn try_normalize(v: Vec2) -> Option<Vec2> {
    let len = length(v);
    if len < 1e-12 {
        return None;
    }
    Some(Vec2::new(v.x / len, v.y / len))
}

/// Scale vector by scalar
pub fn scale(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(v.x * s, v.y * s)
}

/// Add two vectors
pub fn add(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x + b.x, a.y + b.y)
}

/// Subtract vectors (a - b)
pub fn sub(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x - b.x, a.y - b.y)
}

/// Left-hand perpendicular (rotated +90 degrees)
pub fn perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
