//! Positioned, square-bounded arena entities.
//!
//! Every entity carries a [`Body`] (centre + side). Overlap is decided on the
//! bodies alone: squares are treated as circles of radius `side / 2`.

use arena_shared::config::GameConfig;
use arena_shared::protocol;
use arena_shared::vec2::{self, Vec2};
use rand::Rng;

/// Square footprint shared by every entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub pos: Vec2,
    pub side: f32,
}

impl Body {
    pub fn new(pos: Vec2, side: f32) -> Self {
        Self { pos, side }
    }

    pub fn half_side(&self) -> f32 {
        self.side / 2.0
    }

    /// True when the squared centre distance is at most the squared sum of half-sides.
    pub fn overlaps(&self, other: &Body) -> bool {
        let reach = self.half_side() + other.half_side();
        vec2::distance_sq(self.pos, other.pos) <= reach * reach
    }
}

/// Arena extents. Coordinates live in `[-half_width, half_width] x [-half_height, half_height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub half_width: f32,
    pub half_height: f32,
}

impl Arena {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            half_width: config.arena_half_width,
            half_height: config.arena_half_height,
        }
    }

    /// Apply the single toroidal wrap on both axes.
    pub fn wrap(&self, pos: Vec2) -> Vec2 {
        Vec2::new(
            wrap_axis(pos.x, self.half_width),
            wrap_axis(pos.y, self.half_height),
        )
    }

    /// Uniform random point inside the arena.
    pub fn random_point(&self, rng: &mut impl Rng) -> Vec2 {
        Vec2::new(
            -self.half_width + rng.gen::<f32>() * (2.0 * self.half_width),
            -self.half_height + rng.gen::<f32>() * (2.0 * self.half_height),
        )
    }
}

/// Toroidal wrap of one coordinate.
///
/// Only one wrap is performed: a value more than `2 * limit` past a bound
/// stays out of range.
pub fn wrap_axis(value: f32, limit: f32) -> f32 {
    if value > limit {
        -limit + (value - limit)
    } else if value < -limit {
        limit + (value + limit)
    } else {
        value
    }
}

/// Round half up, matching the heading quantisation clients replicate.
fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// A player's vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Pod {
    pub id: u32,
    pub body: Body,
    pub velocity: Vec2,
    /// Accumulated heading in whole degrees
    pub heading_deg: f32,
}

impl Pod {
    pub fn new(id: u32, pos: Vec2, side: f32) -> Self {
        Self {
            id,
            body: Body::new(pos, side),
            velocity: Vec2::ZERO,
            heading_deg: 0.0,
        }
    }

    pub fn heading_rad(&self) -> f64 {
        f64::from(self.heading_deg).to_radians()
    }

    /// Turn by `angle_delta` radians, add `thrust_count` impulses along the
    /// new heading, then advance one step.
    pub fn apply_command(&mut self, angle_delta: f32, thrust_count: u32, thrust: f32, arena: &Arena) {
        let turn = f64::from(angle_delta).to_degrees() % 360.0;
        self.heading_deg += round_half_up(turn) as f32;

        let heading = self.heading_rad();
        let impulse = f64::from(thrust) * f64::from(thrust_count);
        self.velocity.x = (f64::from(self.velocity.x) + impulse * heading.cos()) as f32;
        self.velocity.y = (f64::from(self.velocity.y) - impulse * heading.sin()) as f32;

        self.advance(arena);
    }

    /// `position += velocity`, then wrap.
    pub fn advance(&mut self, arena: &Arena) {
        self.body.pos = arena.wrap(vec2::add(self.body.pos, self.velocity));
    }

    /// `X..Y..VX..VY..T..` snapshot payload.
    pub fn vcoord(&self) -> String {
        protocol::vcoord(self.body.pos, self.velocity, self.heading_rad())
    }
}

/// What an obstacle is. Bombs are obstacles that remember who dropped them.
#[derive(Debug, Clone, PartialEq)]
pub enum ObstacleKind {
    Asteroid,
    Bomb { owner: String },
}

/// An immovable square: a fixed asteroid or a dropped bomb.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub id: u32,
    pub body: Body,
    pub kind: ObstacleKind,
}

impl Obstacle {
    pub fn asteroid(id: u32, pos: Vec2, side: f32) -> Self {
        Self {
            id,
            body: Body::new(pos, side),
            kind: ObstacleKind::Asteroid,
        }
    }

    pub fn bomb(id: u32, owner: &str, pos: Vec2, side: f32) -> Self {
        Self {
            id,
            body: Body::new(pos, side),
            kind: ObstacleKind::Bomb {
                owner: owner.to_string(),
            },
        }
    }

    /// Owner's pseudo for bombs, `None` for asteroids.
    pub fn owner(&self) -> Option<&str> {
        match &self.kind {
            ObstacleKind::Bomb { owner } => Some(owner),
            ObstacleKind::Asteroid => None,
        }
    }

    /// `obs<id>:X..Y..`
    pub fn coord(&self) -> String {
        protocol::obstacle_coord(self.id, self.body.pos)
    }
}

/// The scoring target.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub body: Body,
}

impl Objective {
    pub fn new(pos: Vec2, side: f32) -> Self {
        Self {
            body: Body::new(pos, side),
        }
    }

    pub fn coord(&self) -> String {
        protocol::coord(self.body.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::vec2::vec2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn arena() -> Arena {
        Arena {
            half_width: 100.0,
            half_height: 50.0,
        }
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = Body::new(vec2(0.0, 0.0), 10.0);
        let b = Body::new(vec2(7.0, 6.0), 6.0);
        let c = Body::new(vec2(30.0, 0.0), 10.0);
        assert_eq!(a.overlaps(&b), b.overlaps(&a));
        assert_eq!(a.overlaps(&c), c.overlaps(&a));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn touching_bodies_overlap() {
        let a = Body::new(vec2(0.0, 0.0), 10.0);
        let b = Body::new(vec2(10.0, 0.0), 10.0);
        assert!(a.overlaps(&b));
        let c = Body::new(vec2(10.01, 0.0), 10.0);
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn wrap_leaves_inside_values_alone() {
        assert_eq!(wrap_axis(42.0, 100.0), 42.0);
        assert_eq!(wrap_axis(100.0, 100.0), 100.0);
        assert_eq!(wrap_axis(-100.0, 100.0), -100.0);
    }

    #[test]
    fn wrap_crosses_to_opposite_edge() {
        assert_close(wrap_axis(110.0, 100.0), -90.0);
        assert_close(wrap_axis(-110.0, 100.0), 90.0);
    }

    #[test]
    fn single_wrap_stays_in_bounds_up_to_twice_the_extent() {
        let limit = 100.0;
        for d in [0.5_f32, 1.0, 50.0, 150.0, 199.0, 200.0] {
            let high = wrap_axis(limit + d, limit);
            let low = wrap_axis(-limit - d, limit);
            assert!((-limit..=limit).contains(&high), "high {} -> {}", d, high);
            assert!((-limit..=limit).contains(&low), "low {} -> {}", d, low);
        }
    }

    #[test]
    fn wrap_does_not_loop_past_twice_the_extent() {
        assert!(wrap_axis(350.0, 100.0) > 100.0);
    }

    #[test]
    fn command_rounds_heading_to_whole_degrees() {
        let mut pod = Pod::new(1, Vec2::ZERO, 10.0);
        // 0.5 rad = 28.65 degrees
        pod.apply_command(0.5, 0, 1.0, &arena());
        assert_eq!(pod.heading_deg, 29.0);
        // A full turn plus a bit keeps only the remainder
        pod.apply_command(std::f32::consts::TAU + 0.1, 0, 1.0, &arena());
        assert_eq!(pod.heading_deg, 29.0 + 6.0);
    }

    #[test]
    fn thrust_follows_heading_with_inverted_y() {
        let mut pod = Pod::new(1, Vec2::ZERO, 10.0);
        pod.apply_command(std::f32::consts::FRAC_PI_2, 2, 1.5, &arena());
        assert_eq!(pod.heading_deg, 90.0);
        assert_close(pod.velocity.x, 0.0);
        assert_close(pod.velocity.y, -3.0);
        assert_close(pod.body.pos.y, -3.0);
    }

    #[test]
    fn velocity_accumulates_and_moves_pod() {
        let mut pod = Pod::new(1, vec2(95.0, 0.0), 10.0);
        pod.apply_command(0.0, 3, 2.0, &arena());
        assert_close(pod.velocity.x, 6.0);
        // 101 wraps to -99
        assert_close(pod.body.pos.x, -99.0);
        pod.apply_command(0.0, 0, 2.0, &arena());
        assert_close(pod.body.pos.x, -93.0);
    }

    #[test]
    fn vcoord_reports_heading_in_radians() {
        let mut pod = Pod::new(1, Vec2::ZERO, 10.0);
        pod.heading_deg = 180.0;
        assert!(pod.vcoord().ends_with(&format!("T{}", std::f64::consts::PI)));
    }

    #[test]
    fn bombs_know_their_owner() {
        let bomb = Obstacle::bomb(4, "alice", vec2(1.0, 2.0), 8.0);
        let rock = Obstacle::asteroid(0, vec2(1.0, 2.0), 30.0);
        assert_eq!(bomb.owner(), Some("alice"));
        assert_eq!(rock.owner(), None);
        assert_eq!(bomb.coord(), "obs4:X1.0Y2.0");
    }

    #[test]
    fn random_points_stay_inside_arena() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let arena = arena();
        for _ in 0..1000 {
            let p = arena.random_point(&mut rng);
            assert!(p.x.abs() <= arena.half_width);
            assert!(p.y.abs() <= arena.half_height);
        }
    }
}
