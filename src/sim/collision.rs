//! Hit-test geometry for circular bodies
//!
//! Every body is a circle. Bullets sweep a thick segment from their previous
//! to their current position so fast shots never tunnel through small targets.

use glam::Vec2;

/// Whether two circles overlap
#[inline]
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    let r = ra + rb;
    a.distance_squared(b) <= r * r
}

/// Whether a circle intersects the axis-aligned rectangle `[min, max]`
pub fn circle_rect_overlap(center: Vec2, radius: f32, min: Vec2, max: Vec2) -> bool {
    let closest = center.clamp(min.min(max), min.max(max));
    center.distance_squared(closest) <= radius * radius
}

/// First point where the segment `p1 -> p2` (inflated by `thickness / 2`)
/// touches a circle. Returns the parameter along the segment in `[0, 1]` and
/// the contact point on the segment.
pub fn segment_circle_hit(
    p1: Vec2,
    p2: Vec2,
    thickness: f32,
    center: Vec2,
    radius: f32,
) -> Option<(f32, Vec2)> {
    let r = radius + thickness * 0.5;
    let d = p2 - p1;
    let f = p1 - center;

    // Start already inside
    if f.length_squared() <= r * r {
        return Some((0.0, p1));
    }

    let a = d.length_squared();
    if a <= f32::EPSILON {
        return None;
    }
    let b = 2.0 * f.dot(d);
    let c = f.length_squared() - r * r;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / (2.0 * a);
    if (0.0..=1.0).contains(&t) {
        Some((t, p1 + d * t))
    } else {
        None
    }
}

/// Reflect a velocity off a surface with the given normal
#[inline]
pub fn reflect_velocity(vel: Vec2, normal: Vec2) -> Vec2 {
    vel - 2.0 * vel.dot(normal) * normal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circles_overlap() {
        assert!(circles_overlap(Vec2::ZERO, 5.0, Vec2::new(9.0, 0.0), 5.0));
        assert!(!circles_overlap(Vec2::ZERO, 5.0, Vec2::new(11.0, 0.0), 5.0));
    }

    #[test]
    fn test_circle_rect_overlap() {
        let min = Vec2::new(0.0, 0.0);
        let max = Vec2::new(10.0, 10.0);
        assert!(circle_rect_overlap(Vec2::new(5.0, 5.0), 1.0, min, max));
        assert!(circle_rect_overlap(Vec2::new(12.0, 5.0), 3.0, min, max));
        assert!(!circle_rect_overlap(Vec2::new(14.0, 14.0), 3.0, min, max));
    }

    #[test]
    fn test_segment_hits_circle_front() {
        let hit = segment_circle_hit(
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 0.0),
            0.0,
            Vec2::new(50.0, 0.0),
            10.0,
        );
        let (t, point) = hit.expect("segment crosses circle");
        assert!((t - 0.4).abs() < 1e-4);
        assert!((point.x - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_segment_misses_circle() {
        let hit = segment_circle_hit(
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 0.0),
            2.0,
            Vec2::new(50.0, 30.0),
            10.0,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn test_segment_thickness_extends_reach() {
        let thin = segment_circle_hit(Vec2::ZERO, Vec2::new(100.0, 0.0), 0.0, Vec2::new(50.0, 12.0), 10.0);
        let thick = segment_circle_hit(Vec2::ZERO, Vec2::new(100.0, 0.0), 8.0, Vec2::new(50.0, 12.0), 10.0);
        assert!(thin.is_none());
        assert!(thick.is_some());
    }

    #[test]
    fn test_reflect_velocity() {
        let reflected = reflect_velocity(Vec2::new(100.0, 0.0), Vec2::new(-1.0, 0.0));
        assert!((reflected.x + 100.0).abs() < 0.001);
        assert!(reflected.y.abs() < 0.001);
    }
}
