//! Geometry helpers for distances and device placement.
//!
//! Contains helper functions for:
//! - Distance calculations (squared distance to avoid sqrt in comparisons)
//! - Row-first grid placement
//! - Seeded uniform placement inside a rectangle

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::Point;

/// Squared Euclidean distance in meters².
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Euclidean distance in meters.
pub fn distance(a: &Point, b: &Point) -> f64 {
    distance2(a, b).sqrt()
}

/// Place `count` points on a row-first grid.
///
/// Point `i` lands at column `i % grid_width` and row `i / grid_width`.
///
/// # Parameters
///
/// * `count` - Number of points to place
/// * `origin` - Position of the first point
/// * `delta_x`, `delta_y` - Spacing between columns and rows
/// * `grid_width` - Points per row (must be non-zero)
pub fn grid_positions(count: usize, origin: Point, delta_x: f64, delta_y: f64, grid_width: u32) -> Vec<Point> {
    let width = grid_width.max(1) as usize;
    (0..count)
        .map(|i| {
            let column = (i % width) as f64;
            let row = (i / width) as f64;
            Point::new(origin.x + column * delta_x, origin.y + row * delta_y)
        })
        .collect()
}

/// Place `count` points uniformly inside `[0, width) x [0, height)`.
///
/// The same seed always yields the same layout, so runs stay reproducible.
pub fn random_positions(count: usize, seed: u64, width: f64, height: f64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Point::new(rng.gen_range(0.0..width), rng.gen_range(0.0..height)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(distance2(&a, &b), 25.0);
        assert_eq!(distance(&a, &b), 5.0);
        assert_eq!(distance(&b, &a), 5.0);
    }

    #[test]
    fn grid_is_row_first() {
        let points = grid_positions(5, Point::new(0.0, 0.0), 2.0, 2.0, 3);
        assert_eq!(
            points,
            vec![
                Point::new(0.0, 0.0),
                Point::new(2.0, 0.0),
                Point::new(4.0, 0.0),
                Point::new(0.0, 2.0),
                Point::new(2.0, 2.0),
            ]
        );
    }

    #[test]
    fn random_layout_is_seeded_and_bounded() {
        let first = random_positions(20, 42, 50.0, 30.0);
        let second = random_positions(20, 42, 50.0, 30.0);
        assert_eq!(first, second);
        assert!(first.iter().all(|p| (0.0..50.0).contains(&p.x) && (0.0..30.0).contains(&p.y)));
        assert_ne!(first, random_positions(20, 43, 50.0, 30.0));
    }
}
