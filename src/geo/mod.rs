//! Great-circle distance and point-in-polygon tests.
//!
//! Everything here is a pure function over WGS84 degrees. Distances are in
//! nautical miles because every threshold the engine compares against
//! (controller radii, the 300nm flight search radius) is expressed in nm.

use serde::{Deserialize, Serialize};

/// Mean earth radius in nautical miles (6_371_008.8 m / 1852).
pub const EARTH_RADIUS_NM: f64 = 3_440.065;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn distance_nm(&self, other: &Position) -> f64 {
        haversine_nm(self, other)
    }
}

/// Haversine great-circle distance between two positions.
pub fn haversine_nm(a: &Position, b: &Position) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_NM * c
}

/// Ray casting test. `ring` is a list of vertices; closing the ring
/// (repeating the first vertex) is optional. Points exactly on an edge may
/// fall either way.
pub fn point_in_polygon(point: &Position, ring: &[Position]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (yi, xi) = (ring[i].lat, ring[i].lon);
        let (yj, xj) = (ring[j].lat, ring[j].lon);

        if ((yi > point.lat) != (yj > point.lat))
            && (point.lon < (xj - xi) * (point.lat - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Position> {
        vec![
            Position::new(-34.0, 150.0),
            Position::new(-34.0, 151.0),
            Position::new(-35.0, 151.0),
            Position::new(-35.0, 150.0),
        ]
    }

    #[test]
    fn haversine_is_symmetric() {
        let sydney = Position::new(-33.9461, 151.1772);
        let melbourne = Position::new(-37.6690, 144.8410);

        let there = haversine_nm(&sydney, &melbourne);
        let back = haversine_nm(&melbourne, &sydney);
        assert!((there - back).abs() < 1e-9);
        // roughly 380nm great circle
        assert!(there > 370.0 && there < 390.0, "got {there}");
    }

    #[test]
    fn one_degree_of_longitude_at_equator_is_sixty_nm() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(0.0, 1.0);
        let d = haversine_nm(&a, &b);
        assert!((d - 60.0).abs() <= 0.6, "got {d}");
    }

    #[test]
    fn longitude_shrinks_away_from_equator() {
        // A planar degree formula would report ~60nm here as well.
        let a = Position::new(60.0, 0.0);
        let b = Position::new(60.0, 1.0);
        let d = haversine_nm(&a, &b);
        assert!(d > 29.0 && d < 31.0, "got {d}");
    }

    #[test]
    fn point_in_polygon_inside_and_outside() {
        let ring = square();
        assert!(point_in_polygon(&Position::new(-34.5, 150.5), &ring));
        assert!(!point_in_polygon(&Position::new(-33.5, 150.5), &ring));
        assert!(!point_in_polygon(&Position::new(-34.5, 152.0), &ring));
    }

    #[test]
    fn closed_ring_gives_same_answer() {
        let mut ring = square();
        ring.push(ring[0]);
        assert!(point_in_polygon(&Position::new(-34.5, 150.5), &ring));
        assert!(!point_in_polygon(&Position::new(-36.0, 150.5), &ring));
    }

    #[test]
    fn degenerate_ring_contains_nothing() {
        let ring = vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)];
        assert!(!point_in_polygon(&Position::new(0.5, 0.5), &ring));
    }

    #[test]
    fn position_validation() {
        assert!(Position::new(-33.0, 151.0).is_valid());
        assert!(!Position::new(91.0, 0.0).is_valid());
        assert!(!Position::new(0.0, f64::NAN).is_valid());
    }
}
