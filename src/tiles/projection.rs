//! Spherical Web Mercator tile math
//!
//! Tile space at zoom `z` spans `2^z` units on each axis, x growing east and
//! y growing south, as in the usual slippy-map layout.

use std::f64::consts::PI;

/// A 2D point in tile or world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

impl<T> Point<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

fn tiles_per_axis(zoom: u32) -> f64 {
    2f64.powi(zoom as i32)
}

/// Longitude / latitude in degrees to tile coordinates
pub fn world_to_xy(lon: f64, lat: f64, zoom: u32) -> Point<f64> {
    let zp = tiles_per_axis(zoom);
    let lat_rad = lat.to_radians();

    let x = (lon + 180.0) / 360.0 * zp;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * zp;
    Point::new(x, y)
}

/// Tile coordinates to longitude / latitude in degrees
///
/// Longitude is normalized into `(-180, 180]`.
pub fn xy_to_world(x: f64, y: f64, zoom: u32) -> Point<f64> {
    let zp = tiles_per_axis(zoom);

    let plain_lon = x / zp * 360.0 - 180.0;
    let mut lon = plain_lon % 360.0;
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon <= -180.0 {
        lon += 360.0;
    }

    let n = PI - 2.0 * PI * y / zp;
    let lat = n.sinh().atan().to_degrees();

    Point::new(lon, lat)
}

/// Rescale a point from one zoom level to another
///
/// Scaling is by a power of two, so going there and back is exact.
pub fn transform_zoomed_point(point: Point<f64>, old_zoom: u32, new_zoom: u32) -> Point<f64> {
    if old_zoom == new_zoom {
        return point;
    }

    let diff = new_zoom as i32 - old_zoom as i32;
    let factor = 2f64.powi(diff.abs());
    if diff > 0 {
        Point::new(point.x * factor, point.y * factor)
    } else {
        Point::new(point.x / factor, point.y / factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_world_to_xy_known_points() {
        let origin = world_to_xy(0.0, 0.0, 0);
        assert!((origin.x - 0.5).abs() < EPS);
        assert!((origin.y - 0.5).abs() < EPS);

        let west = world_to_xy(-180.0, 0.0, 3);
        assert!(west.x.abs() < EPS);
        assert!((west.y - 4.0).abs() < EPS);

        // Mercator's latitude limit maps to the top edge
        let top = world_to_xy(0.0, 85.0511287798066, 1);
        assert!(top.y.abs() < 1e-6);
    }

    #[test]
    fn test_round_trip() {
        for zoom in [0, 3, 7, 11, 18] {
            for lon in [-179.5, -120.25, -0.001, 0.0, 13.4, 90.0, 179.9] {
                for lat in [-85.0, -45.5, -0.1, 0.0, 12.3, 51.5, 85.0] {
                    let p = world_to_xy(lon, lat, zoom);
                    let w = xy_to_world(p.x, p.y, zoom);
                    assert!((w.x - lon).abs() < 1e-7, "lon {lon} zoom {zoom}: got {}", w.x);
                    assert!((w.y - lat).abs() < 1e-7, "lat {lat} zoom {zoom}: got {}", w.y);
                }
            }
        }
    }

    #[test]
    fn test_longitude_normalization() {
        // the east edge stays at 180
        assert!((xy_to_world(1.0, 0.5, 0).x - 180.0).abs() < EPS);
        // the west edge folds over to 180 as well
        assert!((xy_to_world(0.0, 0.5, 0).x - 180.0).abs() < EPS);
        // past the east edge wraps back into range
        assert!((xy_to_world(1.25, 0.5, 0).x - -90.0).abs() < EPS);
        assert!((xy_to_world(-0.25, 0.5, 0).x - 90.0).abs() < EPS);
    }

    #[test]
    fn test_zoom_transform_identity() {
        let p = Point::new(123.456, -7.25);
        assert_eq!(transform_zoomed_point(p, 5, 5), p);
        assert_eq!(transform_zoomed_point(p, 0, 0), p);
    }

    #[test]
    fn test_zoom_transform_scaling() {
        let p = Point::new(3.0, 5.0);
        assert_eq!(transform_zoomed_point(p, 3, 5), Point::new(12.0, 20.0));
        assert_eq!(transform_zoomed_point(p, 5, 3), Point::new(0.75, 1.25));
    }

    #[test]
    fn test_zoom_transform_composition_is_exact() {
        let p = Point::new(1234.5678, 0.1);
        for (a, b) in [(3, 11), (11, 3), (0, 20), (7, 8)] {
            let there = transform_zoomed_point(p, a, b);
            assert_eq!(transform_zoomed_point(there, b, a), p);
        }
    }
}
