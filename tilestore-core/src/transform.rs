//! Coordinate transforms between logical and on-disk tile addressing
//!
//! Callers always address tiles in top-left-origin slippy-map XYZ. Legacy
//! datasets may store rows with an inverted Y axis (TMS) or an inverted
//! absolute zoom numbering ("BigPlanet"); both conventions are declared in
//! the dataset metadata and applied here at the query boundary. The two
//! transforms are independent and each is its own inverse, so the same
//! function serves both read and write paths.

use crate::types::{ZoomLevel, MAX_ZOOM_LEVEL, MIN_ZOOM_LEVEL};

/// Zoom offset used by the legacy BigPlanet numbering scheme
pub const BIG_PLANET_INVERTED_ZOOM: i32 = 17;

/// Tile-numbering scheme name that maps to the BigPlanet offset
pub const TILE_NUMBERING_BIG_PLANET: &str = "BigPlanet";

/// Mirror a tile row across the horizontal middle of its zoom level
///
/// Converts between XYZ (row 0 at the top) and TMS (row 0 at the bottom).
/// Involution: applying it twice returns the original row.
pub fn invert_y(y: i32, zoom: ZoomLevel) -> i32 {
    ((1i64 << zoom) - 1 - i64::from(y)) as i32
}

/// Derive the zoom-inversion offset from the `tilenumbering` meta value
///
/// An absent key means the historical default dataset convention
/// (BigPlanet); any scheme name other than BigPlanet means no inversion.
pub fn inverted_zoom_value(tile_numbering: Option<&str>) -> i32 {
    match tile_numbering {
        None => BIG_PLANET_INVERTED_ZOOM,
        Some(name) if name == TILE_NUMBERING_BIG_PLANET => BIG_PLANET_INVERTED_ZOOM,
        Some(_) => 0,
    }
}

/// Translate a logical zoom into the value stored in the `z` column
pub fn physical_zoom(zoom: ZoomLevel, inverted_zoom: i32) -> i32 {
    if inverted_zoom > 0 {
        inverted_zoom - i32::from(zoom)
    } else {
        i32::from(zoom)
    }
}

/// Translate a `z` column value back into a logical zoom, if representable
pub fn logical_zoom(physical: i64, inverted_zoom: i32) -> Option<ZoomLevel> {
    let logical = if inverted_zoom > 0 {
        i64::from(inverted_zoom) - physical
    } else {
        physical
    };
    if (i64::from(MIN_ZOOM_LEVEL)..=i64::from(MAX_ZOOM_LEVEL)).contains(&logical) {
        Some(logical as ZoomLevel)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_y_involution() {
        for zoom in [0u8, 1, 3, 10, 31] {
            let side = 1i64 << zoom;
            for y in [0i64, 1, side / 2, side - 1] {
                let y = y as i32;
                assert_eq!(invert_y(invert_y(y, zoom), zoom), y, "zoom {}", zoom);
            }
        }
    }

    #[test]
    fn test_invert_y_example() {
        // Logical y=2 at zoom 3 lands on physical row 5
        assert_eq!(invert_y(2, 3), 5);
        assert_eq!(invert_y(5, 3), 2);
    }

    #[test]
    fn test_inverted_zoom_value_defaults() {
        assert_eq!(inverted_zoom_value(None), 17);
        assert_eq!(inverted_zoom_value(Some("BigPlanet")), 17);
        assert_eq!(inverted_zoom_value(Some("OSM")), 0);
        assert_eq!(inverted_zoom_value(Some("")), 0);
    }

    #[test]
    fn test_zoom_involution() {
        for inverted in [0, 17] {
            for zoom in 0u8..=16 {
                let physical = physical_zoom(zoom, inverted);
                assert_eq!(logical_zoom(i64::from(physical), inverted), Some(zoom));
            }
        }
    }

    #[test]
    fn test_logical_zoom_rejects_out_of_range() {
        assert_eq!(logical_zoom(32, 0), None);
        assert_eq!(logical_zoom(-1, 0), None);
        // BigPlanet physical value below the offset minus max zoom
        assert_eq!(logical_zoom(-20, 17), None);
    }
}
