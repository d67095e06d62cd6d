/*
Copyright 2024 Regional Weather Tensors contributors

This file is part of Regional Weather Tensors (RWT).

Regional Weather Tensors (RWT) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Regional Weather Tensors (RWT) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Regional Weather Tensors (RWT). If not, see https://www.gnu.org/licenses/.
*/

//! Module responsible for geographic boundaries used for
//! clipping the grids: country bounding box and subregion polygons.
//!
//! Geometry sources are accessed through [`GeometryProvider`]
//! so that the aggregation core does not depend on where
//! the boundaries come from.

mod geojson;

pub use self::geojson::GeoJsonProvider;

use crate::{errors::GeometryError, Float};
use geo::{BoundingRect, Contains, MultiPolygon, Point, Rect};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Rectangular geographic filter in degrees.
///
/// Longitudes follow the [-180, 180) convention,
/// which is also the convention of grids read by the program.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: Float,
    pub west: Float,
    pub south: Float,
    pub east: Float,
}

impl BoundingBox {
    pub fn new(north: Float, west: Float, south: Float, east: Float) -> Result<Self, GeometryError> {
        if north.is_nan() || south.is_nan() || north <= south {
            return Err(GeometryError::InvalidBoundingBox { north, south });
        }

        Ok(BoundingBox {
            north,
            west,
            south,
            east,
        })
    }

    /// Inclusive test whether the point lies within the box.
    pub fn contains(&self, lon: Float, lat: Float) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Box edges in the `[North, West, South, East]` order
    /// expected by the reanalysis archive.
    pub fn as_area(&self) -> [Float; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

/// Named subregion boundary in longitude/latitude.
#[derive(Clone, PartialEq, Debug)]
pub struct RegionPolygon {
    name: String,
    boundary: MultiPolygon<Float>,
    extent: Option<Rect<Float>>,
}

impl RegionPolygon {
    pub fn new(name: impl Into<String>, boundary: MultiPolygon<Float>) -> Self {
        let extent = boundary.bounding_rect();

        RegionPolygon {
            name: name.into(),
            boundary,
            extent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks if the point lies in the interior of the region.
    /// Points exactly on the boundary are treated as outside.
    pub fn contains(&self, lon: Float, lat: Float) -> bool {
        let extent = match self.extent {
            Some(extent) => extent,
            None => return false,
        };

        if lon < extent.min().x || lon > extent.max().x || lat < extent.min().y || lat > extent.max().y
        {
            return false;
        }

        let point = Point::new(lon, lat);
        self.boundary.0.iter().any(|polygon| polygon.contains(&point))
    }
}

/// Capability of resolving the geometries needed for an aggregation run.
pub trait GeometryProvider {
    /// Finds the bounding box of the country with given name.
    fn resolve_country_bbox(&self, name: &str) -> Result<BoundingBox, GeometryError>;

    /// Reads all subregion polygons from the boundary source,
    /// preserving their order.
    fn load_subregions(&self, source: &Path) -> Result<Vec<RegionPolygon>, GeometryError>;
}

/// Converts the longitude in GRIB convention (any positive value)
/// to the convention used by the program (between -180 and 180).
pub fn normalize_longitude(longitude: Float) -> Float {
    if longitude >= 180.0 {
        return longitude - 360.0;
    }

    longitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn square(west: Float, south: Float, east: Float, north: Float) -> MultiPolygon<Float> {
        let ring = LineString::from(vec![
            (west, south),
            (east, south),
            (east, north),
            (west, north),
            (west, south),
        ]);

        MultiPolygon(vec![Polygon::new(ring, vec![])])
    }

    #[test]
    fn bbox_is_inclusive() {
        let bbox = BoundingBox::new(10.0, -13.3, 6.9, -10.2).unwrap();

        assert!(bbox.contains(-13.3, 10.0));
        assert!(bbox.contains(-10.2, 6.9));
        assert!(bbox.contains(-12.0, 8.0));
        assert!(!bbox.contains(-13.31, 8.0));
        assert!(!bbox.contains(-12.0, 10.01));
        assert_eq!(bbox.as_area(), [10.0, -13.3, 6.9, -10.2]);
    }

    #[test]
    fn bbox_requires_north_above_south() {
        assert!(matches!(
            BoundingBox::new(6.0, -13.0, 7.0, -10.0),
            Err(GeometryError::InvalidBoundingBox { .. })
        ));
        assert!(BoundingBox::new(Float::NAN, -13.0, 7.0, -10.0).is_err());
    }

    #[test]
    fn region_contains_interior_only() {
        let region = RegionPolygon::new("Bo", square(0.0, 0.0, 2.0, 2.0));

        assert!(region.contains(1.0, 1.0));
        assert!(!region.contains(0.0, 1.0));
        assert!(!region.contains(3.0, 1.0));
        assert_eq!(region.name(), "Bo");
    }

    #[test]
    fn region_respects_holes_and_parts() {
        let outer = LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]);
        let hole = LineString::from(vec![(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0), (1.0, 1.0)]);
        let mut boundary = MultiPolygon(vec![Polygon::new(outer, vec![hole])]);
        boundary.0.extend(square(10.0, 10.0, 11.0, 11.0).0);

        let region = RegionPolygon::new("Kenema", boundary);

        assert!(region.contains(0.5, 0.5));
        assert!(!region.contains(2.0, 2.0));
        assert!(region.contains(10.5, 10.5));
        assert!(!region.contains(7.0, 7.0));
    }

    #[test]
    fn empty_region_contains_nothing() {
        let region = RegionPolygon::new("void", MultiPolygon(vec![]));

        assert!(region.extent.is_none());
        assert!(!region.contains(0.0, 0.0));
    }

    #[test]
    fn longitudes_normalized() {
        assert_eq!(normalize_longitude(346.7), 346.7 - 360.0);
        assert_eq!(normalize_longitude(180.0), -180.0);
        assert_eq!(normalize_longitude(-13.3), -13.3);
        assert_eq!(normalize_longitude(12.0), 12.0);
    }
}
