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

//! Sub-module reading boundaries from GeoJSON
//! feature collections.
//!
//! Only polygonal geometries are supported. Coordinates
//! are expected in WGS84 longitude/latitude, as GeoJSON mandates.

use super::{BoundingBox, GeometryProvider, RegionPolygon};
use crate::{errors::GeometryError, Float};
use geo::{BoundingRect, LineString, MultiPolygon, Polygon};
use log::{debug, warn};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

type Ring = Vec<Vec<Float>>;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// [`GeometryProvider`] backed by GeoJSON files on local storage.
///
/// Countries are looked up in a single collection by case-insensitive
/// match of `country_property`; subregion names are read from
/// `region_property` of each feature in the boundary source.
#[derive(Clone, Debug)]
pub struct GeoJsonProvider {
    countries: PathBuf,
    country_property: String,
    region_property: String,
}

impl GeoJsonProvider {
    pub fn new(
        countries: impl Into<PathBuf>,
        country_property: impl Into<String>,
        region_property: impl Into<String>,
    ) -> Self {
        GeoJsonProvider {
            countries: countries.into(),
            country_property: country_property.into(),
            region_property: region_property.into(),
        }
    }
}

impl GeometryProvider for GeoJsonProvider {
    fn resolve_country_bbox(&self, name: &str) -> Result<BoundingBox, GeometryError> {
        debug!("Resolving bounding box of {}", name);

        let collection = read_collection(&self.countries)?;
        let wanted = name.to_lowercase();

        let mut total: Option<(Float, Float, Float, Float)> = None;

        for (index, feature) in collection.features.iter().enumerate() {
            let matches = property_string(feature, &self.country_property)
                .map_or(false, |value| value.to_lowercase() == wanted);

            if !matches {
                continue;
            }

            let boundary = match feature_boundary(&self.countries, index, feature)? {
                Some(boundary) => boundary,
                None => continue,
            };

            if let Some(rect) = boundary.bounding_rect() {
                let (min, max) = (rect.min(), rect.max());
                total = Some(match total {
                    None => (min.x, min.y, max.x, max.y),
                    Some((min_x, min_y, max_x, max_y)) => (
                        min_x.min(min.x),
                        min_y.min(min.y),
                        max_x.max(max.x),
                        max_y.max(max.y),
                    ),
                });
            }
        }

        let (min_x, min_y, max_x, max_y) =
            total.ok_or_else(|| GeometryError::CountryNotFound(name.to_string()))?;

        BoundingBox::new(max_y, min_x, min_y, max_x)
    }

    fn load_subregions(&self, source: &Path) -> Result<Vec<RegionPolygon>, GeometryError> {
        debug!("Loading subregions from {}", source.display());

        let collection = read_collection(source)?;
        let mut regions = Vec::with_capacity(collection.features.len());
        let mut names = FxHashSet::default();

        for (index, feature) in collection.features.iter().enumerate() {
            let boundary = match feature_boundary(source, index, feature)? {
                Some(boundary) => boundary,
                None => {
                    warn!("Feature {} in {} has no geometry, skipping", index, source.display());
                    continue;
                }
            };

            let name = property_string(feature, &self.region_property).ok_or_else(|| {
                GeometryError::MissingProperty {
                    path: source.to_path_buf(),
                    feature: index,
                    property: self.region_property.clone(),
                }
            })?;

            // slices are keyed by region name
            if !names.insert(name.clone()) {
                return Err(GeometryError::DuplicateRegion {
                    path: source.to_path_buf(),
                    feature: index,
                    name,
                });
            }

            regions.push(RegionPolygon::new(name, boundary));
        }

        if regions.is_empty() {
            return Err(GeometryError::NoSubregions(source.to_path_buf()));
        }

        debug!("Loaded {} subregions", regions.len());

        Ok(regions)
    }
}

fn read_collection(path: &Path) -> Result<FeatureCollection, GeometryError> {
    let data = fs::read(path).map_err(|source| GeometryError::CantOpenSource {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&data).map_err(|source| GeometryError::CantDeserialize {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the property as string, numeric names are accepted as well.
fn property_string(feature: &Feature, property: &str) -> Option<String> {
    match feature.properties.as_ref()?.get(property)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn feature_boundary(
    path: &Path,
    index: usize,
    feature: &Feature,
) -> Result<Option<MultiPolygon<Float>>, GeometryError> {
    let geometry = match &feature.geometry {
        Some(geometry) => geometry,
        None => return Ok(None),
    };

    let malformed = || GeometryError::MalformedCoordinates {
        path: path.to_path_buf(),
        feature: index,
    };

    let polygons: Vec<Vec<Ring>> = match geometry.kind.as_str() {
        "Polygon" => {
            let rings: Vec<Ring> =
                serde_json::from_value(geometry.coordinates.clone()).map_err(|_| malformed())?;
            vec![rings]
        }
        "MultiPolygon" => {
            serde_json::from_value(geometry.coordinates.clone()).map_err(|_| malformed())?
        }
        other => {
            return Err(GeometryError::UnsupportedGeometry {
                path: path.to_path_buf(),
                feature: index,
                kind: other.to_string(),
            })
        }
    };

    let mut boundary = Vec::with_capacity(polygons.len());

    for rings in polygons {
        let mut rings = rings
            .into_iter()
            .map(|ring| ring_to_linestring(ring).ok_or_else(malformed))
            .collect::<Result<Vec<_>, _>>()?;

        if rings.is_empty() {
            return Err(malformed());
        }

        let exterior = rings.remove(0);
        boundary.push(Polygon::new(exterior, rings));
    }

    Ok(Some(MultiPolygon(boundary)))
}

/// Converts GeoJSON positions to a ring, dropping any altitude.
fn ring_to_linestring(ring: Ring) -> Option<LineString<Float>> {
    let mut coords = Vec::with_capacity(ring.len());

    for position in ring {
        if position.len() < 2 {
            return None;
        }
        coords.push((position[0], position[1]));
    }

    Some(LineString::from(coords))
}
