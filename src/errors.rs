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

use crate::{pipeline::MonthKey, Float};
use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Error while reading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot set memory limit of {0} MB")]
    MemoryLimit(usize),

    #[error("Error while resolving geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Error while reading input data: {0}")]
    Input(#[from] InputError),

    #[error("Error while assembling tensors: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Error while writing output: {0}")]
    Persist(#[from] PersistError),

    #[error("Output is not writable: {0}")]
    FaultyOutput(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open config file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize config file: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("Cannot open boundary source {}: {source}", .path.display())]
    CantOpenSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot deserialize boundary source {}: {source}", .path.display())]
    CantDeserialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Feature {feature} in {} has unsupported geometry type {kind}", .path.display())]
    UnsupportedGeometry {
        path: PathBuf,
        feature: usize,
        kind: String,
    },

    #[error("Feature {feature} in {} has malformed coordinates", .path.display())]
    MalformedCoordinates { path: PathBuf, feature: usize },

    #[error("Feature {feature} in {} has no property {property}", .path.display())]
    MissingProperty {
        path: PathBuf,
        feature: usize,
        property: String,
    },

    #[error("Country '{0}' not found")]
    CountryNotFound(String),

    #[error("Boundary source {} contains no subregion polygons", .0.display())]
    NoSubregions(PathBuf),

    #[error("Feature {feature} in {} repeats subregion name '{name}'", .path.display())]
    DuplicateRegion {
        path: PathBuf,
        feature: usize,
        name: String,
    },

    #[error("Bounding box north edge {north} must lie above south edge {south}")]
    InvalidBoundingBox { north: Float, south: Float },
}

#[derive(Error, Debug)]
pub enum InputError {
    #[cfg(feature = "grib")]
    #[error("Cannot decode GRIB file {}: {source}", .path.display())]
    Codes {
        path: PathBuf,
        source: eccodes::errors::CodesError,
    },

    #[error("Program was built without GRIB support, cannot read {}", .0.display())]
    GribDisabled(PathBuf),

    #[error("Key {key} of message {index} in {} has unexpected type", .path.display())]
    IncorrectKeyType {
        path: PathBuf,
        index: usize,
        key: &'static str,
    },

    #[error("Message {index} in {} holds {found} values for a grid of {expected} cells", .path.display())]
    ValuesLength {
        path: PathBuf,
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Message {index} in {} has invalid validity date {date} time {time}", .path.display())]
    InvalidTimestamp {
        path: PathBuf,
        index: usize,
        date: i64,
        time: i64,
    },

    #[error("Input file {} does not exist in the archive", .0.display())]
    MissingFile(PathBuf),
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error(
        "Field of shape {found:?} at {timestamp} does not match shape {expected:?} \
        for region '{region}', month {month}, variable {variable}"
    )]
    ShapeMismatch {
        region: String,
        month: MonthKey,
        variable: String,
        timestamp: NaiveDateTime,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Cannot access output file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot (de)serialize result table: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Cannot write CSV export: {0}")]
    Csv(#[from] csv::Error),

    #[error("Result table is malformed: {0}")]
    Malformed(String),
}
