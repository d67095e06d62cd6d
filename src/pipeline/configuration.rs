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

//! Module responsible for parsing and checking the configuration file.
//!
//! The configuration file uses [YAML](https://en.wikipedia.org/wiki/YAML)
//! and `serde` to enforce strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml` so you can check this documentation
//! for more details how to set the config file.

use super::clipping::VariableSpec;
use crate::{
    constants::{DEFAULT_PARAM_MAPPING, DEFAULT_TIMES},
    errors::ConfigError,
};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

/// Fields describing the country whose grids are aggregated.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Area {
    /// Country name, matched case-insensitively.
    /// Also used (with spaces replaced by underscores)
    /// in the names of input files.
    pub country: String,

    /// GeoJSON collection with country boundaries.
    pub countries_source: PathBuf,

    /// _(Optional)_ Feature property holding the country name.
    ///
    /// Defaults to `ADMIN`.
    #[serde(default = "Area::default_name_property")]
    pub name_property: String,
}

impl Area {
    fn default_name_property() -> String {
        "ADMIN".to_string()
    }
}

/// Fields describing subregion boundaries.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Regions {
    /// GeoJSON collection with subregion polygons.
    pub source: PathBuf,

    /// _(Optional)_ Feature property holding the subregion name.
    ///
    /// Defaults to `shapeName`.
    #[serde(default = "Regions::default_name_property")]
    pub name_property: String,
}

impl Regions {
    fn default_name_property() -> String {
        "shapeName".to_string()
    }
}

/// Fields with the requested date range.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Period {
    pub start_year: i32,

    /// Last year of the range (inclusive).
    /// Cannot be smaller than `start_year`.
    pub end_year: i32,

    /// Months (`1` to `12`) requested in each year.
    pub months: Vec<u32>,

    /// _(Optional)_ Days of month requested from the archive.
    ///
    /// Defaults to all days (`1` to `31`).
    #[serde(default = "Period::default_days")]
    pub days: Vec<u32>,

    /// _(Optional)_ Hours of day requested from the archive.
    ///
    /// Defaults to `00:00`, `06:00`, `12:00` and `18:00`.
    #[serde(default = "Period::default_times")]
    pub times: Vec<String>,
}

impl Period {
    fn default_days() -> Vec<u32> {
        (1..=31).collect()
    }

    fn default_times() -> Vec<String> {
        DEFAULT_TIMES.iter().map(|t| t.to_string()).collect()
    }

    /// Checks if the date range is valid.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.end_year < self.start_year {
            return Err(ConfigError::OutOfBounds(
                "End year cannot be before start year",
            ));
        }

        if self.months.is_empty() || self.months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(ConfigError::OutOfBounds(
                "Months must be a non-empty list of values between 1 and 12",
            ));
        }

        if self.days.is_empty() || self.days.iter().any(|d| !(1..=31).contains(d)) {
            return Err(ConfigError::OutOfBounds(
                "Days must be a non-empty list of values between 1 and 31",
            ));
        }

        Ok(())
    }
}

/// Fields with information about input files location.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Input {
    /// Directory with monthly GRIB files named
    /// `<country>_<year>_<month>.<extension>`.
    pub data_dir: PathBuf,

    /// _(Optional)_ Extension of input files.
    ///
    /// Defaults to `grib`.
    #[serde(default = "Input::default_extension")]
    pub extension: String,
}

impl Input {
    fn default_extension() -> String {
        "grib".to_string()
    }
}

/// Fields with information about output files.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Output {
    /// Path of the serialized result table.
    pub table: PathBuf,

    /// _(Optional)_ Path of additional flat CSV export.
    #[serde(default)]
    pub csv: Option<PathBuf>,

    /// _(Optional)_ Allow replacing existing output files.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub overwrite: bool,
}

/// _(Optional)_ Fields controlling the processing.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Processing {
    /// _(Optional)_ Stop the run on the first input file that
    /// cannot be decoded. When `false` such files are skipped
    /// with a warning, which can make the results incomplete.
    ///
    /// Defaults to `true`.
    #[serde(default = "Processing::default_fail_fast")]
    pub fail_fast: bool,

    /// _(Optional)_ Show progress bar of processed files.
    ///
    /// Defaults to `true`.
    #[serde(default = "Processing::default_progress")]
    pub progress: bool,
}

impl Processing {
    fn default_fail_fast() -> bool {
        true
    }

    fn default_progress() -> bool {
        true
    }
}

impl Default for Processing {
    fn default() -> Self {
        Processing {
            fail_fast: Processing::default_fail_fast(),
            progress: Processing::default_progress(),
        }
    }
}

/// _(Optional)_ Fields with information about
/// resources available for the program.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used by the program.
    /// Input files are processed in parallel by up to
    /// this number of workers.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit for the program in MB.
    /// Useful for enabling meaningful Out-of-memory error messages.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    ///
    /// Masked fields of all files are kept in memory until
    /// the tensors are assembled, so long date ranges over
    /// fine grids can exhaust the system memory. With capped
    /// allocator the process aborts with OOM error message instead
    /// of being killed by the system without any information.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub area: Area,

    pub regions: Regions,

    pub period: Period,

    /// _(Optional)_ Requested variables. Each entry has
    /// a descriptive `name` and optional GRIB `short_name`.
    ///
    /// Defaults to the standard ERA5 single-level parameter set.
    #[serde(default = "Config::default_variables")]
    pub variables: Vec<VariableSpec>,

    pub input: Input,

    pub output: Output,

    #[serde(default)]
    pub processing: Processing,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.period.check_bounds()?;
        config.resources.check_bounds()?;
        config.check_variables()?;

        Ok(config)
    }

    fn default_variables() -> Vec<VariableSpec> {
        DEFAULT_PARAM_MAPPING
            .iter()
            .map(|(name, short_name)| VariableSpec::new(*name, Some(*short_name)))
            .collect()
    }

    fn check_variables(&self) -> Result<(), ConfigError> {
        if self.variables.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "At least one variable must be requested",
            ));
        }

        let mut names = HashSet::new();
        if !self.variables.iter().all(|v| names.insert(v.name.as_str())) {
            return Err(ConfigError::OutOfBounds("Variable names must be unique"));
        }

        Ok(())
    }
}
