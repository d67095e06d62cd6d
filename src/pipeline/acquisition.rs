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

//! Module describing acquisition of raw grid files.
//!
//! Downloading from the reanalysis archive is done outside
//! of this program; [`LocalArchive`] only resolves monthly
//! files that are expected to be already on local storage.

use super::geometry::BoundingBox;
use crate::errors::InputError;
use log::debug;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Request for raw grids of one area over a date range.
#[derive(Clone, PartialEq, Debug)]
pub struct GridRequest {
    /// Area name used in file names, usually the country name.
    pub area_name: String,
    pub bbox: BoundingBox,
    /// Descriptive names of requested variables.
    pub variables: Vec<String>,
    pub start_year: i32,
    pub end_year: i32,
    pub months: Vec<u32>,
    pub days: Vec<u32>,
    pub times: Vec<String>,
}

impl GridRequest {
    /// All (year, month) pairs covered by the request,
    /// in chronological order of years and requested order of months.
    pub fn periods(&self) -> Vec<(i32, u32)> {
        (self.start_year..=self.end_year)
            .flat_map(|year| self.months.iter().map(move |&month| (year, month)))
            .collect()
    }

    /// Name of the file holding data of given month:
    /// `<area>_<year>_<month>.<extension>`.
    pub fn file_name(&self, year: i32, month: u32, extension: &str) -> String {
        format!(
            "{}_{}_{:02}.{}",
            self.area_name.replace(' ', "_"),
            year,
            month,
            extension
        )
    }

    /// Request body for the reanalysis archive API
    /// covering one month.
    pub fn archive_request(&self, year: i32, month: u32) -> Value {
        json!({
            "product_type": ["reanalysis"],
            "variable": self.variables,
            "year": [year.to_string()],
            "month": [format!("{:02}", month)],
            "day": self.days.iter().map(|d| format!("{:02}", d)).collect::<Vec<_>>(),
            "time": self.times,
            "data_format": "grib",
            "download_format": "unarchived",
            "area": self.bbox.as_area(),
        })
    }
}

/// Capability of providing local paths of raw grid files
/// for a request, one file per (year, month).
pub trait GridSource {
    fn fetch(&self, request: &GridRequest) -> Result<Vec<PathBuf>, InputError>;
}

/// [`GridSource`] with files already present in a local directory.
#[derive(Clone, Debug)]
pub struct LocalArchive {
    data_dir: PathBuf,
    extension: String,
}

impl LocalArchive {
    pub fn new(data_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        LocalArchive {
            data_dir: data_dir.into(),
            extension: extension.into(),
        }
    }
}

impl GridSource for LocalArchive {
    fn fetch(&self, request: &GridRequest) -> Result<Vec<PathBuf>, InputError> {
        let mut files = vec![];

        for (year, month) in request.periods() {
            let path = self
                .data_dir
                .join(request.file_name(year, month, &self.extension));

            if !path.is_file() {
                debug!(
                    "Missing {}, it can be downloaded with request: {}",
                    path.display(),
                    request.archive_request(year, month)
                );
                return Err(InputError::MissingFile(path));
            }

            files.push(path);
        }

        debug!("Resolved {} input files", files.len());

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    fn request() -> GridRequest {
        GridRequest {
            area_name: "Sierra Leone".to_string(),
            bbox: BoundingBox::new(9.996, -13.301, 6.919, -10.282).unwrap(),
            variables: vec!["2m_temperature".to_string(), "total_precipitation".to_string()],
            start_year: 2020,
            end_year: 2021,
            months: vec![1, 2],
            days: vec![1, 2, 3],
            times: vec!["00:00".to_string(), "12:00".to_string()],
        }
    }

    #[test]
    fn periods_cover_all_years_and_months() {
        assert_eq!(
            request().periods(),
            vec![(2020, 1), (2020, 2), (2021, 1), (2021, 2)]
        );
    }

    #[test]
    fn file_names_follow_convention() {
        assert_eq!(
            request().file_name(2020, 1, "grib"),
            "Sierra_Leone_2020_01.grib"
        );
    }

    #[test]
    fn archive_request_body() {
        let body = request().archive_request(2021, 2);

        assert_eq!(body["year"], json!(["2021"]));
        assert_eq!(body["month"], json!(["02"]));
        assert_eq!(body["day"], json!(["01", "02", "03"]));
        assert_eq!(body["area"], json!([9.996, -13.301, 6.919, -10.282]));
        assert_eq!(body["variable"][1], "total_precipitation");
    }

    #[test]
    fn local_archive_resolves_files() {
        let dir = env::temp_dir().join(format!("rwt-archive-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let archive = LocalArchive::new(&dir, "grib");
        let missing = archive.fetch(&request());
        assert!(matches!(missing, Err(InputError::MissingFile(_))));

        for (year, month) in request().periods() {
            fs::write(dir.join(request().file_name(year, month, "grib")), b"GRIB").unwrap();
        }

        let files = archive.fetch(&request()).unwrap();
        assert_eq!(files.len(), 4);
        assert!(files[3].ends_with("Sierra_Leone_2021_02.grib"));
    }
}
