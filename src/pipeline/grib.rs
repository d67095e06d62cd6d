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

//! Module responsible for reading grid messages
//! from input files.
//!
//! Files are decoded completely before any message is handed
//! over, so a file either yields all its messages or an error.

use crate::{errors::InputError, pipeline::accumulation::MonthKey, Float};
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::Array2;
use std::path::Path;

#[cfg(feature = "grib")]
use crate::pipeline::geometry::normalize_longitude;
#[cfg(feature = "grib")]
use eccodes::{
    CodesHandle, FallibleIterator,
    KeyType::{Float as FloatKey, FloatArray, Int, Str},
    KeyedMessage,
    ProductKind::GRIB,
};
#[cfg(feature = "grib")]
use log::debug;
#[cfg(feature = "grib")]
use std::path::PathBuf;

/// One 2D field of a single variable at a single timestamp.
///
/// Arrays are indexed `[row, col]`, rows run along the latitude
/// axis as stored in the file. `lats` and `lons` hold
/// coordinates of each cell.
#[derive(Clone, PartialEq, Debug)]
pub struct GridMessage {
    pub name: String,
    pub short_name: String,
    pub valid_time: NaiveDateTime,
    pub values: Array2<Float>,
    pub lats: Array2<Float>,
    pub lons: Array2<Float>,
}

impl GridMessage {
    pub fn month(&self) -> MonthKey {
        MonthKey::of(&self.valid_time)
    }

    /// Checks if both messages are defined on the same grid.
    pub fn same_grid(&self, other: &GridMessage) -> bool {
        self.lats == other.lats && self.lons == other.lons
    }
}

/// Capability of decoding a raw grid file into messages.
pub trait MessageSource: Sync {
    fn read_messages(&self, path: &Path) -> Result<Vec<GridMessage>, InputError>;
}

/// [`MessageSource`] for GRIB files, decoded with ecCodes.
#[derive(Copy, Clone, Debug, Default)]
pub struct GribReader;

impl MessageSource for GribReader {
    #[cfg(feature = "grib")]
    fn read_messages(&self, path: &Path) -> Result<Vec<GridMessage>, InputError> {
        debug!("Decoding {}", path.display());

        let codes_error = |source| InputError::Codes {
            path: path.to_path_buf(),
            source,
        };

        let handle = CodesHandle::new_from_file(path, GRIB).map_err(codes_error)?;
        let raw: Vec<KeyedMessage> = handle.collect().map_err(codes_error)?;

        let reader = MessageDecoder {
            path: path.to_path_buf(),
        };

        let messages = raw
            .iter()
            .enumerate()
            .map(|(index, msg)| reader.decode(index, msg))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Decoded {} messages from {}", messages.len(), path.display());

        Ok(messages)
    }

    #[cfg(not(feature = "grib"))]
    fn read_messages(&self, path: &Path) -> Result<Vec<GridMessage>, InputError> {
        Err(InputError::GribDisabled(path.to_path_buf()))
    }
}

#[cfg(feature = "grib")]
struct MessageDecoder {
    path: PathBuf,
}

#[cfg(feature = "grib")]
impl MessageDecoder {
    fn decode(&self, index: usize, msg: &KeyedMessage) -> Result<GridMessage, InputError> {
        let name = self.read_str(index, msg, "name")?;
        let short_name = self.read_str(index, msg, "shortName")?;

        let date = self.read_int(index, msg, "validityDate")?;
        let time = self.read_int(index, msg, "validityTime")?;
        let valid_time =
            parse_validity(date, time).ok_or_else(|| InputError::InvalidTimestamp {
                path: self.path.clone(),
                index,
                date,
                time,
            })?;

        let ni = self.read_int(index, msg, "Ni")?;
        let nj = self.read_int(index, msg, "Nj")?;
        if ni < 1 || nj < 1 {
            return Err(InputError::IncorrectKeyType {
                path: self.path.clone(),
                index,
                key: "Ni",
            });
        }
        let shape = (nj as usize, ni as usize);

        let mut values = self.read_floats(index, msg, "values", shape)?;
        let lats = self.read_floats(index, msg, "latitudes", shape)?;
        let mut lons = self.read_floats(index, msg, "longitudes", shape)?;

        if self.read_int(index, msg, "bitmapPresent")? == 1 {
            let missing = self.read_float(index, msg, "missingValue")?;
            values.mapv_inplace(|v| if v == missing { Float::NAN } else { v });
        }

        lons.mapv_inplace(normalize_longitude);

        Ok(GridMessage {
            name,
            short_name,
            valid_time,
            values,
            lats,
            lons,
        })
    }

    fn codes_error(&self, source: eccodes::errors::CodesError) -> InputError {
        InputError::Codes {
            path: self.path.clone(),
            source,
        }
    }

    fn key_error(&self, index: usize, key: &'static str) -> InputError {
        InputError::IncorrectKeyType {
            path: self.path.clone(),
            index,
            key,
        }
    }

    fn read_str(
        &self,
        index: usize,
        msg: &KeyedMessage,
        key: &'static str,
    ) -> Result<String, InputError> {
        match msg.read_key(key).map_err(|e| self.codes_error(e))?.value {
            Str(value) => Ok(value),
            _ => Err(self.key_error(index, key)),
        }
    }

    fn read_int(&self, index: usize, msg: &KeyedMessage, key: &'static str) -> Result<i64, InputError> {
        match msg.read_key(key).map_err(|e| self.codes_error(e))?.value {
            Int(value) => Ok(value),
            _ => Err(self.key_error(index, key)),
        }
    }

    fn read_float(
        &self,
        index: usize,
        msg: &KeyedMessage,
        key: &'static str,
    ) -> Result<Float, InputError> {
        match msg.read_key(key).map_err(|e| self.codes_error(e))?.value {
            FloatKey(value) => Ok(value),
            Int(value) => Ok(value as Float),
            _ => Err(self.key_error(index, key)),
        }
    }

    /// Reads an array key and reshapes it into `shape`.
    ///
    /// Values in GRIB are stored row-by-row with the i index
    /// (west-east) changing fastest, which matches the
    /// row-major layout of `(Nj, Ni)` array.
    fn read_floats(
        &self,
        index: usize,
        msg: &KeyedMessage,
        key: &'static str,
        shape: (usize, usize),
    ) -> Result<Array2<Float>, InputError> {
        let values = match msg.read_key(key).map_err(|e| self.codes_error(e))?.value {
            FloatArray(values) => values,
            _ => return Err(self.key_error(index, key)),
        };

        if values.len() != shape.0 * shape.1 {
            return Err(InputError::ValuesLength {
                path: self.path.clone(),
                index,
                expected: shape.0 * shape.1,
                found: values.len(),
            });
        }

        Array2::from_shape_vec(shape, values).map_err(|_| self.key_error(index, key))
    }
}

/// Combines GRIB `validityDate` (YYYYMMDD) and
/// `validityTime` (HHMM) keys into a timestamp.
pub fn parse_validity(date: i64, time: i64) -> Option<NaiveDateTime> {
    if date < 0 || time < 0 {
        return None;
    }

    let year = (date / 10_000) as i32;
    let month = ((date / 100) % 100) as u32;
    let day = (date % 100) as u32;

    let hour = (time / 100) as u32;
    let minute = (time % 100) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn validity_keys_combined() {
        let datetime = parse_validity(20200131, 1800).unwrap();
        assert_eq!(datetime.to_string(), "2020-01-31 18:00:00");

        let datetime = parse_validity(20200201, 0).unwrap();
        assert_eq!(datetime.to_string(), "2020-02-01 00:00:00");
    }

    #[test]
    fn invalid_validity_rejected() {
        assert!(parse_validity(20200230, 0).is_none());
        assert!(parse_validity(20200101, 2400).is_none());
        assert!(parse_validity(20200101, 1261).is_none());
        assert!(parse_validity(-1, 0).is_none());
    }

    #[test]
    fn message_month_from_timestamp() {
        let msg = GridMessage {
            name: "2 metre temperature".to_string(),
            short_name: "2t".to_string(),
            valid_time: parse_validity(20191231, 1800).unwrap(),
            values: array![[1.0, 2.0]],
            lats: array![[0.0, 0.0]],
            lons: array![[0.0, 1.0]],
        };

        assert_eq!(msg.month().to_string(), "2019-12");

        let mut shifted = msg.clone();
        assert!(msg.same_grid(&shifted));
        shifted.lons[[0, 1]] = 2.0;
        assert!(!msg.same_grid(&shifted));
    }

    #[cfg(not(feature = "grib"))]
    #[test]
    fn reader_without_grib_support_fails() {
        let result = GribReader.read_messages(Path::new("data/area_2020_01.grib"));
        assert!(matches!(result, Err(InputError::GribDisabled(_))));
    }

    #[cfg(feature = "grib")]
    #[test]
    fn missing_file_is_format_error() {
        let result = GribReader.read_messages(Path::new("./does-not-exist/area_2020_01.grib"));
        assert!(matches!(result, Err(InputError::Codes { .. })));
    }
}
