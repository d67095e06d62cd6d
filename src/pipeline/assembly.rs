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

//! Module responsible for turning the accumulated masked fields
//! into 3D tensors and the final table indexed by (region, month).

use super::accumulation::{Accumulation, BucketKey, MaskedSlice, MonthKey};
use crate::{errors::AssemblyError, Float};
use chrono::NaiveDateTime;
use log::debug;
use ndarray::{stack, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Time-ordered stack of masked fields with shape
/// `(timestamps, rows, cols)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableTensor {
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Array3<Float>,
}

impl VariableTensor {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn spatial_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.values.dim();
        (rows, cols)
    }
}

/// One row of the result table. `cells` are parallel
/// to the table columns, `None` marks a variable without data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub region: String,
    pub month: MonthKey,
    pub cells: Vec<Option<VariableTensor>>,
}

/// Table of tensors indexed by (region, month)
/// with one column per requested variable.
///
/// Rows are ordered by region name and then chronologically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl ResultTable {
    /// Checks that every row has a cell for each column
    /// and that the index is unique.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();

        for row in &self.rows {
            if row.cells.len() != self.columns.len() {
                return Err(format!(
                    "row ({}, {}) has {} cells for {} columns",
                    row.region,
                    row.month,
                    row.cells.len(),
                    self.columns.len()
                ));
            }

            if !seen.insert((row.region.as_str(), row.month)) {
                return Err(format!("duplicated row ({}, {})", row.region, row.month));
            }

            for (column, cell) in self.columns.iter().zip(&row.cells) {
                if let Some(tensor) = cell {
                    if tensor.timestamps.len() != tensor.values.len_of(Axis(0)) {
                        return Err(format!(
                            "tensor of {} in ({}, {}) has {} timestamps for {} slices",
                            column,
                            row.region,
                            row.month,
                            tensor.timestamps.len(),
                            tensor.values.len_of(Axis(0))
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Stacks every accumulation bucket into a tensor and builds
/// the result table with a column for each of `variables`.
pub fn assemble(accumulation: Accumulation, variables: &[String]) -> Result<ResultTable, AssemblyError> {
    debug!("Assembling tensors");

    let (mut buckets, observed) = accumulation.into_parts();
    let index: BTreeSet<(String, MonthKey)> = observed.into_iter().collect();

    let mut rows = Vec::with_capacity(index.len());

    for (region, month) in index {
        let mut cells = Vec::with_capacity(variables.len());

        for variable in variables {
            let key = BucketKey {
                region: region.clone(),
                month,
                variable: variable.clone(),
            };

            let cell = match buckets.remove(&key) {
                Some(slices) => Some(stack_slices(&key, slices)?),
                None => None,
            };

            cells.push(cell);
        }

        rows.push(TableRow {
            region,
            month,
            cells,
        });
    }

    debug!("Assembled table with {} rows", rows.len());

    Ok(ResultTable {
        columns: variables.to_vec(),
        rows,
    })
}

/// Sorts slices of one bucket by time and stacks them
/// along a new leading axis.
fn stack_slices(key: &BucketKey, mut slices: Vec<MaskedSlice>) -> Result<VariableTensor, AssemblyError> {
    slices.sort_by_key(MaskedSlice::sort_key);

    let expected = slices[0].field.dim();

    for slice in &slices {
        if slice.field.dim() != expected {
            return Err(AssemblyError::ShapeMismatch {
                region: key.region.clone(),
                month: key.month,
                variable: key.variable.clone(),
                timestamp: slice.valid_time,
                expected,
                found: slice.field.dim(),
            });
        }
    }

    let views: Vec<ArrayView2<Float>> = slices.iter().map(|s| s.field.view()).collect();
    let values = stack(Axis(0), &views).map_err(|_| AssemblyError::ShapeMismatch {
        region: key.region.clone(),
        month: key.month,
        variable: key.variable.clone(),
        timestamp: slices[0].valid_time,
        expected,
        found: expected,
    })?;

    let tensor = VariableTensor {
        timestamps: slices.iter().map(|s| s.valid_time).collect(),
        values,
    };

    debug!(
        "Stacked {} fields of {} for ({}, {}) on {:?} grid",
        tensor.len(),
        key.variable,
        key.region,
        key.month,
        tensor.spatial_shape()
    );

    Ok(tensor)
}

#[cfg(test)]
impl ResultTable {
    pub fn row(&self, region: &str, month: MonthKey) -> Option<&TableRow> {
        self.rows
            .iter()
            .find(|row| row.region == region && row.month == month)
    }

    /// Tensor of the variable in given row, `None` if the row
    /// does not exist or the variable had no data there.
    pub fn get(&self, region: &str, month: MonthKey, variable: &str) -> Option<&VariableTensor> {
        let column = self.columns.iter().position(|c| c == variable)?;
        self.row(region, month)?.cells[column].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn key(region: &str, variable: &str) -> BucketKey {
        BucketKey {
            region: region.to_string(),
            month: MonthKey::new(2020, 1).unwrap(),
            variable: variable.to_string(),
        }
    }

    fn slice(valid_time: NaiveDateTime, origin: (usize, usize), shape: (usize, usize), value: Float) -> MaskedSlice {
        MaskedSlice {
            valid_time,
            origin,
            field: Array2::from_elem(shape, value),
        }
    }

    fn variables() -> Vec<String> {
        vec!["2m_temperature".to_string(), "total_precipitation".to_string()]
    }

    #[test]
    fn tensors_ordered_by_time() {
        let mut acc = Accumulation::new();
        acc.push(key("Bo", "2m_temperature"), slice(at(2, 0), (1, 0), (2, 3), 3.0));
        acc.push(key("Bo", "2m_temperature"), slice(at(1, 6), (0, 1), (2, 3), 2.0));
        acc.push(key("Bo", "2m_temperature"), slice(at(1, 0), (0, 0), (2, 3), 1.0));

        let table = assemble(acc, &variables()).unwrap();
        let month = MonthKey::new(2020, 1).unwrap();
        let tensor = table.get("Bo", month, "2m_temperature").unwrap();

        assert_eq!(tensor.values.dim(), (3, 2, 3));
        assert_eq!(tensor.len(), 3);
        assert_eq!(tensor.spatial_shape(), (2, 3));
        assert!(tensor.timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(tensor.values[[0, 0, 0]], 1.0);
        assert_eq!(tensor.values[[1, 1, 2]], 2.0);
        assert_eq!(tensor.values[[2, 0, 1]], 3.0);
    }

    #[test]
    fn equal_timestamps_keep_origin_order() {
        let mut acc = Accumulation::new();
        acc.push(key("Bo", "2m_temperature"), slice(at(1, 0), (1, 0), (1, 1), 20.0));
        acc.push(key("Bo", "2m_temperature"), slice(at(1, 0), (0, 5), (1, 1), 10.0));

        let table = assemble(acc, &variables()).unwrap();
        let tensor = table
            .get("Bo", MonthKey::new(2020, 1).unwrap(), "2m_temperature")
            .unwrap();

        assert_eq!(tensor.values.iter().copied().collect::<Vec<_>>(), vec![10.0, 20.0]);
    }

    #[test]
    fn absent_variables_are_explicit() {
        let mut acc = Accumulation::new();
        acc.push(key("Bo", "2m_temperature"), slice(at(1, 0), (0, 0), (1, 1), 1.0));
        acc.observe("Kono", MonthKey::new(2020, 1).unwrap());

        let table = assemble(acc, &variables()).unwrap();

        assert_eq!(table.columns, variables());
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows.iter().all(|row| row.cells.len() == 2));

        let bo = table.row("Bo", MonthKey::new(2020, 1).unwrap()).unwrap();
        assert!(bo.cells[0].is_some());
        assert!(bo.cells[1].is_none());

        let kono = table.row("Kono", MonthKey::new(2020, 1).unwrap()).unwrap();
        assert!(kono.cells.iter().all(Option::is_none));
        assert!(table.check_consistency().is_ok());
    }

    #[test]
    fn rows_sorted_by_region_then_month() {
        let mut acc = Accumulation::new();
        acc.observe("Kono", MonthKey::new(2020, 2).unwrap());
        acc.observe("Bo", MonthKey::new(2020, 2).unwrap());
        acc.observe("Kono", MonthKey::new(2019, 12).unwrap());

        let table = assemble(acc, &variables()).unwrap();
        let index: Vec<String> = table
            .rows
            .iter()
            .map(|row| format!("{}/{}", row.region, row.month))
            .collect();

        assert_eq!(index, vec!["Bo/2020-02", "Kono/2019-12", "Kono/2020-02"]);
    }

    #[test]
    fn mismatched_shapes_rejected() {
        let mut acc = Accumulation::new();
        acc.push(key("Bo", "total_precipitation"), slice(at(1, 0), (0, 0), (2, 2), 1.0));
        acc.push(key("Bo", "total_precipitation"), slice(at(1, 6), (1, 0), (3, 2), 1.0));

        let err = assemble(acc, &variables()).unwrap_err();

        match err {
            AssemblyError::ShapeMismatch {
                region,
                variable,
                expected,
                found,
                timestamp,
                ..
            } => {
                assert_eq!(region, "Bo");
                assert_eq!(variable, "total_precipitation");
                assert_eq!(expected, (2, 2));
                assert_eq!(found, (3, 2));
                assert_eq!(timestamp, at(1, 6));
            }
        }
    }

    #[test]
    fn inconsistent_table_detected() {
        let mut acc = Accumulation::new();
        acc.observe("Bo", MonthKey::new(2020, 1).unwrap());

        let mut table = assemble(acc, &variables()).unwrap();
        table.rows[0].cells.pop();
        assert!(table.check_consistency().is_err());

        table.rows[0].cells.push(None);
        table.rows.push(table.rows[0].clone());
        assert!(table.check_consistency().is_err());
    }
}
