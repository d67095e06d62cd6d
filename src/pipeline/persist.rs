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

//! Module responsible for writing the result table
//! to durable storage and reading it back.
//!
//! The table is stored as YAML, which keeps the (region, month)
//! index, tensor shapes and NaN values (as `.nan`). Floats are
//! written in their shortest round-trip representation, so reading
//! and writing a table again produces identical content.

use super::assembly::ResultTable;
use crate::errors::PersistError;
use log::debug;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

/// Serializes the table into a YAML file at `path`.
pub fn save_table(table: &ResultTable, path: &Path) -> Result<(), PersistError> {
    debug!("Saving result table to {}", path.display());

    let mut writer = BufWriter::new(File::create(path)?);
    serde_yaml::to_writer(&mut writer, table)?;
    writer.flush()?;

    Ok(())
}

/// Reads a table previously written with [`save_table`].
pub fn load_table(path: &Path) -> Result<ResultTable, PersistError> {
    debug!("Loading result table from {}", path.display());

    let data = fs::read(path)?;
    let table: ResultTable = serde_yaml::from_slice(&data)?;
    table.check_consistency().map_err(PersistError::Malformed)?;

    Ok(table)
}

/// Writes the table in flat long form, one line per
/// retained (non-missing) cell of every tensor.
///
/// Masked-out cells and absent variables produce no lines.
pub fn export_csv(table: &ResultTable, path: &Path) -> Result<(), PersistError> {
    debug!("Exporting result table to {}", path.display());

    let mut out_file = csv::Writer::from_path(path)?;

    out_file.write_record(&[
        "region",
        "month",
        "variable",
        "timestamp",
        "row",
        "col",
        "value",
    ])?;

    for row in &table.rows {
        let month = row.month.to_string();

        for (variable, cell) in table.columns.iter().zip(&row.cells) {
            let tensor = match cell {
                Some(tensor) => tensor,
                None => continue,
            };

            for ((t, i, j), value) in tensor.values.indexed_iter() {
                if value.is_nan() {
                    continue;
                }

                out_file.write_record(&[
                    row.region.clone(),
                    month.clone(),
                    variable.clone(),
                    tensor.timestamps[t].format("%Y-%m-%dT%H:%M:%S").to_string(),
                    i.to_string(),
                    j.to_string(),
                    value.to_string(),
                ])?;
            }
        }
    }

    out_file.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::{
            accumulation::MonthKey,
            assembly::{TableRow, VariableTensor},
        },
        Float,
    };
    use chrono::NaiveDate;
    use ndarray::Array3;
    use std::{env, path::PathBuf};

    fn temp_path(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("rwt-persist-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn sample_table() -> ResultTable {
        let timestamps = vec![
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(6, 0, 0).unwrap(),
        ];

        let mut values = Array3::from_elem((2, 2, 3), Float::NAN);
        values[[0, 0, 1]] = 26.850000000000023;
        values[[1, 1, 2]] = -0.1;
        values[[1, 0, 0]] = 1.0e-12;

        ResultTable {
            columns: vec!["2m_temperature".to_string(), "total_precipitation".to_string()],
            rows: vec![
                TableRow {
                    region: "Bo".to_string(),
                    month: MonthKey::new(2020, 1).unwrap(),
                    cells: vec![Some(VariableTensor { timestamps, values }), None],
                },
                TableRow {
                    region: "Kono".to_string(),
                    month: MonthKey::new(2020, 1).unwrap(),
                    cells: vec![None, None],
                },
            ],
        }
    }

    /// Equality treating NaN as equal to NaN.
    fn same_tables(a: &ResultTable, b: &ResultTable) -> bool {
        if a.columns != b.columns || a.rows.len() != b.rows.len() {
            return false;
        }

        a.rows.iter().zip(&b.rows).all(|(ra, rb)| {
            ra.region == rb.region
                && ra.month == rb.month
                && ra.cells.len() == rb.cells.len()
                && ra.cells.iter().zip(&rb.cells).all(|(ca, cb)| match (ca, cb) {
                    (None, None) => true,
                    (Some(ta), Some(tb)) => {
                        ta.timestamps == tb.timestamps
                            && ta.values.dim() == tb.values.dim()
                            && ta
                                .values
                                .iter()
                                .zip(tb.values.iter())
                                .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
                    }
                    _ => false,
                })
        })
    }

    #[test]
    fn table_round_trip() {
        let table = sample_table();
        let path = temp_path("round-trip.yaml");

        save_table(&table, &path).unwrap();
        let loaded = load_table(&path).unwrap();

        assert!(same_tables(&table, &loaded));

        let tensor = loaded.get("Bo", MonthKey::new(2020, 1).unwrap(), "2m_temperature").unwrap();
        assert_eq!(tensor.values.dim(), (2, 2, 3));
        assert_eq!(tensor.values[[0, 0, 1]], 26.850000000000023);
        assert!(tensor.values[[0, 0, 0]].is_nan());
    }

    #[test]
    fn reserialization_is_identical() {
        let first = temp_path("first.yaml");
        let second = temp_path("second.yaml");

        save_table(&sample_table(), &first).unwrap();
        save_table(&load_table(&first).unwrap(), &second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn malformed_table_rejected() {
        let mut table = sample_table();
        table.rows[1].cells.pop();

        let path = temp_path("malformed.yaml");
        save_table(&table, &path).unwrap();

        assert!(matches!(load_table(&path), Err(PersistError::Malformed(_))));
    }

    #[test]
    fn csv_export_skips_missing_cells() {
        let path = temp_path("export.csv");
        export_csv(&sample_table(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();

        assert_eq!(records.len(), 3);
        assert_eq!(&records[0][0], "Bo");
        assert_eq!(&records[0][1], "2020-01");
        assert_eq!(&records[0][2], "2m_temperature");
        assert_eq!(&records[0][3], "2020-01-01T00:00:00");
        assert_eq!(&records[0][4], "0");
        assert_eq!(&records[0][5], "1");
        assert_eq!(records[0][6].parse::<Float>().unwrap(), 26.850000000000023);
        assert_eq!(&records[2][3], "2020-01-01T06:00:00");
    }
}
