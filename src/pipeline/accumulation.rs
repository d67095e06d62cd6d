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

//! Module holding the mutable state of an aggregation run:
//! masked fields collected per (region, month, variable).
//!
//! Each worker fills its own [`Accumulation`] and partial
//! accumulations are merged by concatenation. Order of merged
//! buckets is not meaningful, slices are sorted only when tensors
//! are assembled.

use crate::Float;
use chrono::{Datelike, NaiveDateTime};
use ndarray::Array2;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

/// Calendar month, rendered and serialized as `"YYYY-MM"`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return None;
        }

        Some(MonthKey { year, month })
    }

    /// Month of the given timestamp.
    pub fn of(datetime: &NaiveDateTime) -> Self {
        MonthKey {
            year: datetime.year(),
            month: datetime.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for MonthKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let invalid = || format!("'{}' is not a YYYY-MM month", value);

        let (year, month) = value.split_once('-').ok_or_else(invalid)?;

        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }

        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;

        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

/// Composite key of one accumulation bucket.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct BucketKey {
    pub region: String,
    pub month: MonthKey,
    pub variable: String,
}

/// Masked field of one message together with
/// information needed to order it in time.
#[derive(Clone, Debug)]
pub struct MaskedSlice {
    pub valid_time: NaiveDateTime,
    /// Rank of the source file path among all input files and index
    /// of the message within the file, used to break ties between
    /// equal timestamps.
    pub origin: (usize, usize),
    pub field: Array2<Float>,
}

impl MaskedSlice {
    pub fn sort_key(&self) -> (NaiveDateTime, usize, usize) {
        (self.valid_time, self.origin.0, self.origin.1)
    }
}

#[derive(Debug, Default)]
pub struct Accumulation {
    buckets: FxHashMap<BucketKey, Vec<MaskedSlice>>,
    observed: FxHashSet<(String, MonthKey)>,
}

impl Accumulation {
    pub fn new() -> Self {
        Accumulation::default()
    }

    /// Registers a (region, month) pair seen in the input,
    /// even if no requested variable contributes to it.
    pub fn observe(&mut self, region: &str, month: MonthKey) {
        self.observed.insert((region.to_string(), month));
    }

    pub fn push(&mut self, key: BucketKey, slice: MaskedSlice) {
        self.observe(&key.region, key.month);
        self.buckets.entry(key).or_default().push(slice);
    }

    /// Merges another partial accumulation into this one by
    /// concatenating the buckets with equal keys.
    pub fn merge(&mut self, other: Accumulation) {
        self.observed.extend(other.observed);

        for (key, mut slices) in other.buckets {
            self.buckets.entry(key).or_default().append(&mut slices);
        }
    }

    pub fn observed_len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    pub fn into_parts(
        self,
    ) -> (
        FxHashMap<BucketKey, Vec<MaskedSlice>>,
        FxHashSet<(String, MonthKey)>,
    ) {
        (self.buckets, self.observed)
    }
}

#[cfg(test)]
impl Accumulation {
    pub fn slices(&self, key: &BucketKey) -> Option<&[MaskedSlice]> {
        self.buckets.get(key).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn slice(day: u32, origin: (usize, usize), value: Float) -> MaskedSlice {
        MaskedSlice {
            valid_time: NaiveDate::from_ymd_opt(2020, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            origin,
            field: Array2::from_elem((1, 1), value),
        }
    }

    fn key(region: &str) -> BucketKey {
        BucketKey {
            region: region.to_string(),
            month: MonthKey::new(2020, 1).unwrap(),
            variable: "2m_temperature".to_string(),
        }
    }

    #[test]
    fn month_key_format() {
        let key = MonthKey::new(2020, 3).unwrap();
        assert_eq!(key.to_string(), "2020-03");

        let parsed = MonthKey::try_from("2021-12".to_string()).unwrap();
        assert_eq!(parsed, MonthKey::new(2021, 12).unwrap());

        assert!(MonthKey::try_from("2021-13".to_string()).is_err());
        assert!(MonthKey::try_from("2021-1".to_string()).is_err());
        assert!(MonthKey::try_from("202101".to_string()).is_err());
        assert!(MonthKey::new(2020, 0).is_none());
    }

    #[test]
    fn month_key_of_timestamp() {
        let datetime = NaiveDate::from_ymd_opt(2020, 2, 29)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();

        assert_eq!(MonthKey::of(&datetime).to_string(), "2020-02");
    }

    #[test]
    fn month_keys_order_chronologically() {
        let mut keys = vec![
            MonthKey::new(2021, 1).unwrap(),
            MonthKey::new(2020, 12).unwrap(),
            MonthKey::new(2020, 2).unwrap(),
        ];
        keys.sort();

        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered, vec!["2020-02", "2020-12", "2021-01"]);
    }

    #[test]
    fn push_observes_region_month() {
        let mut acc = Accumulation::new();
        assert!(acc.is_empty());

        acc.push(key("Bo"), slice(1, (0, 0), 1.0));
        acc.observe("Kono", MonthKey::new(2020, 1).unwrap());
        acc.observe("Kono", MonthKey::new(2020, 1).unwrap());

        assert_eq!(acc.observed_len(), 2);
        assert_eq!(acc.slices(&key("Bo")).unwrap().len(), 1);
        assert!(acc.slices(&key("Kono")).is_none());
    }

    #[test]
    fn merge_concatenates_buckets() {
        let mut first = Accumulation::new();
        first.push(key("Bo"), slice(3, (1, 0), 3.0));

        let mut second = Accumulation::new();
        second.push(key("Bo"), slice(1, (0, 0), 1.0));
        second.push(key("Kono"), slice(2, (0, 1), 2.0));

        first.merge(second);

        let bo = first.slices(&key("Bo")).unwrap();
        assert_eq!(bo.len(), 2);
        assert_eq!(bo[0].field[[0, 0]], 3.0);
        assert_eq!(bo[1].field[[0, 0]], 1.0);
        assert_eq!(first.observed_len(), 2);
    }
}
