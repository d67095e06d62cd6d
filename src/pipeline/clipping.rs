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

//! Module responsible for clipping grid messages to subregions.
//!
//! For every region each message of a requested variable is masked
//! with the bounding box and the region polygon, normalized to
//! the output units and appended to the [`Accumulation`].
//!
//! Masking only replaces values with [`MISSING`], it never derives
//! a value from its neighbours, so the unit conversion can be
//! applied to the whole field before masking.

use super::{
    accumulation::{Accumulation, BucketKey, MaskedSlice},
    geometry::{BoundingBox, RegionPolygon},
    grib::GridMessage,
};
use crate::{
    constants::{KELVIN_OFFSET, MISSING, TEMPERATURE_INDICATOR},
    Float,
};
use log::debug;
use ndarray::{Array2, Zip};
use serde::Deserialize;

/// Requested variable, identified by its descriptive name
/// and optionally by the GRIB short name.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, short_name: Option<&str>) -> Self {
        VariableSpec {
            name: name.into(),
            short_name: short_name.map(str::to_string),
        }
    }

    /// A message belongs to the variable when the descriptive name
    /// is contained in the message name (case-sensitive) or when
    /// short names are equal.
    pub fn matches(&self, msg: &GridMessage) -> bool {
        if msg.name.contains(self.name.as_str()) {
            return true;
        }

        self.short_name
            .as_deref()
            .map_or(false, |short_name| short_name == msg.short_name)
    }

    /// Temperatures are provided in Kelvin and stored in Celsius.
    pub fn is_temperature(&self) -> bool {
        self.name.to_lowercase().contains(TEMPERATURE_INDICATOR)
    }
}

/// Builds the cell mask of the region: cells inside both
/// the bounding box and the region polygon are `true`.
pub fn region_mask(
    bbox: &BoundingBox,
    region: &RegionPolygon,
    lats: &Array2<Float>,
    lons: &Array2<Float>,
) -> Array2<bool> {
    let mut mask = Array2::from_elem(lats.raw_dim(), false);

    Zip::from(&mut mask)
        .and(lats)
        .and(lons)
        .for_each(|inside, &lat, &lon| {
            *inside = bbox.contains(lon, lat) && region.contains(lon, lat);
        });

    mask
}

/// Replaces values outside of the mask with [`MISSING`],
/// converting retained temperatures to Celsius.
pub fn apply_mask(values: &Array2<Float>, mask: &Array2<bool>, temperature: bool) -> Array2<Float> {
    let mut masked = if temperature {
        values.mapv(|v| v - KELVIN_OFFSET)
    } else {
        values.clone()
    };

    Zip::from(&mut masked).and(mask).for_each(|value, &inside| {
        if !inside {
            *value = MISSING;
        }
    });

    masked
}

/// Region masks computed for one distinct grid.
struct GridMasks {
    prototype: usize,
    masks: Vec<Array2<bool>>,
}

/// Clips messages of single files for a fixed set of regions
/// and variables.
#[derive(Debug)]
pub struct Clipper<'a> {
    bbox: BoundingBox,
    regions: &'a [RegionPolygon],
    variables: &'a [VariableSpec],
}

impl<'a> Clipper<'a> {
    pub fn new(bbox: BoundingBox, regions: &'a [RegionPolygon], variables: &'a [VariableSpec]) -> Self {
        Clipper {
            bbox,
            regions,
            variables,
        }
    }

    /// Clips all messages of one file into a partial accumulation.
    ///
    /// Months are taken from the message timestamps, so a file
    /// can contribute to more than one month. `file_rank` orders
    /// slices of different files with equal timestamps.
    pub fn clip_file(&self, file_rank: usize, messages: &[GridMessage]) -> Accumulation {
        let mut accumulation = Accumulation::new();

        for msg in messages {
            for region in self.regions {
                accumulation.observe(region.name(), msg.month());
            }
        }

        let groups = self.group_by_variable(messages);
        let (grids, grid_of) = self.compute_masks(messages, &groups);

        for (region_index, region) in self.regions.iter().enumerate() {
            for (variable, group) in self.variables.iter().zip(&groups) {
                let temperature = variable.is_temperature();

                for &msg_index in group {
                    let msg = &messages[msg_index];
                    let mask = &grids[grid_of[msg_index]].masks[region_index];

                    accumulation.push(
                        BucketKey {
                            region: region.name().to_string(),
                            month: msg.month(),
                            variable: variable.name.clone(),
                        },
                        MaskedSlice {
                            valid_time: msg.valid_time,
                            origin: (file_rank, msg_index),
                            field: apply_mask(&msg.values, mask, temperature),
                        },
                    );
                }
            }
        }

        accumulation
    }

    /// Indices of messages matching each requested variable,
    /// sorted by timestamp. Sort is stable so messages with equal
    /// timestamps keep the file order.
    fn group_by_variable(&self, messages: &[GridMessage]) -> Vec<Vec<usize>> {
        self.variables
            .iter()
            .map(|variable| {
                let mut group: Vec<usize> = messages
                    .iter()
                    .enumerate()
                    .filter(|(_, msg)| variable.matches(msg))
                    .map(|(index, _)| index)
                    .collect();

                group.sort_by_key(|&index| messages[index].valid_time);

                if group.is_empty() {
                    debug!("No messages of {} in file", variable.name);
                }

                group
            })
            .collect()
    }

    /// Computes region masks once for every distinct grid
    /// of used messages. Returns the masks and the grid index
    /// of each message (unused messages point to grid 0).
    fn compute_masks(
        &self,
        messages: &[GridMessage],
        groups: &[Vec<usize>],
    ) -> (Vec<GridMasks>, Vec<usize>) {
        let mut grids: Vec<GridMasks> = vec![];
        let mut grid_of = vec![0; messages.len()];

        for &msg_index in groups.iter().flatten() {
            let msg = &messages[msg_index];

            let known = grids
                .iter()
                .position(|grid| messages[grid.prototype].same_grid(msg));

            grid_of[msg_index] = match known {
                Some(grid_index) => grid_index,
                None => {
                    let masks = self
                        .regions
                        .iter()
                        .map(|region| region_mask(&self.bbox, region, &msg.lats, &msg.lons))
                        .collect();

                    grids.push(GridMasks {
                        prototype: msg_index,
                        masks,
                    });

                    grids.len() - 1
                }
            };
        }

        (grids, grid_of)
    }
}
