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

//! Module containing the aggregation pipeline.
//!
//! The run is composed of following steps:
//!
//! 1. The country bounding box and subregion polygons are resolved
//!    by a [`GeometryProvider`].
//! 2. Monthly input files are located by a [`GridSource`].
//! 3. Each file is decoded by a [`MessageSource`] and clipped
//!    to every subregion by the [`Clipper`]. Files are processed
//!    in parallel and each produces a partial [`Accumulation`].
//! 4. Partial accumulations are merged and stacked into tensors
//!    forming the [`ResultTable`], which is finally persisted.
//!
//! The accumulation is owned by a single [`aggregate`] call,
//! so nothing is written when the run fails.

pub mod accumulation;
pub mod acquisition;
pub mod assembly;
pub mod clipping;
pub mod configuration;
pub mod geometry;
pub mod grib;
pub mod persist;

pub use self::accumulation::MonthKey;

use self::{
    accumulation::Accumulation,
    acquisition::{GridRequest, GridSource, LocalArchive},
    assembly::{assemble, ResultTable},
    clipping::{Clipper, VariableSpec},
    configuration::{Config, Output, Processing},
    geometry::{GeoJsonProvider, GeometryProvider},
    grib::{GribReader, MessageSource},
};
use crate::{
    errors::{InputError, PersistError, RunError},
    ALLOCATOR,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use std::{
    fs, iter,
    path::{Path, PathBuf},
};

/// Main pipeline function, responsible for all aggregation steps.
///
/// It reads the provided configuration, aggregates the input
/// files on the threadpool and writes the result table.
pub fn main(config_path: &Path) -> Result<(), RunError> {
    info!("Preparing the aggregation core");

    let core = Core::new(config_path)?;
    prepare_output(&core.config.output)?;

    let geometry = GeoJsonProvider::new(
        &core.config.area.countries_source,
        &core.config.area.name_property,
        &core.config.regions.name_property,
    );
    let archive = LocalArchive::new(&core.config.input.data_dir, &core.config.input.extension);
    let request = AggregationRequest::from_config(&core.config);

    let table = aggregate(
        &request,
        &geometry,
        &archive,
        &GribReader,
        &core.threadpool,
        &core.config.processing,
    )?;

    info!("Writing output");

    persist::save_table(&table, &core.config.output.table)?;

    if let Some(csv_path) = &core.config.output.csv {
        persist::export_csv(&table, csv_path)?;
    }

    Ok(())
}

/// Structure containing the program configuration
/// and resources prepared for the run.
#[derive(Debug)]
pub struct Core {
    pub config: Config,
    pub threadpool: ThreadPool,
}

impl Core {
    /// Pipeline [`Core`] constructor.
    ///
    /// Configuration must be loaded and checked, and resource
    /// limits applied before any input is read.
    pub fn new(config_path: &Path) -> Result<Self, RunError> {
        debug!("Reading configuration from {}", config_path.display());
        let config = Config::new_from_file(config_path)?;

        debug!("Setting memory limit");
        set_memory_limit(config.resources.memory)?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        Ok(Core { config, threadpool })
    }
}

/// Everything an aggregation run needs to know
/// about what should be aggregated.
#[derive(Clone, PartialEq, Debug)]
pub struct AggregationRequest {
    pub country: String,
    pub subregion_source: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    pub months: Vec<u32>,
    pub days: Vec<u32>,
    pub times: Vec<String>,
    pub variables: Vec<VariableSpec>,
}

impl AggregationRequest {
    pub fn from_config(config: &Config) -> Self {
        AggregationRequest {
            country: config.area.country.clone(),
            subregion_source: config.regions.source.clone(),
            start_year: config.period.start_year,
            end_year: config.period.end_year,
            months: config.period.months.clone(),
            days: config.period.days.clone(),
            times: config.period.times.clone(),
            variables: config.variables.clone(),
        }
    }

    fn columns(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }
}

/// Aggregates gridded fields of the requested country
/// into per-subregion, per-month tensors.
pub fn aggregate<G, S, P>(
    request: &AggregationRequest,
    geometry: &G,
    source: &S,
    parser: &P,
    threadpool: &ThreadPool,
    processing: &Processing,
) -> Result<ResultTable, RunError>
where
    G: GeometryProvider,
    S: GridSource,
    P: MessageSource,
{
    info!("Resolving geometry of {}", request.country);

    let bbox = geometry.resolve_country_bbox(&request.country)?;
    debug!(
        "Country bounding box: N{:.3} W{:.3} S{:.3} E{:.3}",
        bbox.north, bbox.west, bbox.south, bbox.east
    );

    let regions = geometry.load_subregions(&request.subregion_source)?;
    info!("Loaded {} subregions", regions.len());

    let grid_request = GridRequest {
        area_name: request.country.clone(),
        bbox,
        variables: request.columns(),
        start_year: request.start_year,
        end_year: request.end_year,
        months: request.months.clone(),
        days: request.days.clone(),
        times: request.times.clone(),
    };

    let files = source.fetch(&grid_request)?;

    let clipper = Clipper::new(bbox, &regions, &request.variables);
    let files_bar = files_progress(files.len(), processing.progress);
    let accumulation = clip_files(
        &files,
        parser,
        &clipper,
        threadpool,
        processing.fail_fast,
        &files_bar,
    )?;
    files_bar.finish_with_message("All files processed");

    if accumulation.is_empty() {
        warn!("No grid messages were read, the result table will be empty");
    }

    info!(
        "Accumulated data of {} region-month pairs, assembling tensors",
        accumulation.observed_len()
    );

    let table = assemble(accumulation, &request.columns())?;

    Ok(table)
}

/// Sets the allocator limit to `memory` MB.
fn set_memory_limit(memory: usize) -> Result<(), RunError> {
    let limit = memory
        .checked_mul(1024 * 1024)
        .ok_or(RunError::MemoryLimit(memory))?;

    ALLOCATOR
        .set_limit(limit)
        .map_err(|_| RunError::MemoryLimit(memory))
}

fn files_progress(len: usize, visible: bool) -> ProgressBar {
    let files_bar = if visible {
        ProgressBar::new(len as u64)
    } else {
        ProgressBar::hidden()
    };

    files_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    files_bar.set_prefix("Processed files");

    files_bar
}

/// Decodes and clips all files on the threadpool and merges
/// the partial accumulations.
///
/// With `fail_fast` the first file that cannot be decoded
/// stops the run, otherwise such files are skipped.
/// Every file advances `files_bar`, including skipped ones.
fn clip_files<P: MessageSource>(
    files: &[PathBuf],
    parser: &P,
    clipper: &Clipper,
    threadpool: &ThreadPool,
    fail_fast: bool,
    files_bar: &ProgressBar,
) -> Result<Accumulation, InputError> {
    info!("Clipping {} input files", files.len());

    // slices with equal timestamps are ordered by file rank,
    // so it must not depend on the order of the fetched list
    let mut ranked: Vec<&PathBuf> = files.iter().collect();
    ranked.sort();

    let clip_one = |path: &PathBuf| -> Result<Accumulation, InputError> {
        let file_rank = match ranked.binary_search(&path) {
            Ok(rank) | Err(rank) => rank,
        };

        let partial = parser.read_messages(path).map(|messages| {
            debug!("Clipping {} messages of {}", messages.len(), path.display());
            clipper.clip_file(file_rank, &messages)
        });
        files_bar.inc(1);

        partial
    };

    let partials: Vec<Accumulation> = threadpool.install(|| {
        if fail_fast {
            files
                .par_iter()
                .map(clip_one)
                .collect::<Result<Vec<_>, _>>()
        } else {
            Ok(files
                .par_iter()
                .map(clip_one)
                .filter_map(|partial| match partial {
                    Ok(partial) => Some(partial),
                    Err(err) => {
                        warn!("Skipping input file that cannot be processed: {}", err);
                        None
                    }
                })
                .collect())
        }
    })?;

    // partials arrive in any order, buckets are sorted on assembly
    let mut accumulation = Accumulation::new();
    for partial in partials {
        accumulation.merge(partial);
    }

    Ok(accumulation)
}

/// Checks that output files can be written and creates
/// missing output directories.
fn prepare_output(output: &Output) -> Result<(), RunError> {
    debug!("Checking and setting output paths");

    for path in iter::once(&output.table).chain(output.csv.iter()) {
        if path.exists() && !output.overwrite {
            return Err(RunError::FaultyOutput(
                "Output file exists and overwriting is disabled",
            ));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                debug!("Output directory does not exist so creating a new one");
                fs::create_dir_all(parent).map_err(PersistError::from)?;
            }
        }
    }

    Ok(())
}
