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

//! Regional Weather Tensors (RWT) reduces gridded meteorological
//! reanalysis fields covering a country to per-subregion, per-month
//! tensors ready to be used by downstream forecasting models.
//!
//! For every GRIB message of every monthly input file the program
//! clips the field to the country bounding box and to the polygon of
//! each administrative subregion, normalizes units and stacks the
//! resulting fields in time. The final table is indexed by region and
//! month and holds one tensor-valued column per requested variable.

mod constants;
mod errors;
mod pipeline;


use cap::Cap;
use env_logger::Env;
use log::{error, info};
use std::{alloc, env, path::PathBuf};

type Float = f64;

/// Global allocator used by the program.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better [OOM error](https://en.wikipedia.org/wiki/Out_of_memory) handling.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the runtime environment and calls the [`pipeline::main`].
///
/// The `env_logger` needs to be initiated before any log messages
/// are possible to occur, so that errors raised while reading
/// the configuration are reported as well.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("RWT_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("RWT_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    let config_path = env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("config.yaml"), PathBuf::from);

    match pipeline::main(&config_path) {
        Ok(_) => info!("Aggregation finished. Check the output directory and log."),
        Err(err) => error!("Aggregation failed with error: {}", err),
    }
}
