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

//! Module containing constants used by the program.

use crate::Float;

/// Offset between Kelvin and Celsius temperature scales.
pub const KELVIN_OFFSET: Float = 273.15;

/// Variables with descriptive name containing this token
/// are converted from Kelvin to Celsius.
pub const TEMPERATURE_INDICATOR: &str = "temperature";

/// Value written into grid cells that were masked out.
pub const MISSING: Float = Float::NAN;

/// Default variable set: descriptive ERA5 parameter names
/// paired with their GRIB short names.
pub const DEFAULT_PARAM_MAPPING: [(&str, &str); 22] = [
    ("10m_u_component_of_wind", "10u"),
    ("10m_v_component_of_wind", "10v"),
    ("2m_dewpoint_temperature", "2d"),
    ("2m_temperature", "2t"),
    ("mean_sea_level_pressure", "msl"),
    ("surface_pressure", "sp"),
    ("total_precipitation", "tp"),
    ("total_cloud_cover", "tcc"),
    ("lake_cover", "lc"),
    ("lake_depth", "ld"),
    ("lake_mix_layer_temperature", "lmlt"),
    ("convective_precipitation", "cp"),
    ("convective_rain_rate", "crr"),
    ("total_column_rain_water", "tcrw"),
    ("volumetric_soil_water_layer_1", "swvl1"),
    ("high_vegetation_cover", "cvh"),
    ("low_vegetation_cover", "cvl"),
    ("skin_temperature", "skt"),
    ("evaporation", "e"),
    ("runoff", "ro"),
    ("surface_runoff", "sro"),
    ("total_column_water_vapour", "tcwv"),
];

/// Analysis hours requested from the archive for each day.
pub const DEFAULT_TIMES: [&str; 4] = ["00:00", "06:00", "12:00", "18:00"];
