//! NetCDF-4 storage
//!
//! [`NetcdfStore`] reads the CF-encoded archive files directly and writes
//! artifacts as NetCDF-4. Raw files and stored artifacts go through the same
//! reader: the time axis is decoded from its `units` and `calendar`
//! attributes, `lon`/`lat` may be 1-D (regular grids) or 2-D (curvilinear
//! grids), and every variable whose trailing dimensions are the horizontal
//! ones is loaded. `_FillValue`, `missing_value`, `scale_factor` and
//! `add_offset` are applied on read.

use crate::output::IndexArtifact;
use crate::store::{list_with_extension, DatasetStore};
use log::debug;
use ndarray::{Array2, Array3, Array4, ShapeError};
use netcdf::{AttributeValue, FileMut, Variable};
use sstharm_core::calendar::{decode_cf_times, CfDateTime};
use sstharm_core::dataset::{DataVariable, Dataset, Gridded, HorizontalGrid, Temporal, VariableData};
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of every file the NetCDF store reads or writes
pub const EXTENSION: &str = "nc";

const TIME: &str = "time";
const REGION: &str = "region";
const FILL_VALUE: f64 = 1.0e20;
const LON_NAMES: [&str; 3] = ["lon", "longitude", "nav_lon"];
const LAT_NAMES: [&str; 3] = ["lat", "latitude", "nav_lat"];
/// Attributes consumed while decoding values
const ENCODING_ATTRS: [&str; 4] = ["_FillValue", "missing_value", "scale_factor", "add_offset"];

#[derive(Debug, Error)]
enum NcError {
    #[error(transparent)]
    Netcdf(#[from] netcdf::Error),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Harmonize(#[from] HarmonizeError),
}

impl NcError {
    fn at(self, path: &Path) -> HarmonizeError {
        match self {
            NcError::Harmonize(e) => e,
            other => HarmonizeError::Serialization(format!("{}: {other}", path.display())),
        }
    }
}

type NcResult<T> = Result<T, NcError>;

fn numeric_attr(var: &Variable, name: &str) -> Option<f64> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        _ => None,
    }
}

fn text_attr(var: &Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// String-valued attributes, without the ones used for decoding.
fn text_attrs<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> BTreeMap<String, String> {
    attrs
        .filter(|a| !ENCODING_ATTRS.iter().any(|n| *n == a.name()))
        .filter_map(|a| match a.value().ok()? {
            AttributeValue::Str(s) => Some((a.name().to_string(), s)),
            _ => None,
        })
        .collect()
}

fn read_values(var: &Variable) -> NcResult<Vec<f64>> {
    let raw = var.get_values::<f64, _>(..)?;
    let fill = numeric_attr(var, "_FillValue");
    let missing = numeric_attr(var, "missing_value");
    let scale = numeric_attr(var, "scale_factor").unwrap_or(1.0);
    let offset = numeric_attr(var, "add_offset").unwrap_or(0.0);
    Ok(raw
        .into_iter()
        .map(|v| {
            if !v.is_finite() || Some(v) == fill || Some(v) == missing {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
        .collect())
}

fn dim_names(var: &Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name().to_string()).collect()
}

fn dim_lens(var: &Variable) -> Vec<usize> {
    var.dimensions().iter().map(|d| d.len()).collect()
}

fn find_variable<'f>(file: &'f netcdf::File, names: &[&str]) -> Option<Variable<'f>> {
    names.iter().find_map(|name| file.variable(name))
}

fn read_time(file: &netcdf::File, path: &Path) -> NcResult<Vec<CfDateTime>> {
    let Some(var) = file.variable(TIME) else {
        return Ok(Vec::new());
    };
    let units = text_attr(&var, "units").ok_or_else(|| {
        HarmonizeError::InvalidTimeUnits(format!("{}: time has no units", path.display()))
    })?;
    let calendar = text_attr(&var, "calendar").unwrap_or_else(|| "standard".to_string());
    let offsets = var.get_values::<f64, _>(..)?;
    Ok(decode_cf_times(&units, &calendar, &offsets)?)
}

fn read_grid(file: &netcdf::File, path: &Path) -> NcResult<HorizontalGrid> {
    let missing = |what: &str| HarmonizeError::MissingCoordinate(format!("{what} in {}", path.display()));
    let lon = find_variable(file, &LON_NAMES).ok_or_else(|| missing("longitude"))?;
    let lat = find_variable(file, &LAT_NAMES).ok_or_else(|| missing("latitude"))?;
    let lon_values = read_values(&lon)?;
    let lat_values = read_values(&lat)?;
    let (lon_name, lat_name) = (lon.name().to_string(), lat.name().to_string());

    let grid = match (dim_names(&lat).as_slice(), dim_names(&lon).as_slice()) {
        ([y], [x]) => {
            let shape = (lat_values.len(), lon_values.len());
            HorizontalGrid::new(y, x, shape)
                .with_coordinate(&lat_name, Array2::from_shape_fn(shape, |(j, _)| lat_values[j]))?
                .with_coordinate(&lon_name, Array2::from_shape_fn(shape, |(_, i)| lon_values[i]))?
        }
        ([y, x], [_, _]) => {
            let lens = dim_lens(&lat);
            let shape = (lens[0], lens[1]);
            HorizontalGrid::new(y, x, shape)
                .with_coordinate(&lat_name, Array2::from_shape_vec(shape, lat_values)?)?
                .with_coordinate(&lon_name, Array2::from_shape_vec(shape, lon_values)?)?
        }
        (lat_dims, lon_dims) => {
            return Err(HarmonizeError::ShapeMismatch {
                context: format!("coordinates in {}", path.display()),
                expected: vec![2],
                found: vec![lat_dims.len(), lon_dims.len()],
            }
            .into())
        }
    };
    Ok(grid)
}

/// Load a variable spanning the grid; `None` for anything else (bounds, scalars).
fn read_variable(
    file: &netcdf::File,
    var: &Variable,
    grid: &HorizontalGrid,
) -> NcResult<Option<VariableData>> {
    let dims = dim_names(var);
    let lens = dim_lens(var);
    let (y, x) = grid.dims();
    let (ny, nx) = grid.shape();
    let n = dims.len();
    if n < 2 || dims[n - 2] != y || dims[n - 1] != x {
        return Ok(None);
    }
    let data = match n {
        2 => VariableData::Static(Array2::from_shape_vec((ny, nx), read_values(var)?)?),
        3 if dims[0] == TIME => {
            VariableData::TimeVarying(Array3::from_shape_vec((lens[0], ny, nx), read_values(var)?)?)
        }
        4 if dims[0] == TIME => {
            let level_dim = dims[1].clone();
            let levels = match file.variable(&level_dim) {
                Some(level) => level.get_values::<f64, _>(..)?,
                None => (0..lens[1]).map(|l| l as f64).collect(),
            };
            VariableData::Layered {
                level_dim,
                levels,
                values: Array4::from_shape_vec((lens[0], lens[1], ny, nx), read_values(var)?)?,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(data))
}

fn read_file(path: &Path) -> NcResult<Dataset> {
    if !path.exists() {
        return Err(HarmonizeError::Io(io::Error::new(
            ErrorKind::NotFound,
            path.display().to_string(),
        ))
        .into());
    }
    let file = netcdf::open(path)?;
    let time = read_time(&file, path)?;
    let grid = read_grid(&file, path)?;

    let mut variables = Vec::new();
    for var in file.variables() {
        let name = var.name().to_string();
        if name == TIME || grid.has_coordinate(&name) {
            continue;
        }
        match read_variable(&file, &var, &grid)? {
            Some(data) => variables.push((
                name,
                DataVariable {
                    data,
                    attrs: text_attrs(var.attributes()),
                },
            )),
            None => debug!("{}: skipping `{name}`", path.display()),
        }
    }

    let mut dataset = Dataset::new(grid, time);
    for (name, variable) in variables {
        dataset = dataset.with_variable(&name, variable)?;
    }
    dataset.attrs = text_attrs(file.attributes());
    Ok(dataset)
}

fn create(path: &Path) -> NcResult<FileMut> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(HarmonizeError::from)?;
    }
    Ok(netcdf::create(path)?)
}

fn filled<'a>(values: impl Iterator<Item = &'a f64>) -> Vec<f64> {
    values
        .map(|v| if v.is_finite() { *v } else { FILL_VALUE })
        .collect()
}

fn put_f64(
    file: &mut FileMut,
    name: &str,
    dims: &[&str],
    values: &[f64],
    attrs: &BTreeMap<String, String>,
) -> NcResult<()> {
    let mut var = file.add_variable::<f64>(name, dims)?;
    var.put_attribute("_FillValue", FILL_VALUE)?;
    for (key, value) in attrs {
        var.put_attribute(key, value.as_str())?;
    }
    var.put_values(values, ..)?;
    Ok(())
}

/// Time as whole seconds since the first timestamp, in its own calendar.
fn put_time(file: &mut FileMut, times: &[CfDateTime]) -> NcResult<()> {
    let Some(first) = times.first() else {
        return Ok(());
    };
    let origin = first.seconds_since_origin()?;
    let offsets = times
        .iter()
        .map(|t| Ok((t.seconds_since_origin()? - origin) as f64))
        .collect::<HarmonizeResult<Vec<_>>>()?;
    let mut var = file.add_variable::<f64>(TIME, &[TIME])?;
    var.put_attribute("standard_name", "time")?;
    var.put_attribute("units", format!("seconds since {first}").as_str())?;
    var.put_attribute("calendar", first.calendar().cf_name())?;
    var.put_values(&offsets, ..)?;
    Ok(())
}

fn put_global_attrs(file: &mut FileMut, attrs: &BTreeMap<String, String>) -> NcResult<()> {
    for (key, value) in attrs {
        file.add_attribute(key, value.as_str())?;
    }
    Ok(())
}

/// 1-D values of a coordinate named after its own dimension, when it is
/// constant along the other axis.
fn coordinate_axis(name: &str, values: &Array2<f64>, dims: (&str, &str)) -> Option<Vec<f64>> {
    if name == dims.0 && values.columns().into_iter().all(|c| c == values.column(0)) {
        Some(values.column(0).to_vec())
    } else if name == dims.1 && values.rows().into_iter().all(|r| r == values.row(0)) {
        Some(values.row(0).to_vec())
    } else {
        None
    }
}

fn write_file(path: &Path, dataset: &Dataset) -> NcResult<()> {
    let mut file = create(path)?;
    let grid = dataset.grid();
    let (y, x) = grid.dims();
    let (ny, nx) = grid.shape();
    file.add_dimension(y, ny)?;
    file.add_dimension(x, nx)?;
    file.add_dimension(TIME, dataset.times().len())?;
    put_time(&mut file, dataset.times())?;

    for name in grid.coordinate_names() {
        let values = grid.coordinate(name)?;
        let attrs = BTreeMap::new();
        match coordinate_axis(name, values, (y, x)) {
            Some(axis) => put_f64(&mut file, name, &[name], &axis, &attrs)?,
            None => put_f64(&mut file, name, &[y, x], &filled(values.iter()), &attrs)?,
        }
    }

    for name in dataset.variable_names() {
        let variable = dataset.variable(name)?;
        match &variable.data {
            VariableData::Static(values) => {
                put_f64(&mut file, name, &[y, x], &filled(values.iter()), &variable.attrs)?
            }
            VariableData::TimeVarying(values) => put_f64(
                &mut file,
                name,
                &[TIME, y, x],
                &filled(values.iter()),
                &variable.attrs,
            )?,
            VariableData::Layered {
                level_dim,
                levels,
                values,
            } => {
                let level = level_dim.as_str();
                if file.dimension(level).is_none() {
                    file.add_dimension(level, levels.len())?;
                    put_f64(&mut file, level, &[level], levels, &BTreeMap::new())?;
                }
                put_f64(
                    &mut file,
                    name,
                    &[TIME, level, y, x],
                    &filled(values.iter()),
                    &variable.attrs,
                )?
            }
        }
    }
    put_global_attrs(&mut file, &dataset.attrs)
}

/// Region axis as an integer index with `abbrevs` and `names` string labels.
fn write_index_file(path: &Path, indices: &IndexArtifact) -> NcResult<()> {
    let mut file = create(path)?;
    let region = &indices.region;
    file.add_dimension(REGION, region.codes.len())?;
    file.add_dimension(TIME, indices.time.len())?;
    put_time(&mut file, &indices.time)?;

    {
        let mut var = file.add_variable::<i32>(REGION, &[REGION])?;
        for (key, value) in &region.attrs {
            var.put_attribute(key, value.as_str())?;
        }
        var.put_attribute("description", region.name.as_str())?;
        let index: Vec<i32> = (0..region.codes.len() as i32).collect();
        var.put_values(&index, ..)?;
    }
    for (name, labels) in [("abbrevs", &region.codes), ("names", &region.names)] {
        let mut var = file.add_string_variable(name, &[REGION])?;
        for (i, label) in labels.iter().enumerate() {
            var.put_string(label, [i])?;
        }
    }
    put_f64(
        &mut file,
        "sst",
        &[REGION, TIME],
        &filled(indices.sst.values.iter()),
        &indices.sst.attrs,
    )?;
    put_global_attrs(&mut file, &indices.attrs)
}

/// NetCDF-4 files on the local file system.
#[derive(Copy, Clone, Debug, Default)]
pub struct NetcdfStore;

impl DatasetStore for NetcdfStore {
    fn list_files(&self, dir: &Path) -> HarmonizeResult<Vec<PathBuf>> {
        list_with_extension(dir, EXTENSION)
    }

    fn artifact_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{stem}.{EXTENSION}"))
    }

    fn read_raw(&self, path: &Path) -> HarmonizeResult<Dataset> {
        read_file(path).map_err(|e| e.at(path))
    }

    fn read_dataset(&self, path: &Path) -> HarmonizeResult<Dataset> {
        read_file(path).map_err(|e| e.at(path))
    }

    fn write_dataset(&self, path: &Path, dataset: &Dataset) -> HarmonizeResult<()> {
        write_file(path, dataset).map_err(|e| e.at(path))
    }

    fn write_indices(&self, path: &Path, indices: &IndexArtifact) -> HarmonizeResult<()> {
        write_index_file(path, indices).map_err(|e| e.at(path))
    }
}
