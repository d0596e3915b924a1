//! Labelled gridded containers
//!
//! [`Dataset`] is the multi-variable container produced by concatenating the raw
//! files of one source. [`GriddedField`] is a single time-varying variable on a
//! harmonised grid, the unit of work for the time-window selector and the
//! aggregator.
//!
//! Both share a [`HorizontalGrid`]: two named horizontal dimensions and any
//! number of 2-D coordinate arrays over them. Rectilinear grids are stored with
//! their 1-D latitude and longitude broadcast to 2-D so that curvilinear model
//! grids (`nav_lat`/`nav_lon`) need no special casing.
//!
//! Transformations never mutate a container behind a shared reference; each
//! stage consumes its input and returns a new value.

use crate::calendar::CfDateTime;
use crate::errors::{HarmonizeError, HarmonizeResult};
use ndarray::{concatenate, Array2, Array3, Array4, ArrayViewMut2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical latitude coordinate name
pub const LAT: &str = "lat";
/// Canonical longitude coordinate name
pub const LON: &str = "lon";

/// Horizontal coordinate frame shared by every variable of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HorizontalGrid {
    /// Names of the (y, x) dimensions
    dims: [String; 2],
    shape: (usize, usize),
    coords: BTreeMap<String, Array2<f64>>,
}

impl HorizontalGrid {
    /// Build a grid without coordinates; add them with [`with_coordinate`](Self::with_coordinate).
    pub fn new(y_dim: &str, x_dim: &str, shape: (usize, usize)) -> Self {
        Self {
            dims: [y_dim.to_string(), x_dim.to_string()],
            shape,
            coords: BTreeMap::new(),
        }
    }

    /// Regular latitude/longitude grid with canonical names.
    pub fn rectilinear(lat: &[f64], lon: &[f64]) -> Self {
        Self::rectilinear_named(LAT, LON, lat, lon)
    }

    /// Regular grid whose dimensions and coordinates use the given names.
    pub fn rectilinear_named(lat_name: &str, lon_name: &str, lat: &[f64], lon: &[f64]) -> Self {
        let shape = (lat.len(), lon.len());
        let lat2 = Array2::from_shape_fn(shape, |(j, _)| lat[j]);
        let lon2 = Array2::from_shape_fn(shape, |(_, i)| lon[i]);
        let mut coords = BTreeMap::new();
        coords.insert(lat_name.to_string(), lat2);
        coords.insert(lon_name.to_string(), lon2);
        Self {
            dims: [lat_name.to_string(), lon_name.to_string()],
            shape,
            coords,
        }
    }

    /// Attach a 2-D coordinate array, checking it spans the grid.
    pub fn with_coordinate(mut self, name: &str, values: Array2<f64>) -> HarmonizeResult<Self> {
        if values.dim() != self.shape {
            return Err(HarmonizeError::ShapeMismatch {
                context: format!("coordinate `{name}`"),
                expected: vec![self.shape.0, self.shape.1],
                found: values.shape().to_vec(),
            });
        }
        self.coords.insert(name.to_string(), values);
        Ok(self)
    }

    pub fn dims(&self) -> (&str, &str) {
        (&self.dims[0], &self.dims[1])
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn is_empty(&self) -> bool {
        self.shape.0 == 0 || self.shape.1 == 0
    }

    pub fn has_coordinate(&self, name: &str) -> bool {
        self.coords.contains_key(name)
    }

    pub fn coordinate(&self, name: &str) -> HarmonizeResult<&Array2<f64>> {
        self.coords
            .get(name)
            .ok_or_else(|| HarmonizeError::MissingCoordinate(name.to_string()))
    }

    pub fn coordinate_names(&self) -> impl Iterator<Item = &str> {
        self.coords.keys().map(String::as_str)
    }

    pub fn lat(&self) -> HarmonizeResult<&Array2<f64>> {
        self.coordinate(LAT)
    }

    pub fn lon(&self) -> HarmonizeResult<&Array2<f64>> {
        self.coordinate(LON)
    }

    /// Rename a coordinate, and the dimension of the same name if there is one.
    pub fn rename_coordinate(&mut self, from: &str, to: &str) -> HarmonizeResult<()> {
        let values = self
            .coords
            .remove(from)
            .ok_or_else(|| HarmonizeError::MissingCoordinate(from.to_string()))?;
        self.coords.insert(to.to_string(), values);
        for dim in self.dims.iter_mut() {
            if dim == from {
                *dim = to.to_string();
            }
        }
        Ok(())
    }

    pub fn drop_coordinate(&mut self, name: &str) -> Option<Array2<f64>> {
        self.coords.remove(name)
    }

    /// Apply `f` to every value of a coordinate.
    pub fn map_coordinate(&mut self, name: &str, f: impl Fn(f64) -> f64) -> HarmonizeResult<()> {
        let values = self
            .coords
            .get_mut(name)
            .ok_or_else(|| HarmonizeError::MissingCoordinate(name.to_string()))?;
        values.mapv_inplace(f);
        Ok(())
    }

    fn select(&self, rows: &[usize], cols: &[usize]) -> Self {
        let coords = self
            .coords
            .iter()
            .map(|(name, values)| {
                let picked = values.select(Axis(0), rows).select(Axis(1), cols);
                (name.clone(), picked)
            })
            .collect();
        Self {
            dims: self.dims.clone(),
            shape: (rows.len(), cols.len()),
            coords,
        }
    }
}

/// Rows and columns of a grid kept by a spatial filter.
///
/// Mirrors a "where, then drop all-false labels" selection: a row or column is
/// kept if any of its cells passes the filter, and cells inside the kept block
/// that fail it are blanked to not-a-number in every data variable.
#[derive(Clone, Debug, PartialEq)]
pub struct CellSelection {
    rows: Vec<usize>,
    cols: Vec<usize>,
    inside: Array2<bool>,
}

impl CellSelection {
    /// Build from a full-grid boolean membership array.
    pub fn from_mask(mask: &Array2<bool>) -> Self {
        let rows: Vec<usize> = mask
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|v| *v))
            .map(|(j, _)| j)
            .collect();
        let cols: Vec<usize> = mask
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, col)| col.iter().any(|v| *v))
            .map(|(i, _)| i)
            .collect();
        let inside = mask.select(Axis(0), &rows).select(Axis(1), &cols);
        Self { rows, cols, inside }
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    fn blank_outside(&self, slab: ArrayViewMut2<f64>) {
        Zip::from(slab).and(&self.inside).for_each(|v, &keep| {
            if !keep {
                *v = f64::NAN;
            }
        });
    }
}

/// Containers that live on a [`HorizontalGrid`].
pub trait Gridded: Sized {
    fn grid(&self) -> &HorizontalGrid;

    fn grid_mut(&mut self) -> &mut HorizontalGrid;

    /// Keep only the selected block of cells
    fn select_cells(self, selection: &CellSelection) -> Self;
}

/// Containers indexed by a time axis.
pub trait Temporal: Sized {
    fn times(&self) -> &[CfDateTime];

    /// Keep the given time indices, in the given order
    fn select_times(self, indices: &[usize]) -> Self;
}

/// Storage of one variable, distinguished by which dimensions it spans.
///
/// Spatial dimensions are always the trailing two axes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VariableData {
    /// (y, x), e.g. cell area
    Static(#[serde(with = "missing_as_null")] Array2<f64>),
    /// (time, y, x)
    TimeVarying(#[serde(with = "missing_as_null")] Array3<f64>),
    /// (time, level, y, x), e.g. observational SST on a singleton depth level
    Layered {
        level_dim: String,
        levels: Vec<f64>,
        #[serde(with = "missing_as_null")]
        values: Array4<f64>,
    },
}

/// Serialise arrays as `{shape, data}` with not-a-number written as `null`,
/// so missing cells survive formats without a NaN literal (JSON).
pub mod missing_as_null {
    use ndarray::{Array, Dimension, IxDyn};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Stored {
        shape: Vec<usize>,
        data: Vec<Option<f64>>,
    }

    pub fn serialize<S, D>(values: &Array<f64, D>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        D: Dimension,
    {
        Stored {
            shape: values.shape().to_vec(),
            data: values
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, De, D>(deserializer: De) -> Result<Array<f64, D>, De::Error>
    where
        De: Deserializer<'de>,
        D: Dimension,
    {
        let stored = Stored::deserialize(deserializer)?;
        let dim = D::from_dimension(&IxDyn(&stored.shape))
            .ok_or_else(|| De::Error::custom(format!("unexpected rank {}", stored.shape.len())))?;
        let data = stored
            .data
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Array::from_shape_vec(dim, data).map_err(De::Error::custom)
    }
}

impl VariableData {
    fn spatial_shape(&self) -> (usize, usize) {
        match self {
            VariableData::Static(v) => v.dim(),
            VariableData::TimeVarying(v) => (v.dim().1, v.dim().2),
            VariableData::Layered { values, .. } => (values.dim().2, values.dim().3),
        }
    }

    fn time_len(&self) -> Option<usize> {
        match self {
            VariableData::Static(_) => None,
            VariableData::TimeVarying(v) => Some(v.dim().0),
            VariableData::Layered { values, .. } => Some(values.dim().0),
        }
    }

    fn shape(&self) -> Vec<usize> {
        match self {
            VariableData::Static(v) => v.shape().to_vec(),
            VariableData::TimeVarying(v) => v.shape().to_vec(),
            VariableData::Layered { values, .. } => values.shape().to_vec(),
        }
    }

    fn select_cells(self, selection: &CellSelection) -> Self {
        let (rows, cols) = (selection.rows(), selection.cols());
        match self {
            VariableData::Static(v) => {
                let mut picked = v.select(Axis(0), rows).select(Axis(1), cols);
                selection.blank_outside(picked.view_mut());
                VariableData::Static(picked)
            }
            VariableData::TimeVarying(v) => {
                VariableData::TimeVarying(select_time_block(&v, selection))
            }
            VariableData::Layered {
                level_dim,
                levels,
                values,
            } => {
                let mut picked = values.select(Axis(2), rows).select(Axis(3), cols);
                for mut step in picked.outer_iter_mut() {
                    for slab in step.outer_iter_mut() {
                        selection.blank_outside(slab);
                    }
                }
                VariableData::Layered {
                    level_dim,
                    levels,
                    values: picked,
                }
            }
        }
    }

    fn select_times(self, indices: &[usize]) -> Self {
        match self {
            VariableData::Static(v) => VariableData::Static(v),
            VariableData::TimeVarying(v) => VariableData::TimeVarying(v.select(Axis(0), indices)),
            VariableData::Layered {
                level_dim,
                levels,
                values,
            } => VariableData::Layered {
                level_dim,
                levels,
                values: values.select(Axis(0), indices),
            },
        }
    }
}

/// A named variable and its attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataVariable {
    pub data: VariableData,
    pub attrs: BTreeMap<String, String>,
}

impl DataVariable {
    pub fn new(data: VariableData) -> Self {
        Self {
            data,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn units(&self) -> Option<&str> {
        self.attrs.get("units").map(String::as_str)
    }
}

/// Multi-variable gridded dataset sharing one time axis and one horizontal grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    time: Vec<CfDateTime>,
    grid: HorizontalGrid,
    variables: BTreeMap<String, DataVariable>,
    pub attrs: BTreeMap<String, String>,
}

impl Dataset {
    pub fn new(grid: HorizontalGrid, time: Vec<CfDateTime>) -> Self {
        Self {
            time,
            grid,
            variables: BTreeMap::new(),
            attrs: BTreeMap::new(),
        }
    }

    /// Add a variable, checking it matches the dataset's grid and time axis.
    pub fn with_variable(mut self, name: &str, variable: DataVariable) -> HarmonizeResult<Self> {
        let expected_spatial = self.grid.shape();
        let time_ok = variable
            .data
            .time_len()
            .map_or(true, |n| n == self.time.len());
        if variable.data.spatial_shape() != expected_spatial || !time_ok {
            let mut expected = match variable.data.time_len() {
                Some(_) => vec![self.time.len()],
                None => vec![],
            };
            if let VariableData::Layered { levels, .. } = &variable.data {
                expected.push(levels.len());
            }
            expected.extend([expected_spatial.0, expected_spatial.1]);
            return Err(HarmonizeError::ShapeMismatch {
                context: format!("variable `{name}`"),
                expected,
                found: variable.data.shape(),
            });
        }
        self.variables.insert(name.to_string(), variable);
        Ok(self)
    }

    pub fn variable(&self, name: &str) -> HarmonizeResult<&DataVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| HarmonizeError::MissingVariable(name.to_string()))
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn rename_variable(&mut self, from: &str, to: &str) -> HarmonizeResult<()> {
        let variable = self
            .variables
            .remove(from)
            .ok_or_else(|| HarmonizeError::MissingVariable(from.to_string()))?;
        self.variables.insert(to.to_string(), variable);
        Ok(())
    }

    /// Drop every data variable except those named.
    pub fn retain_variables(&mut self, keep: &[&str]) -> HarmonizeResult<()> {
        if let Some(missing) = keep.iter().find(|name| !self.variables.contains_key(**name)) {
            return Err(HarmonizeError::MissingVariable(missing.to_string()));
        }
        self.variables.retain(|name, _| keep.contains(&name.as_str()));
        Ok(())
    }

    /// Select one level of a layered variable and drop the level dimension.
    pub fn select_level(&mut self, name: &str, level_dim: &str, level: f64) -> HarmonizeResult<()> {
        let variable = self
            .variables
            .get_mut(name)
            .ok_or_else(|| HarmonizeError::MissingVariable(name.to_string()))?;
        let VariableData::Layered {
            level_dim: dim,
            levels,
            values,
        } = &variable.data
        else {
            return Err(HarmonizeError::Error(format!(
                "variable `{name}` has no `{level_dim}` dimension"
            )));
        };
        if dim != level_dim {
            return Err(HarmonizeError::Error(format!(
                "variable `{name}` is layered on `{dim}`, not `{level_dim}`"
            )));
        }
        let index = levels
            .iter()
            .position(|l| *l == level)
            .ok_or_else(|| {
                HarmonizeError::Error(format!("`{level_dim}` has no level {level}"))
            })?;
        let selected = values.index_axis(Axis(1), index).to_owned();
        variable.data = VariableData::TimeVarying(selected);
        Ok(())
    }

    /// Static 2-D values of a variable (e.g. cell area).
    pub fn static_values(&self, name: &str) -> HarmonizeResult<&Array2<f64>> {
        match &self.variable(name)?.data {
            VariableData::Static(values) => Ok(values),
            other => Err(HarmonizeError::ShapeMismatch {
                context: format!("static variable `{name}`"),
                expected: vec![self.grid.shape().0, self.grid.shape().1],
                found: other.shape(),
            }),
        }
    }

    /// Extract a time-varying variable as a [`GriddedField`].
    pub fn into_field(mut self, name: &str) -> HarmonizeResult<GriddedField> {
        let variable = self
            .variables
            .remove(name)
            .ok_or_else(|| HarmonizeError::MissingVariable(name.to_string()))?;
        match variable.data {
            VariableData::TimeVarying(values) => Ok(GriddedField {
                name: name.to_string(),
                time: self.time,
                grid: self.grid,
                values,
                attrs: variable.attrs,
            }),
            other => Err(HarmonizeError::ShapeMismatch {
                context: format!("time-varying variable `{name}`"),
                expected: vec![self.time.len(), self.grid.shape().0, self.grid.shape().1],
                found: other.shape(),
            }),
        }
    }

    /// Join datasets end to end along time, in the order given.
    ///
    /// Time-varying variables are concatenated; static variables are taken from
    /// the first part. Every part must share the grid shape and variable set.
    pub fn concat_time(parts: Vec<Dataset>) -> HarmonizeResult<Dataset> {
        let mut parts = parts.into_iter();
        let mut combined = parts
            .next()
            .ok_or_else(|| HarmonizeError::Error("no datasets to concatenate".to_string()))?;
        for part in parts {
            if part.grid.shape() != combined.grid.shape() {
                return Err(HarmonizeError::ShapeMismatch {
                    context: "concatenated grid".to_string(),
                    expected: vec![combined.grid.shape().0, combined.grid.shape().1],
                    found: vec![part.grid.shape().0, part.grid.shape().1],
                });
            }
            for (name, variable) in combined.variables.iter_mut() {
                let next = part
                    .variables
                    .get(name)
                    .ok_or_else(|| HarmonizeError::MissingVariable(name.clone()))?;
                variable.data = concat_variable(name, &variable.data, &next.data)?;
            }
            combined.time.extend(part.time);
        }
        Ok(combined)
    }
}

fn select_time_block(values: &Array3<f64>, selection: &CellSelection) -> Array3<f64> {
    let mut picked = values
        .select(Axis(1), selection.rows())
        .select(Axis(2), selection.cols());
    for slab in picked.outer_iter_mut() {
        selection.blank_outside(slab);
    }
    picked
}

fn concat_variable(
    name: &str,
    head: &VariableData,
    tail: &VariableData,
) -> HarmonizeResult<VariableData> {
    let mismatch = |e: ndarray::ShapeError| HarmonizeError::ShapeMismatch {
        context: format!("concatenating `{name}`: {e}"),
        expected: head.shape(),
        found: tail.shape(),
    };
    match (head, tail) {
        (VariableData::Static(a), VariableData::Static(_)) => Ok(VariableData::Static(a.clone())),
        (VariableData::TimeVarying(a), VariableData::TimeVarying(b)) => Ok(
            VariableData::TimeVarying(concatenate(Axis(0), &[a.view(), b.view()]).map_err(mismatch)?),
        ),
        (
            VariableData::Layered {
                level_dim,
                levels,
                values: a,
            },
            VariableData::Layered { values: b, .. },
        ) => Ok(VariableData::Layered {
            level_dim: level_dim.clone(),
            levels: levels.clone(),
            values: concatenate(Axis(0), &[a.view(), b.view()]).map_err(mismatch)?,
        }),
        _ => Err(HarmonizeError::ShapeMismatch {
            context: format!("concatenating `{name}` with a different layout"),
            expected: head.shape(),
            found: tail.shape(),
        }),
    }
}

impl Gridded for Dataset {
    fn grid(&self) -> &HorizontalGrid {
        &self.grid
    }

    fn grid_mut(&mut self) -> &mut HorizontalGrid {
        &mut self.grid
    }

    fn select_cells(self, selection: &CellSelection) -> Self {
        let grid = self.grid.select(selection.rows(), selection.cols());
        let variables = self
            .variables
            .into_iter()
            .map(|(name, variable)| {
                let data = variable.data.select_cells(selection);
                (
                    name,
                    DataVariable {
                        data,
                        attrs: variable.attrs,
                    },
                )
            })
            .collect();
        Self {
            time: self.time,
            grid,
            variables,
            attrs: self.attrs,
        }
    }
}

impl Temporal for Dataset {
    fn times(&self) -> &[CfDateTime] {
        &self.time
    }

    fn select_times(self, indices: &[usize]) -> Self {
        let time = indices.iter().map(|i| self.time[*i]).collect();
        let variables = self
            .variables
            .into_iter()
            .map(|(name, variable)| {
                let data = variable.data.select_times(indices);
                (
                    name,
                    DataVariable {
                        data,
                        attrs: variable.attrs,
                    },
                )
            })
            .collect();
        Self {
            time,
            grid: self.grid,
            variables,
            attrs: self.attrs,
        }
    }
}

/// A single time-varying variable on a horizontal grid, laid out (time, y, x).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GriddedField {
    name: String,
    time: Vec<CfDateTime>,
    grid: HorizontalGrid,
    values: Array3<f64>,
    pub attrs: BTreeMap<String, String>,
}

impl GriddedField {
    pub fn new(
        name: &str,
        time: Vec<CfDateTime>,
        grid: HorizontalGrid,
        values: Array3<f64>,
    ) -> HarmonizeResult<Self> {
        let (ny, nx) = grid.shape();
        if values.dim() != (time.len(), ny, nx) {
            return Err(HarmonizeError::ShapeMismatch {
                context: format!("field `{name}`"),
                expected: vec![time.len(), ny, nx],
                found: values.shape().to_vec(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            time,
            grid,
            values,
            attrs: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> Option<&str> {
        self.attrs.get("units").map(String::as_str)
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Replace the values, keeping the coordinate frame.
    pub fn map_values(mut self, f: impl Fn(f64) -> f64) -> Self {
        self.values.mapv_inplace(f);
        self
    }

    /// Rewrap as a single-variable dataset for persistence.
    pub fn into_dataset(self) -> Dataset {
        let mut variables = BTreeMap::new();
        variables.insert(
            self.name,
            DataVariable {
                data: VariableData::TimeVarying(self.values),
                attrs: self.attrs,
            },
        );
        Dataset {
            time: self.time,
            grid: self.grid,
            variables,
            attrs: BTreeMap::new(),
        }
    }
}

impl Gridded for GriddedField {
    fn grid(&self) -> &HorizontalGrid {
        &self.grid
    }

    fn grid_mut(&mut self) -> &mut HorizontalGrid {
        &mut self.grid
    }

    fn select_cells(self, selection: &CellSelection) -> Self {
        Self {
            grid: self.grid.select(selection.rows(), selection.cols()),
            values: select_time_block(&self.values, selection),
            ..self
        }
    }
}

impl Temporal for GriddedField {
    fn times(&self) -> &[CfDateTime] {
        &self.time
    }

    fn select_times(self, indices: &[usize]) -> Self {
        Self {
            time: indices.iter().map(|i| self.time[*i]).collect(),
            values: self.values.select(Axis(0), indices),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarKind;
    use ndarray::array;

    fn years(ys: &[i32]) -> Vec<CfDateTime> {
        ys.iter()
            .map(|y| CfDateTime::ymd(CalendarKind::Standard, *y, 1, 1).unwrap())
            .collect()
    }

    fn sample(ys: &[i32]) -> Dataset {
        let grid = HorizontalGrid::rectilinear(&[-40.0, -41.0], &[145.0, 146.0, 147.0]);
        let n = ys.len();
        let sst = Array3::from_shape_fn((n, 2, 3), |(t, j, i)| (t * 100 + j * 10 + i) as f64);
        let area = Array2::from_elem((2, 3), 1.0);
        Dataset::new(grid, years(ys))
            .with_variable("tos", DataVariable::new(VariableData::TimeVarying(sst)))
            .unwrap()
            .with_variable("areacello", DataVariable::new(VariableData::Static(area)))
            .unwrap()
    }

    #[test]
    fn rectilinear_broadcasts_coordinates() {
        let grid = HorizontalGrid::rectilinear(&[-40.0, -41.0], &[145.0, 146.0, 147.0]);
        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.lat().unwrap()[[1, 2]], -41.0);
        assert_eq!(grid.lon().unwrap()[[1, 2]], 147.0);
        assert_eq!(grid.dims(), ("lat", "lon"));
    }

    #[test]
    fn coordinate_shape_is_checked() {
        let grid = HorizontalGrid::new("y", "x", (2, 2));
        let err = grid
            .with_coordinate("nav_lat", Array2::zeros((3, 2)))
            .unwrap_err();
        assert!(matches!(err, HarmonizeError::ShapeMismatch { .. }));
    }

    #[test]
    fn variable_shape_is_checked() {
        let grid = HorizontalGrid::rectilinear(&[0.0], &[0.0, 1.0]);
        let err = Dataset::new(grid, years(&[2000]))
            .with_variable(
                "sst",
                DataVariable::new(VariableData::TimeVarying(Array3::zeros((2, 1, 2)))),
            )
            .unwrap_err();
        assert!(matches!(err, HarmonizeError::ShapeMismatch { .. }));
    }

    #[test]
    fn rename_coordinate_follows_dimension() {
        let mut grid = HorizontalGrid::rectilinear_named("latitude", "longitude", &[1.0], &[2.0]);
        grid.rename_coordinate("longitude", LON).unwrap();
        assert_eq!(grid.dims(), ("latitude", "lon"));
        assert!(grid.has_coordinate(LON));
        assert!(!grid.has_coordinate("longitude"));
    }

    #[test]
    fn select_cells_blanks_cells_outside_filter() {
        let ds = sample(&[2000]);
        let mask = array![[false, true, true], [false, true, false]];
        let selection = CellSelection::from_mask(&mask);
        assert_eq!(selection.rows(), &[0, 1]);
        assert_eq!(selection.cols(), &[1, 2]);

        let out = ds.select_cells(&selection);
        assert_eq!(out.grid().shape(), (2, 2));
        assert_eq!(out.grid().lon().unwrap()[[0, 0]], 146.0);
        let field = out.into_field("tos").unwrap();
        assert_eq!(field.values()[[0, 0, 0]], 1.0);
        assert_eq!(field.values()[[0, 0, 1]], 2.0);
        assert_eq!(field.values()[[0, 1, 0]], 11.0);
        assert!(field.values()[[0, 1, 1]].is_nan());
    }

    #[test]
    fn concat_time_appends_time_varying_and_keeps_static() {
        let joined = Dataset::concat_time(vec![sample(&[2000, 2001]), sample(&[2002])]).unwrap();
        assert_eq!(joined.times().len(), 3);
        assert_eq!(joined.static_values("areacello").unwrap().dim(), (2, 3));
        let field = joined.into_field("tos").unwrap();
        assert_eq!(field.values().dim(), (3, 2, 3));
        assert_eq!(field.values()[[2, 0, 0]], 0.0);
        assert_eq!(field.values()[[1, 0, 0]], 100.0);
    }

    #[test]
    fn concat_time_requires_matching_variables() {
        let mut short = sample(&[2002]);
        short.retain_variables(&["areacello"]).unwrap();
        let err = Dataset::concat_time(vec![sample(&[2000]), short]).unwrap_err();
        assert!(matches!(err, HarmonizeError::MissingVariable(name) if name == "tos"));
    }

    #[test]
    fn select_level_drops_level_dimension() {
        let grid = HorizontalGrid::rectilinear(&[0.0], &[0.0]);
        let values = Array4::from_elem((2, 1, 1, 1), 12.5);
        let mut ds = Dataset::new(grid, years(&[2000, 2001]))
            .with_variable(
                "sst",
                DataVariable::new(VariableData::Layered {
                    level_dim: "zlev".to_string(),
                    levels: vec![0.0],
                    values,
                }),
            )
            .unwrap();
        ds.select_level("sst", "zlev", 0.0).unwrap();
        let field = ds.into_field("sst").unwrap();
        assert_eq!(field.values().dim(), (2, 1, 1));
    }

    #[test]
    fn retain_variables_reports_missing() {
        let mut ds = sample(&[2000]);
        assert!(ds.retain_variables(&["sst"]).is_err());
        ds.rename_variable("tos", "sst").unwrap();
        ds.retain_variables(&["sst"]).unwrap();
        assert_eq!(ds.variable_names().collect::<Vec<_>>(), vec!["sst"]);
    }

    #[test]
    fn missing_values_survive_json() {
        let mut ds = sample(&[2000]);
        let mask = array![[true, true, false], [true, true, true]];
        ds = ds.select_cells(&CellSelection::from_mask(&mask));
        let text = serde_json::to_string(&ds).unwrap();
        let back: Dataset = serde_json::from_str(&text).unwrap();
        let field = back.into_field("tos").unwrap();
        assert!(field.values()[[0, 0, 2]].is_nan());
        assert_eq!(field.values()[[0, 1, 2]], 12.0);
    }

    #[test]
    fn field_select_times_reorders() {
        let field = sample(&[2000, 2001, 2002]).into_field("tos").unwrap();
        let picked = field.select_times(&[2, 0]);
        assert_eq!(picked.times()[0].year(), 2002);
        assert_eq!(picked.values()[[0, 0, 0]], 200.0);
        assert_eq!(picked.values()[[1, 0, 0]], 0.0);
    }
}
