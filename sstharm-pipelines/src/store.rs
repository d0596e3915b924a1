//! Dataset persistence
//!
//! Pipelines talk to storage through [`DatasetStore`]. [`JsonStore`] keeps
//! every container as a JSON document; the NetCDF-4 store lives in
//! `netcdf_store` behind the `netcdf` feature. JSON documents come in two
//! shapes:
//!
//! - **Raw archive files** hold numeric CF time offsets (`units`, `calendar`,
//!   `values`) that are decoded on read, as well as 2-D coordinates and the
//!   data variables.
//! - **Artifacts** written by the pipelines are serialised [`Dataset`]s or
//!   [`IndexArtifact`]s with already-decoded timestamps.
//!
//! Missing cells are stored as `null`.

use crate::output::IndexArtifact;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sstharm_core::calendar::decode_cf_times;
use sstharm_core::dataset::{DataVariable, Dataset, HorizontalGrid};
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Extension of every file the JSON store reads or writes
pub const EXTENSION: &str = "json";

/// CF-encoded time axis of a raw file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawTimeAxis {
    /// e.g. `days since 1850-01-01`
    pub units: String,
    /// CF calendar attribute, e.g. `noleap`
    pub calendar: String,
    pub values: Vec<f64>,
}

/// One raw archive file as laid out on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFile {
    /// Absent for static files such as cell area
    #[serde(default)]
    pub time: Option<RawTimeAxis>,
    /// Names of the (y, x) dimensions
    pub dims: [String; 2],
    pub shape: (usize, usize),
    pub coords: BTreeMap<String, ndarray::Array2<f64>>,
    pub variables: BTreeMap<String, DataVariable>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl RawFile {
    /// Decode the time axis and build a checked [`Dataset`].
    pub fn decode(self) -> HarmonizeResult<Dataset> {
        let time = match &self.time {
            Some(axis) => decode_cf_times(&axis.units, &axis.calendar, &axis.values)?,
            None => Vec::new(),
        };
        let mut grid = HorizontalGrid::new(&self.dims[0], &self.dims[1], self.shape);
        for (name, values) in self.coords {
            grid = grid.with_coordinate(&name, values)?;
        }
        let mut dataset = Dataset::new(grid, time);
        for (name, variable) in self.variables {
            dataset = dataset.with_variable(&name, variable)?;
        }
        dataset.attrs = self.attrs;
        Ok(dataset)
    }
}

/// Storage collaborator used by every pipeline.
pub trait DatasetStore: Send + Sync {
    /// Data files directly inside `dir`, sorted by file name.
    fn list_files(&self, dir: &Path) -> HarmonizeResult<Vec<PathBuf>>;

    /// Artifacts in `dir` whose file name starts with `prefix`, sorted.
    fn find_artifacts(&self, dir: &Path, prefix: &str) -> HarmonizeResult<Vec<PathBuf>> {
        Ok(self
            .list_files(dir)?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            })
            .collect())
    }

    /// Path of the artifact named `stem` inside `dir`
    fn artifact_path(&self, dir: &Path, stem: &str) -> PathBuf;

    fn read_raw(&self, path: &Path) -> HarmonizeResult<Dataset>;

    fn read_dataset(&self, path: &Path) -> HarmonizeResult<Dataset>;

    fn write_dataset(&self, path: &Path, dataset: &Dataset) -> HarmonizeResult<()>;

    fn write_indices(&self, path: &Path, indices: &IndexArtifact) -> HarmonizeResult<()>;
}

/// Read raw files and join them along time, in the order given.
pub fn load_files<S: DatasetStore + ?Sized>(store: &S, files: &[PathBuf]) -> HarmonizeResult<Dataset> {
    let parts = files
        .iter()
        .map(|path| store.read_raw(path))
        .collect::<HarmonizeResult<Vec<_>>>()?;
    Dataset::concat_time(parts)
}

/// Files in `dir` with the given extension, sorted by name.
pub(crate) fn list_with_extension(dir: &Path, extension: &str) -> HarmonizeResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// JSON documents on the local file system.
#[derive(Copy, Clone, Debug, Default)]
pub struct JsonStore;

impl JsonStore {
    fn read_json<T: DeserializeOwned>(path: &Path) -> HarmonizeResult<T> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| HarmonizeError::Serialization(format!("{}: {e}", path.display())))
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> HarmonizeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), value)
            .map_err(|e| HarmonizeError::Serialization(format!("{}: {e}", path.display())))
    }
}

impl DatasetStore for JsonStore {
    fn list_files(&self, dir: &Path) -> HarmonizeResult<Vec<PathBuf>> {
        list_with_extension(dir, EXTENSION)
    }

    fn artifact_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{stem}.{EXTENSION}"))
    }

    fn read_raw(&self, path: &Path) -> HarmonizeResult<Dataset> {
        Self::read_json::<RawFile>(path)?.decode()
    }

    fn read_dataset(&self, path: &Path) -> HarmonizeResult<Dataset> {
        Self::read_json(path)
    }

    fn write_dataset(&self, path: &Path, dataset: &Dataset) -> HarmonizeResult<()> {
        Self::write_json(path, dataset)
    }

    fn write_indices(&self, path: &Path, indices: &IndexArtifact) -> HarmonizeResult<()> {
        Self::write_json(path, indices)
    }
}
