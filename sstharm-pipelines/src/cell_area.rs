//! Cell-area extraction for model grids
//!
//! Reads the `areacello` catalog (line 0, the observational product, is
//! skipped), trims each model's native cell area to the extraction box and
//! persists `areacello.<region>.<source>.<experiment>.<variant>`.
//!
//! Longitudes are left in the native convention. Area fields are reduced to
//! weights by position and never joined on coordinates.

use crate::batch::{Pipeline, SourceFailure, SourceOutcome, Stage, StageContext};
use crate::catalog::{area_entries, CatalogEntry};
use crate::output::{assemble_cell_area, ArtifactKind};
use crate::store::{load_files, DatasetStore};
use log::info;
use sstharm_core::config::RunConfig;
use sstharm_core::descriptor::resolve_area_entry;
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use sstharm_core::longitude::{harmonize_grid, BoundingBox, LongitudeRemap};
use sstharm_core::policy::AREA;

pub struct CellAreaPipeline<S> {
    store: S,
    config: RunConfig,
    bbox: BoundingBox,
}

impl<S: DatasetStore> CellAreaPipeline<S> {
    pub fn new(store: S, config: RunConfig) -> HarmonizeResult<Self> {
        let bbox = config.bounding_box()?;
        Ok(Self {
            store,
            config,
            bbox,
        })
    }
}

impl<S: DatasetStore> Pipeline for CellAreaPipeline<S> {
    fn name(&self) -> &'static str {
        "cell-area"
    }

    fn entries(&self) -> HarmonizeResult<Vec<CatalogEntry>> {
        area_entries(&self.config)
    }

    fn run_source(&self, entry: &CatalogEntry) -> Result<SourceOutcome, SourceFailure> {
        let index = entry.index;
        let source = resolve_area_entry(index, &entry.historical).at_stage(
            Stage::Resolve,
            index,
            &entry.provisional_label(),
        )?;
        let label = source.label.as_str();
        info!("processing {label}");

        let dir = self.config.archive_path(&entry.historical);
        let files = self
            .store
            .list_files(&dir)
            .and_then(|files| {
                if files.is_empty() {
                    Err(HarmonizeError::MissingArtifact {
                        kind: "input".to_string(),
                        label: label.to_string(),
                        location: dir.display().to_string(),
                    })
                } else {
                    Ok(files)
                }
            })
            .at_stage(Stage::Listing, index, label)?;

        let mut dataset = load_files(&self.store, &files).at_stage(Stage::Load, index, label)?;
        dataset
            .retain_variables(&[AREA])
            .at_stage(Stage::Load, index, label)?;

        info!("{label}: keeping native longitude convention for cell area");
        let (dataset, convention) = harmonize_grid(dataset, &self.bbox, LongitudeRemap::Preserve)
            .at_stage(Stage::Harmonize, index, label)?;
        info!("{label}: longitude convention {convention:?}");

        let output = assemble_cell_area(dataset, &source, &self.config.region_label, &self.bbox);
        let stem = ArtifactKind::CellArea.stem(&self.config.region_label, label);
        let path = self.store.artifact_path(&self.config.grid_dir, &stem);
        self.store
            .write_dataset(&path, &output)
            .at_stage(Stage::Persist, index, label)?;

        Ok(SourceOutcome {
            index,
            label: source.label.clone(),
            artifact: path,
            span: None,
        })
    }
}
