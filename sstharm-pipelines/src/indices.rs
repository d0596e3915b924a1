//! Regional SST indices
//!
//! Reads each source's stored regional SST, rasterises the region set on its
//! grid, derives weights from the source's policy (latitude cosine, or the
//! stored model cell area) and persists the weighted regional means as
//! `sst_indices.<region>.<label>`.

use crate::batch::{Pipeline, SourceFailure, SourceOutcome, Stage, StageContext};
use crate::catalog::{paired_entries, CatalogEntry};
use crate::output::{ArtifactKind, IndexArtifact};
use crate::store::DatasetStore;
use log::{debug, info};
use ndarray::Array2;
use sstharm_core::aggregate::{mask_unphysical, weighted_regional_means};
use sstharm_core::config::RunConfig;
use sstharm_core::dataset::{Gridded, Temporal};
use sstharm_core::descriptor::{resolve_entry, ResolvedSource};
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use sstharm_core::longitude::BoundingBox;
use sstharm_core::policy::{AREA, SST};
use sstharm_core::regions::RegionSet;
use sstharm_core::weights::{weights_for_policy, WeightingStrategy};
use std::io::ErrorKind;

pub struct IndicesPipeline<S> {
    store: S,
    config: RunConfig,
    bbox: BoundingBox,
    regions: RegionSet,
}

impl<S: DatasetStore> IndicesPipeline<S> {
    pub fn new(store: S, config: RunConfig) -> HarmonizeResult<Self> {
        let bbox = config.bounding_box()?;
        Ok(Self {
            store,
            config,
            bbox,
            regions: RegionSet::tasmania(),
        })
    }

    /// Use a different region set
    pub fn with_regions(mut self, regions: RegionSet) -> Self {
        self.regions = regions;
        self
    }

    /// Stored native cell area for a model, looked up by source name.
    ///
    /// When several experiments were stored for one source the first in
    /// name order is used.
    fn stored_cell_area(&self, source: &ResolvedSource) -> HarmonizeResult<Array2<f64>> {
        let prefix = ArtifactKind::CellArea.name_prefix(&self.config.region_label, &source.name);
        let found = match self.store.find_artifacts(&self.config.grid_dir, &prefix) {
            Err(HarmonizeError::Io(e)) if e.kind() == ErrorKind::NotFound => Vec::new(),
            other => other?,
        };
        let Some(path) = found.first() else {
            return Err(HarmonizeError::MissingArtifact {
                kind: AREA.to_string(),
                label: source.label.clone(),
                location: format!("{}/{prefix}*", self.config.grid_dir.display()),
            });
        };
        debug!("{}: cell area from {}", source.label, path.display());
        let dataset = self.store.read_dataset(path)?;
        Ok(dataset.static_values(AREA)?.clone())
    }
}

impl<S: DatasetStore> Pipeline for IndicesPipeline<S> {
    fn name(&self) -> &'static str {
        "indices"
    }

    fn entries(&self) -> HarmonizeResult<Vec<CatalogEntry>> {
        paired_entries(&self.config)
    }

    fn run_source(&self, entry: &CatalogEntry) -> Result<SourceOutcome, SourceFailure> {
        let index = entry.index;
        let scenario_line = entry.scenario.as_deref().unwrap_or(&entry.historical);
        let source = resolve_entry(index, &entry.historical, scenario_line).at_stage(
            Stage::Resolve,
            index,
            &entry.provisional_label(),
        )?;
        let label = source.label.as_str();
        info!("processing {label}");

        let stem = ArtifactKind::RegionSst.stem(&self.config.region_label, label);
        let sst_path = self.store.artifact_path(&self.config.sst_dir, &stem);
        let field = match self.store.read_dataset(&sst_path) {
            Err(HarmonizeError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(HarmonizeError::MissingArtifact {
                    kind: SST.to_string(),
                    label: label.to_string(),
                    location: sst_path.display().to_string(),
                })
            }
            other => other,
        }
        .and_then(|ds| ds.into_field(SST))
        .map(mask_unphysical)
        .at_stage(Stage::Load, index, label)?;
        debug!(
            "{label}: {} time steps on a {:?} grid",
            field.times().len(),
            field.grid().shape()
        );

        let masks = self
            .regions
            .mask_3d(field.grid())
            .at_stage(Stage::Masks, index, label)?;

        let area = match source.policy.weighting {
            WeightingStrategy::NormalizedCellArea => Some(
                self.stored_cell_area(&source)
                    .at_stage(Stage::Weights, index, label)?,
            ),
            WeightingStrategy::LatitudeCosine => None,
        };
        let weights = weights_for_policy(&source.policy, field.grid(), area.as_ref())
            .at_stage(Stage::Weights, index, label)?;

        info!("{label}: computing indices");
        let series = weighted_regional_means(&field, &masks, &weights)
            .at_stage(Stage::Aggregate, index, label)?;
        let artifact = IndexArtifact::assemble(
            &series,
            &masks,
            field.units(),
            &source,
            &self.config.region_label,
            &self.bbox,
        )
        .at_stage(Stage::Aggregate, index, label)?;

        let stem = ArtifactKind::Indices.stem(&self.config.region_label, label);
        let path = self.store.artifact_path(&self.config.output_dir, &stem);
        self.store
            .write_indices(&path, &artifact)
            .at_stage(Stage::Persist, index, label)?;

        Ok(SourceOutcome {
            index,
            label: source.label.clone(),
            artifact: path,
            span: None,
        })
    }
}
