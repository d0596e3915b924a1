//! Regional SST extraction
//!
//! For each catalog entry: list the historical then scenario files, apply any
//! known-issue truncation, concatenate, harmonise variable and coordinate
//! naming, trim to the extraction box (longitudes wrapped to 0–360), trim to
//! the analysis window, blank non-physical values and persist
//! `sst.<region>.<label>`.

use crate::batch::{Pipeline, SourceFailure, SourceOutcome, Stage, StageContext};
use crate::catalog::{paired_entries, CatalogEntry};
use crate::output::{assemble_region_sst, ArtifactKind};
use crate::store::{load_files, DatasetStore};
use log::{debug, info};
use sstharm_core::aggregate::mask_unphysical;
use sstharm_core::config::RunConfig;
use sstharm_core::dataset::Dataset;
use sstharm_core::descriptor::{resolve_entry, ResolvedSource};
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use sstharm_core::longitude::{harmonize_grid, BoundingBox, LongitudeRemap};
use sstharm_core::overrides::apply_known_issues;
use sstharm_core::policy::{SourcePolicy, SST};
use sstharm_core::time_window::select_time_window;
use std::path::PathBuf;

/// Rename the source's SST variable to `sst`, drop everything else and
/// remove a singleton level dimension if the source has one.
pub fn prepare_sst_variable(
    mut dataset: Dataset,
    policy: &SourcePolicy,
) -> HarmonizeResult<Dataset> {
    if policy.source_variable != SST {
        dataset.rename_variable(&policy.source_variable, SST)?;
    }
    dataset.retain_variables(&[SST])?;
    if let Some(level) = &policy.level {
        dataset.select_level(SST, &level.dim, level.level)?;
    }
    Ok(dataset)
}

pub struct RegionSstPipeline<S> {
    store: S,
    config: RunConfig,
    bbox: BoundingBox,
}

impl<S: DatasetStore> RegionSstPipeline<S> {
    pub fn new(store: S, config: RunConfig) -> HarmonizeResult<Self> {
        let bbox = config.bounding_box()?;
        Ok(Self {
            store,
            config,
            bbox,
        })
    }

    /// Historical files sorted, then scenario files sorted, without repeats,
    /// after any known-issue truncation.
    pub fn source_files(
        &self,
        entry: &CatalogEntry,
        source: &ResolvedSource,
    ) -> HarmonizeResult<Vec<PathBuf>> {
        let mut dirs = vec![self.config.archive_path(&entry.historical)];
        if let Some(scenario) = &entry.scenario {
            dirs.push(self.config.archive_path(scenario));
        }
        let mut files: Vec<PathBuf> = Vec::new();
        for dir in &dirs {
            for file in self.store.list_files(dir)? {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }
        if let Some(scenario) = &source.scenario {
            files = apply_known_issues(scenario, files);
        }
        if files.is_empty() {
            return Err(HarmonizeError::MissingArtifact {
                kind: "input".to_string(),
                label: source.label.clone(),
                location: dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        debug!("{}: {} input files", source.label, files.len());
        Ok(files)
    }

    pub fn artifact_path(&self, source: &ResolvedSource) -> PathBuf {
        let stem = ArtifactKind::RegionSst.stem(&self.config.region_label, &source.label);
        self.store.artifact_path(&self.config.sst_dir, &stem)
    }
}

impl<S: DatasetStore> Pipeline for RegionSstPipeline<S> {
    fn name(&self) -> &'static str {
        "region-sst"
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

        let files = self
            .source_files(entry, &source)
            .at_stage(Stage::Listing, index, label)?;
        let dataset = load_files(&self.store, &files)
            .and_then(|ds| prepare_sst_variable(ds, &source.policy))
            .at_stage(Stage::Load, index, label)?;

        let (dataset, convention) = harmonize_grid(dataset, &self.bbox, LongitudeRemap::Wrap)
            .at_stage(Stage::Harmonize, index, label)?;
        debug!("{label}: longitude convention {convention:?}");

        let (dataset, span) = select_time_window(dataset, &source.policy)
            .at_stage(Stage::TimeWindow, index, label)?;
        let field = dataset
            .into_field(SST)
            .map(mask_unphysical)
            .at_stage(Stage::Load, index, label)?;

        let output = assemble_region_sst(field, &source, &self.config.region_label, &self.bbox);
        let path = self.artifact_path(&source);
        self.store
            .write_dataset(&path, &output)
            .at_stage(Stage::Persist, index, label)?;

        Ok(SourceOutcome {
            index,
            label: source.label.clone(),
            artifact: path,
            span: Some(span),
        })
    }
}
