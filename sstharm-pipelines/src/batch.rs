//! Batch execution with per-source failure isolation
//!
//! Sources share no mutable state, so a batch fans out across sources with
//! `rayon`. A failing source becomes a [`SourceFailure`] in the report; its
//! siblings run to completion regardless.

use crate::catalog::CatalogEntry;
use log::{info, warn};
use rayon::prelude::*;
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use sstharm_core::time_window::YearSpan;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline step a failure occurred in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Listing,
    Load,
    Harmonize,
    TimeWindow,
    Weights,
    Masks,
    Aggregate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Listing => "file listing",
            Stage::Load => "load",
            Stage::Harmonize => "grid harmonisation",
            Stage::TimeWindow => "time window",
            Stage::Weights => "weights",
            Stage::Masks => "region masks",
            Stage::Aggregate => "aggregation",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// A failure scoped to one source.
#[derive(Error, Debug)]
#[error("{label}: {stage} failed: {error}")]
pub struct SourceFailure {
    pub index: usize,
    pub label: String,
    pub stage: Stage,
    #[source]
    pub error: HarmonizeError,
}

/// Attach source context to a stage result.
pub trait StageContext<T> {
    fn at_stage(self, stage: Stage, index: usize, label: &str) -> Result<T, SourceFailure>;
}

impl<T> StageContext<T> for HarmonizeResult<T> {
    fn at_stage(self, stage: Stage, index: usize, label: &str) -> Result<T, SourceFailure> {
        self.map_err(|error| SourceFailure {
            index,
            label: label.to_string(),
            stage,
            error,
        })
    }
}

/// A source processed to completion.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceOutcome {
    pub index: usize,
    pub label: String,
    pub artifact: PathBuf,
    /// Retained year span, for pipelines that trim time
    pub span: Option<YearSpan>,
}

/// A processing pipeline run once per catalog entry.
pub trait Pipeline: Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Catalog entries to process
    fn entries(&self) -> HarmonizeResult<Vec<CatalogEntry>>;

    fn run_source(&self, entry: &CatalogEntry) -> Result<SourceOutcome, SourceFailure>;
}

/// Successes and failures of one batch, in catalog order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<SourceOutcome>,
    pub failed: Vec<SourceFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run every catalog entry of a pipeline.
///
/// Fails only when the catalog itself cannot be read.
pub fn run_batch<P: Pipeline>(pipeline: &P) -> HarmonizeResult<BatchReport> {
    let entries = pipeline.entries()?;
    info!("{}: process list", pipeline.name());
    for entry in &entries {
        info!("[{}]: {}", entry.index, entry.historical);
    }
    Ok(run_entries(pipeline, &entries))
}

/// Run a pipeline over explicit entries.
pub fn run_entries<P: Pipeline>(pipeline: &P, entries: &[CatalogEntry]) -> BatchReport {
    let results: Vec<Result<SourceOutcome, SourceFailure>> = entries
        .par_iter()
        .map(|entry| pipeline.run_source(entry))
        .collect();

    let mut report = BatchReport::default();
    for result in results {
        match result {
            Ok(outcome) => {
                info!(
                    "{}: wrote {} for {}",
                    pipeline.name(),
                    outcome.artifact.display(),
                    outcome.label
                );
                report.succeeded.push(outcome);
            }
            Err(failure) => {
                warn!("{}: {failure}", pipeline.name());
                report.failed.push(failure);
            }
        }
    }
    info!(
        "{}: {} succeeded, {} failed",
        pipeline.name(),
        report.succeeded.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EvenOnly;

    impl Pipeline for EvenOnly {
        fn name(&self) -> &'static str {
            "even-only"
        }

        fn entries(&self) -> HarmonizeResult<Vec<CatalogEntry>> {
            Ok((0..5)
                .map(|index| CatalogEntry {
                    index,
                    historical: format!("/src/{index}/"),
                    scenario: None,
                })
                .collect())
        }

        fn run_source(&self, entry: &CatalogEntry) -> Result<SourceOutcome, SourceFailure> {
            let label = entry.provisional_label();
            if entry.index % 2 == 1 {
                return Err(HarmonizeError::Error("odd".to_string())).at_stage(
                    Stage::Load,
                    entry.index,
                    &label,
                );
            }
            Ok(SourceOutcome {
                index: entry.index,
                label,
                artifact: PathBuf::from(format!("{}.json", entry.index)),
                span: None,
            })
        }
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let report = run_batch(&EvenOnly).unwrap();
        assert_eq!(report.len(), 5);
        assert_eq!(report.succeeded.len(), 3);
        assert!(!report.is_success());
        let failed: Vec<usize> = report.failed.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 3]);
        assert_eq!(report.failed[0].stage, Stage::Load);
        assert_eq!(
            report.failed[0].to_string(),
            "catalog entry 1: load failed: odd"
        );
    }
}
