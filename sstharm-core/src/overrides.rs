//! Known-issue file overrides
//!
//! Some published model versions ship a scenario file whose time axis is
//! corrupt. Those files lie past 2100 so they are never needed; the fix is to
//! keep only a leading subset of the naturally sorted historical+scenario file
//! list before anything is loaded.
//!
//! This is data rather than logic. Add entries to [`KNOWN_ISSUES`].

use crate::descriptor::SourceDescriptor;
use log::info;

/// One archive version with a corrupted file set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnownIssue {
    pub source_id: &'static str,
    pub experiment_id: &'static str,
    pub variant_label: &'static str,
    pub data_version: &'static str,
    /// Indices into the combined sorted file list to retain, in order
    pub keep: &'static [usize],
    /// The offending file
    pub note: &'static str,
}

impl KnownIssue {
    pub fn matches(&self, descriptor: &SourceDescriptor) -> bool {
        descriptor.source_id == self.source_id
            && descriptor.experiment_label == self.experiment_id
            && descriptor.variant_label == self.variant_label
            && descriptor.data_version.as_deref() == Some(self.data_version)
    }
}

pub const KNOWN_ISSUES: &[KnownIssue] = &[
    KnownIssue {
        source_id: "IPSL-CM6A-LR",
        experiment_id: "ssp126",
        variant_label: "r1i1p1f1",
        data_version: "v20190903",
        keep: &[0, 1],
        note: "tos_Oday_IPSL-CM6A-LR_ssp126_r1i1p1f1_gn_21010101-23001231.nc",
    },
    KnownIssue {
        source_id: "IPSL-CM6A-LR",
        experiment_id: "ssp585",
        variant_label: "r1i1p1f1",
        data_version: "v20190903",
        keep: &[0, 1],
        note: "tos_Oday_IPSL-CM6A-LR_ssp585_r1i1p1f1_gn_21010101-23001231.nc",
    },
    KnownIssue {
        source_id: "MRI-ESM2-0",
        experiment_id: "ssp126",
        variant_label: "r1i1p1f1",
        data_version: "v20210329",
        keep: &[0, 1, 2, 3, 4],
        note: "tos_Oday_MRI-ESM2-0_ssp126_r1i1p1f1_gn_22510101-23001231.nc",
    },
    KnownIssue {
        source_id: "MRI-ESM2-0",
        experiment_id: "ssp585",
        variant_label: "r1i1p1f1",
        data_version: "v20210329",
        keep: &[0, 1, 2, 3, 4],
        note: "tos_Oday_MRI-ESM2-0_ssp585_r1i1p1f1_gn_22510101-23001231.nc",
    },
];

/// Look up the override for a scenario descriptor.
pub fn find_known_issue(descriptor: &SourceDescriptor) -> Option<&'static KnownIssue> {
    KNOWN_ISSUES.iter().find(|issue| issue.matches(descriptor))
}

/// Truncate a combined file list if the scenario descriptor has a known issue.
///
/// Indices past the end of the list are ignored. Lists for sources without an
/// entry pass through unchanged.
pub fn apply_known_issues<T>(scenario: &SourceDescriptor, files: Vec<T>) -> Vec<T> {
    let Some(issue) = find_known_issue(scenario) else {
        return files;
    };
    info!(
        "known issue for {} {} {} {}: keeping files {:?} (skips {})",
        issue.source_id, issue.experiment_id, issue.variant_label, issue.data_version, issue.keep,
        issue.note
    );
    let mut indexed: Vec<Option<T>> = files.into_iter().map(Some).collect();
    issue
        .keep
        .iter()
        .filter_map(|&i| indexed.get_mut(i).and_then(Option::take))
        .collect()
}
