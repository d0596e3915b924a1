//! Source provenance parsed from archive path identifiers
//!
//! Catalog lines are absolute archive directories. Model directories follow
//! the CMIP6 data reference syntax, so the provenance fields sit at fixed
//! offsets once the path is split on `/`:
//!
//! ```text
//! /g/data/oi10/replicas/CMIP6/CMIP/NCAR/CESM2/historical/r4i1p1f1/Oday/tos/gn/v20190308/
//! ```
//!
//! Splitting that path gives an empty segment 0, the source id at 8, experiment
//! at 9, variant at 10, table at 11, variable at 12, grid at 13, version at 14.
//! Observational products live in a shallower tree and are labelled by
//! segments 4 to 6, e.g. `NOAA_OISST.AVHRR.v2-1_modified`.

use crate::errors::{HarmonizeError, HarmonizeResult};
use crate::policy::SourcePolicy;
use serde::{Deserialize, Serialize};

/// Experiment label shared by every historical catalog
pub const HISTORICAL: &str = "historical";

const SOURCE_SEGMENT: usize = 8;
const EXPERIMENT_SEGMENT: usize = 9;
const VARIANT_SEGMENT: usize = 10;
const TABLE_SEGMENT: usize = 11;
const VARIABLE_SEGMENT: usize = 12;
const GRID_SEGMENT: usize = 13;
const VERSION_SEGMENT: usize = 14;

const OBSERVATION_SEGMENTS: std::ops::Range<usize> = 4..7;

/// Whether data was measured or simulated
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Observation,
    Model,
}

/// Provenance record for one archive directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub experiment_label: String,
    pub variant_label: String,
    pub grid_label: String,
    pub table_id: Option<String>,
    pub variable_id: Option<String>,
    pub data_version: Option<String>,
    pub provenance: Provenance,
}

impl SourceDescriptor {
    pub fn is_observation(&self) -> bool {
        self.provenance == Provenance::Observation
    }
}

fn segment<'a>(parts: &[&'a str], index: usize, identifier: &str) -> HarmonizeResult<&'a str> {
    match parts.get(index) {
        Some(part) if !part.is_empty() => Ok(*part),
        _ => Err(HarmonizeError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: format!("no path segment at position {index}"),
        }),
    }
}

fn optional_segment(parts: &[&str], index: usize) -> Option<String> {
    parts
        .get(index)
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
}

/// Parse a CMIP6 model directory.
pub fn parse_model_identifier(identifier: &str) -> HarmonizeResult<SourceDescriptor> {
    let parts: Vec<&str> = identifier.trim().split('/').collect();
    Ok(SourceDescriptor {
        source_id: segment(&parts, SOURCE_SEGMENT, identifier)?.to_string(),
        experiment_label: segment(&parts, EXPERIMENT_SEGMENT, identifier)?.to_string(),
        variant_label: segment(&parts, VARIANT_SEGMENT, identifier)?.to_string(),
        grid_label: optional_segment(&parts, GRID_SEGMENT).unwrap_or_default(),
        table_id: optional_segment(&parts, TABLE_SEGMENT),
        variable_id: optional_segment(&parts, VARIABLE_SEGMENT),
        data_version: optional_segment(&parts, VERSION_SEGMENT),
        provenance: Provenance::Model,
    })
}

/// Parse an observational product directory.
///
/// The product name, platform and version take the place of the source,
/// experiment and variant fields.
pub fn parse_observation_identifier(identifier: &str) -> HarmonizeResult<SourceDescriptor> {
    let parts: Vec<&str> = identifier.trim().split('/').collect();
    let fields = OBSERVATION_SEGMENTS
        .map(|i| segment(&parts, i, identifier).map(str::to_string))
        .collect::<HarmonizeResult<Vec<_>>>()?;
    let [source_id, experiment_label, variant_label]: [String; 3] =
        fields
            .try_into()
            .map_err(|_| HarmonizeError::InvalidIdentifier {
                identifier: identifier.to_string(),
                reason: "expected three observational label segments".to_string(),
            })?;
    Ok(SourceDescriptor {
        source_id,
        experiment_label,
        variant_label,
        grid_label: String::new(),
        table_id: None,
        variable_id: None,
        data_version: None,
        provenance: Provenance::Observation,
    })
}

/// A catalog entry resolved into provenance, naming and processing policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSource {
    /// Position in the catalog; entry 0 is the observational product
    pub index: usize,
    /// Label used for artifact and output naming
    pub label: String,
    /// Short name, the source id (used to find per-source artifacts)
    pub name: String,
    pub historical: SourceDescriptor,
    pub scenario: Option<SourceDescriptor>,
    pub policy: SourcePolicy,
}

impl ResolvedSource {
    pub fn is_observation(&self) -> bool {
        self.historical.is_observation()
    }
}

/// `<source_id>.<experiment_h>+<experiment_f>.<variant_label>`
pub fn model_label(historical: &SourceDescriptor, scenario: &SourceDescriptor) -> String {
    format!(
        "{}.{}+{}.{}",
        historical.source_id,
        historical.experiment_label,
        scenario.experiment_label,
        historical.variant_label
    )
}

fn observation_label(descriptor: &SourceDescriptor) -> String {
    format!(
        "{}.{}.{}",
        descriptor.source_id, descriptor.experiment_label, descriptor.variant_label
    )
}

/// Check a historical/scenario pair describes the same model run.
pub fn check_consistency(
    historical: &SourceDescriptor,
    scenario: &SourceDescriptor,
) -> HarmonizeResult<()> {
    if historical.source_id != scenario.source_id {
        return Err(HarmonizeError::Consistency {
            field: "source_id".to_string(),
            historical: historical.source_id.clone(),
            scenario: scenario.source_id.clone(),
        });
    }
    if historical.variant_label != scenario.variant_label {
        return Err(HarmonizeError::Consistency {
            field: "variant_label".to_string(),
            historical: historical.variant_label.clone(),
            scenario: scenario.variant_label.clone(),
        });
    }
    Ok(())
}

/// Resolve line `index` of the paired historical and scenario catalogs.
///
/// Line 0 is always the observational product and its scenario line is ignored.
pub fn resolve_entry(
    index: usize,
    historical: &str,
    scenario: &str,
) -> HarmonizeResult<ResolvedSource> {
    if index == 0 {
        let descriptor = parse_observation_identifier(historical)?;
        return Ok(ResolvedSource {
            index,
            label: observation_label(&descriptor),
            name: descriptor.source_id.clone(),
            historical: descriptor,
            scenario: None,
            policy: SourcePolicy::observation(),
        });
    }
    let h = parse_model_identifier(historical)?;
    let f = parse_model_identifier(scenario)?;
    check_consistency(&h, &f)?;
    Ok(ResolvedSource {
        index,
        label: model_label(&h, &f),
        name: h.source_id.clone(),
        historical: h,
        scenario: Some(f),
        policy: SourcePolicy::model(),
    })
}

/// Resolve a line of the single cell-area catalog.
///
/// Labels take the form `<source_id>.<experiment>.<variant_label>`.
pub fn resolve_area_entry(index: usize, identifier: &str) -> HarmonizeResult<ResolvedSource> {
    if index == 0 {
        let descriptor = parse_observation_identifier(identifier)?;
        return Ok(ResolvedSource {
            index,
            label: observation_label(&descriptor),
            name: descriptor.source_id.clone(),
            historical: descriptor,
            scenario: None,
            policy: SourcePolicy::observation(),
        });
    }
    let descriptor = parse_model_identifier(identifier)?;
    Ok(ResolvedSource {
        index,
        label: format!(
            "{}.{}.{}",
            descriptor.source_id, descriptor.experiment_label, descriptor.variant_label
        ),
        name: descriptor.source_id.clone(),
        historical: descriptor,
        scenario: None,
        policy: SourcePolicy::model(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBS: &str = "/g/data/ua8/NOAA_OISST/AVHRR/v2-1_modified/";
    const CESM_H: &str =
        "/g/data/oi10/replicas/CMIP6/CMIP/NCAR/CESM2/historical/r4i1p1f1/Oday/tos/gn/v20190308/";
    const CESM_F: &str =
        "/g/data/oi10/replicas/CMIP6/ScenarioMIP/NCAR/CESM2/ssp126/r4i1p1f1/Oday/tos/gn/v20200528/";

    #[test]
    fn parse_model_fields() {
        let d = parse_model_identifier(CESM_F).unwrap();
        assert_eq!(d.source_id, "CESM2");
        assert_eq!(d.experiment_label, "ssp126");
        assert_eq!(d.variant_label, "r4i1p1f1");
        assert_eq!(d.table_id.as_deref(), Some("Oday"));
        assert_eq!(d.variable_id.as_deref(), Some("tos"));
        assert_eq!(d.grid_label, "gn");
        assert_eq!(d.data_version.as_deref(), Some("v20200528"));
        assert!(!d.is_observation());
    }

    #[test]
    fn parse_model_rejects_short_path() {
        let err = parse_model_identifier("/g/data/CESM2/").unwrap_err();
        assert!(matches!(err, HarmonizeError::InvalidIdentifier { .. }));
    }

    #[test]
    fn observation_entry_label() {
        let source = resolve_entry(0, OBS, OBS).unwrap();
        assert_eq!(source.label, "NOAA_OISST.AVHRR.v2-1_modified");
        assert_eq!(source.name, "NOAA_OISST");
        assert!(source.is_observation());
        assert!(source.scenario.is_none());
    }

    #[test]
    fn model_entry_label() {
        let source = resolve_entry(3, CESM_H, CESM_F).unwrap();
        assert_eq!(source.label, "CESM2.historical+ssp126.r4i1p1f1");
        assert_eq!(source.name, "CESM2");
        assert!(!source.is_observation());
    }

    #[test]
    fn mismatched_variant_is_a_consistency_error() {
        let other = CESM_F.replace("r4i1p1f1", "r1i1p1f1");
        let err = resolve_entry(1, CESM_H, &other).unwrap_err();
        match err {
            HarmonizeError::Consistency {
                field,
                historical,
                scenario,
            } => {
                assert_eq!(field, "variant_label");
                assert_eq!(historical, "r4i1p1f1");
                assert_eq!(scenario, "r1i1p1f1");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn mismatched_source_is_a_consistency_error() {
        let other = CESM_F.replace("CESM2", "CESM2-WACCM");
        assert!(matches!(
            resolve_entry(1, CESM_H, &other),
            Err(HarmonizeError::Consistency { field, .. }) if field == "source_id"
        ));
    }

    #[test]
    fn area_entry_label() {
        let path = "/g/data/oi10/replicas/CMIP6/CMIP/NCAR/CESM2/historical/r4i1p1f1/Ofx/areacello/gn/v20190308/";
        let source = resolve_area_entry(2, path).unwrap();
        assert_eq!(source.label, "CESM2.historical.r4i1p1f1");
    }
}
