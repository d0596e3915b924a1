//! Source catalogs
//!
//! A catalog is a newline-delimited list of archive directories. Line 0 is
//! always the observational product. The SST pipelines read two catalogs in
//! parallel (historical and scenario) and pair them by line; the cell-area
//! pipeline reads a single catalog.

use sstharm_core::config::RunConfig;
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use std::fs;
use std::path::Path;

/// One catalog line, or a historical/scenario pair of lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub index: usize,
    pub historical: String,
    pub scenario: Option<String>,
}

impl CatalogEntry {
    /// Placeholder label used before the entry has been resolved
    pub fn provisional_label(&self) -> String {
        format!("catalog entry {}", self.index)
    }
}

/// Non-blank lines of a catalog file, trimmed.
pub fn read_catalog(path: &Path) -> HarmonizeResult<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| {
        HarmonizeError::Config(format!("cannot read catalog {}: {e}", path.display()))
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Pair the historical and scenario catalogs line by line.
pub fn paired_entries(config: &RunConfig) -> HarmonizeResult<Vec<CatalogEntry>> {
    let historical = read_catalog(&config.historical_catalog())?;
    let scenario = read_catalog(&config.scenario_catalog())?;
    if historical.len() != scenario.len() {
        return Err(HarmonizeError::Config(format!(
            "historical catalog has {} entries but {} catalog has {}",
            historical.len(),
            config.scenario,
            scenario.len()
        )));
    }
    Ok(historical
        .into_iter()
        .zip(scenario)
        .enumerate()
        .map(|(index, (historical, scenario))| CatalogEntry {
            index,
            historical,
            scenario: Some(scenario),
        })
        .collect())
}

/// Entries of the cell-area catalog, skipping the observational line 0.
pub fn area_entries(config: &RunConfig) -> HarmonizeResult<Vec<CatalogEntry>> {
    Ok(read_catalog(&config.area_catalog())?
        .into_iter()
        .enumerate()
        .skip(1)
        .map(|(index, historical)| CatalogEntry {
            index,
            historical,
            scenario: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sstharm_core::config::Scenario;

    #[test]
    fn pairs_by_line_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::rooted_at(dir.path(), Scenario::Ssp585);
        fs::create_dir_all(&config.catalog_dir).unwrap();
        fs::write(config.historical_catalog(), "/obs/\n/h1/\n\n").unwrap();
        fs::write(config.scenario_catalog(), "/obs/\n/f1/\n").unwrap();

        let entries = paired_entries(&config).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].historical, "/h1/");
        assert_eq!(entries[1].scenario.as_deref(), Some("/f1/"));
    }

    #[test]
    fn unequal_catalogs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::rooted_at(dir.path(), Scenario::Ssp126);
        fs::create_dir_all(&config.catalog_dir).unwrap();
        fs::write(config.historical_catalog(), "/obs/\n/h1/\n").unwrap();
        fs::write(config.scenario_catalog(), "/obs/\n").unwrap();
        assert!(matches!(
            paired_entries(&config),
            Err(HarmonizeError::Config(_))
        ));
    }

    #[test]
    fn area_catalog_skips_observations() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::rooted_at(dir.path(), Scenario::Ssp126);
        fs::create_dir_all(&config.catalog_dir).unwrap();
        fs::write(config.area_catalog(), "/obs/\n/a1/\n/a2/\n").unwrap();
        let entries = area_entries(&config).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 1);
        assert!(entries[0].scenario.is_none());
    }
}
