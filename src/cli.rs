//! Command line interface.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use sstharm_core::config::{RunConfig, Scenario};
use sstharm_pipelines::{
    run_batch, BatchReport, CellAreaPipeline, DatasetStore, IndicesPipeline, JsonStore, Pipeline,
    RegionSstPipeline,
};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
/// Harmonise SST archives and compute regional indices
pub struct Cli {
    /// TOML run configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Working root with `lists/`, `grid/`, `sst/` and `sst_indices/`,
    /// used when no configuration file is given
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Future scenario paired with the historical run
    #[arg(short, long, global = true)]
    pub scenario: Option<Scenario>,

    /// Mount point prepended to catalog paths
    #[arg(long, global = true)]
    pub archive_root: Option<PathBuf>,

    /// Container format of archive files and artifacts
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Json)]
    pub store: StoreKind,

    /// Log level, e.g. `debug`; falls back to `RUST_LOG`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Json,
    /// Requires the `netcdf` feature
    Netcdf,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Extract regional SST for every catalog entry
    RegionSst,
    /// Extract native cell area for every model
    CellArea,
    /// Compute regional indices from stored SST and cell area
    Indices,
    /// Run all three stages in dependency order
    All,
}

impl Cli {
    /// Build the run configuration from the file or root, then apply flags.
    pub fn run_config(&self) -> Result<RunConfig> {
        let mut config = match (&self.config, &self.root) {
            (Some(path), _) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading configuration {}", path.display()))?;
                RunConfig::from_toml_str(&text)
                    .with_context(|| format!("parsing configuration {}", path.display()))?
            }
            (None, Some(root)) => RunConfig::rooted_at(root, self.scenario.unwrap_or_default()),
            (None, None) => bail!("either --config or --root must be given"),
        };
        if let Some(scenario) = self.scenario {
            config.scenario = scenario;
        }
        if let Some(archive_root) = &self.archive_root {
            config.archive_root = Some(archive_root.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn execute<P: Pipeline>(pipeline: &P) -> Result<(&'static str, BatchReport)> {
    let report = run_batch(pipeline)
        .with_context(|| format!("{}: reading catalogs", pipeline.name()))?;
    Ok((pipeline.name(), report))
}

fn run_with<S: DatasetStore + Copy>(
    store: S,
    command: Commands,
    config: &RunConfig,
) -> Result<Vec<(&'static str, BatchReport)>> {
    let mut reports = Vec::new();
    if matches!(command, Commands::RegionSst | Commands::All) {
        reports.push(execute(&RegionSstPipeline::new(store, config.clone())?)?);
    }
    if matches!(command, Commands::CellArea | Commands::All) {
        reports.push(execute(&CellAreaPipeline::new(store, config.clone())?)?);
    }
    if matches!(command, Commands::Indices | Commands::All) {
        reports.push(execute(&IndicesPipeline::new(store, config.clone())?)?);
    }
    Ok(reports)
}

/// Run the selected stages and return their reports in execution order.
///
/// An `Err` means a whole stage could not start; per-source failures are
/// carried in the reports.
pub fn run(
    command: Commands,
    store: StoreKind,
    config: &RunConfig,
) -> Result<Vec<(&'static str, BatchReport)>> {
    info!(
        "scenario {}, region `{}`, box {:?}, {store:?} store",
        config.scenario, config.region_label, config.extraction_box
    );
    match store {
        StoreKind::Json => run_with(JsonStore, command, config),
        #[cfg(feature = "netcdf")]
        StoreKind::Netcdf => run_with(sstharm_pipelines::NetcdfStore, command, config),
        #[cfg(not(feature = "netcdf"))]
        StoreKind::Netcdf => bail!("NetCDF storage needs a build with `--features netcdf`"),
    }
}

/// Log every failure and return whether all sources succeeded.
pub fn summarise(reports: &[(&'static str, BatchReport)]) -> bool {
    let mut ok = true;
    for (name, report) in reports {
        info!(
            "{name}: {} of {} sources succeeded",
            report.succeeded.len(),
            report.len()
        );
        for failure in &report.failed {
            error!("{name}: [{}] {failure}", failure.index);
            ok = false;
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_layout_with_overrides() {
        let cli = Cli::try_parse_from([
            "sstharm",
            "indices",
            "--root",
            "/scratch/mhw",
            "--scenario",
            "ssp585",
            "--archive-root",
            "/mnt",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Indices);
        assert_eq!(cli.store, StoreKind::Json);
        let config = cli.run_config().unwrap();
        assert_eq!(config.scenario, Scenario::Ssp585);
        assert_eq!(config.output_dir, PathBuf::from("/scratch/mhw/sst_indices"));
        assert_eq!(config.archive_root, Some(PathBuf::from("/mnt")));
    }

    #[test]
    fn scenario_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            r#"
catalog_dir = "/scratch/lists"
grid_dir = "/scratch/grid"
sst_dir = "/scratch/sst"
output_dir = "/scratch/sst_indices"
scenario = "ssp126"
"#,
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "sstharm",
            "all",
            "--config",
            path.to_str().unwrap(),
            "-s",
            "ssp585",
        ])
        .unwrap();
        let config = cli.run_config().unwrap();
        assert_eq!(config.scenario, Scenario::Ssp585);
        assert_eq!(config.region_label, "tas");
    }

    #[test]
    fn store_switch() {
        let cli = Cli::try_parse_from(["sstharm", "all", "--store", "netcdf"]).unwrap();
        assert_eq!(cli.store, StoreKind::Netcdf);
        assert!(Cli::try_parse_from(["sstharm", "all", "--store", "zarr"]).is_err());
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn netcdf_store_needs_feature() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::rooted_at(dir.path(), Scenario::Ssp126);
        let err = run(Commands::All, StoreKind::Netcdf, &config).unwrap_err();
        assert!(err.to_string().contains("--features netcdf"));
    }

    #[test]
    fn malformed_configuration_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "catalog_dir = \"/scratch/lists\"\nunknown_key = 1\n").unwrap();
        let cli = Cli::try_parse_from(["sstharm", "all", "-c", path.to_str().unwrap()]).unwrap();
        let err = cli.run_config().unwrap_err();
        assert!(format!("{err:#}").contains("parsing configuration"));

        let cli = Cli::try_parse_from(["sstharm", "all", "-c", "/nonexistent/run.toml"]).unwrap();
        let err = cli.run_config().unwrap_err();
        assert!(err.to_string().contains("reading configuration"));
    }

    #[test]
    fn configuration_is_required() {
        let cli = Cli::try_parse_from(["sstharm", "region-sst"]).unwrap();
        assert!(cli.run_config().is_err());
        assert!(Cli::try_parse_from(["sstharm", "all", "--scenario", "ssp245"]).is_err());
    }

    #[test]
    fn missing_catalogs_stop_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::rooted_at(dir.path(), Scenario::Ssp126);
        assert!(run(Commands::RegionSst, StoreKind::Json, &config).is_err());
    }
}
