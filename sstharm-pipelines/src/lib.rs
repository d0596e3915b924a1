pub mod batch;
pub mod catalog;
pub mod cell_area;
pub mod indices;
#[cfg(feature = "netcdf")]
pub mod netcdf_store;
pub mod output;
pub mod region_sst;
pub mod store;

pub use batch::{run_batch, BatchReport, Pipeline, SourceFailure, Stage};
pub use cell_area::CellAreaPipeline;
pub use indices::IndicesPipeline;
pub use region_sst::RegionSstPipeline;
pub use store::{DatasetStore, JsonStore};
#[cfg(feature = "netcdf")]
pub use netcdf_store::NetcdfStore;
