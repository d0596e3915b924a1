pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod longitude;
pub mod overrides;
pub mod policy;
pub mod regions;
pub mod time_window;
pub mod weights;

pub mod errors;
