//! Harmonise sea surface temperature archives onto a regional frame and
//! compute area-weighted regional indices.
//!
//! The numerical core lives in [`sstharm_core`] and the batch pipelines in
//! [`sstharm_pipelines`]; this crate adds the command line driver.

pub mod cli;
pub mod logging;

pub use sstharm_core;
pub use sstharm_pipelines;
