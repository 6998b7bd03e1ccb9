//! Shovel pipeline: range-queries the metrics backend in time-windowed
//! batches, enriches observations with CI build metadata and pushes the
//! resulting records to the record store

pub mod jenkins;
pub mod prometheus;
pub mod pusher;
mod run;

pub use run::{run, run_at, RunSummary};
