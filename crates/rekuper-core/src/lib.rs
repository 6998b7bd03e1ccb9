//! Shared data model and batching logic for the rekuper ingestion pipeline

pub mod config;
mod error;
mod series;
mod types;
mod window;

pub use error::{Error, Result};
pub use series::{extract_windows, RangeData, RangeResponse, RangeSeries};
pub use types::{ObservationWindow, RecordPayload, ResolvedVersion, ResourceKind, SeriesWindow};
pub use window::BatchWindows;
