//! Record store: SQLite persistence with idempotent window merges and the
//! HTTP upsert surface consumed by the shovel pipeline

pub mod http;
mod store;

pub use store::{EntityRecord, ProjectRecord, SessionRecord, Store};
