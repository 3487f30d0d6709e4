//! Core entities shared by the analytic engine, persistence layer and the
//! ingestion/dispatch workers.

pub mod models;
pub mod patch;

pub use models::*;
pub use patch::Patch;
