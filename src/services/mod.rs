pub mod fetch_engine;
pub mod import_service;

pub use fetch_engine::{BatchFetcher, FetchOutcome};
pub use import_service::{ImportService, ImportStats};
