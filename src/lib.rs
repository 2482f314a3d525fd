pub mod audit;
pub mod batch;
pub mod demo;
pub mod engine;
pub mod error;
pub mod import;
pub mod incremental;
pub mod memory_store;
pub mod model;
pub mod reconcile;
pub mod scoring;
pub mod settings;
pub mod sqlite_store;
pub mod store;

pub use engine::ScoringEngine;
pub use error::{EngineError, Result};
