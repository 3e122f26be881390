pub mod affinity;
pub mod bias;
pub mod combinatorics;
pub mod config;
pub mod delta;
pub mod entropy;
pub mod error;
pub mod filters;
pub mod judge;
pub mod normalize;
pub mod parallel;
pub mod pipeline;
pub mod scorer;
pub mod stats;
pub mod wheel;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::EngineConfig;
pub use error::EngineError;
pub use parallel::Executor;
pub use pipeline::{run_analysis, AnalysisReport};
