pub mod clustering;
pub mod config;
pub mod duplicates;
pub mod environment;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod vector;

pub use config::EngineConfig;
pub use errors::{QuorumError, Result};
pub use pipeline::ConsensusPipeline;

pub const TARGET_PIPELINE: &str = "pipeline";
