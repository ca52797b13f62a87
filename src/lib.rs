pub mod config;
pub mod decoder;
pub mod derive;
pub mod error;
pub mod graph;
pub mod keys;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod types;
pub mod util;

pub use config::{HeaderLayout, PipelineConfig};
pub use derive::{DerivationEngine, DerivedTable, View};
pub use error::{DecodeError, PipelineError, Result};
pub use keys::{assign, lookup, KeyRegistry, KeyTable, UNMATCHED_ID};
pub use pipeline::{Pipeline, PipelineInputs, RunOutput, RunSummary};
