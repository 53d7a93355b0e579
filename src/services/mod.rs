pub mod generation_service;
pub mod matrix_planner;
pub mod pool_selector;
pub mod prompt;
pub mod quality_validator;
pub mod retry;
pub mod warn_writer;

pub use generation_service::{BatchSettings, GenerationCache, GenerationService};
pub use pool_selector::{PoolSelector, SelectionLedger};
pub use prompt::PromptSettings;
pub use quality_validator::{QualityValidator, QualityWeights, Verdict};
pub use retry::{AttemptState, LastFailure, RetryPolicy};
pub use warn_writer::WarnWriter;
