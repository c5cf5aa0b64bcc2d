//! Email analysis core: tiered analysis orchestration plus deterministic
//! action-item and date extraction.

pub mod analyze;
pub mod extract;
pub mod message;

pub use analyze::{AnalysisResult, AnalyzeError, Orchestrator, Settings};
pub use extract::{ExtractionEngine, ExtractionResult};
pub use message::EmailMessage;
