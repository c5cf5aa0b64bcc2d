pub mod cache;
pub mod cloud;
pub mod collab;
pub mod heuristic;
pub mod ollama;
pub mod orchestrator;
pub mod queue;
pub mod schema;
pub mod types;

pub use cache::MemoryCache;
pub use cloud::OpenAiCompatProvider;
pub use collab::{
    ActionExtractor, AlwaysOnline, AnalysisCache, CloudInference, LocalInference, NetworkState,
    PiiRedactor,
};
pub use ollama::OllamaAnalyzer;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use queue::{JobQueue, JobStatus, ProcessingJob};
pub use types::{AnalysisKind, AnalysisResult, AnalyzeError, Provenance, Sentiment, Settings};
