pub mod dates;
pub mod engine;
pub mod patterns;
pub mod types;

pub use engine::ExtractionEngine;
pub use patterns::{ActionPattern, PatternCatalog};
pub use types::{
    ActionItem, Category, DateKind, ExtractedDate, ExtractionMethod, ExtractionResult, Priority,
};
