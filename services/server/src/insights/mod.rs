pub mod analyzer;
pub mod engine;
pub mod openai;

pub use analyzer::{AlertAnalyzer, AnalyzerError};
pub use engine::InsightsEngine;
pub use openai::OpenAiAnalyzer;
