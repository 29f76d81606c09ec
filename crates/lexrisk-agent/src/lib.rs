pub mod instruction;
pub mod keyword;
pub mod openrouter;
pub mod reply;

pub use keyword::{KeywordAnalyzer, Tolerance};
pub use openrouter::OpenRouterAnalyzer;
