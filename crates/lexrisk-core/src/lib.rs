pub mod aggregate;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod segment;
pub mod types;

pub use error::ProcessError;
pub use types::*;
