pub mod config;
pub mod enhancer;
pub mod grobid;
pub mod parser;
pub mod router;
pub mod utils;

pub use config::{AppConfig, ExtractorConfig};
pub use enhancer::{Enhancer, LlmEnhancer};
pub use parser::{ExtractionPipeline, PaperContent};
pub use utils::{ExtractError, ExtractResult};
