pub mod config;
pub mod ocr;
pub mod paths;
pub mod solver;

pub use config::{AppConfig, PipelineConfig, SolverConfig, TesseractConfig};
pub use ocr::ImageTextExtractor;
pub use solver::CaptchaSolver;
