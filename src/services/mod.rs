pub mod export;
pub mod ocr;
pub mod preprocess;

// Re-export commonly used services
pub use export::ResultExporter;
pub use ocr::{EngineRegistry, RecognitionBackend};
pub use preprocess::Preprocessor;
