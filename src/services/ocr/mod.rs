// Recognition backends and the registry that probes them at startup
//
// Every backend implements one capability: turn a normalized page into
// text fragments with confidences, or fail. The orchestrator is written
// against the trait only.

pub mod contour;
#[cfg(feature = "onnx")]
pub mod neural;
pub mod registry;
pub mod tesseract;

use crate::core::errors::EngineResult;
use crate::core::types::{LanguageCode, NormalizedImage, RecognizedFragment};

pub use contour::ContourDetector;
pub use registry::EngineRegistry;
pub use tesseract::TesseractBackend;

/// A single text-recognition engine
pub trait RecognitionBackend: Send + Sync {
    /// Unique registry key (e.g. "tesseract")
    fn name(&self) -> &str;

    /// Recognize text on the page.
    ///
    /// Returning zero fragments means "ran fine, found nothing"; only `Err`
    /// counts as a failure.
    fn recognize(
        &self,
        image: &NormalizedImage,
        languages: &[LanguageCode],
    ) -> EngineResult<Vec<RecognizedFragment>>;
}
