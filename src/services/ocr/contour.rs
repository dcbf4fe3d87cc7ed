// Contour-based fallback detector
//
// Does not read text. Counts blobs shaped like glyph groups so the caller at
// least learns whether the page carries text.

use imageproc::contours::{find_contours, BorderType};
use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use tracing::debug;

use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{LanguageCode, NormalizedImage, RecognizedFragment};
use crate::services::ocr::RecognitionBackend;
use crate::utils::bounding_rect;

pub const CONTOUR_BACKEND: &str = "contour";

const MIN_ASPECT_RATIO: f32 = 0.2;
const MAX_ASPECT_RATIO: f32 = 5.0;
const MIN_SIDE: i32 = 10;

/// Always-available last-resort backend
#[derive(Debug, Default)]
pub struct ContourDetector;

impl ContourDetector {
    pub fn new() -> Self {
        Self
    }

    /// Number of outer contours whose bounding box looks like a text region
    pub fn count_text_regions(&self, gray: &GrayImage) -> usize {
        // A flat page has no ink to separate from the background
        let mut pixels = gray.pixels().map(|p| p[0]);
        let Some(first) = pixels.next() else {
            return 0;
        };
        if pixels.all(|value| value == first) {
            return 0;
        }

        let level = otsu_level(gray);

        // Ink becomes foreground for contour tracing
        let binary = threshold(gray, level, ThresholdType::BinaryInverted);

        find_contours::<i32>(&binary)
            .into_iter()
            .filter(|contour| matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none())
            .filter_map(|contour| bounding_rect(&contour.points))
            .filter(|&(_, _, w, h)| {
                let aspect_ratio = if h > 0 { w as f32 / h as f32 } else { 0.0 };
                aspect_ratio > MIN_ASPECT_RATIO
                    && aspect_ratio < MAX_ASPECT_RATIO
                    && w > MIN_SIDE
                    && h > MIN_SIDE
            })
            .count()
    }
}

impl RecognitionBackend for ContourDetector {
    fn name(&self) -> &str {
        CONTOUR_BACKEND
    }

    fn recognize(
        &self,
        image: &NormalizedImage,
        _languages: &[LanguageCode],
    ) -> EngineResult<Vec<RecognizedFragment>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EngineError::InvalidOutput(format!(
                "cannot scan an empty {}x{} image",
                image.width(),
                image.height()
            )));
        }

        let regions = self.count_text_regions(&image.pixels);
        debug!(regions, "Contour scan finished");

        if regions == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![RecognizedFragment::new(
            format!(
                "Detected {} potential text regions. For full text extraction, install an advanced OCR backend (tesseract or the onnx feature).",
                regions
            ),
            1.0,
        )])
    }
}
