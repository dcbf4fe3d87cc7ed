// Image normalization ahead of recognition
//
// decode -> bound size -> grayscale -> denoise -> contrast -> binarize

use image::imageops::FilterType;
use imageproc::contrast::equalize_histogram;
use imageproc::filter::median_filter;
use tracing::debug;

use crate::core::errors::PreprocessError;
use crate::core::types::NormalizedImage;
use crate::utils::adaptive_threshold;

/// 3x3 median window
const MEDIAN_RADIUS: u32 = 1;
/// 11x11 local-mean window
const THRESHOLD_RADIUS: u32 = 5;
const THRESHOLD_OFFSET: i32 = 2;

/// Turns uploaded bytes into the page every backend consumes
#[derive(Debug, Clone)]
pub struct Preprocessor {
    max_dimension: u32,
}

impl Preprocessor {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    /// Decode and normalize one image.
    ///
    /// The longest side is scaled down to `max_dimension` keeping the aspect
    /// ratio; smaller images are never upscaled.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<NormalizedImage, PreprocessError> {
        let decoded = image::load_from_memory(bytes)?;
        let (source_width, source_height) = (decoded.width(), decoded.height());

        if source_width == 0 || source_height == 0 {
            return Err(PreprocessError::InvalidImageSize {
                width: source_width,
                height: source_height,
            });
        }

        let longest = source_width.max(source_height);
        let decoded = if longest > self.max_dimension {
            let scale = self.max_dimension as f64 / longest as f64;
            let width = ((source_width as f64 * scale).round() as u32).max(1);
            let height = ((source_height as f64 * scale).round() as u32).max(1);
            debug!(
                "Resizing {}x{} -> {}x{}",
                source_width, source_height, width, height
            );
            decoded.resize_exact(width, height, FilterType::Triangle)
        } else {
            decoded
        };

        let gray = decoded.to_luma8();
        let denoised = median_filter(&gray, MEDIAN_RADIUS, MEDIAN_RADIUS);
        let equalized = equalize_histogram(&denoised);
        let binary = adaptive_threshold(&equalized, THRESHOLD_RADIUS, THRESHOLD_OFFSET);

        Ok(NormalizedImage::new(binary))
    }
}
