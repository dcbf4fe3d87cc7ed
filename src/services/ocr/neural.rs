// Neural line recognizer (ONNX Runtime, CTC decoding)
//
// Splits the normalized page into text lines by ink projection, runs each
// line through a CRNN-style model and greedy-decodes the CTC logits.

use image::{imageops::FilterType, GrayImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{LanguageCode, NormalizedImage, RecognizedFragment};
use crate::services::ocr::RecognitionBackend;
use crate::utils::split_text_lines;

pub const NEURAL_BACKEND: &str = "neural";

/// Model input height; width follows the line's aspect ratio
const TARGET_HEIGHT: u32 = 48;
const MIN_WIDTH: u32 = 16;
/// Bands thinner than this are speckle, not text
const MIN_LINE_HEIGHT: u32 = 6;
/// Padding added above and below each detected band
const LINE_MARGIN: u32 = 2;

/// CTC line recognizer backed by one ONNX session
pub struct NeuralBackend {
    session: Mutex<Session>,
    vocab: HashMap<usize, String>,
    blank_index: usize,
}

impl NeuralBackend {
    /// Load the model and its vocabulary from disk
    pub fn new(model_path: &Path, vocab_path: &Path) -> EngineResult<Self> {
        if !model_path.exists() {
            return Err(EngineError::Unavailable(format!(
                "model not found at {}",
                model_path.display()
            )));
        }
        if !vocab_path.exists() {
            return Err(EngineError::Unavailable(format!(
                "vocabulary not found at {}",
                vocab_path.display()
            )));
        }

        info!("Loading neural OCR model from disk: {}", model_path.display());

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.with_inter_threads(1))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| EngineError::Unavailable(format!("failed to load model: {}", e)))?;

        let content = std::fs::read_to_string(vocab_path)?;
        let vocab = parse_vocabulary(&content);
        let blank_index = vocab.keys().max().map(|max| max + 1).unwrap_or(0);

        info!(
            "Neural OCR initialized: vocab_size={}, blank_index={}",
            vocab.len(),
            blank_index
        );

        Ok(Self {
            session: Mutex::new(session),
            vocab,
            blank_index,
        })
    }

    /// Resize a line to the model height and lay it out as [1, 3, H, W]
    fn line_tensor(&self, line: &GrayImage) -> (Array4<f32>, i32) {
        let (w, h) = line.dimensions();
        let scale = TARGET_HEIGHT as f32 / h.max(1) as f32;
        let new_w = ((w as f32 * scale) as u32).max(MIN_WIDTH);

        let resized = image::imageops::resize(line, new_w, TARGET_HEIGHT, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, 3, TARGET_HEIGHT as usize, new_w as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let value = pixel[0] as f32 / 255.0;
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = value;
            }
        }

        // seq_length = width / 4 (LSTM stride)
        (tensor, (new_w / 4) as i32)
    }

    fn recognize_line(&self, line: &GrayImage) -> EngineResult<RecognizedFragment> {
        let (tensor, seq_length) = self.line_tensor(line);

        let shape: Vec<usize> = tensor.shape().to_vec();
        let (data, _offset) = tensor.into_raw_vec_and_offset();
        let shape_arr: [usize; 4] = [shape[0], shape[1], shape[2], shape[3]];

        let inference = |e: ort::Error| EngineError::Inference(e.to_string());
        let data_value = Value::from_array((shape_arr, data)).map_err(inference)?;
        let seq_lengths_value = Value::from_array(([1usize], vec![seq_length])).map_err(inference)?;

        // Extract data while the session is held, then release it
        let (dims, logits) = {
            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![
                    "data" => data_value,
                    "seq_lengths" => seq_lengths_value
                ])
                .map_err(inference)?;

            let first_key = outputs
                .keys()
                .next()
                .map(|k| k.to_string())
                .ok_or_else(|| EngineError::InvalidOutput("model produced no outputs".to_string()))?;
            let (shape, logits) = outputs[first_key.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(inference)?;

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, logits.to_vec())
        };

        let (seq_len, vocab_size) = match dims.as_slice() {
            [s, 1, v] => (*s, *v),
            [_, s, v] => (*s, *v),
            [s, v] => (*s, *v),
            other => {
                return Err(EngineError::InvalidOutput(format!(
                    "unexpected logits shape: {:?}",
                    other
                )))
            }
        };

        let (text, confidence) = ctc_decode(&logits, seq_len, vocab_size, self.blank_index, &self.vocab);
        debug!("Line result: '{}' (confidence: {:.2})", text, confidence);
        Ok(RecognizedFragment::new(text, confidence))
    }
}

impl RecognitionBackend for NeuralBackend {
    fn name(&self) -> &str {
        NEURAL_BACKEND
    }

    fn recognize(
        &self,
        image: &NormalizedImage,
        _languages: &[LanguageCode],
    ) -> EngineResult<Vec<RecognizedFragment>> {
        let page = &image.pixels;
        let bands = split_text_lines(page, MIN_LINE_HEIGHT);
        debug!(lines = bands.len(), "Neural OCR line split");

        let mut fragments = Vec::with_capacity(bands.len());
        for (top, bottom) in bands {
            let top = top.saturating_sub(LINE_MARGIN);
            let bottom = (bottom + LINE_MARGIN).min(page.height());
            let line = image::imageops::crop_imm(page, 0, top, page.width(), bottom - top).to_image();

            let fragment = self.recognize_line(&line)?;
            if !fragment.text.trim().is_empty() {
                fragments.push(fragment);
            }
        }
        Ok(fragments)
    }
}

/// Parse a vocabulary file (format: index\tchar)
fn parse_vocabulary(content: &str) -> HashMap<usize, String> {
    let mut vocab = HashMap::new();
    for line in content.lines() {
        let Some((idx_str, char_str)) = line.split_once('\t') else {
            continue;
        };
        let Ok(idx) = idx_str.trim().parse::<usize>() else {
            continue;
        };
        let ch = match char_str {
            "<space>" => " ".to_string(),
            "<blank>" => continue,
            other => other.to_string(),
        };
        vocab.insert(idx, ch);
    }
    vocab
}

/// CTC greedy decode: collapse repeats, drop blanks.
///
/// Returns the text and the mean per-character confidence.
fn ctc_decode(
    logits: &[f32],
    seq_len: usize,
    vocab_size: usize,
    blank_index: usize,
    vocab: &HashMap<usize, String>,
) -> (String, f32) {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut prev_idx: Option<usize> = None;

    for t in 0..seq_len {
        let offset = t * vocab_size;
        let Some(step) = logits.get(offset..offset + vocab_size) else {
            break;
        };
        let (best_idx, best_val) = step
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });

        if best_idx != blank_index && Some(best_idx) != prev_idx {
            text.push_str(vocab.get(&best_idx).map(|s| s.as_str()).unwrap_or("?"));
            // Convert log prob to confidence
            confidences.push(best_val.exp().min(1.0));
        }
        prev_idx = Some(best_idx);
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };
    (text, confidence)
}
