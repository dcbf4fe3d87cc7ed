pub mod filename;
pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use filename::{display_name, sanitize_filename};
pub use image_ops::{adaptive_threshold, bounding_rect, encode_png, split_text_lines};
pub use metrics::Metrics;
