use image::{GrayImage, ImageFormat, Luma};
use imageproc::filter::box_filter;
use imageproc::point::Point;
use std::io::Cursor;

/// Pixels at or below this level count as ink on a binarized page
const INK_LEVEL: u8 = 127;

/// Encode a grayscale image as PNG bytes.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png_bytes = Vec::new();
    let mut cursor = Cursor::new(&mut png_bytes);
    img.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Local-mean adaptive threshold with an offset.
///
/// A pixel becomes white (255) when it is brighter than the mean of its
/// `(2r+1)x(2r+1)` neighbourhood minus `offset`, black otherwise. The
/// mean is a box filter with border pixels replicated past the edge.
pub fn adaptive_threshold(img: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let means = box_filter(img, block_radius, block_radius);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let value = img.get_pixel(x, y)[0] as i32;
        let mean = means.get_pixel(x, y)[0] as i32;
        if value > mean - offset {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Find horizontal bands of rows containing ink.
///
/// Returns `(top, bottom_exclusive)` pairs in top-to-bottom order. Bands
/// shorter than `min_height` rows are treated as noise and dropped.
pub fn split_text_lines(img: &GrayImage, min_height: u32) -> Vec<(u32, u32)> {
    let (width, height) = img.dimensions();
    let mut bands = Vec::new();
    let mut start: Option<u32> = None;

    for y in 0..height {
        let has_ink = (0..width).any(|x| img.get_pixel(x, y)[0] <= INK_LEVEL);
        match (has_ink, start) {
            (true, None) => start = Some(y),
            (false, Some(top)) => {
                if y - top >= min_height {
                    bands.push((top, y));
                }
                start = None;
            }
            _ => {}
        }
    }

    if let Some(top) = start {
        if height - top >= min_height {
            bands.push((top, height));
        }
    }

    bands
}

/// Axis-aligned bounding rectangle `(x, y, width, height)` of a point set.
pub fn bounding_rect(points: &[Point<i32>]) -> Option<(i32, i32, i32, i32)> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}
