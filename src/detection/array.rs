//! 图像与 ndarray 之间的转换 (HWC, u8)

use image::RgbImage;
use ndarray::Array3;

use crate::{DetectionError, Result};

/// `Array3<u8>` (H, W, C) → RGB 图像
///
/// 支持 1 (灰度), 3 (RGB), 4 (RGBA, 丢弃 alpha) 通道。
pub fn array_to_image(array: &Array3<u8>) -> Result<RgbImage> {
    let (h, w, c) = array.dim();
    if h == 0 || w == 0 {
        return Err(DetectionError::InvalidInput(format!(
            "image array is empty: shape ({h}, {w}, {c})"
        )));
    }
    if !matches!(c, 1 | 3 | 4) {
        return Err(DetectionError::InvalidInput(format!(
            "image array must have 1, 3 or 4 channels, got {c}"
        )));
    }

    let mut image = RgbImage::new(w as u32, h as u32);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        pixel.0 = match c {
            1 => {
                let v = array[[y, x, 0]];
                [v, v, v]
            }
            _ => [array[[y, x, 0]], array[[y, x, 1]], array[[y, x, 2]]],
        };
    }
    Ok(image)
}

/// RGB 图像 → `Array3<u8>` (H, W, 3)
pub fn image_to_array(image: &RgbImage) -> Array3<u8> {
    let (w, h) = image.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[c]
    })
}
