use image::{DynamicImage, GrayImage};
use imageproc::contrast::threshold;

use crate::image_utils::Mask;

/// Convert any decoded image to 8-bit grayscale
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Binarize a grayscale image
///
/// Pixels strictly brighter than `level` become foreground. With `invert`
/// the intensities are flipped first, so dark roots on a light background
/// are selected.
pub fn segment(gray: &GrayImage, level: u8, invert: bool) -> Mask {
    if invert {
        let mut flipped = gray.clone();
        image::imageops::invert(&mut flipped);
        threshold(&flipped, level)
    } else {
        threshold(gray, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::{count_foreground, FOREGROUND};
    use image::Luma;

    fn ramp() -> GrayImage {
        GrayImage::from_fn(256, 1, |x, _| Luma([x as u8]))
    }

    #[test]
    fn threshold_is_strict() {
        let mask = segment(&ramp(), 200, false);
        assert_eq!(mask.get_pixel(200, 0)[0], 0);
        assert_eq!(mask.get_pixel(201, 0)[0], FOREGROUND);
        assert_eq!(count_foreground(&mask), 55);
    }

    #[test]
    fn inverted_selects_dark_pixels() {
        let mask = segment(&ramp(), 200, true);
        assert_eq!(mask.get_pixel(0, 0)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(54, 0)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(55, 0)[0], 0);
    }

    #[test]
    fn all_background_image_is_empty() {
        let gray = GrayImage::from_pixel(8, 8, Luma([10]));
        assert_eq!(count_foreground(&segment(&gray, 200, false)), 0);
    }
}
