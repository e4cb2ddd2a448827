use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;

use crate::image_utils::{Mask, BACKGROUND};

/// Distance from every foreground pixel to the nearest background
///
/// Values are measured to the boundary between pixels, so a pixel touching
/// the background has distance 0.5 and its local diameter is 1. The area
/// outside the image counts as background. Background pixels hold 0.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMap {
    width: u32,
    height: u32,
    values: Vec<f64>,
}

impl DistanceMap {
    pub fn compute(mask: &Mask) -> Self {
        let (width, height) = mask.dimensions();

        // One pixel of background padding; the transform measures distance
        // to non-zero pixels so background is marked non-zero here.
        let padded = GrayImage::from_fn(width + 2, height + 2, |px, py| {
            let inside = px >= 1 && py >= 1 && px <= width && py <= height;
            if inside && mask.get_pixel(px - 1, py - 1)[0] != BACKGROUND {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });

        let squared = euclidean_squared_distance_transform(&padded);
        let mut values = vec![0.0; (width as usize) * (height as usize)];
        for y in 0..height {
            for x in 0..width {
                if mask.get_pixel(x, y)[0] != BACKGROUND {
                    let d = squared.get_pixel(x + 1, y + 1)[0].sqrt() - 0.5;
                    values[(y * width + x) as usize] = d.max(0.0);
                }
            }
        }

        Self { width, height, values }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.values[(y * self.width + x) as usize]
    }

    /// Local diameter at a pixel, twice the distance value
    #[inline]
    pub fn diameter(&self, x: u32, y: u32) -> f64 {
        2.0 * self.get(x, y)
    }

    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Whether no 8-neighbour inside the image is further from the background
    pub fn is_local_maximum(&self, x: u32, y: u32) -> bool {
        let value = self.get(x, y);
        crate::image_utils::neighbors(x, y, self.width, self.height, |nx, ny| {
            self.get(nx, ny) > value
        })
        .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::{empty_mask, FOREGROUND};
    use assert_approx_eq::assert_approx_eq;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn bar_centre_has_bar_width_as_diameter() {
        let mut mask = empty_mask(20, 9);
        draw_filled_rect_mut(&mut mask, Rect::at(2, 3).of_size(16, 3), Luma([FOREGROUND]));
        let map = DistanceMap::compute(&mask);

        assert_approx_eq!(map.diameter(10, 4), 3.0);
        assert_approx_eq!(map.diameter(10, 3), 1.0);
        assert_eq!(map.get(0, 0), 0.0);
    }

    #[test]
    fn image_border_counts_as_background() {
        let mask = GrayImage::from_pixel(5, 5, Luma([FOREGROUND]));
        let map = DistanceMap::compute(&mask);
        assert_approx_eq!(map.get(0, 2), 0.5);
        assert_approx_eq!(map.get(2, 2), 2.5);
        assert!(map.is_local_maximum(2, 2));
        assert!(!map.is_local_maximum(1, 2));
    }

    #[test]
    fn empty_mask_is_all_zero() {
        let map = DistanceMap::compute(&empty_mask(4, 4));
        assert_eq!(map.max_value(), 0.0);
    }
}
