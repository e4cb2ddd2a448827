// src/roi.rs - Regions of interest within an image

use image::{GenericImageView, GrayImage, ImageBuffer, Luma, Pixel, Rgb};
use log::warn;

use crate::config::Roi;
use crate::output::FULL_IMAGE_ROI;

/// A region resolved against a concrete image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn full(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self { name: name.into(), x: 0, y: 0, width, height }
    }

    /// Whether the region covers the whole of a `width` x `height` image
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == width && self.height == height
    }

    /// Translate an image coordinate into region coordinates
    ///
    /// Points outside the region have no counterpart and give `None`.
    pub fn translate(&self, point: (u32, u32)) -> Option<(u32, u32)> {
        let (px, py) = point;
        let inside = px >= self.x
            && py >= self.y
            && px - self.x < self.width
            && py - self.y < self.height;
        inside.then(|| (px - self.x, py - self.y))
    }
}

fn fits(roi: &Roi, width: u32, height: u32) -> bool {
    let right = u64::from(roi.x) + u64::from(roi.width);
    let bottom = u64::from(roi.y) + u64::from(roi.height);
    right <= u64::from(width) && bottom <= u64::from(height)
}

/// Resolve configured regions against an image of the given size
///
/// Without regions the full image is analysed under the name `Full`. A
/// region that does not fit inside the image keeps its name but covers the
/// full image, and a warning is logged.
pub fn resolve_regions(rois: &[Roi], width: u32, height: u32, image_name: &str) -> Vec<Region> {
    if rois.is_empty() {
        return vec![Region::full(FULL_IMAGE_ROI, width, height)];
    }

    rois.iter()
        .map(|roi| {
            if fits(roi, width, height) {
                Region {
                    name: roi.name.clone(),
                    x: roi.x,
                    y: roi.y,
                    width: roi.width,
                    height: roi.height,
                }
            } else {
                warn!(
                    "Ignoring the region-of-interest '{}', as it is out-of-bounds for the image {}. Using the full image instead.",
                    roi.name, image_name
                );
                Region::full(roi.name.clone(), width, height)
            }
        })
        .collect()
}

/// Copy the pixels of a region out of a grayscale image
pub fn crop_gray(image: &GrayImage, region: &Region) -> GrayImage {
    if region.is_full(image.width(), image.height()) {
        return image.clone();
    }
    image.view(region.x, region.y, region.width, region.height).to_image()
}

/// Full-size image that per-region outputs are pasted into
pub struct Composite<P: Pixel> {
    canvas: ImageBuffer<P, Vec<P::Subpixel>>,
}

impl<P: Pixel> Composite<P> {
    pub fn new(width: u32, height: u32, background: P) -> Self {
        Self { canvas: ImageBuffer::from_pixel(width, height, background) }
    }

    /// Paste a region's output at the region's position; later regions win
    pub fn paste(&mut self, region: &Region, part: &ImageBuffer<P, Vec<P::Subpixel>>) {
        let (width, height) = self.canvas.dimensions();
        let part_width = part.width().min(width.saturating_sub(region.x));
        let part_height = part.height().min(height.saturating_sub(region.y));
        for y in 0..part_height {
            for x in 0..part_width {
                self.canvas.put_pixel(region.x + x, region.y + y, *part.get_pixel(x, y));
            }
        }
    }

    pub fn into_image(self) -> ImageBuffer<P, Vec<P::Subpixel>> {
        self.canvas
    }
}

/// Composite for segmented masks, white where no region was analysed
pub fn mask_composite(width: u32, height: u32) -> Composite<Luma<u8>> {
    Composite::new(width, height, Luma([255]))
}

/// Composite for processed overlays, white where no region was analysed
pub fn overlay_composite(width: u32, height: u32) -> Composite<Rgb<u8>> {
    Composite::new(width, height, Rgb([255, 255, 255]))
}
