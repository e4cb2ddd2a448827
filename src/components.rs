use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use log::debug;

use crate::image_utils::{Mask, BACKGROUND, FOREGROUND};

/// Parameters of the component filter, resolved from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComponentFilterOptions {
    /// Remove foreground components up to this fraction of the image
    pub fg_noise_fraction: Option<f64>,
    /// Fill background components up to this fraction of the image
    pub bg_noise_fraction: Option<f64>,
    pub keep_largest: bool,
}

/// Summary of one labelled component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStats {
    pub label: u32,
    pub size: usize,
    /// Raster index of the first pixel met in row-major order
    pub first_index: usize,
}

/// Label 8-connected regions of pixels equal to `value`
///
/// Returns the label image and per-label statistics ordered by label.
pub fn label_components(mask: &Mask, value: u8) -> (image::ImageBuffer<Luma<u32>, Vec<u32>>, Vec<ComponentStats>) {
    // connected_components labels everything except its background value
    let source: GrayImage = if value == BACKGROUND {
        let mut inverted = mask.clone();
        image::imageops::invert(&mut inverted);
        inverted
    } else {
        mask.clone()
    };

    let labels = connected_components(&source, Connectivity::Eight, Luma([BACKGROUND]));
    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0);

    let mut stats: Vec<ComponentStats> = (1..=max_label)
        .map(|label| ComponentStats {
            label,
            size: 0,
            first_index: usize::MAX,
        })
        .collect();

    for (index, pixel) in labels.pixels().enumerate() {
        let label = pixel[0];
        if label == 0 {
            continue;
        }
        let entry = &mut stats[(label - 1) as usize];
        entry.size += 1;
        entry.first_index = entry.first_index.min(index);
    }

    stats.retain(|s| s.size > 0);
    (labels, stats)
}

/// Clean a segmented mask
///
/// Small background regions are filled first, then small foreground
/// regions are removed, then only the largest remaining foreground
/// component is kept when requested. Ties between equally large
/// components go to the one found first in raster order.
pub fn filter_components(mask: &Mask, options: &ComponentFilterOptions) -> Mask {
    let mut result = mask.clone();
    let total = (mask.width() as usize) * (mask.height() as usize);

    if let Some(fraction) = options.bg_noise_fraction {
        let limit = fraction * total as f64;
        let filled = recolor_small(&mut result, BACKGROUND, FOREGROUND, limit);
        debug!("Filled {} background components of at most {:.1} px", filled, limit);
    }

    if let Some(fraction) = options.fg_noise_fraction {
        let limit = fraction * total as f64;
        let removed = recolor_small(&mut result, FOREGROUND, BACKGROUND, limit);
        debug!("Removed {} foreground components of at most {:.1} px", removed, limit);
    }

    if options.keep_largest {
        keep_largest_component(&mut result);
    }

    result
}

/// Recolour every `from` component whose size is at most `limit`
fn recolor_small(mask: &mut Mask, from: u8, to: u8, limit: f64) -> usize {
    let (labels, stats) = label_components(mask, from);
    let small: Vec<bool> = {
        let max_label = stats.iter().map(|s| s.label).max().unwrap_or(0) as usize;
        let mut small = vec![false; max_label + 1];
        for s in &stats {
            small[s.label as usize] = (s.size as f64) <= limit;
        }
        small
    };

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label != 0 && small[label] {
            mask.put_pixel(x, y, Luma([to]));
        }
    }

    small.iter().filter(|&&s| s).count()
}

/// Retain only the largest foreground component in place
pub fn keep_largest_component(mask: &mut Mask) {
    let (labels, stats) = label_components(mask, FOREGROUND);

    // Larger wins; on equal size the earlier raster position wins
    let Some(largest) = stats
        .iter()
        .min_by(|a, b| b.size.cmp(&a.size).then(a.first_index.cmp(&b.first_index)))
    else {
        return;
    };

    if stats.len() > 1 {
        debug!(
            "Keeping largest component of {} px, dropping {} others",
            largest.size,
            stats.len() - 1
        );
    }

    for (x, y, label) in labels.enumerate_pixels() {
        if label[0] != 0 && label[0] != largest.label {
            mask.put_pixel(x, y, Luma([BACKGROUND]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::{count_components, count_foreground, empty_mask};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn two_blobs() -> Mask {
        let mut mask = empty_mask(40, 40);
        draw_filled_rect_mut(&mut mask, Rect::at(2, 2).of_size(10, 10), Luma([FOREGROUND]));
        draw_filled_rect_mut(&mut mask, Rect::at(30, 30).of_size(5, 1), Luma([FOREGROUND]));
        mask
    }

    #[test]
    fn small_foreground_noise_is_removed() {
        let options = ComponentFilterOptions {
            fg_noise_fraction: Some(10.0 / 1600.0),
            ..Default::default()
        };
        let result = filter_components(&two_blobs(), &options);
        assert_eq!(count_foreground(&result), 100);
        assert_eq!(count_components(&result), 1);
    }

    #[test]
    fn small_holes_are_filled() {
        let mut mask = empty_mask(20, 20);
        draw_filled_rect_mut(&mut mask, Rect::at(2, 2).of_size(10, 10), Luma([FOREGROUND]));
        mask.put_pixel(5, 5, Luma([BACKGROUND]));

        let options = ComponentFilterOptions {
            bg_noise_fraction: Some(0.01),
            ..Default::default()
        };
        let result = filter_components(&mask, &options);
        assert_eq!(result.get_pixel(5, 5)[0], FOREGROUND);
        // The surrounding background is far larger than the limit
        assert_eq!(result.get_pixel(0, 0)[0], BACKGROUND);
    }

    #[test]
    fn keep_largest_breaks_ties_by_raster_order() {
        let mut mask = empty_mask(10, 10);
        draw_filled_rect_mut(&mut mask, Rect::at(6, 0).of_size(2, 2), Luma([FOREGROUND]));
        draw_filled_rect_mut(&mut mask, Rect::at(0, 6).of_size(2, 2), Luma([FOREGROUND]));

        keep_largest_component(&mut mask);
        assert_eq!(count_components(&mask), 1);
        assert_eq!(mask.get_pixel(6, 0)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(0, 6)[0], BACKGROUND);
    }

    #[test]
    fn empty_mask_stays_empty() {
        let options = ComponentFilterOptions {
            fg_noise_fraction: Some(0.5),
            bg_noise_fraction: None,
            keep_largest: true,
        };
        let result = filter_components(&empty_mask(5, 5), &options);
        assert_eq!(count_foreground(&result), 0);
    }
}
