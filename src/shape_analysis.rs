// src/shape_analysis.rs - Whole-mask shape measurements

use image::Luma;
use imageproc::contours::find_contours;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::image_utils::{is_foreground, Mask, BACKGROUND, NEIGHBORS_4};
use crate::topology::median;

/// Calculate the number of foreground pixels in the mask
pub fn calculate_area(mask: &Mask) -> u32 {
    let (width, height) = mask.dimensions();
    let mut foreground_count = 0;

    for y in 0..height {
        for x in 0..width {
            if mask.get_pixel(x, y)[0] != BACKGROUND {
                foreground_count += 1;
            }
        }
    }

    foreground_count
}

/// Bounding box of foreground pixels as (min_x, min_y, max_x, max_y)
pub fn foreground_bounds(mask: &Mask) -> Option<(u32, u32, u32, u32)> {
    let (img_width, img_height) = mask.dimensions();

    let mut min_x = img_width;
    let mut max_x = 0;
    let mut min_y = img_height;
    let mut max_y = 0;
    let mut found_pixels = false;

    for y in 0..img_height {
        for x in 0..img_width {
            if mask.get_pixel(x, y)[0] != BACKGROUND {
                found_pixels = true;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }

    found_pixels.then_some((min_x, min_y, max_x, max_y))
}

/// Calculate the bounding box dimensions of foreground pixels
/// Returns (width, depth), zero for an empty mask
pub fn calculate_bounding_box_dimensions(mask: &Mask) -> (u32, u32) {
    match foreground_bounds(mask) {
        Some((min_x, min_y, max_x, max_y)) => (max_x - min_x + 1, max_y - min_y + 1),
        None => (0, 0),
    }
}

/// Median and maximum number of foreground runs per row
///
/// Only rows between the top and bottom of the root are counted, so a
/// row crossing three separate roots contributes 3.
pub fn calculate_root_counts(mask: &Mask) -> (f64, f64) {
    let Some((_, min_y, _, max_y)) = foreground_bounds(mask) else {
        return (0.0, 0.0);
    };
    let width = mask.width();

    let counts: Vec<f64> = (min_y..=max_y)
        .map(|y| {
            let mut runs = 0;
            let mut inside = false;
            for x in 0..width {
                let foreground = mask.get_pixel(x, y)[0] != BACKGROUND;
                if foreground && !inside {
                    runs += 1;
                }
                inside = foreground;
            }
            runs as f64
        })
        .collect();

    let maximum = counts.iter().copied().fold(0.0, f64::max);
    (median(&counts), maximum)
}

/// Convex hull of the foreground, taken over pixel corners
pub fn calculate_convex_hull(mask: &Mask) -> Vec<Point<i32>> {
    let (width, height) = mask.dimensions();
    let mut corners = Vec::new();

    for y in 0..height as i32 {
        for x in 0..width as i32 {
            if !is_foreground(mask, x, y) {
                continue;
            }
            let on_border = NEIGHBORS_4
                .iter()
                .any(|(dx, dy)| !is_foreground(mask, x + dx, y + dy));
            if on_border {
                corners.extend([
                    Point::new(x, y),
                    Point::new(x + 1, y),
                    Point::new(x, y + 1),
                    Point::new(x + 1, y + 1),
                ]);
            }
        }
    }

    if corners.is_empty() {
        return corners;
    }
    convex_hull(corners.as_slice())
}

/// Area enclosed by a polygon (shoelace formula)
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = (0..points.len())
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();

    twice_area.abs() as f64 / 2.0
}

/// Hole statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holes {
    pub count: usize,
    pub total_area: usize,
    /// Pixels of every hole, one entry per hole
    pub regions: Vec<Vec<(u32, u32)>>,
}

impl Holes {
    pub fn average_size(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.total_area as f64 / self.count as f64
        }
    }
}

/// Background 4-connected regions that do not touch the image border
pub fn find_holes(mask: &Mask) -> Holes {
    let (width, height) = mask.dimensions();
    let mut background = mask.clone();
    image::imageops::invert(&mut background);

    let labels = connected_components(&background, Connectivity::Four, Luma([BACKGROUND]));
    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;

    let mut regions: Vec<Vec<(u32, u32)>> = vec![Vec::new(); max_label + 1];
    let mut touches_border = vec![false; max_label + 1];
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        regions[label].push((x, y));
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            touches_border[label] = true;
        }
    }

    let regions: Vec<Vec<(u32, u32)>> = regions
        .into_iter()
        .enumerate()
        .filter(|(label, pixels)| *label != 0 && !pixels.is_empty() && !touches_border[*label])
        .map(|(_, pixels)| pixels)
        .collect();

    Holes {
        count: regions.len(),
        total_area: regions.iter().map(Vec::len).sum(),
        regions,
    }
}

/// Traced outer and hole contours of the foreground
pub fn trace_contours(mask: &Mask) -> Vec<Vec<(u32, u32)>> {
    find_contours::<i32>(mask)
        .into_iter()
        .map(|contour| {
            contour
                .points
                .into_iter()
                .map(|p| (p.x.max(0) as u32, p.y.max(0) as u32))
                .collect()
        })
        .collect()
}

/// Calculate the perimeter of a closed contour
pub fn calculate_perimeter(contour_points: &[(u32, u32)]) -> f64 {
    if contour_points.len() < 2 {
        return 0.0;
    }

    let mut perimeter = 0.0;
    let n = contour_points.len();

    for i in 0..n {
        let (x1, y1) = contour_points[i];
        let (x2, y2) = contour_points[(i + 1) % n]; // Wrap around to first point

        let dx = x2 as f64 - x1 as f64;
        let dy = y2 as f64 - y1 as f64;
        perimeter += (dx * dx + dy * dy).sqrt();
    }

    perimeter
}

/// Summed closed length of every contour in the mask
pub fn calculate_total_perimeter(contours: &[Vec<(u32, u32)>]) -> f64 {
    contours.iter().map(|c| calculate_perimeter(c)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::{empty_mask, FOREGROUND};
    use assert_approx_eq::assert_approx_eq;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn square(size: u32) -> Mask {
        let mut mask = empty_mask(30, 30);
        draw_filled_rect_mut(&mut mask, Rect::at(5, 5).of_size(size, size), Luma([FOREGROUND]));
        mask
    }

    #[test]
    fn area_and_extent_of_a_square() {
        let mask = square(10);
        assert_eq!(calculate_area(&mask), 100);
        assert_eq!(calculate_bounding_box_dimensions(&mask), (10, 10));
        assert_eq!(calculate_bounding_box_dimensions(&empty_mask(4, 4)), (0, 0));
    }

    #[test]
    fn convex_area_covers_pixel_corners() {
        let hull = calculate_convex_hull(&square(10));
        assert_approx_eq!(polygon_area(&hull), 100.0);
        assert!(calculate_convex_hull(&empty_mask(3, 3)).is_empty());
    }

    #[test]
    fn root_counts_per_row() {
        let mut mask = empty_mask(20, 10);
        draw_filled_rect_mut(&mut mask, Rect::at(2, 0).of_size(2, 10), Luma([FOREGROUND]));
        draw_filled_rect_mut(&mut mask, Rect::at(8, 4).of_size(2, 6), Luma([FOREGROUND]));
        draw_filled_rect_mut(&mut mask, Rect::at(14, 6).of_size(2, 4), Luma([FOREGROUND]));

        let (median, maximum) = calculate_root_counts(&mask);
        assert_eq!(maximum, 3.0);
        assert_eq!(median, 2.0);
    }

    #[test]
    fn enclosed_background_is_a_hole() {
        let mut mask = square(10);
        draw_filled_rect_mut(&mut mask, Rect::at(8, 8).of_size(2, 3), Luma([BACKGROUND]));

        let holes = find_holes(&mask);
        assert_eq!(holes.count, 1);
        assert_eq!(holes.total_area, 6);
        assert_approx_eq!(holes.average_size(), 6.0);
        assert!(find_holes(&square(10)).average_size().is_nan());
    }

    #[test]
    fn perimeter_of_a_square_outline() {
        let contours = trace_contours(&square(10));
        assert_eq!(contours.len(), 1);
        assert_approx_eq!(calculate_total_perimeter(&contours), 36.0);
    }
}
