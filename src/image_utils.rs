use image::{GrayImage, Luma};
use std::collections::VecDeque;

/// Binary image; foreground pixels are `FOREGROUND`, everything else is background
pub type Mask = GrayImage;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// 8-neighbour offsets in counter-clockwise order starting east
/// (E, NE, N, NW, W, SW, S, SE), with y growing downward.
pub const NEIGHBORS_8: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// 4-neighbour offsets (E, N, W, S)
pub const NEIGHBORS_4: [(i32, i32); 4] = [(1, 0), (0, -1), (-1, 0), (0, 1)];

/// Check whether signed coordinates fall inside an image
#[inline]
pub fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

/// Foreground test; pixels outside the mask read as background
#[inline]
pub fn is_foreground(mask: &Mask, x: i32, y: i32) -> bool {
    let (width, height) = mask.dimensions();
    in_bounds(x, y, width, height) && mask.get_pixel(x as u32, y as u32)[0] != BACKGROUND
}

/// Blank mask of the given size
pub fn empty_mask(width: u32, height: u32) -> Mask {
    GrayImage::from_pixel(width, height, Luma([BACKGROUND]))
}

/// Number of foreground pixels
pub fn count_foreground(mask: &Mask) -> usize {
    mask.pixels().filter(|p| p[0] != BACKGROUND).count()
}

/// In-bounds 8-neighbours of a pixel that satisfy `keep`
pub fn neighbors<F>(x: u32, y: u32, width: u32, height: u32, mut keep: F) -> Vec<(u32, u32)>
where
    F: FnMut(u32, u32) -> bool,
{
    let mut result = Vec::with_capacity(8);
    for (dx, dy) in NEIGHBORS_8.iter() {
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if in_bounds(nx, ny, width, height) && keep(nx as u32, ny as u32) {
            result.push((nx as u32, ny as u32));
        }
    }
    result
}

/// Foreground flags of the 8 neighbours in `NEIGHBORS_8` order
fn neighborhood(mask: &Mask, x: u32, y: u32) -> [bool; 8] {
    let mut ring = [false; 8];
    for (k, (dx, dy)) in NEIGHBORS_8.iter().enumerate() {
        ring[k] = is_foreground(mask, x as i32 + dx, y as i32 + dy);
    }
    ring
}

/// Yokoi connectivity number for 8-connected foreground
///
/// Counts how many distinct foreground 8-components touch the pixel
/// through its neighbourhood.
pub fn connectivity_number(mask: &Mask, x: u32, y: u32) -> u32 {
    let ring = neighborhood(mask, x, y);
    let bg = |k: usize| u32::from(!ring[k % 8]);

    (0..8)
        .step_by(2)
        .map(|k| bg(k) - bg(k) * bg(k + 1) * bg(k + 2))
        .sum()
}

/// Whether a pixel can be added or removed without changing topology
///
/// A pixel is simple when it lies on the border of the foreground (at least
/// one 4-neighbour is background) and its neighbourhood holds exactly one
/// foreground 8-component. Toggling a simple pixel never merges, splits,
/// creates, or removes a foreground component.
pub fn is_simple_point(mask: &Mask, x: u32, y: u32) -> bool {
    let has_background_4 = NEIGHBORS_4
        .iter()
        .any(|(dx, dy)| !is_foreground(mask, x as i32 + dx, y as i32 + dy));

    has_background_4 && connectivity_number(mask, x, y) == 1
}

/// Number of foreground 8-neighbours
pub fn foreground_neighbor_count(mask: &Mask, x: u32, y: u32) -> usize {
    neighborhood(mask, x, y).iter().filter(|&&f| f).count()
}

/// Count 8-connected foreground components
pub fn count_components(mask: &Mask) -> usize {
    let (width, height) = mask.dimensions();
    let mut seen = vec![false; (width * height) as usize];
    let mut count = 0;
    let mut queue = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            if seen[idx] || mask.get_pixel(x, y)[0] == BACKGROUND {
                continue;
            }
            count += 1;
            seen[idx] = true;
            queue.push_back((x, y));

            while let Some((cx, cy)) = queue.pop_front() {
                for (nx, ny) in neighbors(cx, cy, width, height, |nx, ny| {
                    mask.get_pixel(nx, ny)[0] != BACKGROUND
                }) {
                    let nidx = (ny * width + nx) as usize;
                    if !seen[nidx] {
                        seen[nidx] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }
    }

    count
}

/// Paint a filled square of side `width` centred on a pixel
pub fn stamp<P: image::Pixel>(
    image: &mut image::ImageBuffer<P, Vec<P::Subpixel>>,
    x: u32,
    y: u32,
    width: u32,
    color: P,
) {
    let (img_width, img_height) = image.dimensions();
    let reach = (width.max(1) as i32 - 1) / 2;
    let extra = (width.max(1) as i32 - 1) - reach;

    for dy in -reach..=extra {
        for dx in -reach..=extra {
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if in_bounds(px, py, img_width, img_height) {
                image.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// Build a mask from a list of foreground coordinates
#[cfg(test)]
pub fn mask_from_points(width: u32, height: u32, points: &[(u32, u32)]) -> Mask {
    let mut mask = empty_mask(width, height);
    for &(x, y) in points {
        mask.put_pixel(x, y, Luma([FOREGROUND]));
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_end_is_simple_but_middle_is_not() {
        let mask = mask_from_points(5, 3, &[(0, 1), (1, 1), (2, 1), (3, 1), (4, 1)]);
        assert!(is_simple_point(&mask, 0, 1));
        assert!(!is_simple_point(&mask, 2, 1));
        assert_eq!(connectivity_number(&mask, 2, 1), 2);
    }

    #[test]
    fn interior_pixel_is_not_simple() {
        let mut mask = empty_mask(3, 3);
        for p in mask.pixels_mut() {
            *p = Luma([FOREGROUND]);
        }
        assert!(!is_simple_point(&mask, 1, 1));
        assert!(is_simple_point(&mask, 0, 0));
    }

    #[test]
    fn isolated_pixel_is_not_simple() {
        let mask = mask_from_points(3, 3, &[(1, 1)]);
        assert_eq!(connectivity_number(&mask, 1, 1), 0);
        assert!(!is_simple_point(&mask, 1, 1));
    }

    #[test]
    fn diagonal_pixels_form_one_component() {
        let mask = mask_from_points(4, 4, &[(0, 0), (1, 1), (3, 3)]);
        assert_eq!(count_components(&mask), 2);
    }

    #[test]
    fn stamp_clips_to_image() {
        let mut mask = empty_mask(4, 4);
        stamp(&mut mask, 0, 0, 3, Luma([FOREGROUND]));
        assert_eq!(count_foreground(&mask), 4);
    }
}
