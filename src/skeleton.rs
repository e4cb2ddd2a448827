// src/skeleton.rs - Distance-ordered homotopic thinning

use image::Luma;
use log::debug;

use crate::distance::DistanceMap;
use crate::image_utils::{
    count_foreground, foreground_neighbor_count, is_foreground, is_simple_point, Mask, BACKGROUND,
    FOREGROUND, NEIGHBORS_8,
};

/// One-pixel-wide medial axis of a mask
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    mask: Mask,
}

impl Skeleton {
    pub fn from_mask(mask: Mask) -> Self {
        Self { mask }
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        is_foreground(&self.mask, x, y)
    }

    /// Skeleton pixels in raster order
    pub fn pixels(&self) -> Vec<(u32, u32)> {
        self.mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] != BACKGROUND)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    pub fn len(&self) -> usize {
        count_foreground(&self.mask)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of skeleton pixels among the 8 neighbours
    pub fn degree(&self, x: u32, y: u32) -> usize {
        foreground_neighbor_count(&self.mask, x, y)
    }

    /// Skeleton neighbours of a pixel in `NEIGHBORS_8` order
    pub fn neighbors(&self, x: u32, y: u32) -> Vec<(u32, u32)> {
        NEIGHBORS_8
            .iter()
            .map(|(dx, dy)| (x as i32 + dx, y as i32 + dy))
            .filter(|&(nx, ny)| self.contains(nx, ny))
            .map(|(nx, ny)| (nx as u32, ny as u32))
            .collect()
    }
}

/// Thin a mask to its medial axis
///
/// Foreground pixels are visited in ascending distance order (ties in
/// raster order) and removed when they are simple, so the number of
/// 8-connected components and holes never changes. An end point whose
/// distance is a local maximum of the distance map is kept, which anchors
/// the axis inside elongated shapes. Passes repeat until nothing changes.
pub fn skeletonize(mask: &Mask, distance: &DistanceMap) -> Skeleton {
    let mut current = mask.clone();

    let mut order: Vec<(u32, u32)> = current
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] != BACKGROUND)
        .map(|(x, y, _)| (x, y))
        .collect();
    order.sort_by(|&(ax, ay), &(bx, by)| {
        distance
            .get(ax, ay)
            .total_cmp(&distance.get(bx, by))
            .then(ay.cmp(&by))
            .then(ax.cmp(&bx))
    });

    let anchors: Vec<bool> = order
        .iter()
        .map(|&(x, y)| distance.is_local_maximum(x, y))
        .collect();
    let mut candidates: Vec<((u32, u32), bool)> = order.into_iter().zip(anchors).collect();

    let mut passes = 0;
    loop {
        passes += 1;
        let before = candidates.len();

        candidates.retain(|&((x, y), anchor)| {
            let end_point = foreground_neighbor_count(&current, x, y) == 1;
            if (end_point && anchor) || !is_simple_point(&current, x, y) {
                return true;
            }
            current.put_pixel(x, y, Luma([BACKGROUND]));
            false
        });

        if candidates.len() == before {
            break;
        }
    }

    debug!(
        "Skeletonized {} px to {} px in {} passes",
        count_foreground(mask),
        candidates.len(),
        passes
    );

    for p in current.pixels_mut() {
        if p[0] != BACKGROUND {
            *p = Luma([FOREGROUND]);
        }
    }

    Skeleton::from_mask(current)
}
