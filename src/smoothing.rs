// src/smoothing.rs - Topology-preserving contour smoothing

use bresenham::Bresenham;
use image::Luma;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use log::debug;

use crate::image_utils::{empty_mask, in_bounds, is_simple_point, Mask, BACKGROUND, FOREGROUND};

/// Smooth the boundary of every foreground region
///
/// Outer and hole contours are simplified with Douglas-Peucker at
/// `tolerance` pixels and rasterised into a target mask. The input is then
/// moved toward that target by flipping differing pixels only while they
/// are simple points, so components and holes are never created, merged,
/// or destroyed.
pub fn smooth_contours(mask: &Mask, tolerance: f64) -> Mask {
    let contours: Vec<Contour<i32>> = find_contours(mask);
    if contours.is_empty() {
        return mask.clone();
    }

    let simplified: Vec<(BorderType, Vec<Point<i32>>)> = contours
        .iter()
        .map(|contour| {
            let simple = approximate_polygon_dp(&contour.points, tolerance, true);
            let points = if simple.len() < 3 { contour.points.clone() } else { simple };
            (contour.border_type, points)
        })
        .collect();

    let target = rasterize_contours(mask.width(), mask.height(), &simplified);
    approach_target(mask, &target)
}

/// Paint simplified contours in discovery order
///
/// Outer contours are filled; hole contours clear their interior but keep
/// their boundary pixels. A hole is always discovered after the region
/// that encloses it.
pub fn rasterize_contours(width: u32, height: u32, contours: &[(BorderType, Vec<Point<i32>>)]) -> Mask {
    let mut target = empty_mask(width, height);

    for (border_type, points) in contours {
        match border_type {
            BorderType::Outer => {
                fill_polygon(&mut target, points, FOREGROUND);
                draw_polygon_edges(&mut target, points, FOREGROUND);
            }
            BorderType::Hole => {
                fill_polygon(&mut target, points, BACKGROUND);
                draw_polygon_edges(&mut target, points, FOREGROUND);
            }
        }
    }

    target
}

/// Flip pixels that differ from `target` while they remain simple
///
/// Each pixel flips at most once; pixels that never become simple keep
/// their original value.
fn approach_target(mask: &Mask, target: &Mask) -> Mask {
    let mut current = mask.clone();
    let mut pending: Vec<(u32, u32)> = current
        .enumerate_pixels()
        .filter(|(x, y, p)| p[0] != target.get_pixel(*x, *y)[0])
        .map(|(x, y, _)| (x, y))
        .collect();

    let initial = pending.len();
    loop {
        let before = pending.len();
        pending.retain(|&(x, y)| {
            if !is_simple_point(&current, x, y) {
                return true;
            }
            let value = target.get_pixel(x, y)[0];
            current.put_pixel(x, y, Luma([value]));
            false
        });

        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    debug!(
        "Contour smoothing flipped {} of {} differing pixels",
        initial - pending.len(),
        initial
    );

    current
}

fn draw_polygon_edges(mask: &mut Mask, points: &[Point<i32>], value: u8) {
    let (width, height) = mask.dimensions();
    if points.len() == 1 {
        let p = points[0];
        if in_bounds(p.x, p.y, width, height) {
            mask.put_pixel(p.x as u32, p.y as u32, Luma([value]));
        }
        return;
    }

    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        // Bresenham excludes the end point, which is the next edge's start
        for (x, y) in Bresenham::new((a.x as isize, a.y as isize), (b.x as isize, b.y as isize)) {
            if in_bounds(x as i32, y as i32, width, height) {
                mask.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
        if in_bounds(b.x, b.y, width, height) {
            mask.put_pixel(b.x as u32, b.y as u32, Luma([value]));
        }
    }
}

/// Even-odd scanline fill sampled at pixel centres
fn fill_polygon(mask: &mut Mask, points: &[Point<i32>], value: u8) {
    if points.len() < 3 {
        return;
    }
    let (width, height) = mask.dimensions();
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(-1).min(height as i32 - 1);

    let mut crossings: Vec<f64> = Vec::new();
    for y in min_y..=max_y {
        let scan = y as f64;
        crossings.clear();

        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            let (ay, by) = (a.y as f64, b.y as f64);
            // Half-open rule so shared vertices count once
            if (ay <= scan && by > scan) || (by <= scan && ay > scan) {
                let t = (scan - ay) / (by - ay);
                crossings.push(a.x as f64 + t * (b.x as f64 - a.x as f64));
            }
        }

        crossings.sort_by(|a, b| a.total_cmp(b));
        for pair in crossings.chunks_exact(2) {
            let start = pair[0].ceil().max(0.0) as i64;
            let end = pair[1].floor().min(width as f64 - 1.0) as i64;
            for x in start..=end {
                mask.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }
}
