// src/overlay.rs - Annotated processed image

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::point::Point;

use crate::binning::bin_index;
use crate::config::OverlayOptions;
use crate::distance::DistanceMap;
use crate::image_utils::{stamp, Mask, BACKGROUND};
use crate::shape_analysis::{calculate_convex_hull, find_holes, trace_contours};
use crate::topology::{NodeKind, TopologyGraph};

pub const ROOT_COLOR: [u8; 3] = [200, 200, 200];
pub const HULL_COLOR: [u8; 3] = [255, 0, 255];
pub const HOLE_COLOR: [u8; 3] = [255, 255, 0];
pub const CONTOUR_COLOR: [u8; 3] = [0, 255, 255];
pub const SEGMENT_COLOR: [u8; 3] = [0, 200, 0];
pub const TIP_COLOR: [u8; 3] = [255, 0, 0];
pub const BRANCH_COLOR: [u8; 3] = [0, 0, 255];

/// Medial axis colours by diameter range, repeated when there are more ranges
pub const RANGE_PALETTE: [[u8; 3]; 6] = [
    [255, 64, 64],
    [64, 200, 64],
    [64, 128, 255],
    [255, 200, 0],
    [200, 64, 255],
    [0, 220, 220],
];

/// Everything the overlay needs from one analysis
pub struct OverlayInputs<'a> {
    pub mask: &'a Mask,
    pub distance: &'a DistanceMap,
    pub graph: &'a TopologyGraph,
    pub dranges: &'a [f64],
    /// Scale used for range lookup, 1 for pixel ranges
    pub bin_scale: f64,
}

/// Render the processed image with the selected annotations
pub fn render_overlay(inputs: &OverlayInputs, options: &OverlayOptions) -> RgbImage {
    let (width, height) = inputs.mask.dimensions();
    let mut canvas = RgbImage::new(width, height);

    if options.show_distance_map {
        paint_distance_map(&mut canvas, inputs.mask, inputs.distance);
    } else {
        for (x, y, p) in inputs.mask.enumerate_pixels() {
            if p[0] != BACKGROUND {
                canvas.put_pixel(x, y, Rgb(ROOT_COLOR));
            }
        }
    }

    if options.show_holes {
        for region in find_holes(inputs.mask).regions {
            for (x, y) in region {
                canvas.put_pixel(x, y, Rgb(HOLE_COLOR));
            }
        }
    }

    if options.show_convex_hull {
        let hull = calculate_convex_hull(inputs.mask);
        draw_closed_polyline(&mut canvas, &hull, Rgb(HULL_COLOR));
    }

    if options.show_contours {
        for contour in trace_contours(inputs.mask) {
            for (x, y) in contour {
                stamp(&mut canvas, x, y, options.contour_width, Rgb(CONTOUR_COLOR));
            }
        }
    }

    if options.show_medial_axis {
        paint_medial_axis(&mut canvas, inputs, options);
    }

    canvas
}

/// Foreground shaded from dark at the boundary to bright at the axis
fn paint_distance_map(canvas: &mut RgbImage, mask: &Mask, distance: &DistanceMap) {
    let max = distance.max_value();
    if max <= 0.0 {
        return;
    }
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == BACKGROUND {
            continue;
        }
        let level = (distance.get(x, y) / max * 255.0).round().clamp(0.0, 255.0) as u8;
        canvas.put_pixel(x, y, Rgb([level, level, 255 - level / 2]));
    }
}

fn paint_medial_axis(canvas: &mut RgbImage, inputs: &OverlayInputs, options: &OverlayOptions) {
    let graph = inputs.graph;
    let axis_width = options.medial_axis_width;

    if options.show_medial_axis_diameter {
        for ((x, y), diameter) in graph.retained_pixels() {
            let range = bin_index(inputs.dranges, diameter * inputs.bin_scale);
            let color = RANGE_PALETTE[range % RANGE_PALETTE.len()];
            stamp(canvas, x, y, axis_width, Rgb(color));
        }
        return;
    }

    for (_, segment) in graph.alive_segments() {
        for &(x, y) in &segment.pixels {
            stamp(canvas, x, y, axis_width, Rgb(SEGMENT_COLOR));
        }
    }
    for (_, node) in graph.alive_nodes() {
        let color = match node.kind {
            NodeKind::Tip => TIP_COLOR,
            NodeKind::Branch => BRANCH_COLOR,
            NodeKind::Isolated | NodeKind::Loop => SEGMENT_COLOR,
        };
        for &(x, y) in &node.pixels {
            stamp(canvas, x, y, axis_width + 2, Rgb(color));
        }
    }
}

fn draw_closed_polyline(canvas: &mut RgbImage, points: &[Point<i32>], color: Rgb<u8>) {
    if points.len() < 2 {
        return;
    }
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMap;
    use crate::image_utils::{empty_mask, FOREGROUND};
    use crate::skeleton::skeletonize;
    use crate::topology::build_topology;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn medial_axis_is_coloured_by_range() {
        let mut mask = empty_mask(30, 11);
        draw_filled_rect_mut(&mut mask, Rect::at(3, 4).of_size(20, 3), Luma([FOREGROUND]));
        let distance = DistanceMap::compute(&mask);
        let graph = build_topology(&skeletonize(&mask, &distance), &distance, None);

        let inputs = OverlayInputs {
            mask: &mask,
            distance: &distance,
            graph: &graph,
            dranges: &[2.0, 5.0],
            bin_scale: 1.0,
        };
        let options = OverlayOptions {
            medial_axis_width: 1,
            show_convex_hull: false,
            show_contours: false,
            ..OverlayOptions::default()
        };
        let canvas = render_overlay(&inputs, &options);

        assert_eq!(canvas.get_pixel(10, 5).0, RANGE_PALETTE[1]);
        assert_eq!(canvas.get_pixel(10, 4).0, ROOT_COLOR);
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0]);
    }
}
