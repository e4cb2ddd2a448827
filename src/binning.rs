use std::f64::consts::PI;

use crate::errors::{RootTraitError, Result};
use crate::topology::TopologyGraph;

/// Totals accumulated for one diameter range, in pixel units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiameterBin {
    pub length: f64,
    pub projected_area: f64,
    pub surface_area: f64,
    pub volume: f64,
}

impl DiameterBin {
    fn add_pixel(&mut self, diameter: f64) {
        self.length += 1.0;
        self.projected_area += diameter;
        self.surface_area += PI * diameter;
        self.volume += PI * (diameter / 2.0).powi(2);
    }
}

/// N+1 bins for N cut-points
#[derive(Debug, Clone, PartialEq)]
pub struct DiameterBins {
    pub bins: Vec<DiameterBin>,
}

impl DiameterBins {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Sum over all bins
    pub fn total(&self) -> DiameterBin {
        self.bins.iter().fold(DiameterBin::default(), |acc, b| DiameterBin {
            length: acc.length + b.length,
            projected_area: acc.projected_area + b.projected_area,
            surface_area: acc.surface_area + b.surface_area,
            volume: acc.volume + b.volume,
        })
    }
}

/// Check that cut-points are positive, finite and strictly ascending
pub fn validate_dranges(dranges: &[f64]) -> Result<()> {
    for (i, &value) in dranges.iter().enumerate() {
        if !value.is_finite() || value <= 0.0 {
            return Err(RootTraitError::InvalidRange(format!(
                "cut-point {} must be a positive number, got {}",
                i + 1,
                value
            )));
        }
        if i > 0 && value <= dranges[i - 1] {
            return Err(RootTraitError::InvalidRange(format!(
                "cut-points must be strictly ascending, {} follows {}",
                value,
                dranges[i - 1]
            )));
        }
    }
    Ok(())
}

/// Bin of a diameter; bin k covers `(dranges[k-1], dranges[k]]`
#[inline]
pub fn bin_index(dranges: &[f64], diameter: f64) -> usize {
    dranges.partition_point(|&cut| cut < diameter)
}

/// Accumulate every retained skeleton pixel into its diameter bin
///
/// The bin is chosen on the diameter in the active unit (`mm_per_pixel`
/// is 1 when no conversion applies); the accumulated values stay in
/// pixel units.
pub fn bin_diameters(graph: &TopologyGraph, dranges: &[f64], mm_per_pixel: f64) -> Result<DiameterBins> {
    validate_dranges(dranges)?;

    let mut bins = vec![DiameterBin::default(); dranges.len() + 1];
    for (_, diameter) in graph.retained_pixels() {
        bins[bin_index(dranges, diameter * mm_per_pixel)].add_pixel(diameter);
    }

    Ok(DiameterBins { bins })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMap;
    use crate::image_utils::{empty_mask, FOREGROUND};
    use crate::skeleton::skeletonize;
    use crate::topology::build_topology;
    use assert_approx_eq::assert_approx_eq;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn bar_graph() -> TopologyGraph {
        let mut mask = empty_mask(40, 9);
        draw_filled_rect_mut(&mut mask, Rect::at(3, 3).of_size(30, 3), Luma([FOREGROUND]));
        let distance = DistanceMap::compute(&mask);
        build_topology(&skeletonize(&mask, &distance), &distance, None)
    }

    #[test]
    fn bin_edges_are_inclusive_on_the_right() {
        let dranges = [2.0, 5.0];
        assert_eq!(bin_index(&dranges, 0.0), 0);
        assert_eq!(bin_index(&dranges, 2.0), 0);
        assert_eq!(bin_index(&dranges, 2.0001), 1);
        assert_eq!(bin_index(&dranges, 5.0), 1);
        assert_eq!(bin_index(&dranges, 9.0), 2);
        assert_eq!(bin_index(&[], 9.0), 0);
    }

    #[test]
    fn invalid_cut_points_are_rejected() {
        assert!(validate_dranges(&[2.0, 5.0]).is_ok());
        assert!(validate_dranges(&[]).is_ok());
        assert!(matches!(validate_dranges(&[5.0, 2.0]), Err(RootTraitError::InvalidRange(_))));
        assert!(matches!(validate_dranges(&[2.0, 2.0]), Err(RootTraitError::InvalidRange(_))));
        assert!(matches!(validate_dranges(&[-1.0]), Err(RootTraitError::InvalidRange(_))));
        assert!(matches!(validate_dranges(&[f64::NAN]), Err(RootTraitError::InvalidRange(_))));
    }

    #[test]
    fn uniform_diameter_lands_in_one_bin() {
        let bins = bin_diameters(&bar_graph(), &[2.0, 5.0], 1.0).unwrap();
        assert_eq!(bins.len(), 3);
        assert_eq!(bins.bins[0].length, 0.0);
        assert_eq!(bins.bins[1].length, 28.0);
        assert_eq!(bins.bins[2].length, 0.0);
        assert_approx_eq!(bins.bins[1].projected_area, 84.0);
        assert_approx_eq!(bins.bins[1].volume, 28.0 * PI * 2.25);
    }

    #[test]
    fn empty_ranges_give_a_single_bin_with_everything() {
        let graph = bar_graph();
        let bins = bin_diameters(&graph, &[], 1.0).unwrap();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins.total().length, graph.retained_pixels().len() as f64);
    }

    #[test]
    fn bins_sum_to_totals() {
        let graph = bar_graph();
        let split = bin_diameters(&graph, &[1.0, 2.9, 3.1, 10.0], 1.0).unwrap();
        let whole = bin_diameters(&graph, &[], 1.0).unwrap();
        assert_approx_eq!(split.total().surface_area, whole.total().surface_area);
        assert_approx_eq!(split.total().length, whole.total().length);
    }

    #[test]
    fn millimetre_ranges_use_converted_diameters() {
        // 3 px at 0.5 mm per px is 1.5 mm, below the 2 mm cut-point
        let bins = bin_diameters(&bar_graph(), &[2.0, 5.0], 0.5).unwrap();
        assert_eq!(bins.bins[0].length, 28.0);
    }
}
