// src/features.rs - Feature vectors for whole and broken root analysis

use nalgebra::{Matrix2, SymmetricEigen};

use crate::binning::DiameterBins;
use crate::config::RootType;
use crate::image_utils::Mask;
use crate::shape_analysis::{
    calculate_area, calculate_bounding_box_dimensions, calculate_convex_hull, calculate_root_counts,
    calculate_total_perimeter, find_holes, polygon_area, trace_contours,
};
use crate::topology::{median, TopologyGraph};

/// Pixels per orientation sample along a segment
pub const ORIENTATION_RUN: usize = 10;

/// Physical dimension of a feature, used for unit conversion and naming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Count,
    Length,
    Area,
    Volume,
    /// Per unit length, e.g. branching frequency
    InverseLength,
    /// Ratios, fractions, seconds and degrees
    Unitless,
}

/// One named value of a feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub name: String,
    pub dimension: Dimension,
    pub value: f64,
}

impl Feature {
    fn new(name: impl Into<String>, dimension: Dimension, value: f64) -> Self {
        Self {
            name: name.into(),
            dimension,
            value,
        }
    }
}

/// Per-range totals, one value per diameter bin
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BinnedSeries {
    pub length: Vec<f64>,
    pub projected_area: Vec<f64>,
    pub surface_area: Vec<f64>,
    pub volume: Vec<f64>,
}

impl BinnedSeries {
    pub fn from_bins(bins: &DiameterBins) -> Self {
        Self {
            length: bins.bins.iter().map(|b| b.length).collect(),
            projected_area: bins.bins.iter().map(|b| b.projected_area).collect(),
            surface_area: bins.bins.iter().map(|b| b.surface_area).collect(),
            volume: bins.bins.iter().map(|b| b.volume).collect(),
        }
    }

    fn entries(&self) -> Vec<Feature> {
        let series = [
            ("Root.Length.Diameter.Range", Dimension::Length, &self.length),
            ("Projected.Area.Diameter.Range", Dimension::Area, &self.projected_area),
            ("Surface.Area.Diameter.Range", Dimension::Area, &self.surface_area),
            ("Volume.Diameter.Range", Dimension::Volume, &self.volume),
        ];

        series
            .into_iter()
            .flat_map(|(name, dimension, values)| {
                values
                    .iter()
                    .enumerate()
                    .map(move |(k, &v)| Feature::new(format!("{}.{}", name, k + 1), dimension, v))
            })
            .collect()
    }

    fn map_values<F: Fn(Dimension, f64) -> f64>(&mut self, f: &F) {
        for v in &mut self.length {
            *v = f(Dimension::Length, *v);
        }
        for v in self.projected_area.iter_mut().chain(self.surface_area.iter_mut()) {
            *v = f(Dimension::Area, *v);
        }
        for v in &mut self.volume {
            *v = f(Dimension::Volume, *v);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WholeRootFeatures {
    pub median_number_of_roots: f64,
    pub maximum_number_of_roots: f64,
    pub number_of_root_tips: f64,
    pub total_root_length: f64,
    pub depth: f64,
    pub maximum_width: f64,
    pub width_to_depth_ratio: f64,
    pub network_area: f64,
    pub convex_area: f64,
    pub solidity: f64,
    pub lower_root_area: f64,
    pub average_diameter: f64,
    pub median_diameter: f64,
    pub maximum_diameter: f64,
    pub perimeter: f64,
    pub volume: f64,
    pub surface_area: f64,
    pub holes: f64,
    pub average_hole_size: f64,
    pub computation_time: f64,
    pub average_root_orientation: f64,
    pub shallow_angle_frequency: f64,
    pub medium_angle_frequency: f64,
    pub steep_angle_frequency: f64,
    pub bins: BinnedSeries,
}

impl WholeRootFeatures {
    fn scalars(&self) -> Vec<Feature> {
        use Dimension::*;
        vec![
            Feature::new("Median.Number.of.Roots", Count, self.median_number_of_roots),
            Feature::new("Maximum.Number.of.Roots", Count, self.maximum_number_of_roots),
            Feature::new("Number.of.Root.Tips", Count, self.number_of_root_tips),
            Feature::new("Total.Root.Length", Length, self.total_root_length),
            Feature::new("Depth", Length, self.depth),
            Feature::new("Maximum.Width", Length, self.maximum_width),
            Feature::new("Width-to-Depth.Ratio", Unitless, self.width_to_depth_ratio),
            Feature::new("Network.Area", Area, self.network_area),
            Feature::new("Convex.Area", Area, self.convex_area),
            Feature::new("Solidity", Unitless, self.solidity),
            Feature::new("Lower.Root.Area", Area, self.lower_root_area),
            Feature::new("Average.Diameter", Length, self.average_diameter),
            Feature::new("Median.Diameter", Length, self.median_diameter),
            Feature::new("Maximum.Diameter", Length, self.maximum_diameter),
            Feature::new("Perimeter", Length, self.perimeter),
            Feature::new("Volume", Volume, self.volume),
            Feature::new("Surface.Area", Area, self.surface_area),
            Feature::new("Holes", Count, self.holes),
            Feature::new("Average.Hole.Size", Area, self.average_hole_size),
            Feature::new("Computation.Time.s", Unitless, self.computation_time),
            Feature::new("Average.Root.Orientation.deg", Unitless, self.average_root_orientation),
            Feature::new("Shallow.Angle.Frequency", Unitless, self.shallow_angle_frequency),
            Feature::new("Medium.Angle.Frequency", Unitless, self.medium_angle_frequency),
            Feature::new("Steep.Angle.Frequency", Unitless, self.steep_angle_frequency),
        ]
    }

    fn map_values<F: Fn(Dimension, f64) -> f64>(&mut self, f: &F) {
        use Dimension::*;
        for v in [
            &mut self.total_root_length,
            &mut self.depth,
            &mut self.maximum_width,
            &mut self.average_diameter,
            &mut self.median_diameter,
            &mut self.maximum_diameter,
            &mut self.perimeter,
        ] {
            *v = f(Length, *v);
        }
        for v in [
            &mut self.network_area,
            &mut self.convex_area,
            &mut self.lower_root_area,
            &mut self.surface_area,
            &mut self.average_hole_size,
        ] {
            *v = f(Area, *v);
        }
        self.volume = f(Volume, self.volume);
        self.bins.map_values(f);
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrokenRootFeatures {
    pub number_of_root_tips: f64,
    pub number_of_branch_points: f64,
    pub total_root_length: f64,
    pub branching_frequency: f64,
    pub network_area: f64,
    pub average_diameter: f64,
    pub median_diameter: f64,
    pub maximum_diameter: f64,
    pub perimeter: f64,
    pub volume: f64,
    pub surface_area: f64,
    pub computation_time: f64,
    pub bins: BinnedSeries,
}

impl BrokenRootFeatures {
    fn scalars(&self) -> Vec<Feature> {
        use Dimension::*;
        vec![
            Feature::new("Number.of.Root.Tips", Count, self.number_of_root_tips),
            Feature::new("Number.of.Branch.Points", Count, self.number_of_branch_points),
            Feature::new("Total.Root.Length", Length, self.total_root_length),
            Feature::new("Branching.frequency", InverseLength, self.branching_frequency),
            Feature::new("Network.Area", Area, self.network_area),
            Feature::new("Average.Diameter", Length, self.average_diameter),
            Feature::new("Median.Diameter", Length, self.median_diameter),
            Feature::new("Maximum.Diameter", Length, self.maximum_diameter),
            Feature::new("Perimeter", Length, self.perimeter),
            Feature::new("Volume", Volume, self.volume),
            Feature::new("Surface.Area", Area, self.surface_area),
            Feature::new("Computation.Time.s", Unitless, self.computation_time),
        ]
    }

    fn map_values<F: Fn(Dimension, f64) -> f64>(&mut self, f: &F) {
        use Dimension::*;
        for v in [
            &mut self.total_root_length,
            &mut self.average_diameter,
            &mut self.median_diameter,
            &mut self.maximum_diameter,
            &mut self.perimeter,
        ] {
            *v = f(Length, *v);
        }
        self.network_area = f(Area, self.network_area);
        self.surface_area = f(Area, self.surface_area);
        self.volume = f(Volume, self.volume);
        self.branching_frequency = f(InverseLength, self.branching_frequency);
        self.bins.map_values(f);
    }
}

/// Ordered, fixed-schema result for one image or region
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureVector {
    WholeRoot(WholeRootFeatures),
    BrokenRoots(BrokenRootFeatures),
}

impl FeatureVector {
    pub fn root_type(&self) -> RootType {
        match self {
            FeatureVector::WholeRoot(_) => RootType::WholeRoot,
            FeatureVector::BrokenRoots(_) => RootType::BrokenRoots,
        }
    }

    pub fn bins(&self) -> &BinnedSeries {
        match self {
            FeatureVector::WholeRoot(f) => &f.bins,
            FeatureVector::BrokenRoots(f) => &f.bins,
        }
    }

    /// All features in column order, scalars first and binned series last
    pub fn entries(&self) -> Vec<Feature> {
        let (mut entries, bins) = match self {
            FeatureVector::WholeRoot(f) => (f.scalars(), &f.bins),
            FeatureVector::BrokenRoots(f) => (f.scalars(), &f.bins),
        };
        entries.extend(bins.entries());
        entries
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries().into_iter().map(|f| f.value).collect()
    }

    pub fn set_computation_time(&mut self, seconds: f64) {
        match self {
            FeatureVector::WholeRoot(f) => f.computation_time = seconds,
            FeatureVector::BrokenRoots(f) => f.computation_time = seconds,
        }
    }

    /// Look a feature up by its unsuffixed name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries().into_iter().find(|f| f.name == name).map(|f| f.value)
    }

    /// Rewrite every dimensioned value; counts and unitless values are untouched
    pub fn map_values<F: Fn(Dimension, f64) -> f64>(&mut self, f: F) {
        match self {
            FeatureVector::WholeRoot(features) => features.map_values(&f),
            FeatureVector::BrokenRoots(features) => features.map_values(&f),
        }
    }
}

/// Column names and dimensions for a root type with `bin_count` bins
pub fn schema(root_type: RootType, bin_count: usize) -> Vec<(String, Dimension)> {
    let zeros = vec![0.0; bin_count];
    let bins = BinnedSeries {
        length: zeros.clone(),
        projected_area: zeros.clone(),
        surface_area: zeros.clone(),
        volume: zeros,
    };
    let template = match root_type {
        RootType::WholeRoot => FeatureVector::WholeRoot(WholeRootFeatures {
            bins,
            ..Default::default()
        }),
        RootType::BrokenRoots => FeatureVector::BrokenRoots(BrokenRootFeatures {
            bins,
            ..Default::default()
        }),
    };

    template
        .entries()
        .into_iter()
        .map(|f| (f.name, f.dimension))
        .collect()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Diameter statistics over retained skeleton pixels: (average, median, maximum)
fn diameter_stats(graph: &TopologyGraph) -> (f64, f64, f64) {
    let diameters: Vec<f64> = graph.retained_pixels().into_iter().map(|(_, d)| d).collect();
    if diameters.is_empty() {
        return (f64::NAN, f64::NAN, f64::NAN);
    }
    let average = diameters.iter().sum::<f64>() / diameters.len() as f64;
    let maximum = diameters.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (average, median(&diameters), maximum)
}

/// Local skeleton directions in degrees from vertical
///
/// Each live segment is cut into runs of `ORIENTATION_RUN` pixels and the
/// principal axis of every run with at least two pixels gives one sample.
pub fn orientation_samples(graph: &TopologyGraph) -> Vec<f64> {
    let mut samples = Vec::new();

    for (_, segment) in graph.alive_segments() {
        for run in segment.pixels.chunks(ORIENTATION_RUN) {
            if run.len() < 2 {
                continue;
            }
            let count = run.len() as f64;
            let cx = run.iter().map(|p| p.0 as f64).sum::<f64>() / count;
            let cy = run.iter().map(|p| p.1 as f64).sum::<f64>() / count;

            let mut cxx = 0.0;
            let mut cyy = 0.0;
            let mut cxy = 0.0;
            for &(x, y) in run {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                cxx += dx * dx;
                cyy += dy * dy;
                cxy += dx * dy;
            }

            let eig = SymmetricEigen::new(Matrix2::new(cxx, cxy, cxy, cyy));
            let axis = if eig.eigenvalues[0] >= eig.eigenvalues[1] {
                eig.eigenvectors.column(0)
            } else {
                eig.eigenvectors.column(1)
            };
            let (vx, vy) = (axis[0], axis[1]);
            if !(vx.is_finite() && vy.is_finite()) || vx.hypot(vy) < 1e-9 {
                continue;
            }

            samples.push(vx.abs().atan2(vy.abs()).to_degrees());
        }
    }

    samples
}

/// (average, shallow, medium, steep) from orientation samples
fn orientation_summary(samples: &[f64]) -> (f64, f64, f64, f64) {
    if samples.is_empty() {
        return (f64::NAN, f64::NAN, f64::NAN, f64::NAN);
    }
    let n = samples.len() as f64;
    let steep = samples.iter().filter(|&&a| a < 30.0).count() as f64;
    let medium = samples.iter().filter(|&&a| (30.0..60.0).contains(&a)).count() as f64;
    let shallow = samples.iter().filter(|&&a| a >= 60.0).count() as f64;

    (samples.iter().sum::<f64>() / n, shallow / n, medium / n, steep / n)
}

/// Compute the feature vector for a processed mask and its skeleton graph
///
/// All values are in pixel units; `elapsed_seconds` is reported as is.
pub fn aggregate(
    root_type: RootType,
    mask: &Mask,
    graph: &TopologyGraph,
    bins: &DiameterBins,
    elapsed_seconds: f64,
) -> FeatureVector {
    let totals = bins.total();
    let (average_diameter, median_diameter, maximum_diameter) = diameter_stats(graph);
    let network_area = calculate_area(mask) as f64;
    let perimeter = calculate_total_perimeter(&trace_contours(mask));
    let series = BinnedSeries::from_bins(bins);

    match root_type {
        RootType::WholeRoot => {
            let (median_roots, maximum_roots) = calculate_root_counts(mask);
            let (width, depth) = calculate_bounding_box_dimensions(mask);
            let convex_area = polygon_area(&calculate_convex_hull(mask));
            let holes = find_holes(mask);
            let (orientation, shallow, medium, steep) = orientation_summary(&orientation_samples(graph));

            FeatureVector::WholeRoot(WholeRootFeatures {
                median_number_of_roots: median_roots,
                maximum_number_of_roots: maximum_roots,
                number_of_root_tips: graph.tip_count() as f64,
                total_root_length: totals.length,
                depth: depth as f64,
                maximum_width: width as f64,
                width_to_depth_ratio: ratio(width as f64, depth as f64),
                network_area,
                convex_area,
                solidity: ratio(network_area, convex_area),
                lower_root_area: (convex_area - network_area).max(0.0),
                average_diameter,
                median_diameter,
                maximum_diameter,
                perimeter,
                volume: totals.volume,
                surface_area: totals.surface_area,
                holes: holes.count as f64,
                average_hole_size: holes.average_size(),
                computation_time: elapsed_seconds,
                average_root_orientation: orientation,
                shallow_angle_frequency: shallow,
                medium_angle_frequency: medium,
                steep_angle_frequency: steep,
                bins: series,
            })
        }
        RootType::BrokenRoots => {
            let branch_points = graph.branch_count() as f64;
            FeatureVector::BrokenRoots(BrokenRootFeatures {
                number_of_root_tips: graph.tip_count() as f64,
                number_of_branch_points: branch_points,
                total_root_length: totals.length,
                branching_frequency: ratio(branch_points, totals.length),
                network_area,
                average_diameter,
                median_diameter,
                maximum_diameter,
                perimeter,
                volume: totals.volume,
                surface_area: totals.surface_area,
                computation_time: elapsed_seconds,
                bins: series,
            })
        }
    }
}
