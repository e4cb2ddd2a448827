// src/pipeline.rs - Per-image trait extraction

use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, GrayImage, RgbImage};
use log::{debug, info};

use crate::binning::{bin_diameters, DiameterBins};
use crate::components::{filter_components, ComponentFilterOptions};
use crate::config::Config;
use crate::distance::DistanceMap;
use crate::errors::Result;
use crate::features::{aggregate, FeatureVector};
use crate::image_io::{save_image, InputImage};
use crate::image_utils::Mask;
use crate::output::FeatureRow;
use crate::overlay::{render_overlay, OverlayInputs};
use crate::pruning::prune;
use crate::roi::{crop_gray, mask_composite, overlay_composite, resolve_regions};
use crate::segmentation::{segment, to_grayscale};
use crate::skeleton::{skeletonize, Skeleton};
use crate::smoothing::smooth_contours;
use crate::topology::{build_topology, TopologyGraph};
use crate::units::{convert_features, UnitSystem};

/// Everything produced by one run of the pipeline
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Cleaned binary mask the traits were measured on
    pub segmented: Mask,
    pub distance: DistanceMap,
    pub skeleton: Skeleton,
    /// Topology after pruning, when pruning is enabled
    pub graph: TopologyGraph,
    /// Diameter bins, accumulated in pixel units
    pub bins: DiameterBins,
    /// Features in the analyzer's unit system
    pub features: FeatureVector,
}

/// Trait extraction bound to one validated configuration
///
/// The analyzer holds no per-image state, so one instance can be shared
/// across threads processing independent images.
#[derive(Debug, Clone)]
pub struct RootAnalyzer {
    config: Config,
    filter: ComponentFilterOptions,
    units: UnitSystem,
}

impl RootAnalyzer {
    /// Validate the configuration and resolve its effective settings
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let config = config.normalized();

        let filter = ComponentFilterOptions {
            fg_noise_fraction: config.fg_noise_fraction(),
            bg_noise_fraction: config.bg_noise_fraction(),
            keep_largest: config.keep_largest,
        };
        let units = UnitSystem::from_scale(config.mm_per_pixel());

        Ok(Self { config, filter, units })
    }

    /// The effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn units(&self) -> UnitSystem {
        self.units
    }

    /// Number of diameter bins in every feature vector
    pub fn bin_count(&self) -> usize {
        self.config.dranges.len() + 1
    }

    /// Analyse a colour or grayscale image
    pub fn analyze(&self, image: &DynamicImage) -> Result<AnalysisResult> {
        self.analyze_gray(&to_grayscale(image))
    }

    /// Analyse an 8-bit grayscale image using the configured base point
    pub fn analyze_gray(&self, gray: &GrayImage) -> Result<AnalysisResult> {
        let base_point = self.config.base_point.map(|[x, y]| (x, y));
        self.analyze_with_base(gray, base_point)
    }

    /// Analyse with an explicit base point, given in `gray`'s coordinates
    pub fn analyze_with_base(
        &self,
        gray: &GrayImage,
        base_point: Option<(u32, u32)>,
    ) -> Result<AnalysisResult> {
        let config = &self.config;
        let start = Instant::now();

        let mut mask = segment(gray, config.threshold_level(), config.invert);
        mask = filter_components(&mask, &self.filter);

        if let Some(tolerance) = config.smoothing() {
            mask = smooth_contours(&mask, tolerance);
            debug!("Smoothed contours with tolerance {}", tolerance);
        }

        let distance = DistanceMap::compute(&mask);
        let skeleton = skeletonize(&mask, &distance);
        let mut graph = build_topology(&skeleton, &distance, base_point);
        debug!(
            "Skeleton has {} pixels, {} tips, {} branch points",
            skeleton.len(),
            graph.tip_count(),
            graph.branch_count()
        );

        if let Some(settings) = config.pruning() {
            let report = prune(&mut graph, settings.threshold, settings.policy);
            debug!(
                "Pruned {} segments in {} passes, merged {} nodes",
                report.removed_segments, report.passes, report.merged_nodes
            );
        }

        let bins = bin_diameters(&graph, &config.dranges, self.units.bin_scale())?;
        let mut features = aggregate(config.root_type, &mask, &graph, &bins, 0.0);
        features.set_computation_time(start.elapsed().as_secs_f64());
        let features = convert_features(&features, self.units);

        Ok(AnalysisResult {
            segmented: mask,
            distance,
            skeleton,
            graph,
            bins,
            features,
        })
    }

    /// Annotated processed image for one analysis
    pub fn render(&self, result: &AnalysisResult) -> RgbImage {
        let inputs = OverlayInputs {
            mask: &result.segmented,
            distance: &result.distance,
            graph: &result.graph,
            dranges: &self.config.dranges,
            bin_scale: self.units.bin_scale(),
        };
        render_overlay(&inputs, &self.config.overlay)
    }
}

/// Process one input image, one feature row per region of interest
///
/// Segmented and processed images are saved into `output_dir` when the
/// configuration asks for them. Errors carry the image path.
pub fn process_image(
    input_image: &InputImage,
    analyzer: &RootAnalyzer,
    output_dir: &Path,
) -> Result<Vec<FeatureRow>> {
    let image_name = input_image.path.display().to_string();
    run_regions(input_image, analyzer, output_dir).map_err(|e| e.for_image(image_name))
}

fn run_regions(
    input_image: &InputImage,
    analyzer: &RootAnalyzer,
    output_dir: &Path,
) -> Result<Vec<FeatureRow>> {
    let config = analyzer.config();
    let file_name = input_image.file_name();
    info!("Processing {}", file_name);

    let gray = to_grayscale(&input_image.image);
    let (width, height) = gray.dimensions();
    let regions = resolve_regions(&config.rois, width, height, &file_name);

    let mut seg_composite = config.save_segmented.then(|| mask_composite(width, height));
    let mut overlay = config.save_processed.then(|| overlay_composite(width, height));
    let base_point = config.base_point.map(|[x, y]| (x, y));

    let mut rows = Vec::with_capacity(regions.len());
    for region in &regions {
        let part = crop_gray(&gray, region);
        let region_base = base_point.and_then(|point| region.translate(point));
        if base_point.is_some() && region_base.is_none() {
            debug!("Base point lies outside region '{}'", region.name);
        }

        let result = analyzer.analyze_with_base(&part, region_base)?;

        if let Some(composite) = seg_composite.as_mut() {
            composite.paste(region, &result.segmented);
        }
        if let Some(composite) = overlay.as_mut() {
            composite.paste(region, &analyzer.render(&result));
        }

        rows.push(FeatureRow {
            file_name: file_name.clone(),
            region: region.name.clone(),
            features: result.features,
        });
    }

    if let Some(composite) = seg_composite {
        let path = output_dir.join(format!("{}{}.png", input_image.filename, config.seg_suffix));
        save_image(&DynamicImage::ImageLuma8(composite.into_image()), &path)?;
        debug!("Saved segmented image to {}", path.display());
    }

    if let Some(composite) = overlay {
        let path = output_dir.join(format!("{}{}.png", input_image.filename, config.feature_suffix));
        save_image(&DynamicImage::ImageRgb8(composite.into_image()), &path)?;
        debug!("Saved processed image to {}", path.display());
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RootType, Roi};
    use crate::errors::RootTraitError;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    /// Dark roots on a light background, as scanned
    fn scan_with_bar() -> GrayImage {
        let mut gray = GrayImage::from_pixel(60, 20, Luma([240]));
        draw_filled_rect_mut(&mut gray, Rect::at(5, 8).of_size(40, 3), Luma([20]));
        gray
    }

    #[test]
    fn invalid_configuration_is_rejected_up_front() {
        let config = Config { dranges: vec![3.0, 1.0], ..Config::default() };
        assert!(matches!(RootAnalyzer::new(&config), Err(RootTraitError::InvalidRange(_))));
    }

    #[test]
    fn dark_roots_need_inversion() {
        let config = Config { invert: true, ..Config::default() };
        let analyzer = RootAnalyzer::new(&config).unwrap();
        let result = analyzer.analyze_gray(&scan_with_bar()).unwrap();

        assert_eq!(result.features.root_type(), RootType::BrokenRoots);
        assert_eq!(result.features.get("Number.of.Root.Tips"), Some(2.0));
        assert_eq!(analyzer.bin_count(), 3);
        assert_eq!(result.bins.len(), 3);
    }

    #[test]
    fn computation_time_covers_feature_aggregation() {
        let mut gray = GrayImage::from_pixel(300, 300, Luma([240]));
        draw_filled_rect_mut(&mut gray, Rect::at(20, 20).of_size(260, 260), Luma([20]));
        let config = Config { invert: true, root_type: RootType::WholeRoot, ..Config::default() };
        let analyzer = RootAnalyzer::new(&config).unwrap();
        let result = analyzer.analyze_gray(&gray).unwrap();

        let aggregation = (0..3)
            .map(|_| {
                let start = Instant::now();
                let _features =
                    aggregate(RootType::WholeRoot, &result.segmented, &result.graph, &result.bins, 0.0);
                start.elapsed().as_secs_f64()
            })
            .fold(f64::INFINITY, f64::min);

        let reported = result.features.get("Computation.Time.s").unwrap();
        assert!(reported >= aggregation, "reported {} < aggregation {}", reported, aggregation);
    }

    #[test]
    fn regions_give_one_row_each() {
        let config = Config {
            invert: true,
            rois: vec![
                Roi { name: "left".into(), x: 0, y: 0, width: 30, height: 20 },
                Roi { name: "outside".into(), x: 50, y: 0, width: 30, height: 20 },
            ],
            ..Config::default()
        };
        let analyzer = RootAnalyzer::new(&config).unwrap();
        let input = InputImage {
            image: DynamicImage::ImageLuma8(scan_with_bar()),
            path: "scan.png".into(),
            filename: "scan".into(),
        };

        let rows = process_image(&input, &analyzer, Path::new(".")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].region, "left");
        assert_eq!(rows[1].region, "outside");
        assert_eq!(rows[0].file_name, "scan.png");
    }
}
