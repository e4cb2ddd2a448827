// src/config.rs - Pipeline configuration loaded from TOML

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::binning::validate_dranges;
use crate::errors::{RootTraitError, Result};
use crate::pruning::PrunePolicy;
use crate::units::mm_per_pixel;

/// Configuration for root trait extraction
///
/// A `Config` is an immutable snapshot handed to the analyzer before a run.
/// Options that only make sense together with a parent switch (the smoothing
/// tolerance, the pruning threshold, noise sizes, conversion factor) are
/// optional so that setting them without the switch can be reported.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub input_path: String,

    /// Output directory; empty means next to the input
    #[serde(default)]
    pub output_path: String,

    #[serde(default = "default_output_file")]
    pub output_file: String,

    #[serde(default)]
    pub recursive: bool,

    #[serde(default)]
    pub no_append: bool,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    #[serde(default)]
    pub root_type: RootType,

    // Segmentation
    #[serde(default = "default_threshold")]
    pub threshold: i32,

    #[serde(default)]
    pub invert: bool,

    // Component filtering
    #[serde(default = "default_keep_largest")]
    pub keep_largest: bool,

    #[serde(default)]
    pub filter_fg_noise: bool,

    #[serde(default)]
    pub filter_bg_noise: bool,

    /// Largest foreground component removed as noise, as a fraction of the image
    #[serde(default)]
    pub max_fg_size_fraction: Option<f64>,

    /// Largest background component filled as noise, as a fraction of the image
    #[serde(default)]
    pub max_bg_size_fraction: Option<f64>,

    // Contour smoothing
    #[serde(default)]
    pub enable_smoothing: bool,

    #[serde(default)]
    pub smoothing_tolerance: Option<f64>,

    // Root pruning
    #[serde(default)]
    pub enable_pruning: bool,

    #[serde(default)]
    pub prune_threshold: Option<u32>,

    /// How leaf length is measured; the parent radius is subtracted by default
    #[serde(default)]
    pub prune_policy: Option<PrunePolicy>,

    // Unit conversion
    #[serde(default)]
    pub pixel_conversion: bool,

    #[serde(default)]
    pub conversion_mode: ConversionMode,

    #[serde(default)]
    pub conversion_factor: Option<f64>,

    /// Diameter range cut-points, in pixels or millimetres when converting
    #[serde(default = "default_dranges")]
    pub dranges: Vec<f64>,

    /// Externally designated base of a whole root system
    #[serde(default)]
    pub base_point: Option<[u32; 2]>,

    #[serde(default)]
    pub rois: Vec<Roi>,

    #[serde(default)]
    pub overlay: OverlayOptions,

    // Image outputs
    #[serde(default)]
    pub save_segmented: bool,

    #[serde(default)]
    pub save_processed: bool,

    #[serde(default = "default_seg_suffix")]
    pub seg_suffix: String,

    #[serde(default = "default_feature_suffix")]
    pub feature_suffix: String,
}

/// Analysis mode
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RootType {
    /// A single connected root system (crowns)
    WholeRoot,
    /// Disconnected root fragments (washed soil cores, scans)
    #[default]
    BrokenRoots,
}

/// How `conversion_factor` is interpreted
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    #[default]
    Dpi,
    PixelsPerMm,
}

/// Named rectangular region of interest
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Roi {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Flags selecting what is drawn on the processed image
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OverlayOptions {
    /// Whole root only
    #[serde(default = "default_true")]
    pub show_convex_hull: bool,

    /// Whole root only
    #[serde(default = "default_true")]
    pub show_holes: bool,

    #[serde(default)]
    pub show_distance_map: bool,

    #[serde(default = "default_true")]
    pub show_medial_axis: bool,

    #[serde(default = "default_medial_axis_width")]
    pub medial_axis_width: u32,

    /// Colour the medial axis by diameter range instead of topology
    #[serde(default = "default_true")]
    pub show_medial_axis_diameter: bool,

    /// Whole root only
    #[serde(default = "default_true")]
    pub show_contours: bool,

    #[serde(default = "default_contour_width")]
    pub contour_width: u32,
}

/// Effective pruning parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruneSettings {
    pub threshold: f64,
    pub policy: PrunePolicy,
}

pub const DEFAULT_SMOOTHING_TOLERANCE: f64 = 2.0;
pub const DEFAULT_PRUNE_THRESHOLD: u32 = 1;
pub const DEFAULT_MAX_FG_SIZE_FRACTION: f64 = 0.001;
pub const DEFAULT_MAX_BG_SIZE_FRACTION: f64 = 0.001;
pub const DEFAULT_CONVERSION_FACTOR: f64 = 1.0;

fn default_output_file() -> String {
    "features.csv".to_string()
}

fn default_parallel() -> bool {
    true
}

fn default_threshold() -> i32 {
    200
}

fn default_keep_largest() -> bool {
    true
}

fn default_dranges() -> Vec<f64> {
    vec![2.0, 5.0]
}

fn default_seg_suffix() -> String {
    "_seg".to_string()
}

fn default_feature_suffix() -> String {
    "_features".to_string()
}

fn default_true() -> bool {
    true
}

fn default_medial_axis_width() -> u32 {
    3
}

fn default_contour_width() -> u32 {
    1
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            show_convex_hull: true,
            show_holes: true,
            show_distance_map: false,
            show_medial_axis: true,
            medial_axis_width: 3,
            show_medial_axis_diameter: true,
            show_contours: true,
            contour_width: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: String::new(),
            output_path: String::new(),
            output_file: default_output_file(),
            recursive: false,
            no_append: false,
            use_parallel: true,
            root_type: RootType::BrokenRoots,
            threshold: 200,
            invert: false,
            keep_largest: true,
            filter_fg_noise: false,
            filter_bg_noise: false,
            max_fg_size_fraction: None,
            max_bg_size_fraction: None,
            enable_smoothing: false,
            smoothing_tolerance: None,
            enable_pruning: false,
            prune_threshold: None,
            prune_policy: None,
            pixel_conversion: false,
            conversion_mode: ConversionMode::Dpi,
            conversion_factor: None,
            dranges: default_dranges(),
            base_point: None,
            rois: Vec::new(),
            overlay: OverlayOptions::default(),
            save_segmented: false,
            save_processed: false,
            seg_suffix: default_seg_suffix(),
            feature_suffix: default_feature_suffix(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RootTraitError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| RootTraitError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            RootTraitError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }

    /// Validate parameters before any pixel is processed
    pub fn validate(&self) -> Result<()> {
        if !(0..=255).contains(&self.threshold) {
            return Err(RootTraitError::Config(format!(
                "threshold must be between 0 and 255, got {}",
                self.threshold
            )));
        }

        validate_dranges(&self.dranges)?;

        for (name, value) in [
            ("max_fg_size_fraction", self.max_fg_size_fraction),
            ("max_bg_size_fraction", self.max_bg_size_fraction),
        ] {
            if let Some(fraction) = value {
                if !(fraction > 0.0 && fraction <= 1.0) {
                    return Err(RootTraitError::Config(format!(
                        "{} must be in (0, 1], got {}",
                        name, fraction
                    )));
                }
            }
        }

        if let Some(tolerance) = self.smoothing_tolerance {
            if !(tolerance.is_finite() && tolerance > 0.0) {
                return Err(RootTraitError::Config(format!(
                    "smoothing_tolerance must be > 0.0, got {}",
                    tolerance
                )));
            }
        }

        if self.prune_threshold == Some(0) {
            return Err(RootTraitError::Config(
                "prune_threshold must be > 0".to_string(),
            ));
        }

        if let Some(factor) = self.conversion_factor {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(RootTraitError::Config(format!(
                    "conversion_factor must be > 0.0, got {}",
                    factor
                )));
            }
        }

        if self.overlay.medial_axis_width == 0 {
            return Err(RootTraitError::Config(
                "medial_axis_width must be > 0".to_string(),
            ));
        }

        if self.overlay.contour_width == 0 {
            return Err(RootTraitError::Config(
                "contour_width must be > 0".to_string(),
            ));
        }

        for roi in &self.rois {
            if roi.width == 0 || roi.height == 0 {
                return Err(RootTraitError::Config(format!(
                    "region of interest '{}' has an empty size",
                    roi.name
                )));
            }
        }

        Ok(())
    }

    /// Effective configuration with unsupported combinations switched off
    ///
    /// Every downgrade is reported as a warning; nothing here is fatal.
    pub fn normalized(&self) -> Config {
        let mut config = self.clone();

        if config.root_type == RootType::BrokenRoots {
            let overlay = &mut config.overlay;
            if overlay.show_convex_hull || overlay.show_holes || overlay.show_contours {
                warn!("Convex hull, holes, and contours options are ignored for broken roots");
                overlay.show_convex_hull = false;
                overlay.show_holes = false;
                overlay.show_contours = false;
            }
        }

        if config.max_fg_size_fraction.is_some() && !config.filter_fg_noise {
            warn!("max_fg_size_fraction is set but filter_fg_noise is not enabled, ignoring it");
            config.max_fg_size_fraction = None;
        }

        if config.max_bg_size_fraction.is_some() && !config.filter_bg_noise {
            warn!("max_bg_size_fraction is set but filter_bg_noise is not enabled, ignoring it");
            config.max_bg_size_fraction = None;
        }

        if config.smoothing_tolerance.is_some() && !config.enable_smoothing {
            warn!("smoothing_tolerance is set but smoothing is not enabled, ignoring it");
            config.smoothing_tolerance = None;
        }

        if (config.prune_threshold.is_some() || config.prune_policy.is_some())
            && !config.enable_pruning
        {
            warn!("prune_threshold is set but pruning is not enabled, ignoring it");
            config.prune_threshold = None;
            config.prune_policy = None;
        }

        if config.conversion_factor.is_some() && !config.pixel_conversion {
            warn!("Conversion factor provided but pixel conversion is not enabled, ignoring it");
            config.conversion_factor = None;
        }

        if config.base_point.is_some() && config.root_type == RootType::BrokenRoots {
            warn!("base_point only applies to whole roots, ignoring it");
            config.base_point = None;
        }

        if config.seg_suffix != default_seg_suffix() && !config.save_segmented {
            warn!("seg_suffix is set but save_segmented is not enabled, ignoring it");
        }

        if config.feature_suffix != default_feature_suffix() && !config.save_processed {
            warn!("feature_suffix is set but save_processed is not enabled, ignoring it");
        }

        config
    }

    /// Threshold as a pixel value; only meaningful after `validate`
    pub fn threshold_level(&self) -> u8 {
        self.threshold.clamp(0, 255) as u8
    }

    /// Largest foreground noise component, as a fraction, when filtering is on
    pub fn fg_noise_fraction(&self) -> Option<f64> {
        self.filter_fg_noise
            .then(|| self.max_fg_size_fraction.unwrap_or(DEFAULT_MAX_FG_SIZE_FRACTION))
    }

    /// Largest background noise component, as a fraction, when filtering is on
    pub fn bg_noise_fraction(&self) -> Option<f64> {
        self.filter_bg_noise
            .then(|| self.max_bg_size_fraction.unwrap_or(DEFAULT_MAX_BG_SIZE_FRACTION))
    }

    /// Smoothing tolerance in pixels when smoothing is on
    pub fn smoothing(&self) -> Option<f64> {
        self.enable_smoothing
            .then(|| self.smoothing_tolerance.unwrap_or(DEFAULT_SMOOTHING_TOLERANCE))
    }

    /// Pruning parameters when pruning is on
    pub fn pruning(&self) -> Option<PruneSettings> {
        if !self.enable_pruning {
            return None;
        }

        Some(PruneSettings {
            threshold: f64::from(self.prune_threshold.unwrap_or(DEFAULT_PRUNE_THRESHOLD)),
            policy: self.prune_policy.unwrap_or_default(),
        })
    }

    /// Millimetres per pixel when conversion is on
    pub fn mm_per_pixel(&self) -> Option<f64> {
        self.pixel_conversion.then(|| {
            mm_per_pixel(
                self.conversion_mode,
                self.conversion_factor.unwrap_or(DEFAULT_CONVERSION_FACTOR),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_tool() {
        let config = Config::default();
        assert_eq!(config.root_type, RootType::BrokenRoots);
        assert_eq!(config.threshold, 200);
        assert_eq!(config.dranges, vec![2.0, 5.0]);
        assert!(config.keep_largest);
        assert!(config.validate().is_ok());
        assert_eq!(config.smoothing(), None);
        assert_eq!(config.pruning(), None);
        assert_eq!(config.mm_per_pixel(), None);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            root_type = "whole_root"
            threshold = 120
            dranges = [1.0, 3.0, 6.0]

            [overlay]
            show_distance_map = true
            "#,
        )
        .unwrap();

        assert_eq!(config.root_type, RootType::WholeRoot);
        assert_eq!(config.threshold_level(), 120);
        assert_eq!(config.dranges.len(), 3);
        assert!(config.overlay.show_distance_map);
        assert!(config.overlay.show_convex_hull);
        assert_eq!(config.overlay.medial_axis_width, 3);
        assert_eq!(config.output_file, "features.csv");
    }

    #[test]
    fn raw_length_pruning_is_read_by_name() {
        let config: Config = toml::from_str(
            r#"
            enable_pruning = true
            prune_threshold = 3
            prune_policy = "raw_length"
            "#,
        )
        .unwrap();

        let pruning = config.pruning().unwrap();
        assert_eq!(pruning.threshold, 3.0);
        assert_eq!(pruning.policy, PrunePolicy::RawLength);
    }

    #[test]
    fn sample_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
        let config = Config::from_file(path).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.invert);
        assert_eq!(config.pruning().map(|p| p.threshold), Some(5.0));
        assert_eq!(config.pruning().map(|p| p.policy), Some(PrunePolicy::BeyondParentRadius));
        assert_eq!(config.fg_noise_fraction(), Some(0.001));
    }

    #[test]
    fn missing_config_file_is_a_configuration_error() {
        let err = Config::from_file("/no/such/config.toml").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = Config { threshold: 256, ..Config::default() };
        assert!(matches!(config.validate(), Err(RootTraitError::Config(_))));
    }

    #[test]
    fn rejects_bad_dranges() {
        let descending = Config { dranges: vec![5.0, 2.0], ..Config::default() };
        assert!(matches!(descending.validate(), Err(RootTraitError::InvalidRange(_))));

        let non_positive = Config { dranges: vec![0.0, 2.0], ..Config::default() };
        assert!(matches!(non_positive.validate(), Err(RootTraitError::InvalidRange(_))));
    }

    #[test]
    fn broken_roots_disable_whole_root_overlays() {
        let config = Config::default().normalized();
        assert!(!config.overlay.show_convex_hull);
        assert!(!config.overlay.show_holes);
        assert!(!config.overlay.show_contours);
        assert!(config.overlay.show_medial_axis);
    }

    #[test]
    fn child_options_without_parent_are_dropped() {
        let config = Config {
            smoothing_tolerance: Some(3.0),
            prune_threshold: Some(10),
            conversion_factor: Some(600.0),
            max_fg_size_fraction: Some(0.5),
            ..Config::default()
        }
        .normalized();

        assert_eq!(config.smoothing_tolerance, None);
        assert_eq!(config.prune_threshold, None);
        assert_eq!(config.conversion_factor, None);
        assert_eq!(config.max_fg_size_fraction, None);
        assert_eq!(config.fg_noise_fraction(), None);
    }

    #[test]
    fn effective_settings_when_enabled() {
        let config = Config {
            enable_smoothing: true,
            enable_pruning: true,
            prune_threshold: Some(12),
            prune_policy: Some(PrunePolicy::RawLength),
            pixel_conversion: true,
            conversion_mode: ConversionMode::PixelsPerMm,
            conversion_factor: Some(4.0),
            ..Config::default()
        };

        assert_eq!(config.smoothing(), Some(DEFAULT_SMOOTHING_TOLERANCE));
        let pruning = config.pruning().unwrap();
        assert_eq!(pruning.threshold, 12.0);
        assert_eq!(pruning.policy, PrunePolicy::RawLength);
        assert_eq!(config.mm_per_pixel(), Some(0.25));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config {
            root_type: RootType::WholeRoot,
            rois: vec![Roi { name: "left".into(), x: 0, y: 0, width: 10, height: 20 }],
            base_point: Some([5, 0]),
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
