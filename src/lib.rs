// src/lib.rs - Library interface for root_trait_rust

pub mod binning;
pub mod components;
pub mod config;
pub mod distance;
pub mod errors;
pub mod features;
pub mod image_io;
pub mod image_utils;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod pruning;
pub mod roi;
pub mod segmentation;
pub mod shape_analysis;
pub mod skeleton;
pub mod smoothing;
pub mod topology;
pub mod units;

// Re-export commonly used types and functions
pub use errors::{RootTraitError, Result};
pub use config::{Config, ConversionMode, OverlayOptions, Roi, RootType};
pub use pipeline::{process_image, AnalysisResult, RootAnalyzer};
pub use image_io::{InputImage, collect_image_files, load_image, save_image};
pub use output::{FeatureRow, write_feature_csv};

// Re-export the pipeline stages
pub use segmentation::{segment, to_grayscale};
pub use components::{filter_components, keep_largest_component, ComponentFilterOptions};
pub use smoothing::smooth_contours;
pub use distance::DistanceMap;
pub use skeleton::{skeletonize, Skeleton};
pub use topology::{build_topology, NodeKind, TopologyGraph};
pub use pruning::{prune, PrunePolicy, PruneReport};
pub use binning::{bin_diameters, DiameterBin, DiameterBins};
pub use features::{aggregate, Dimension, FeatureVector};
pub use units::{convert_features, UnitSystem};
