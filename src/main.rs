use std::path::{Path, PathBuf};
use std::time::Instant;
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use rayon::prelude::*;

use root_trait_rust_lib::config::{Config, ConversionMode, RootType};
use root_trait_rust_lib::errors::{RootTraitError, Result};
use root_trait_rust_lib::image_io::{collect_image_files, load_image};
use root_trait_rust_lib::output::{write_feature_csv, FeatureRow};
use root_trait_rust_lib::pipeline::{process_image, RootAnalyzer};
use root_trait_rust_lib::pruning::PrunePolicy;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "root_trait_rust - Root System Architecture Traits")]
struct Args {
    /// Path to input image or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Directory for the feature table and saved images
    #[clap(short, long)]
    output: Option<String>,

    /// Path to a TOML configuration file
    #[clap(short, long)]
    config: Option<String>,

    /// Write the effective configuration to this file and continue
    #[clap(long)]
    write_config: Option<String>,

    /// Name of the feature table inside the output directory
    #[clap(long)]
    output_file: Option<String>,

    /// Analysis mode
    #[clap(short = 't', long, value_enum)]
    root_type: Option<RootTypeArg>,

    /// Threshold level (0-255)
    #[clap(long)]
    threshold: Option<i32>,

    /// Select dark roots on a light background
    #[clap(long)]
    invert: bool,

    /// Keep every foreground component instead of only the largest
    #[clap(long)]
    keep_all_components: bool,

    /// Remove small foreground components
    #[clap(long)]
    filter_fg_noise: bool,

    /// Largest foreground noise component as a fraction of the image
    #[clap(long)]
    max_fg_size: Option<f64>,

    /// Fill small background components
    #[clap(long)]
    filter_bg_noise: bool,

    /// Largest background noise component as a fraction of the image
    #[clap(long)]
    max_bg_size: Option<f64>,

    /// Smooth root contours
    #[clap(long)]
    smooth: bool,

    /// Contour smoothing tolerance in pixels
    #[clap(long)]
    smoothing_tolerance: Option<f64>,

    /// Prune short root branches
    #[clap(long)]
    prune: bool,

    /// Shortest surviving branch in pixels
    #[clap(long)]
    prune_threshold: Option<u32>,

    /// Compare raw branch length instead of length beyond the parent radius
    #[clap(long)]
    prune_raw_length: bool,

    /// Report physical units instead of pixels
    #[clap(long)]
    convert: bool,

    /// How the conversion factor is read
    #[clap(long, value_enum)]
    conversion_mode: Option<ConversionModeArg>,

    /// Dots per inch or pixels per millimetre
    #[clap(long)]
    factor: Option<f64>,

    /// Diameter range cut-points, comma separated
    #[clap(long, value_delimiter = ',')]
    dranges: Option<Vec<f64>>,

    /// Base of a whole root system as x,y
    #[clap(long, value_delimiter = ',')]
    base_point: Option<Vec<u32>>,

    /// Save the segmented mask for each image
    #[clap(long)]
    save_segmented: bool,

    /// Save the annotated processed image for each image
    #[clap(long)]
    save_processed: bool,

    /// Shade the root by the distance map
    #[clap(long)]
    show_distance_map: bool,

    /// Colour the medial axis by topology instead of diameter range
    #[clap(long)]
    topology_colors: bool,

    /// Medial axis line width in the processed image
    #[clap(long)]
    medial_axis_width: Option<u32>,

    /// Do not draw the convex hull
    #[clap(long)]
    hide_convex_hull: bool,

    /// Do not draw holes
    #[clap(long)]
    hide_holes: bool,

    /// Do not draw contours
    #[clap(long)]
    hide_contours: bool,

    /// Contour line width in the processed image
    #[clap(long)]
    contour_width: Option<u32>,

    /// Search input directories recursively
    #[clap(short, long)]
    recursive: bool,

    /// Replace an existing feature table instead of appending
    #[clap(long)]
    no_append: bool,

    /// Process images one at a time
    #[clap(long)]
    sequential: bool,

    /// Print debug messages
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RootTypeArg {
    Whole,
    Broken,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConversionModeArg {
    Dpi,
    PixelsPerMm,
}

/// Apply command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(input) = &args.input {
        config.input_path = input.clone();
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if let Some(output_file) = &args.output_file {
        config.output_file = output_file.clone();
    }
    if let Some(root_type) = args.root_type {
        config.root_type = match root_type {
            RootTypeArg::Whole => RootType::WholeRoot,
            RootTypeArg::Broken => RootType::BrokenRoots,
        };
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    config.invert |= args.invert;
    if args.keep_all_components {
        config.keep_largest = false;
    }

    config.filter_fg_noise |= args.filter_fg_noise;
    if args.max_fg_size.is_some() {
        config.max_fg_size_fraction = args.max_fg_size;
    }
    config.filter_bg_noise |= args.filter_bg_noise;
    if args.max_bg_size.is_some() {
        config.max_bg_size_fraction = args.max_bg_size;
    }

    config.enable_smoothing |= args.smooth;
    if args.smoothing_tolerance.is_some() {
        config.smoothing_tolerance = args.smoothing_tolerance;
    }

    config.enable_pruning |= args.prune;
    if args.prune_threshold.is_some() {
        config.prune_threshold = args.prune_threshold;
    }
    if args.prune_raw_length {
        config.prune_policy = Some(PrunePolicy::RawLength);
    }

    config.pixel_conversion |= args.convert;
    if let Some(mode) = args.conversion_mode {
        config.conversion_mode = match mode {
            ConversionModeArg::Dpi => ConversionMode::Dpi,
            ConversionModeArg::PixelsPerMm => ConversionMode::PixelsPerMm,
        };
    }
    if args.factor.is_some() {
        config.conversion_factor = args.factor;
    }

    if let Some(dranges) = &args.dranges {
        config.dranges = dranges.clone();
    }
    if let Some(point) = &args.base_point {
        match point.as_slice() {
            &[x, y] => config.base_point = Some([x, y]),
            _ => {
                return Err(RootTraitError::Config(
                    "base point must be given as x,y".to_string(),
                ))
            }
        }
    }

    config.save_segmented |= args.save_segmented;
    config.save_processed |= args.save_processed;

    let overlay = &mut config.overlay;
    overlay.show_distance_map |= args.show_distance_map;
    if args.topology_colors {
        overlay.show_medial_axis_diameter = false;
    }
    if let Some(width) = args.medial_axis_width {
        overlay.medial_axis_width = width;
    }
    if args.hide_convex_hull {
        overlay.show_convex_hull = false;
    }
    if args.hide_holes {
        overlay.show_holes = false;
    }
    if args.hide_contours {
        overlay.show_contours = false;
    }
    if let Some(width) = args.contour_width {
        overlay.contour_width = width;
    }

    config.recursive |= args.recursive;
    config.no_append |= args.no_append;
    if args.sequential {
        config.use_parallel = false;
    }

    Ok(())
}

/// Output directory: configured, or next to the input
fn output_directory(config: &Config, input_path: &Path) -> PathBuf {
    if !config.output_path.is_empty() {
        return PathBuf::from(&config.output_path);
    }
    if input_path.is_dir() {
        input_path.to_path_buf()
    } else {
        input_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn run_one(path: &Path, analyzer: &RootAnalyzer, output_dir: &Path) -> Result<Vec<FeatureRow>> {
    let input_image = load_image(path).map_err(|e| e.for_image(path.display().to_string()))?;
    process_image(&input_image, analyzer, output_dir)
}

/// Main function
fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Override config with command-line arguments
    apply_overrides(&mut config, &args)?;

    if config.input_path.is_empty() {
        return Err(RootTraitError::Config(
            "no input given; use --input or set input_path".to_string(),
        ));
    }

    // Configuration errors stop the run before any image is read
    let analyzer = RootAnalyzer::new(&config)?;

    if let Some(path) = &args.write_config {
        analyzer.config().save_to_file(path)?;
        info!("Wrote effective configuration to {}", path);
    }

    let start_time = Instant::now();

    let input_path = PathBuf::from(&config.input_path);
    let files = collect_image_files(&input_path, config.recursive)?;
    if files.is_empty() {
        warn!("No images found in {}", input_path.display());
    } else {
        info!("Found {} images", files.len());
    }

    let output_dir = output_directory(&config, &input_path);
    std::fs::create_dir_all(&output_dir)?;

    // Results keep input order in both modes
    let results: Vec<Result<Vec<FeatureRow>>> = if analyzer.config().use_parallel {
        files.par_iter()
            .map(|path| run_one(path, &analyzer, &output_dir))
            .collect()
    } else {
        files.iter()
            .map(|path| run_one(path, &analyzer, &output_dir))
            .collect()
    };

    let mut rows = Vec::new();
    let mut failures = 0;
    for result in results {
        match result {
            Ok(image_rows) => rows.extend(image_rows),
            Err(e) => {
                error!("{}", e);
                failures += 1;
            }
        }
    }

    let effective = analyzer.config();
    let csv_path = output_dir.join(&effective.output_file);
    write_feature_csv(
        &csv_path,
        &rows,
        effective.root_type,
        analyzer.bin_count(),
        analyzer.units(),
        effective.no_append,
    )?;

    // Report elapsed time
    let elapsed = start_time.elapsed();
    info!(
        "Processed {} images ({} failed) in {:.2} seconds",
        files.len(),
        failures,
        elapsed.as_secs_f64()
    );

    Ok(())
}
