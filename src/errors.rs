use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for root trait extraction
#[derive(Error, Debug)]
pub enum RootTraitError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid diameter ranges: {0}")]
    InvalidRange(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Error processing {image}: {source}")]
    ImageProcessing {
        image: String,
        #[source]
        source: Box<RootTraitError>,
    },

    #[error("Unexpected error: {0}")]
    Other(String),
}

impl RootTraitError {
    /// Attach the identifier of the image being processed
    pub fn for_image(self, image: impl Into<String>) -> Self {
        match self {
            already @ RootTraitError::ImageProcessing { .. } => already,
            other => RootTraitError::ImageProcessing {
                image: image.into(),
                source: Box::new(other),
            },
        }
    }

    /// True for invalid or contradictory parameters, which are fatal for a run
    pub fn is_configuration(&self) -> bool {
        match self {
            RootTraitError::Config(_)
            | RootTraitError::ConfigLoad { .. }
            | RootTraitError::InvalidRange(_) => true,
            RootTraitError::ImageProcessing { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, RootTraitError>;
