use crate::config::ConversionMode;
use crate::features::{Dimension, FeatureVector};

pub const MM_PER_INCH: f64 = 25.4;

/// Millimetres covered by one pixel
pub fn mm_per_pixel(mode: ConversionMode, factor: f64) -> f64 {
    match mode {
        ConversionMode::Dpi => MM_PER_INCH / factor,
        ConversionMode::PixelsPerMm => 1.0 / factor,
    }
}

/// Unit system of reported values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitSystem {
    Pixels,
    Millimetres { mm_per_pixel: f64 },
}

impl UnitSystem {
    pub fn from_scale(mm_per_pixel: Option<f64>) -> Self {
        match mm_per_pixel {
            Some(mm_per_pixel) => UnitSystem::Millimetres { mm_per_pixel },
            None => UnitSystem::Pixels,
        }
    }

    /// Scale applied to diameters before looking up their bin
    pub fn bin_scale(&self) -> f64 {
        match *self {
            UnitSystem::Pixels => 1.0,
            UnitSystem::Millimetres { mm_per_pixel } => mm_per_pixel,
        }
    }

    /// Column name suffix for a dimension
    pub fn suffix(&self, dimension: Dimension) -> &'static str {
        let mm = matches!(self, UnitSystem::Millimetres { .. });
        match (dimension, mm) {
            (Dimension::Length, false) => ".px",
            (Dimension::Length, true) => ".mm",
            (Dimension::Area, false) => ".px2",
            (Dimension::Area, true) => ".mm2",
            (Dimension::Volume, false) => ".px3",
            (Dimension::Volume, true) => ".mm3",
            (Dimension::InverseLength, false) => ".per.px",
            (Dimension::InverseLength, true) => ".per.mm",
            (Dimension::Count | Dimension::Unitless, _) => "",
        }
    }
}

/// Convert one value of the given dimension by scale `s` (mm per pixel)
pub fn scale_value(dimension: Dimension, value: f64, s: f64) -> f64 {
    match dimension {
        Dimension::Length => value * s,
        Dimension::Area => value * s * s,
        Dimension::Volume => value * s * s * s,
        Dimension::InverseLength => value / s,
        Dimension::Count | Dimension::Unitless => value,
    }
}

/// Rescale pixel-unit features into the unit system
pub fn convert_features(features: &FeatureVector, units: UnitSystem) -> FeatureVector {
    let mut converted = features.clone();
    if let UnitSystem::Millimetres { mm_per_pixel } = units {
        converted.map_values(|dimension, value| scale_value(dimension, value, mm_per_pixel));
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn dpi_and_pixels_per_mm() {
        assert_approx_eq!(mm_per_pixel(ConversionMode::Dpi, 254.0), 0.1);
        assert_approx_eq!(mm_per_pixel(ConversionMode::PixelsPerMm, 4.0), 0.25);
    }

    #[test]
    fn dimensions_scale_by_their_power() {
        assert_approx_eq!(scale_value(Dimension::Length, 10.0, 0.5), 5.0);
        assert_approx_eq!(scale_value(Dimension::Area, 10.0, 0.5), 2.5);
        assert_approx_eq!(scale_value(Dimension::Volume, 10.0, 0.5), 1.25);
        assert_approx_eq!(scale_value(Dimension::InverseLength, 10.0, 0.5), 20.0);
        assert_eq!(scale_value(Dimension::Count, 7.0, 0.5), 7.0);
    }

    #[test]
    fn suffixes_follow_unit_system() {
        let mm = UnitSystem::Millimetres { mm_per_pixel: 0.1 };
        assert_eq!(UnitSystem::Pixels.suffix(Dimension::Area), ".px2");
        assert_eq!(mm.suffix(Dimension::InverseLength), ".per.mm");
        assert_eq!(mm.suffix(Dimension::Count), "");
        assert_eq!(UnitSystem::from_scale(None), UnitSystem::Pixels);
    }
}
