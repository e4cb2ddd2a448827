use std::fs::{self, OpenOptions};
use std::path::Path;
use csv::WriterBuilder;
use log::{info, warn};

use crate::config::RootType;
use crate::errors::{RootTraitError, Result};
use crate::features::{schema, FeatureVector};
use crate::units::UnitSystem;

/// Region name used when the whole image is analysed
pub const FULL_IMAGE_ROI: &str = "Full";

/// One output line: an image (or region of an image) and its features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub file_name: String,
    pub region: String,
    pub features: FeatureVector,
}

/// Format a number like C's `%g` with the given significant digits
///
/// A precision of 0 behaves as 1 and a negative one as 6.
pub fn format_significant(value: f64, precision: i32) -> String {
    let precision = match precision {
        0 => 1,
        p if p < 0 => 6,
        p => p as usize,
    };

    if value == 0.0 {
        return "0".to_string();
    }

    // Exponent after rounding to the requested digits
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => return scientific,
    };

    if exponent < -4 || exponent >= precision as i32 {
        let mantissa = strip_trailing_zeros(&mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, value))
    }
}

fn strip_trailing_zeros(number: &str) -> String {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        number.to_string()
    }
}

/// Encode a feature value for the table
///
/// Non-finite values become `NA`; others keep six significant digits
/// after the decimal point of their magnitude.
pub fn format_feature_value(value: f64) -> String {
    if !value.is_finite() {
        return "NA".to_string();
    }
    if value == 0.0 {
        return format_significant(value, 6);
    }
    let precision = value.abs().log10().ceil() as i32 + 6;
    format_significant(value, precision)
}

/// Column names of the feature table
pub fn header_columns(root_type: RootType, bin_count: usize, units: UnitSystem) -> Vec<String> {
    let mut columns = vec!["File.Name".to_string(), "Region.of.Interest".to_string()];
    columns.extend(
        schema(root_type, bin_count)
            .into_iter()
            .map(|(name, dimension)| format!("{}{}", name, units.suffix(dimension))),
    );
    columns
}

/// Write feature rows to a CSV table
///
/// An existing table is appended to unless `no_append` is set, in which
/// case it is replaced. The header is written whenever a new table starts.
pub fn write_feature_csv<P: AsRef<Path>>(
    path: P,
    rows: &[FeatureRow],
    root_type: RootType,
    bin_count: usize,
    units: UnitSystem,
    no_append: bool,
) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let exists = path.exists();
    if exists && !no_append {
        warn!("Output file {} already exists. Appending results.", path.display());
    }

    let file = if no_append {
        OpenOptions::new().write(true).create(true).truncate(true).open(path)?
    } else {
        OpenOptions::new().append(true).create(true).open(path)?
    };

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    let header = header_columns(root_type, bin_count, units);
    if !exists || no_append {
        writer.write_record(&header)?;
    }

    for row in rows {
        if row.features.root_type() != root_type {
            return Err(RootTraitError::Other(format!(
                "row for {} does not match the table's root type",
                row.file_name
            )));
        }

        let mut record = vec![row.file_name.clone(), row.region.clone()];
        record.extend(row.features.values().into_iter().map(format_feature_value));
        if record.len() != header.len() {
            return Err(RootTraitError::Other(format!(
                "row for {} has {} columns, expected {}",
                row.file_name,
                record.len(),
                header.len()
            )));
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_digit_encoding() {
        assert_eq!(format_feature_value(0.0), "0");
        assert_eq!(format_feature_value(f64::NAN), "NA");
        assert_eq!(format_feature_value(f64::INFINITY), "NA");
        assert_eq!(format_feature_value(50.0), "50");
        assert_eq!(format_feature_value(1256.6370614359173), "1256.637061");
        assert_eq!(format_feature_value(0.5), "0.5");
        assert_eq!(format_feature_value(1.0 / 3.0), "0.333333");
        assert_eq!(format_feature_value(-2.25), "-2.25");
    }

    #[test]
    fn small_and_large_values_switch_to_scientific() {
        assert_eq!(format_significant(1.0e-7, -1), "1e-07");
        assert_eq!(format_feature_value(1.0e-7), "1e-07");
        assert_eq!(format_significant(123456789.0, 3), "1.23e+08");
        assert_eq!(format_significant(0.0001, 6), "0.0001");
        assert_eq!(format_significant(0.00001, 6), "1e-05");
    }

    #[test]
    fn header_uses_unit_suffixes() {
        let header = header_columns(RootType::BrokenRoots, 3, UnitSystem::Pixels);
        assert_eq!(header[0], "File.Name");
        assert_eq!(header[1], "Region.of.Interest");
        assert_eq!(header[4], "Total.Root.Length.px");
        assert_eq!(header[5], "Branching.frequency.per.px");
        assert_eq!(header.last().unwrap(), "Volume.Diameter.Range.3.px3");

        let mm = header_columns(
            RootType::WholeRoot,
            1,
            UnitSystem::Millimetres { mm_per_pixel: 0.1 },
        );
        assert!(mm.contains(&"Average.Hole.Size.mm2".to_string()));
        assert!(mm.contains(&"Width-to-Depth.Ratio".to_string()));
    }
}
