//! Descriptive statistics and CSV export for computed series.

use polars::prelude::*;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV output is not valid UTF-8")]
    Utf8,
}

/// count / mean / std / min / quartiles / max of one numeric column.
///
/// Non-finite values are excluded from every statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    #[serde(rename = "25%")]
    pub p25: f64,
    #[serde(rename = "50%")]
    pub p50: f64,
    #[serde(rename = "75%")]
    pub p75: f64,
    pub max: f64,
}

impl ColumnSummary {
    pub fn from_values(column: &str, values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = if n == 0 {
            f64::NAN
        } else {
            sorted.iter().sum::<f64>() / n as f64
        };
        let std = if n < 2 {
            f64::NAN
        } else {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        };

        Self {
            column: column.to_string(),
            count: n,
            mean,
            std,
            min: sorted.first().copied().unwrap_or(f64::NAN),
            p25: quantile(&sorted, 0.25),
            p50: quantile(&sorted, 0.50),
            p75: quantile(&sorted, 0.75),
            max: sorted.last().copied().unwrap_or(f64::NAN),
        }
    }
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

/// Summaries for every numeric column of `df`, in column order.
pub fn describe(df: &DataFrame) -> Result<Vec<ColumnSummary>, SummaryError> {
    let mut out = Vec::new();
    for column in df.get_columns() {
        if !is_numeric(column.dtype()) {
            continue;
        }
        let values: Vec<f64> = column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .flatten()
            .collect();
        out.push(ColumnSummary::from_values(column.name().as_str(), &values));
    }
    Ok(out)
}

/// Fixed-width table, one line per column.
pub fn render_table(summaries: &[ColumnSummary]) -> String {
    let mut s = String::new();
    let _ = writeln!(
        s,
        "{:<18} {:>8} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14}",
        "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    let _ = writeln!(s, "{}", "-".repeat(18 + 9 + 15 * 7));
    for c in summaries {
        let _ = writeln!(
            s,
            "{:<18} {:>8} {:>14.6} {:>14.6} {:>14.6} {:>14.6} {:>14.6} {:>14.6} {:>14.6}",
            c.column, c.count, c.mean, c.std, c.min, c.p25, c.p50, c.p75, c.max
        );
    }
    s
}

/// Summaries as CSV text with a header row.
pub fn export_summary_csv(summaries: &[ColumnSummary]) -> Result<String, SummaryError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for s in summaries {
        wtr.serialize(s)?;
    }
    let data = wtr
        .into_inner()
        .map_err(|e| SummaryError::Io(e.into_error()))?;
    String::from_utf8(data).map_err(|_| SummaryError::Utf8)
}

/// Write a frame to `path` as CSV with a header, creating parent directories.
pub fn write_frame_csv(df: &mut DataFrame, path: &Path) -> Result<(), SummaryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    CsvWriter::new(file).include_header(true).finish(df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartiles_interpolate_linearly() {
        let s = ColumnSummary::from_values("x", &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, 2.5);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.p25, 1.75);
        assert_eq!(s.p50, 2.5);
        assert_eq!(s.p75, 3.25);
        assert_eq!(s.max, 4.0);
        assert!((s.std - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn non_finite_values_are_excluded() {
        let s = ColumnSummary::from_values("x", &[f64::INFINITY, 1.0, f64::NAN, 3.0]);
        assert_eq!(s.count, 2);
        assert_eq!(s.mean, 2.0);
    }

    #[test]
    fn empty_column_is_nan() {
        let s = ColumnSummary::from_values("x", &[]);
        assert_eq!(s.count, 0);
        assert!(s.mean.is_nan());
        assert!(s.p50.is_nan());
    }

    #[test]
    fn describe_skips_non_numeric_columns() {
        let df = df!(
            "close" => &[1.0, 2.0, 3.0],
            "days" => &[3i64, 2, 1],
            "ok" => &[true, true, false]
        )
        .unwrap();
        let out = describe(&df).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].column, "close");
        assert_eq!(out[1].column, "days");
        assert_eq!(out[1].max, 3.0);
    }

    #[test]
    fn summary_csv_has_pandas_style_headers() {
        let csv = export_summary_csv(&[ColumnSummary::from_values("x", &[1.0, 2.0])]).unwrap();
        let header = csv.lines().next().unwrap();
        assert_eq!(header, "column,count,mean,std,min,25%,50%,75%,max");
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn render_table_lists_every_column() {
        let table = render_table(&[
            ColumnSummary::from_values("spot_close", &[1.0]),
            ColumnSummary::from_values("funding_spread", &[0.1]),
        ]);
        assert!(table.contains("spot_close"));
        assert!(table.contains("funding_spread"));
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn frame_csv_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/joined.csv");
        let mut df = df!("a" => &[1i64, 2]).unwrap();
        write_frame_csv(&mut df, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("a"));
        assert_eq!(text.lines().count(), 3);
    }
}
