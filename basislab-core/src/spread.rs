//! Spot/derivative basis.
//!
//! Joins a spot and a dated-futures kline series on open time, keeps the rows
//! strictly before maturity and derives the annualized funding spread:
//!
//! `funding_spread = ln(futures_close / spot_close) / (days_to_maturity / 365)`
//!
//! A zero spot close yields a non-finite spread. Such rows are kept and marked
//! `spread_valid = false`; nothing here panics on bad prices.

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Join key shared by both legs.
pub const TIMESTAMP: &str = "timestamp";
pub const DAYS_TO_MATURITY: &str = "days_to_maturity";
pub const FUNDING_SPREAD: &str = "funding_spread";
pub const SPREAD_VALID: &str = "spread_valid";

pub const SPOT_PREFIX: &str = "spot";
pub const FUTURES_PREFIX: &str = "futures";

const MS_PER_DAY: i64 = 86_400_000;
const DAYS_PER_YEAR: f64 = 365.0;

/// Kline columns carried into a leg, with their suffix after renaming.
const LEG_COLUMNS: [(&str, &str); 5] = [
    ("Open", "open"),
    ("High", "high"),
    ("Low", "low"),
    ("Close", "close"),
    ("Volume", "volume"),
];
const OPEN_TIME: &str = "Open_time";

#[derive(Debug, Error)]
pub enum SpreadError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// How the basis is annualized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compounding {
    /// `ln(F / S) / T`
    #[default]
    Continuous,
    /// `(F / S - 1) / T`
    Simple,
}

impl Compounding {
    /// Annualized spread for `days` until maturity. Zero rates assumed.
    pub fn annualize(self, derivative_close: f64, spot_close: f64, days: i64) -> f64 {
        let years = days as f64 / DAYS_PER_YEAR;
        let ratio = derivative_close / spot_close;
        match self {
            Self::Continuous => ratio.ln() / years,
            Self::Simple => (ratio - 1.0) / years,
        }
    }
}

/// Whole days from `timestamp_ms` until `maturity_ms`, floored.
pub fn days_to_maturity(maturity_ms: i64, timestamp_ms: i64) -> i64 {
    (maturity_ms - timestamp_ms).div_euclid(MS_PER_DAY)
}

/// Project a kline frame to `timestamp` plus prefixed OHLCV columns.
pub fn select_leg(df: &DataFrame, prefix: &str) -> Result<DataFrame, SpreadError> {
    let required = std::iter::once(OPEN_TIME).chain(LEG_COLUMNS.iter().map(|(name, _)| *name));
    for name in required {
        if df.column(name).is_err() {
            return Err(SpreadError::MissingColumn(name.to_string()));
        }
    }

    let mut exprs = vec![col(OPEN_TIME).alias(TIMESTAMP)];
    for (source, suffix) in LEG_COLUMNS {
        let target = format!("{prefix}_{suffix}");
        exprs.push(col(source).alias(target.as_str()));
    }

    Ok(df.clone().lazy().select(exprs).collect()?)
}

/// Joins two legs and derives the funding spread.
#[derive(Debug, Clone)]
pub struct SpreadCalculator {
    maturity: NaiveDateTime,
    compounding: Compounding,
    spot_prefix: String,
    derivative_prefix: String,
}

impl SpreadCalculator {
    /// `maturity` is interpreted as UTC, like the archive's open times.
    pub fn new(maturity: NaiveDateTime) -> Self {
        Self {
            maturity,
            compounding: Compounding::default(),
            spot_prefix: SPOT_PREFIX.to_string(),
            derivative_prefix: FUTURES_PREFIX.to_string(),
        }
    }

    pub fn with_compounding(mut self, compounding: Compounding) -> Self {
        self.compounding = compounding;
        self
    }

    pub fn with_prefixes(mut self, spot: &str, derivative: &str) -> Self {
        self.spot_prefix = spot.to_string();
        self.derivative_prefix = derivative.to_string();
        self
    }

    pub fn maturity(&self) -> NaiveDateTime {
        self.maturity
    }

    pub fn compounding(&self) -> Compounding {
        self.compounding
    }

    fn maturity_ms(&self) -> i64 {
        self.maturity.and_utc().timestamp_millis()
    }

    /// Select, rename and join two raw kline frames, then derive the spread.
    pub fn run(&self, spot_klines: &DataFrame, derivative_klines: &DataFrame) -> Result<DataFrame, SpreadError> {
        let spot = select_leg(spot_klines, &self.spot_prefix)?;
        let derivative = select_leg(derivative_klines, &self.derivative_prefix)?;
        self.compute(&spot, &derivative)
    }

    /// Inner join on `timestamp`, ordered by timestamp. Unmatched rows are dropped.
    pub fn join_legs(&self, spot: &DataFrame, derivative: &DataFrame) -> Result<DataFrame, SpreadError> {
        for df in [spot, derivative] {
            if df.column(TIMESTAMP).is_err() {
                return Err(SpreadError::MissingColumn(TIMESTAMP.to_string()));
            }
        }

        let joined = spot
            .clone()
            .lazy()
            .join(
                derivative.clone().lazy(),
                [col(TIMESTAMP)],
                [col(TIMESTAMP)],
                JoinArgs::new(JoinType::Inner),
            )
            .sort([TIMESTAMP], SortMultipleOptions::default().with_maintain_order(true))
            .collect()?;
        Ok(joined)
    }

    /// Join prefixed legs, drop rows at or past maturity and add
    /// `days_to_maturity`, `funding_spread` and `spread_valid`.
    ///
    /// The returned `timestamp` column is a millisecond `Datetime`.
    pub fn compute(&self, spot: &DataFrame, derivative: &DataFrame) -> Result<DataFrame, SpreadError> {
        let spot_close = format!("{}_close", self.spot_prefix);
        let derivative_close = format!("{}_close", self.derivative_prefix);
        for (df, name) in [(spot, &spot_close), (derivative, &derivative_close)] {
            if df.column(name).is_err() {
                return Err(SpreadError::MissingColumn(name.clone()));
            }
        }

        let mut df = self.join_legs(spot, derivative)?;

        // Filter before any spread is evaluated.
        let maturity_ms = self.maturity_ms();
        let days: Vec<Option<i64>> = df
            .column(TIMESTAMP)?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|ts| ts.map(|ts| days_to_maturity(maturity_ms, ts)))
            .collect();
        let keep: BooleanChunked = days.iter().map(|d| d.is_some_and(|d| d > 0)).collect();
        df.with_column(Column::new(DAYS_TO_MATURITY.into(), days))?;
        let mut df = df.filter(&keep)?;

        let spreads: Vec<f64> = {
            let spot_ca = df.column(&spot_close)?.cast(&DataType::Float64)?;
            let derivative_ca = df.column(&derivative_close)?.cast(&DataType::Float64)?;
            let days_ca = df.column(DAYS_TO_MATURITY)?.i64()?;
            spot_ca
                .f64()?
                .into_iter()
                .zip(derivative_ca.f64()?.into_iter())
                .zip(days_ca.into_iter())
                .map(|((s, f), d)| match (s, f, d) {
                    (Some(s), Some(f), Some(d)) => self.compounding.annualize(f, s, d),
                    _ => f64::NAN,
                })
                .collect()
        };
        let valid: Vec<bool> = spreads.iter().map(|v| v.is_finite()).collect();

        let timestamp = df
            .column(TIMESTAMP)?
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        df.with_column(timestamp)?;
        df.with_column(Column::new(FUNDING_SPREAD.into(), spreads))?;
        df.with_column(Column::new(SPREAD_VALID.into(), valid))?;

        Ok(df)
    }
}

/// Finite spreads of a computed frame, in row order.
pub fn valid_spreads(df: &DataFrame) -> Result<Vec<f64>, SpreadError> {
    Ok(df
        .column(FUNDING_SPREAD)?
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const HOUR_MS: i64 = 3_600_000;

    fn maturity() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 9, 24)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap()
    }

    fn ms(y: i32, m: u32, d: u32, h: u32) -> i64 {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn leg(prefix: &str, ts: &[i64], close: &[f64]) -> DataFrame {
        DataFrame::new(vec![
            Column::new(TIMESTAMP.into(), ts),
            Column::new(format!("{prefix}_close").into(), close),
        ])
        .unwrap()
    }

    #[test]
    fn continuous_spread_matches_log_ratio() {
        let v = Compounding::Continuous.annualize(51_000.0, 50_000.0, 90);
        let expected = (51_000.0f64 / 50_000.0).ln() / (90.0 / 365.0);
        assert!((v - expected).abs() < 1e-12);
        assert!((v - 0.0799).abs() < 1e-3);
    }

    #[test]
    fn simple_spread_is_linear() {
        let v = Compounding::Simple.annualize(51_000.0, 50_000.0, 365);
        assert!((v - 0.02).abs() < 1e-12);
    }

    #[test]
    fn days_to_maturity_floors() {
        let m = ms(2021, 9, 24, 0);
        assert_eq!(days_to_maturity(m, m - HOUR_MS), 0);
        assert_eq!(days_to_maturity(m, m - 25 * HOUR_MS), 1);
        assert_eq!(days_to_maturity(m, m + HOUR_MS), -1);
    }

    #[test]
    fn join_keeps_only_shared_timestamps() {
        let calc = SpreadCalculator::new(maturity());
        let t = |h| ms(2021, 6, 26, h);
        let spot = leg("spot", &[t(0), t(1), t(2), t(3)], &[1.0, 2.0, 3.0, 4.0]);
        let fut = leg("futures", &[t(1), t(3), t(5)], &[2.0, 4.0, 6.0]);

        let joined = calc.join_legs(&spot, &fut).unwrap();
        assert_eq!(joined.height(), 2);
        let ts: Vec<i64> = joined.column(TIMESTAMP).unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(ts, vec![t(1), t(3)]);
    }

    #[test]
    fn rows_at_or_after_maturity_are_dropped() {
        let calc = SpreadCalculator::new(maturity());
        let ts = [ms(2021, 9, 22, 0), ms(2021, 9, 24, 12), ms(2021, 9, 25, 0)];
        let spot = leg("spot", &ts, &[100.0, 100.0, 100.0]);
        let fut = leg("futures", &ts, &[101.0, 101.0, 101.0]);

        let out = calc.compute(&spot, &fut).unwrap();
        assert_eq!(out.height(), 1);
        let days = out.column(DAYS_TO_MATURITY).unwrap().i64().unwrap();
        assert_eq!(days.get(0), Some(2));
    }

    #[test]
    fn zero_spot_close_is_flagged_invalid() {
        let calc = SpreadCalculator::new(maturity());
        let ts = [ms(2021, 7, 1, 0), ms(2021, 7, 1, 1)];
        let spot = leg("spot", &ts, &[0.0, 100.0]);
        let fut = leg("futures", &ts, &[101.0, 101.0]);

        let out = calc.compute(&spot, &fut).unwrap();
        let valid = out.column(SPREAD_VALID).unwrap().bool().unwrap();
        assert_eq!(valid.get(0), Some(false));
        assert_eq!(valid.get(1), Some(true));
        assert_eq!(valid_spreads(&out).unwrap().len(), 1);
    }

    #[test]
    fn custom_prefixes_name_the_close_columns() {
        let calc = SpreadCalculator::new(maturity())
            .with_compounding(Compounding::Simple)
            .with_prefixes("btc", "btc_210924");
        assert_eq!(calc.maturity(), maturity());
        assert_eq!(calc.compounding(), Compounding::Simple);

        let ts = [ms(2021, 6, 25, 0)];
        let out = calc
            .compute(&leg("btc", &ts, &[100.0]), &leg("btc_210924", &ts, &[101.0]))
            .unwrap();
        let spread = out.column(FUNDING_SPREAD).unwrap().f64().unwrap().get(0).unwrap();
        let days = out.column(DAYS_TO_MATURITY).unwrap().i64().unwrap().get(0).unwrap();
        assert_eq!(days, 91);
        assert!((spread - 0.01 / (91.0 / 365.0)).abs() < 1e-12);

        assert!(matches!(
            calc.compute(&leg("spot", &ts, &[100.0]), &leg("btc_210924", &ts, &[101.0])),
            Err(SpreadError::MissingColumn(name)) if name == "btc_close"
        ));
    }

    #[test]
    fn timestamp_becomes_datetime() {
        let calc = SpreadCalculator::new(maturity());
        let ts = [ms(2021, 7, 1, 0)];
        let out = calc
            .compute(&leg("spot", &ts, &[100.0]), &leg("futures", &ts, &[101.0]))
            .unwrap();
        assert_eq!(
            out.column(TIMESTAMP).unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
    }

    #[test]
    fn select_leg_renames_ohlcv() {
        let raw = df!(
            "Open_time" => &[1i64],
            "Open" => &[1.0],
            "High" => &[2.0],
            "Low" => &[0.5],
            "Close" => &[1.5],
            "Volume" => &[10.0],
            "Close_time" => &[2i64]
        )
        .unwrap();
        let out = select_leg(&raw, "spot").unwrap();
        let names: Vec<String> = out.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(
            names,
            vec!["timestamp", "spot_open", "spot_high", "spot_low", "spot_close", "spot_volume"]
        );
    }

    #[test]
    fn select_leg_requires_kline_columns() {
        let raw = df!("Open_time" => &[1i64]).unwrap();
        assert!(matches!(
            select_leg(&raw, "spot"),
            Err(SpreadError::MissingColumn(_))
        ));
    }
}
