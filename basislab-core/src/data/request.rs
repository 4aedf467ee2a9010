//! Archive request and path locator.
//!
//! Layout of the public archive:
//! `data/{spot|futures/um|futures/cm}/daily/klines/{SYMBOL}/{interval}/{SYMBOL}-{interval}-{date}.zip`
//!
//! Everything here is pure: no filesystem or network access. The local cache
//! mirrors the remote layout under the destination directory.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Public origin of the daily archives.
pub const DEFAULT_BASE_URL: &str = "https://data.binance.vision/";

/// Trading venue an archive belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketSegment {
    #[serde(rename = "spot")]
    Spot,
    #[serde(rename = "um")]
    UsdMargined,
    #[serde(rename = "cm")]
    CoinMargined,
}

impl MarketSegment {
    pub const ALL: [MarketSegment; 3] = [Self::Spot, Self::UsdMargined, Self::CoinMargined];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::UsdMargined => "um",
            Self::CoinMargined => "cm",
        }
    }

    /// Leading path segment: `data/spot/` or `data/futures/{um|cm}/`.
    fn path_prefix(self) -> String {
        match self {
            Self::Spot => "data/spot/".to_string(),
            other => format!("data/futures/{}/", other.as_str()),
        }
    }
}

impl fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketSegment {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spot" => Ok(Self::Spot),
            "um" | "usd-margined" => Ok(Self::UsdMargined),
            "cm" | "coin-margined" => Ok(Self::CoinMargined),
            _ => Err(RequestError::UnknownSegment(s.to_string())),
        }
    }
}

/// Kind of market data stored in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    #[serde(rename = "klines")]
    Klines,
    #[serde(rename = "trades")]
    Trades,
    #[serde(rename = "aggTrades")]
    AggTrades,
}

impl DataKind {
    pub const ALL: [DataKind; 3] = [Self::Klines, Self::Trades, Self::AggTrades];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Klines => "klines",
            Self::Trades => "trades",
            Self::AggTrades => "aggTrades",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "klines" => Ok(Self::Klines),
            "trades" => Ok(Self::Trades),
            "aggTrades" => Ok(Self::AggTrades),
            _ => Err(RequestError::UnknownDataKind(s.to_string())),
        }
    }
}

/// Candlestick interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1mo")]
    Mo1,
}

impl Interval {
    pub const ALL: [Interval; 14] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::H6,
        Self::H8,
        Self::H12,
        Self::D1,
        Self::D3,
        Self::W1,
        Self::Mo1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::Mo1 => "1mo",
        }
    }

    /// Whether the archive publishes daily files for this interval.
    /// Intervals longer than a day only exist as monthly archives.
    pub fn is_daily(self) -> bool {
        !matches!(self, Self::D3 | Self::W1 | Self::Mo1)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| RequestError::UnknownInterval(s.to_string()))
    }
}

/// Errors raised while building a request.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("unknown trading type '{0}' (expected spot, um or cm)")]
    UnknownSegment(String),

    #[error("unknown market data type '{0}' (expected klines, trades or aggTrades)")]
    UnknownDataKind(String),

    #[error("unknown interval '{0}'")]
    UnknownInterval(String),

    #[error("klines require an interval")]
    MissingInterval,

    #[error("interval {0} has no daily archive")]
    UnsupportedInterval(Interval),

    #[error("symbol must not be empty")]
    InvalidSymbol,
}

/// Caller-supplied request parameters.
///
/// Optional fields fall back to: yesterday for both dates, the current working
/// directory for the destination, and [`DEFAULT_BASE_URL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub symbol: String,
    pub trading_type: MarketSegment,
    #[serde(default = "default_kind")]
    pub mkt_data_type: DataKind,
    #[serde(default)]
    pub interval: Option<Interval>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_kind() -> DataKind {
    DataKind::Klines
}

impl RequestParams {
    pub fn klines(symbol: &str, segment: MarketSegment, interval: Interval) -> Self {
        Self {
            symbol: symbol.to_string(),
            trading_type: segment,
            mkt_data_type: DataKind::Klines,
            interval: Some(interval),
            start_date: None,
            end_date: None,
            dir: None,
            base_url: None,
        }
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// One daily archive: where it lives remotely and where it is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyFile {
    pub date: NaiveDate,
    pub file_name: String,
    pub remote_url: String,
    pub local_path: PathBuf,
}

/// A resolved, immutable archive request.
///
/// The daily file list is derived once at construction.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    segment: MarketSegment,
    kind: DataKind,
    symbol: String,
    interval: Option<Interval>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    destination_dir: PathBuf,
    base_url: String,
    base_path: String,
    files: Vec<DailyFile>,
}

impl ArchiveRequest {
    /// Resolve parameters, defaulting both dates to yesterday.
    pub fn from_params(params: RequestParams) -> Result<Self, RequestError> {
        let yesterday = chrono::Local::now().date_naive() - Duration::days(1);
        Self::from_params_at(params, yesterday)
    }

    /// Resolve parameters with an explicit fallback date.
    pub fn from_params_at(params: RequestParams, fallback: NaiveDate) -> Result<Self, RequestError> {
        let symbol = params.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(RequestError::InvalidSymbol);
        }

        let interval = match (params.mkt_data_type, params.interval) {
            (DataKind::Klines, None) => return Err(RequestError::MissingInterval),
            (DataKind::Klines, Some(i)) if !i.is_daily() => {
                return Err(RequestError::UnsupportedInterval(i))
            }
            (_, interval) => interval,
        };

        let destination_dir = match params.dir {
            Some(dir) => dir,
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        let base_url = params
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let start_date = params.start_date.unwrap_or(fallback);
        let end_date = params.end_date.unwrap_or(fallback);

        let base_path = base_path(params.trading_type, params.mkt_data_type, &symbol, interval);
        let files = daily_files(
            &base_url,
            &destination_dir,
            &base_path,
            params.mkt_data_type,
            &symbol,
            interval,
            start_date,
            end_date,
        );

        Ok(Self {
            segment: params.trading_type,
            kind: params.mkt_data_type,
            symbol,
            interval,
            start_date,
            end_date,
            destination_dir,
            base_url,
            base_path,
            files,
        })
    }

    pub fn segment(&self) -> MarketSegment {
        self.segment
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Option<Interval> {
        self.interval
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Relative archive directory, shared by the remote URL and the cache.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Local directory holding this request's cached archives.
    pub fn cache_dir(&self) -> PathBuf {
        self.destination_dir.join(&self.base_path)
    }

    /// Daily files in chronological order.
    pub fn files(&self) -> &[DailyFile] {
        &self.files
    }
}

/// Relative directory of an archive series.
///
/// Non-kline kinds also route through `daily/klines/`; this matches the layout
/// the loader has always used and is kept so existing caches stay valid.
pub fn base_path(
    segment: MarketSegment,
    kind: DataKind,
    symbol: &str,
    interval: Option<Interval>,
) -> String {
    let kind_path = match (kind, interval) {
        (DataKind::Klines, Some(interval)) => format!("daily/klines/{symbol}/{interval}/"),
        _ => format!("daily/klines/{symbol}/"),
    };
    format!("{}{kind_path}", segment.path_prefix())
}

/// Archive file name for one day.
pub fn file_name(kind: DataKind, symbol: &str, interval: Option<Interval>, date: NaiveDate) -> String {
    let date = date.format("%Y-%m-%d");
    match (kind, interval) {
        (DataKind::Klines, Some(interval)) => format!("{symbol}-{interval}-{date}.zip"),
        _ => format!("{symbol}-{kind}-{date}.zip"),
    }
}

/// Inclusive list of days from `start` to `end`; empty when `start > end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn daily_files(
    base_url: &str,
    destination_dir: &Path,
    base_path: &str,
    kind: DataKind,
    symbol: &str,
    interval: Option<Interval>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyFile> {
    let cache_dir = destination_dir.join(base_path);
    date_range(start, end)
        .into_iter()
        .map(|date| {
            let file_name = file_name(kind, symbol, interval, date);
            DailyFile {
                date,
                remote_url: format!("{base_url}{base_path}{file_name}"),
                local_path: cache_dir.join(&file_name),
                file_name,
            }
        })
        .collect()
}
