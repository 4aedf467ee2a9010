//! BasisLab Core — archive download, caching, loading and basis spreads.
//!
//! This crate contains the whole pipeline:
//! - Archive locator (per-day remote URLs and cache paths)
//! - Column catalog for the headerless archive CSVs
//! - Cached loader streaming archives to disk and parsing them with polars
//! - Spot/futures join and annualized funding spread
//! - Descriptive statistics and TOML run configuration

pub mod config;
pub mod data;
pub mod spread;
pub mod summary;

pub use config::{ConfigError, SpreadConfig};
pub use spread::{Compounding, SpreadCalculator, SpreadError};
pub use summary::{describe, ColumnSummary, SummaryError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: request and catalog types can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<data::ArchiveRequest>();
        require_sync::<data::ArchiveRequest>();
        require_send::<data::DailyFile>();
        require_sync::<data::DailyFile>();
        require_send::<data::ColumnCatalog>();
        require_sync::<data::ColumnCatalog>();
        require_send::<data::FetchError>();
        require_sync::<data::FetchError>();
        require_send::<SpreadCalculator>();
        require_sync::<SpreadCalculator>();
        require_send::<SpreadConfig>();
        require_sync::<SpreadConfig>();
    }
}
