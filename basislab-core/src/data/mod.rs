//! Archive location, download and loading

pub mod binance;
pub mod download;
pub mod loader;
pub mod provider;
pub mod request;
pub mod schema;

pub use binance::{fetch_trading_pairs, HttpTransport, EXCHANGE_INFO_URL};
pub use download::{download_all, download_requests, DownloadSummary};
pub use loader::{buffer_size, read_archive, ArchiveLoader, MIN_BUFFER_SIZE};
pub use provider::{
    ArchiveError, ArchiveTransport, DownloadProgress, FetchError, FetchOutcome, RemoteBody,
    SilentProgress, StderrProgress,
};
pub use request::{
    ArchiveRequest, DailyFile, DataKind, Interval, MarketSegment, RequestError, RequestParams,
    DEFAULT_BASE_URL,
};
pub use schema::{ArchiveSchema, ColumnCatalog};
