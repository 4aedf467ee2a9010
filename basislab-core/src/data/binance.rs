//! HTTP transport for the public market-data archive.
//!
//! Streams daily zip archives over blocking HTTP. A 404 means the day was never
//! published (before listing or after delisting) and is reported as
//! `NotFound` straight away; connection errors and other non-success statuses
//! are retried with exponential backoff before surfacing as `Transport`.

use super::provider::{ArchiveTransport, FetchError, RemoteBody};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Exchange metadata endpoint listing every tradable symbol.
pub const EXCHANGE_INFO_URL: &str = "https://api.binance.com/api/v3/exchangeInfo";

/// Exchange info response (only the fields we read).
#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = build_client()?;
        Ok(Self {
            client,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Override the retry policy. `max_retries = 0` disables retries.
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn client(&self) -> &reqwest::blocking::Client {
        &self.client
    }

    fn open_with_retry(&self, url: &str) -> Result<RemoteBody, FetchError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(url, attempt, ?delay, "retrying archive request");
                std::thread::sleep(delay);
            }

            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound {
                            url: url.to_string(),
                        });
                    }

                    if !status.is_success() {
                        warn!(url, %status, attempt, "archive request failed");
                        last_error = Some(FetchError::Transport {
                            url: url.to_string(),
                            reason: format!("HTTP {status}"),
                        });
                        continue;
                    }

                    return Ok(RemoteBody {
                        content_length: resp.content_length(),
                        reader: Box::new(resp),
                    });
                }
                Err(e) => {
                    let error = FetchError::Transport {
                        url: url.to_string(),
                        reason: e.to_string(),
                    };
                    if e.is_connect() || e.is_timeout() {
                        warn!(url, attempt, error = %e, "archive request failed");
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Transport {
            url: url.to_string(),
            reason: "max retries exceeded".into(),
        }))
    }
}

impl ArchiveTransport for HttpTransport {
    fn name(&self) -> &str {
        "binance_vision"
    }

    fn open(&self, url: &str) -> Result<RemoteBody, FetchError> {
        self.open_with_retry(url)
    }
}

fn build_client() -> Result<reqwest::blocking::Client, FetchError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("basislab/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FetchError::Transport {
            url: String::new(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

/// List every tradable symbol from the exchange info endpoint, in response order.
pub fn fetch_trading_pairs(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<Vec<String>, FetchError> {
    let transport = |e: reqwest::Error| FetchError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    };

    let resp = client.get(url).send().map_err(transport)?;
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Transport {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let body = resp.text().map_err(transport)?;
    parse_symbols(&body).map_err(|e| FetchError::Transport {
        url: url.to_string(),
        reason: format!("malformed exchange info: {e}"),
    })
}

fn parse_symbols(body: &str) -> Result<Vec<String>, serde_json::Error> {
    let info: ExchangeInfo = serde_json::from_str(body)?;
    Ok(info.symbols.into_iter().map(|s| s.symbol).collect())
}
