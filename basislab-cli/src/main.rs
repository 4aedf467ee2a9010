//! BasisLab CLI — archive download, spread computation and symbol discovery.
//!
//! Commands:
//! - `download` — fetch daily archives into a local cache mirroring the remote layout
//! - `spread` — load spot and dated-futures klines and report the annualized basis
//! - `symbols` — list tradable symbols from the exchange info endpoint

use anyhow::{anyhow, bail, Context, Result};
use basislab_core::data::{
    download_requests, fetch_trading_pairs, ArchiveLoader, ArchiveRequest, ColumnCatalog,
    DataKind, HttpTransport, Interval, MarketSegment, RequestParams, StderrProgress,
    EXCHANGE_INFO_URL,
};
use basislab_core::spread::{valid_spreads, FUNDING_SPREAD};
use basislab_core::summary::{describe, export_summary_csv, render_table, write_frame_csv};
use basislab_core::{Compounding, SpreadConfig};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "basislab",
    about = "BasisLab CLI — historical archive downloader and basis spread calculator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily archives for one or more symbols.
    Download {
        /// Single symbol or multiple symbols separated by space.
        #[arg(short = 's', long = "symbols", required = true, num_args = 1..)]
        symbols: Vec<String>,

        /// Trading type: spot, um (USD-margined futures) or cm (coin-margined futures).
        #[arg(short = 't', long = "trading-type", default_value = "spot")]
        trading_type: MarketSegment,

        /// Market data type: klines, trades or aggTrades.
        #[arg(long = "mkt-data-type", default_value = "klines")]
        mkt_data_type: DataKind,

        /// Kline interval (1m … 1d). Required for klines.
        #[arg(short = 'i', long)]
        interval: Option<Interval>,

        /// First day to download (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long = "start-date")]
        start_date: Option<NaiveDate>,

        /// Last day to download (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long = "end-date")]
        end_date: Option<NaiveDate>,

        /// Directory to store the downloaded data. Defaults to the current directory.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Compute the annualized spot/futures funding spread.
    Spread {
        /// Path to a TOML run config. Mutually exclusive with the leg flags.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Spot symbol (e.g. BTCUSDT).
        #[arg(long)]
        spot: Option<String>,

        /// Dated futures symbol (e.g. BTCUSDT_210924).
        #[arg(long)]
        futures: Option<String>,

        /// Futures market: um or cm.
        #[arg(long = "futures-type", default_value = "um")]
        futures_type: MarketSegment,

        /// Contract expiry, UTC (YYYY-MM-DDTHH:MM:SS).
        #[arg(long)]
        maturity: Option<NaiveDateTime>,

        /// Kline interval shared by both legs.
        #[arg(short = 'i', long, default_value = "1h")]
        interval: Interval,

        /// First day (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long = "start-date")]
        start_date: Option<NaiveDate>,

        /// Last day (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long = "end-date")]
        end_date: Option<NaiveDate>,

        /// Archive cache directory. Defaults to the current directory.
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Use simple instead of continuous compounding.
        #[arg(long, default_value_t = false)]
        simple: bool,

        /// Write the joined series to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the summary statistics to this CSV file.
        #[arg(long = "summary-csv")]
        summary_csv: Option<PathBuf>,

        /// Rows of the joined series to print.
        #[arg(long, default_value_t = 5)]
        head: usize,
    },
    /// List tradable symbols.
    Symbols {
        /// Only print symbols containing this text (case-insensitive).
        #[arg(long)]
        contains: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            symbols,
            trading_type,
            mkt_data_type,
            interval,
            start_date,
            end_date,
            folder,
        } => run_download(
            symbols,
            trading_type,
            mkt_data_type,
            interval,
            start_date,
            end_date,
            folder,
        ),
        Commands::Spread {
            config,
            spot,
            futures,
            futures_type,
            maturity,
            interval,
            start_date,
            end_date,
            folder,
            simple,
            output,
            summary_csv,
            head,
        } => {
            let config = match config {
                Some(path) => {
                    if spot.is_some() || futures.is_some() || maturity.is_some() {
                        bail!("--config and the leg flags are mutually exclusive");
                    }
                    SpreadConfig::from_file(&path)?
                }
                None => {
                    let leg = |symbol: Option<String>, segment: MarketSegment, flag: &str| {
                        let symbol = symbol.ok_or_else(|| anyhow!("{flag} is required without --config"))?;
                        Ok::<_, anyhow::Error>(RequestParams {
                            start_date,
                            end_date,
                            ..RequestParams::klines(&symbol, segment, interval)
                        })
                    };
                    let config = SpreadConfig {
                        maturity: maturity
                            .ok_or_else(|| anyhow!("--maturity is required without --config"))?,
                        compounding: if simple {
                            Compounding::Simple
                        } else {
                            Compounding::Continuous
                        },
                        folder,
                        output: None,
                        spot: leg(spot, MarketSegment::Spot, "--spot")?,
                        derivative: leg(futures, futures_type, "--futures")?,
                    };
                    config.validate()?;
                    config
                }
            };
            run_spread(config, output, summary_csv, head)
        }
        Commands::Symbols { contains } => run_symbols(contains),
    }
}

fn run_download(
    symbols: Vec<String>,
    trading_type: MarketSegment,
    mkt_data_type: DataKind,
    interval: Option<Interval>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    folder: Option<PathBuf>,
) -> Result<()> {
    let requests = symbols
        .iter()
        .map(|symbol| {
            ArchiveRequest::from_params(RequestParams {
                symbol: symbol.clone(),
                trading_type,
                mkt_data_type,
                interval,
                start_date,
                end_date,
                dir: folder.clone(),
                base_url: None,
            })
            .with_context(|| format!("invalid request for {symbol}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let catalog = ColumnCatalog::standard();
    let transport = HttpTransport::new()?;
    let progress = StderrProgress;
    let loader = ArchiveLoader::new(&catalog, transport, &progress);

    let summary = download_requests(&loader, &requests);

    println!();
    println!(
        "Download complete: {}/{} days available ({} cached, {} downloaded, {} not published)",
        summary.available(),
        summary.total,
        summary.cache_hits,
        summary.downloaded,
        summary.not_found.len()
    );
    for request in &requests {
        println!("  {} -> {}", request.symbol(), request.cache_dir().display());
    }

    if !summary.all_succeeded() {
        for (date, err) in &summary.failures {
            eprintln!("Error for {date}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run_spread(
    config: SpreadConfig,
    output: Option<PathBuf>,
    summary_csv: Option<PathBuf>,
    head: usize,
) -> Result<()> {
    let (spot_req, derivative_req) = config.requests()?;

    let catalog = ColumnCatalog::standard();
    let transport = HttpTransport::new()?;
    let progress = StderrProgress;
    let loader = ArchiveLoader::new(&catalog, transport, &progress);

    let spot = loader
        .load_all(&spot_req)
        .with_context(|| format!("failed to load {}", spot_req.symbol()))?;
    let derivative = loader
        .load_all(&derivative_req)
        .with_context(|| format!("failed to load {}", derivative_req.symbol()))?;

    let calculator = config.calculator();
    let mut joined = calculator.run(&spot, &derivative)?;
    info!(
        spot_rows = spot.height(),
        derivative_rows = derivative.height(),
        joined_rows = joined.height(),
        "computed funding spread"
    );

    let invalid = joined.height() - valid_spreads(&joined)?.len();

    println!();
    println!("=== Funding Spread ===");
    println!("Spot:       {} ({})", spot_req.symbol(), spot_req.segment());
    println!(
        "Derivative: {} ({})",
        derivative_req.symbol(),
        derivative_req.segment()
    );
    println!("Maturity:   {}", calculator.maturity());
    println!("Compounding: {:?}", calculator.compounding());
    if let Some(interval) = spot_req.interval() {
        println!("Interval:   {interval}");
    }
    println!("Period:     {} to {}", spot_req.start_date(), spot_req.end_date());
    println!("Rows:       {}", joined.height());
    if invalid > 0 {
        println!("WARNING: {invalid} row(s) have a non-finite {FUNDING_SPREAD}");
    }
    println!();
    println!("{}", joined.head(Some(head)));

    let summaries = describe(&joined)?;
    println!();
    print!("{}", render_table(&summaries));

    if let Some(path) = output.or(config.output) {
        write_frame_csv(&mut joined, &path)?;
        println!("Joined series saved to: {}", path.display());
    }
    if let Some(path) = summary_csv {
        std::fs::write(&path, export_summary_csv(&summaries)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Summary saved to: {}", path.display());
    }

    Ok(())
}

fn run_symbols(contains: Option<String>) -> Result<()> {
    let transport = HttpTransport::new()?;
    let symbols = fetch_trading_pairs(transport.client(), EXCHANGE_INFO_URL)?;

    let needle = contains.map(|s| s.to_uppercase());
    let mut shown = 0;
    for symbol in &symbols {
        if needle.as_deref().map_or(true, |n| symbol.contains(n)) {
            println!("{symbol}");
            shown += 1;
        }
    }
    eprintln!("{shown} of {} symbols", symbols.len());
    Ok(())
}
