//! Property tests for locator and spread invariants.
//!
//! Uses proptest to verify:
//! 1. Daily file count — one file per day of an inclusive range, none when inverted
//! 2. Ordering — files are strictly chronological with unique names
//! 3. Path determinism — every URL and cache path ends with the file name
//! 4. Maturity filter — no computed row sits at or past maturity

use basislab_core::data::{ArchiveRequest, DataKind, Interval, MarketSegment, RequestParams};
use basislab_core::spread::{days_to_maturity, DAYS_TO_MATURITY};
use basislab_core::SpreadCalculator;
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..3000).prop_map(|offset| NaiveDate::from_ymd_opt(2017, 1, 1).unwrap() + Duration::days(offset))
}

fn arb_segment() -> impl Strategy<Value = MarketSegment> {
    prop::sample::select(MarketSegment::ALL.to_vec())
}

fn arb_kind() -> impl Strategy<Value = (DataKind, Option<Interval>)> {
    let daily: Vec<Interval> = Interval::ALL.iter().copied().filter(|i| i.is_daily()).collect();
    prop_oneof![
        prop::sample::select(daily).prop_map(|i| (DataKind::Klines, Some(i))),
        Just((DataKind::Trades, None)),
        Just((DataKind::AggTrades, None)),
    ]
}

fn arb_symbol() -> impl Strategy<Value = String> {
    "[a-z]{3,6}(usdt|btc)"
}

fn build(
    symbol: String,
    segment: MarketSegment,
    (kind, interval): (DataKind, Option<Interval>),
    start: NaiveDate,
    end: NaiveDate,
) -> ArchiveRequest {
    ArchiveRequest::from_params(RequestParams {
        symbol,
        trading_type: segment,
        mkt_data_type: kind,
        interval,
        start_date: Some(start),
        end_date: Some(end),
        dir: Some("/cache".into()),
        base_url: None,
    })
    .unwrap()
}

// ── 1–3. Locator ─────────────────────────────────────────────────────

proptest! {
    /// One file per day of an inclusive range; empty when start > end.
    #[test]
    fn file_count_matches_range(
        symbol in arb_symbol(),
        segment in arb_segment(),
        kind in arb_kind(),
        start in arb_date(),
        span in -10i64..60,
    ) {
        let end = start + Duration::days(span);
        let req = build(symbol, segment, kind, start, end);
        let expected = if span < 0 { 0 } else { span as usize + 1 };
        prop_assert_eq!(req.files().len(), expected);
    }

    /// Files are strictly chronological and their names are unique.
    #[test]
    fn files_are_chronological_and_unique(
        symbol in arb_symbol(),
        segment in arb_segment(),
        kind in arb_kind(),
        start in arb_date(),
        span in 0i64..60,
    ) {
        let req = build(symbol, segment, kind, start, start + Duration::days(span));
        let files = req.files();
        prop_assert_eq!(files.first().map(|f| f.date), Some(start));
        for pair in files.windows(2) {
            prop_assert_eq!(pair[1].date, pair[0].date + Duration::days(1));
        }
        let names: HashSet<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        prop_assert_eq!(names.len(), files.len());
    }

    /// URLs and cache paths share the base path and end with the file name.
    #[test]
    fn paths_are_deterministic(
        symbol in arb_symbol(),
        segment in arb_segment(),
        kind in arb_kind(),
        date in arb_date(),
    ) {
        let a = build(symbol.clone(), segment, kind, date, date);
        let b = build(symbol, segment, kind, date, date);
        prop_assert_eq!(a.files(), b.files());

        let f = &a.files()[0];
        let upper = a.symbol().to_string();
        prop_assert!(f.file_name.starts_with(&upper));
        let dated = format!("{}.zip", date.format("%Y-%m-%d"));
        prop_assert!(f.file_name.ends_with(&dated));
        let relative = format!("{}{}", a.base_path(), f.file_name);
        prop_assert!(f.remote_url.ends_with(&relative));
        prop_assert!(f.local_path.ends_with(&f.file_name));
    }
}

// ── 4. Maturity filter ───────────────────────────────────────────────

proptest! {
    /// Every surviving row is at least one whole day before maturity.
    #[test]
    fn no_row_at_or_after_maturity(hours in prop::collection::vec(0i64..24 * 120, 1..50)) {
        let maturity = NaiveDate::from_ymd_opt(2021, 9, 24).unwrap().and_hms_opt(23, 59, 59).unwrap();
        let origin = NaiveDate::from_ymd_opt(2021, 6, 26).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let origin_ms = origin.and_utc().timestamp_millis();
        let maturity_ms = maturity.and_utc().timestamp_millis();

        let mut ts: Vec<i64> = hours.iter().map(|h| origin_ms + h * 3_600_000).collect();
        ts.sort_unstable();
        ts.dedup();
        let closes: Vec<f64> = ts.iter().map(|_| 100.0).collect();

        let spot = DataFrame::new(vec![
            Column::new("timestamp".into(), &ts),
            Column::new("spot_close".into(), &closes),
        ]).unwrap();
        let fut = DataFrame::new(vec![
            Column::new("timestamp".into(), &ts),
            Column::new("futures_close".into(), &closes),
        ]).unwrap();

        let out = SpreadCalculator::new(maturity).compute(&spot, &fut).unwrap();
        let expected = ts.iter().filter(|t| days_to_maturity(maturity_ms, **t) > 0).count();
        prop_assert_eq!(out.height(), expected);

        let days = out.column(DAYS_TO_MATURITY).unwrap().i64().unwrap();
        prop_assert!(days.into_no_null_iter().all(|d| d > 0));
    }
}
