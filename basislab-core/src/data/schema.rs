use super::request::{DataKind, MarketSegment};
use polars::prelude::*;
use std::collections::HashMap;

/// Ordered column layout of a headerless archive CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveSchema {
    columns: Vec<(&'static str, DataType)>,
}

impl ArchiveSchema {
    fn new(columns: Vec<(&'static str, DataType)>) -> Self {
        Self { columns }
    }

    /// Column names in file order.
    pub fn names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Polars schema used to parse the archive.
    pub fn to_polars_schema(&self) -> Schema {
        Schema::from_iter(
            self.columns
                .iter()
                .map(|(name, dtype)| Field::new((*name).into(), dtype.clone())),
        )
    }

    /// Zero-row frame carrying this schema's columns.
    pub fn empty_frame(&self) -> DataFrame {
        DataFrame::empty_with_schema(&self.to_polars_schema())
    }
}

/// Immutable lookup of archive layouts keyed by (segment, kind).
///
/// Build once with [`ColumnCatalog::standard`] and share by reference.
#[derive(Debug, Clone)]
pub struct ColumnCatalog {
    schemas: HashMap<(MarketSegment, DataKind), ArchiveSchema>,
}

impl ColumnCatalog {
    /// Layouts published by the exchange archive.
    pub fn standard() -> Self {
        let spot_klines = klines_schema("Quote_asset_volume");
        let cm_klines = klines_schema("Base_asset_volume");
        let spot_trades = trades_schema("quoteQty");
        let cm_trades = trades_schema("baseQty");

        let mut spot_agg = agg_trades_columns();
        spot_agg.push(("Was_the_trade_the_best_price_match", DataType::Boolean));
        let spot_agg = ArchiveSchema::new(spot_agg);
        let futures_agg = ArchiveSchema::new(agg_trades_columns());

        let schemas = HashMap::from([
            ((MarketSegment::Spot, DataKind::Klines), spot_klines.clone()),
            ((MarketSegment::Spot, DataKind::Trades), spot_trades.clone()),
            ((MarketSegment::Spot, DataKind::AggTrades), spot_agg),
            ((MarketSegment::UsdMargined, DataKind::Klines), spot_klines),
            ((MarketSegment::UsdMargined, DataKind::Trades), spot_trades),
            ((MarketSegment::UsdMargined, DataKind::AggTrades), futures_agg.clone()),
            ((MarketSegment::CoinMargined, DataKind::Klines), cm_klines),
            ((MarketSegment::CoinMargined, DataKind::Trades), cm_trades),
            ((MarketSegment::CoinMargined, DataKind::AggTrades), futures_agg),
        ]);

        Self { schemas }
    }

    pub fn get(&self, segment: MarketSegment, kind: DataKind) -> Option<&ArchiveSchema> {
        self.schemas.get(&(segment, kind))
    }
}

impl Default for ColumnCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn klines_schema(volume_column: &'static str) -> ArchiveSchema {
    ArchiveSchema::new(vec![
        ("Open_time", DataType::Int64),
        ("Open", DataType::Float64),
        ("High", DataType::Float64),
        ("Low", DataType::Float64),
        ("Close", DataType::Float64),
        ("Volume", DataType::Float64),
        ("Close_time", DataType::Int64),
        (volume_column, DataType::Float64),
        ("Number_of_trades", DataType::Int64),
        ("Taker_buy_base_asset_volume", DataType::Float64),
        ("Taker_buy_quote_asset_volume", DataType::Float64),
        ("Ignore", DataType::Float64),
    ])
}

fn trades_schema(quantity_column: &'static str) -> ArchiveSchema {
    ArchiveSchema::new(vec![
        ("trade_Id", DataType::Int64),
        ("price", DataType::Float64),
        ("qty", DataType::Float64),
        (quantity_column, DataType::Float64),
        ("time", DataType::Int64),
        ("isBuyerMaker", DataType::Boolean),
        ("isBestMatch", DataType::Boolean),
    ])
}

fn agg_trades_columns() -> Vec<(&'static str, DataType)> {
    vec![
        ("Aggregate_tradeId", DataType::Int64),
        ("Price", DataType::Float64),
        ("Quantity", DataType::Float64),
        ("First_tradeId", DataType::Int64),
        ("Last_tradeId", DataType::Int64),
        ("Timestamp", DataType::Int64),
        ("Was_the_buyer_the_maker", DataType::Boolean),
    ]
}
