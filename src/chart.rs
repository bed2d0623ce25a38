pub mod zones;

use serde::Serialize;

use crate::frame::FrameRow;
use crate::model::{Interval, MarketStructure, PriceBar};
use crate::strategy::structure::market_structure;
use zones::Zone;

/// Largest Unix timestamp the charting boundary accepts for intraday bars.
const MAX_CHART_SECONDS: i64 = i32::MAX as i64;

/// Indicator overlay selectable for a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Overlay {
    Ema,
    Rsi,
    Macd,
    Bollinger,
    Volume,
}

/// What a chart carries. Built once and never mutated by preparation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub ema: bool,
    pub rsi: bool,
    pub macd: bool,
    pub bollinger: bool,
    pub volume: bool,
    pub zones: bool,
    /// Keep only the most recent bars; 0 keeps everything.
    pub max_bars: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            ema: true,
            rsi: true,
            macd: true,
            bollinger: true,
            volume: true,
            zones: true,
            max_bars: 2000,
        }
    }
}

impl ChartOptions {
    /// Enable exactly the listed overlays.
    pub fn with_overlays(self, overlays: &[Overlay]) -> Self {
        Self {
            ema: overlays.contains(&Overlay::Ema),
            rsi: overlays.contains(&Overlay::Rsi),
            macd: overlays.contains(&Overlay::Macd),
            bollinger: overlays.contains(&Overlay::Bollinger),
            volume: overlays.contains(&Overlay::Volume),
            ..self
        }
    }
}

/// Unix seconds for intraday intervals, `YYYY-MM-DD` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChartTime {
    Unix(i64),
    Date(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub time: ChartTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_fast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_slow: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_signal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_hist: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_upper: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_middle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_lower: Option<f64>,
}

/// Everything the charting boundary needs to render one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub symbol: String,
    pub interval: String,
    pub structure: MarketStructure,
    pub zones: Vec<Zone>,
    pub points: Vec<ChartPoint>,
}

/// Clean indicator rows into a strictly ordered, duplicate-free chart series.
///
/// Malformed bars and intraday bars outside the accepted Unix range are
/// dropped; the first bar per normalised time is kept. Indicator values that
/// are missing or non-finite are left out of the point.
pub fn prepare(
    symbol: &str,
    rows: Vec<FrameRow>,
    interval: Interval,
    options: &ChartOptions,
) -> ChartSpec {
    let mut keyed: Vec<(i64, FrameRow)> = rows
        .into_iter()
        .filter(|row| row.bar.is_well_formed())
        .filter_map(|row| time_key(&row.bar, interval).map(|key| (key, row)))
        .collect();

    // stable: equal keys keep arrival order, so dedup keeps the first seen
    keyed.sort_by_key(|(key, _)| *key);
    keyed.dedup_by_key(|(key, _)| *key);

    let bars: Vec<PriceBar> = keyed.iter().map(|(_, row)| row.bar.clone()).collect();
    let structure = market_structure(&bars);
    let zones = if options.zones {
        zones::detect(&bars)
    } else {
        Vec::new()
    };

    let skip = match options.max_bars {
        0 => 0,
        max => keyed.len().saturating_sub(max),
    };

    let points = keyed
        .into_iter()
        .skip(skip)
        .map(|(_, row)| to_point(&row, interval, options))
        .collect();

    ChartSpec {
        symbol: symbol.to_owned(),
        interval: interval.as_str().to_owned(),
        structure,
        zones,
        points,
    }
}

/// Ordering and dedup key: Unix seconds intraday, day number otherwise.
fn time_key(bar: &PriceBar, interval: Interval) -> Option<i64> {
    if interval.is_intraday() {
        let seconds = bar.timestamp.timestamp();
        (seconds > 0 && seconds <= MAX_CHART_SECONDS).then_some(seconds)
    } else {
        Some(bar.timestamp.timestamp().div_euclid(86_400))
    }
}

fn to_point(row: &FrameRow, interval: Interval, options: &ChartOptions) -> ChartPoint {
    let bar = &row.bar;
    let time = if interval.is_intraday() {
        ChartTime::Unix(bar.timestamp.timestamp())
    } else {
        ChartTime::Date(bar.timestamp.format("%Y-%m-%d").to_string())
    };
    let pick = |enabled: bool, value: Option<f64>| value.filter(|v| enabled && v.is_finite());

    ChartPoint {
        time,
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        volume: pick(options.volume, Some(bar.volume)),
        ema_fast: pick(options.ema, row.ema_fast),
        ema_slow: pick(options.ema, row.ema_slow),
        rsi: pick(options.rsi, row.rsi),
        macd: pick(options.macd, row.macd),
        macd_signal: pick(options.macd, row.macd_signal),
        macd_hist: pick(options.macd, row.macd_hist),
        bb_upper: pick(options.bollinger, row.bb_upper),
        bb_middle: pick(options.bollinger, row.bb_middle),
        bb_lower: pick(options.bollinger, row.bb_lower),
    }
}
