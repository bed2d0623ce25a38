use crate::model::{MarketStructure, PriceBar};

const WINDOW: usize = 20;

/// Compare the last `WINDOW` bars' extremes with the `WINDOW` before them.
///
/// Higher high and higher low is bullish, lower high and lower low is
/// bearish, anything else (including short history) is sideways.
pub fn market_structure(bars: &[PriceBar]) -> MarketStructure {
    if bars.len() < 2 * WINDOW {
        return MarketStructure::Sideways;
    }

    let recent = &bars[bars.len() - WINDOW..];
    let previous = &bars[bars.len() - 2 * WINDOW..bars.len() - WINDOW];

    let (recent_high, recent_low) = extremes(recent);
    let (previous_high, previous_low) = extremes(previous);

    if recent_high > previous_high && recent_low > previous_low {
        MarketStructure::Bullish
    } else if recent_high < previous_high && recent_low < previous_low {
        MarketStructure::Bearish
    } else {
        MarketStructure::Sideways
    }
}

fn extremes(bars: &[PriceBar]) -> (f64, f64) {
    bars.iter().fold((f64::MIN, f64::MAX), |(high, low), b| {
        (high.max(b.high), low.min(b.low))
    })
}
