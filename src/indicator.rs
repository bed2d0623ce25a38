pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod volume;

use crate::model::PriceBar;

/// A technical analysis indicator that operates on a slice of bars.
///
/// Bars must be in ascending chronological order (oldest first).
pub trait Indicator: Send + Sync {
    /// Unique name of this indicator (e.g., "rsi", "ema").
    fn name(&self) -> &str;

    /// Minimum number of bars required to produce at least one defined value.
    fn required_bars(&self) -> usize;

    /// Indicator values aligned one-to-one with `bars`.
    ///
    /// Bars without enough preceding history map to `None`; a series shorter
    /// than the lookback yields all `None` rather than an error.
    fn series(&self, bars: &[PriceBar]) -> Vec<Option<f64>>;
}

/// Extract close prices from a slice of bars.
pub fn close_prices(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Extract volumes from a slice of bars.
pub fn volumes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

/// Right-align `values` (the defined tail of an indicator) to `total_len` slots.
pub fn align<T: Copy>(total_len: usize, values: &[T]) -> Vec<Option<T>> {
    let offset = total_len.saturating_sub(values.len());
    let mut output = vec![None; total_len];
    for (index, value) in values.iter().take(total_len).enumerate() {
        output[offset + index] = Some(*value);
    }
    output
}
