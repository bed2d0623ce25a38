use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, align, close_prices};
use crate::model::PriceBar;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// RSI values from the first full window onward.
    pub fn values(&self, prices: &[f64]) -> Vec<f64> {
        if prices.len() < self.required_bars() {
            return Vec::new();
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        // Seed using simple average of first `period` gains/losses
        let mut avg_gain: f64 = deltas[..self.period]
            .iter()
            .map(|&d| d.max(0.0))
            .sum::<f64>()
            / self.period as f64;
        let mut avg_loss: f64 = deltas[..self.period]
            .iter()
            .map(|&d| (-d).max(0.0))
            .sum::<f64>()
            / self.period as f64;

        let mut results = Vec::with_capacity(deltas.len() - self.period + 1);
        results.push(rsi_value(avg_gain, avg_loss));

        for &delta in &deltas[self.period..] {
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
            results.push(rsi_value(avg_gain, avg_loss));
        }

        results
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_bars(&self) -> usize {
        self.period + 1
    }

    fn series(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        align(bars.len(), &self.values(&close_prices(bars)))
    }
}

/// A zero average loss (including a flat window) reads as 100.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
