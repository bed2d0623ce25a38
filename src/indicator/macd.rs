use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{Indicator, align, close_prices};
use crate::model::PriceBar;

pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

/// MACD line, signal line and histogram, each aligned to the input bars.
#[derive(Debug, Clone, Default)]
pub struct MacdLines {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast: Ema::new(fast_period)?,
            slow: Ema::new(slow_period)?,
            signal: Ema::new(signal_period)?,
        })
    }

    pub fn lines(&self, bars: &[PriceBar]) -> MacdLines {
        let total = bars.len();
        let prices = close_prices(bars);

        let fast_ema = self.fast.values(&prices);
        let slow_ema = self.slow.values(&prices);
        if slow_ema.is_empty() {
            return MacdLines {
                macd: vec![None; total],
                signal: vec![None; total],
                histogram: vec![None; total],
            };
        }

        // slow_ema is shorter by (slow - fast) elements; both end at the last bar
        let offset = self.slow.period() - self.fast.period();
        let macd_line: Vec<f64> = fast_ema[offset..]
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();

        let signal_line = self.signal.values(&macd_line);
        let signal_offset = macd_line.len() - signal_line.len();
        let histogram: Vec<f64> = macd_line[signal_offset..]
            .iter()
            .zip(signal_line.iter())
            .map(|(m, s)| m - s)
            .collect();

        MacdLines {
            macd: align(total, &macd_line),
            signal: align(total, &signal_line),
            histogram: align(total, &histogram),
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    /// Bars needed for the first MACD line value; the signal line needs
    /// `signal_period - 1` more.
    fn required_bars(&self) -> usize {
        self.slow.period()
    }

    fn series(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        self.lines(bars).macd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::bars_from_closes;

    #[test]
    fn macd_invalid_fast_ge_slow() {
        assert!(Macd::new(26, 12, 9).is_err());
    }

    #[test]
    fn macd_period_zero_invalid() {
        assert!(Macd::new(0, 26, 9).is_err());
    }

    #[test]
    fn macd_short_series_is_undefined() {
        let macd = Macd::new(12, 26, 9).unwrap();
        let lines = macd.lines(&bars_from_closes(&[1.0; 25]));
        assert!(lines.macd.iter().all(Option::is_none));
        assert!(lines.signal.iter().all(Option::is_none));
        assert!(lines.histogram.iter().all(Option::is_none));
    }

    #[test]
    fn macd_warm_up_offsets() {
        let macd = Macd::new(12, 26, 9).unwrap();
        let closes: Vec<f64> = (1..=40).map(|i| i as f64).collect();
        let lines = macd.lines(&bars_from_closes(&closes));
        assert!(lines.macd[24].is_none());
        assert!(lines.macd[25].is_some());
        assert!(lines.signal[32].is_none());
        assert!(lines.signal[33].is_some());
        assert!(lines.histogram[33].is_some());
    }

    #[test]
    fn macd_flat_prices_returns_zero() {
        let macd = Macd::new(3, 5, 3).unwrap();
        let lines = macd.lines(&bars_from_closes(&[10.0_f64; 10]));
        for v in lines.macd.iter().chain(&lines.histogram).flatten() {
            assert!(v.abs() < 1e-9, "expected 0 for flat prices, got {v}");
        }
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let macd = Macd::new(3, 5, 3).unwrap();
        let closes: Vec<f64> = (1..=20).map(|i| (i as f64).sqrt() * 10.0).collect();
        let lines = macd.lines(&bars_from_closes(&closes));
        for i in 0..closes.len() {
            if let (Some(m), Some(s), Some(h)) = (lines.macd[i], lines.signal[i], lines.histogram[i]) {
                assert!((m - s - h).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let macd = Macd::new(3, 5, 3).unwrap();
        let closes: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        let last = macd.series(&bars_from_closes(&closes)).last().copied().flatten();
        assert!(last.unwrap() > 0.0);
    }
}
