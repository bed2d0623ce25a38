use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, align, close_prices};
use crate::model::PriceBar;

/// Simple Moving Average.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// SMA of every full window; empty when `values` is shorter than the period.
    pub fn values(&self, values: &[f64]) -> Vec<f64> {
        if values.len() < self.period {
            return Vec::new();
        }
        values
            .windows(self.period)
            .map(|w| w.iter().sum::<f64>() / self.period as f64)
            .collect()
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn series(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        align(bars.len(), &self.values(&close_prices(bars)))
    }
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// EMA from the seed onward; empty when `values` is shorter than the period.
    pub fn values(&self, values: &[f64]) -> Vec<f64> {
        if values.len() < self.period {
            return Vec::new();
        }

        let k = 2.0 / (self.period as f64 + 1.0);
        let seed: f64 = values[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut ema = seed;
        let mut results = Vec::with_capacity(values.len() - self.period + 1);
        results.push(ema);

        for &value in &values[self.period..] {
            ema = value * k + ema * (1.0 - k);
            results.push(ema);
        }

        results
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn series(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        align(bars.len(), &self.values(&close_prices(bars)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::bars_from_closes;

    #[test]
    fn sma_period_zero_invalid() {
        assert!(Sma::new(0).is_err());
    }

    #[test]
    fn sma_short_series_is_undefined() {
        let sma = Sma::new(5).unwrap();
        let series = sma.series(&bars_from_closes(&[1.0; 4]));
        assert_eq!(series.len(), 4);
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn sma_known_value() {
        let sma = Sma::new(3).unwrap();
        let series = sma.series(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0]));
        // (1+2+3)/3 = 2.0, (2+3+4)/3 = 3.0
        assert_eq!(series, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn ema_period_zero_invalid() {
        assert!(Ema::new(0).is_err());
    }

    #[test]
    fn ema_short_series_is_undefined() {
        let ema = Ema::new(200).unwrap();
        let series = ema.series(&bars_from_closes(&[100.0; 199]));
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn ema_of_constant_series_is_constant() {
        let ema = Ema::new(3).unwrap();
        let series = ema.series(&bars_from_closes(&[10.0; 6]));
        assert!(series[..2].iter().all(Option::is_none));
        for v in series[2..].iter().flatten() {
            assert!((v - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ema_seed_equals_sma() {
        let ema = Ema::new(3).unwrap();
        let series = ema.series(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0]));
        // seed = (1+2+3)/3 = 2.0; next = 4*0.5 + 2*0.5 = 3.0
        assert_eq!(series[2], Some(2.0));
        assert_eq!(series[3], Some(3.0));
    }

    #[test]
    fn ema_first_defined_at_period_minus_one() {
        let ema = Ema::new(50).unwrap();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = ema.series(&bars_from_closes(&closes));
        assert!(series[48].is_none());
        assert!(series[49].is_some());
    }
}
