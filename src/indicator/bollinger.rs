use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Sma;
use crate::indicator::{Indicator, align, close_prices};
use crate::model::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands over closes, using the population standard deviation.
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        if std_dev_multiplier <= 0.0 {
            bail!(IndicatorError::InvalidParameter {
                name: "std_dev_multiplier must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }

    pub fn bands(&self, bars: &[PriceBar]) -> Vec<Option<Bands>> {
        let prices = close_prices(bars);
        let sma = Sma::new(self.period)
            .map(|sma| sma.values(&prices))
            .unwrap_or_default();

        let bands: Vec<Bands> = prices
            .windows(self.period)
            .zip(sma.iter())
            .map(|(window, &middle)| {
                let variance =
                    window.iter().map(|&p| (p - middle).powi(2)).sum::<f64>() / self.period as f64;
                let width = self.std_dev_multiplier * variance.sqrt();
                Bands {
                    upper: middle + width,
                    middle,
                    lower: middle - width,
                }
            })
            .collect();

        align(bars.len(), &bands)
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    /// Middle band (SMA) values only.
    fn series(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        self.bands(bars)
            .into_iter()
            .map(|b| b.map(|b| b.middle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::bars_from_closes;

    #[test]
    fn bollinger_period_zero_invalid() {
        assert!(BollingerBands::new(0, 2.0).is_err());
    }

    #[test]
    fn bollinger_negative_multiplier_invalid() {
        assert!(BollingerBands::new(20, -1.0).is_err());
    }

    #[test]
    fn bollinger_short_series_is_undefined() {
        let bb = BollingerBands::new(5, 2.0).unwrap();
        let bands = bb.bands(&bars_from_closes(&[1.0; 4]));
        assert_eq!(bands.len(), 4);
        assert!(bands.iter().all(Option::is_none));
    }

    #[test]
    fn bollinger_flat_prices_zero_width() {
        let bb = BollingerBands::new(3, 2.0).unwrap();
        let bands = bb.bands(&bars_from_closes(&[10.0_f64; 5]));
        for b in bands.iter().flatten() {
            assert!((b.upper - 10.0).abs() < 1e-9);
            assert!((b.middle - 10.0).abs() < 1e-9);
            assert!((b.lower - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn bollinger_population_std_dev() {
        // window [1,2,3]: mean 2, population variance 2/3
        let bb = BollingerBands::new(3, 2.0).unwrap();
        let bands = bb.bands(&bars_from_closes(&[1.0, 2.0, 3.0]));
        let b = bands[2].unwrap();
        let expected = 2.0 * (2.0_f64 / 3.0).sqrt();
        assert!((b.upper - 2.0 - expected).abs() < 1e-9);
    }

    #[test]
    fn bollinger_bands_symmetry() {
        let bb = BollingerBands::new(3, 2.0).unwrap();
        let bands = bb.bands(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        for b in bands.iter().flatten() {
            assert!((b.upper - b.middle - (b.middle - b.lower)).abs() < 1e-9);
        }
    }
}
