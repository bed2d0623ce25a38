use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Sma;
use crate::indicator::{Indicator, align, volumes};
use crate::model::PriceBar;

/// Volume moving average: simple average of trading volume over a period,
/// including the current bar.
pub struct VolumeMA {
    sma: Sma,
}

impl VolumeMA {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self {
            sma: Sma::new(period)?,
        })
    }
}

impl Indicator for VolumeMA {
    fn name(&self) -> &str {
        "volume_ma"
    }

    fn required_bars(&self) -> usize {
        self.sma.required_bars()
    }

    fn series(&self, bars: &[PriceBar]) -> Vec<Option<f64>> {
        align(bars.len(), &self.sma.values(&volumes(bars)))
    }
}
