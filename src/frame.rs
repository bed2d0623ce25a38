use error_stack::Report;
use tracing::debug;

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::bollinger::BollingerBands;
use crate::indicator::ma::Ema;
use crate::indicator::macd::Macd;
use crate::indicator::rsi::Rsi;
use crate::indicator::volume::VolumeMA;
use crate::model::PriceBar;
use crate::series::PriceSeries;

/// Lookback periods for every indicator carried by a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSettings {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_k: f64,
    pub volume_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_fast: 50,
            ema_slow: 200,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_k: 2.0,
            volume_period: 20,
        }
    }
}

/// A bar extended with whatever indicator values its history supports.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRow {
    pub bar: PriceBar,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub avg_volume: Option<f64>,
}

#[cfg(test)]
impl FrameRow {
    /// A row with no indicator values.
    pub fn bare(bar: PriceBar) -> Self {
        Self {
            bar,
            ema_fast: None,
            ema_slow: None,
            rsi: None,
            macd: None,
            macd_signal: None,
            macd_hist: None,
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            avg_volume: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    rows: Vec<FrameRow>,
}

#[cfg(test)]
impl IndicatorFrame {
    pub fn from_rows(rows: Vec<FrameRow>) -> Self {
        Self { rows }
    }
}

impl IndicatorFrame {
    pub fn compute(
        series: &PriceSeries,
        settings: &IndicatorSettings,
    ) -> Result<Self, Report<IndicatorError>> {
        let bars = series.bars();

        let ema_fast_ind = Ema::new(settings.ema_fast)?;
        let ema_slow_ind = Ema::new(settings.ema_slow)?;
        let rsi_ind = Rsi::new(settings.rsi_period)?;
        let macd_ind = Macd::new(settings.macd_fast, settings.macd_slow, settings.macd_signal)?;
        let bb_ind = BollingerBands::new(settings.bb_period, settings.bb_k)?;
        let volume_ind = VolumeMA::new(settings.volume_period)?;

        let indicators: [&dyn Indicator; 6] = [
            &ema_fast_ind,
            &ema_slow_ind,
            &rsi_ind,
            &macd_ind,
            &bb_ind,
            &volume_ind,
        ];
        for indicator in indicators {
            if bars.len() < indicator.required_bars() {
                debug!(
                    indicator = indicator.name(),
                    required = indicator.required_bars(),
                    available = bars.len(),
                    "insufficient bars, values left undefined"
                );
            }
        }

        let ema_fast = ema_fast_ind.series(bars);
        let ema_slow = ema_slow_ind.series(bars);
        let rsi = rsi_ind.series(bars);
        let macd = macd_ind.lines(bars);
        let bands = bb_ind.bands(bars);
        let avg_volume = volume_ind.series(bars);

        let rows = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| FrameRow {
                bar: bar.clone(),
                ema_fast: ema_fast[i],
                ema_slow: ema_slow[i],
                rsi: rsi[i],
                macd: macd.macd[i],
                macd_signal: macd.signal[i],
                macd_hist: macd.histogram[i],
                bb_upper: bands[i].map(|b| b.upper),
                bb_middle: bands[i].map(|b| b.middle),
                bb_lower: bands[i].map(|b| b.lower),
                avg_volume: avg_volume[i],
            })
            .collect();

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<FrameRow> {
        self.rows
    }

    pub fn last(&self) -> Option<&FrameRow> {
        self.rows.last()
    }

    pub fn bars(&self) -> impl Iterator<Item = &PriceBar> {
        self.rows.iter().map(|r| &r.bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::bars_from_closes;

    fn frame_for(len: usize) -> IndicatorFrame {
        let closes: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
        let series = PriceSeries::from_raw(bars_from_closes(&closes));
        IndicatorFrame::compute(&series, &IndicatorSettings::default()).unwrap()
    }

    #[test]
    fn short_history_leaves_slow_ema_undefined() {
        let frame = frame_for(50);
        let last = frame.last().unwrap();
        assert!(last.ema_fast.is_some());
        assert!(last.ema_slow.is_none());
        assert!(last.rsi.is_some());
        assert!(last.avg_volume.is_some());
    }

    #[test]
    fn long_history_defines_every_field_on_last_row() {
        let frame = frame_for(250);
        let last = frame.last().unwrap();
        assert!(last.ema_slow.is_some());
        assert!(last.macd_signal.is_some());
        assert!(last.bb_upper.is_some());
        assert_eq!(frame.rows().len(), 250);
    }

    #[test]
    fn values_depend_only_on_prefix() {
        let full = frame_for(240);
        let prefix = frame_for(220);
        assert_eq!(full.rows()[219], prefix.rows()[219]);
    }

    #[test]
    fn invalid_settings_rejected() {
        let series = PriceSeries::from_raw(bars_from_closes(&[1.0; 10]));
        let settings = IndicatorSettings {
            macd_fast: 30,
            ..IndicatorSettings::default()
        };
        assert!(IndicatorFrame::compute(&series, &settings).is_err());
    }

    #[test]
    fn empty_series_gives_empty_frame() {
        let frame =
            IndicatorFrame::compute(&PriceSeries::default(), &IndicatorSettings::default()).unwrap();
        assert!(frame.rows().is_empty());
    }
}
