use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::chart::ChartOptions;
use crate::error::ConfigError;
use crate::frame::IndicatorSettings;
use crate::model::Interval;
use crate::strategy::BreakoutRule;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Ranges the Yahoo chart API accepts.
const VALID_RANGES: &[&str] = &[
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_watchlist() -> String {
    "stocks.txt".into()
}

fn default_provider_url() -> String {
    YAHOO_CHART_URL.into()
}

fn default_interval() -> String {
    "1d".into()
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_max_retries() -> u32 {
    1
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_min_bars() -> usize {
    50
}

fn default_concurrency() -> usize {
    4
}

fn default_ema_fast() -> usize {
    50
}

fn default_ema_slow() -> usize {
    200
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_low() -> f64 {
    50.0
}

fn default_rsi_high() -> f64 {
    75.0
}

fn default_volume_period() -> usize {
    20
}

fn default_volume_multiplier() -> f64 {
    1.5
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_k() -> f64 {
    2.0
}

fn default_max_bars() -> usize {
    2000
}

fn default_true() -> bool {
    true
}

fn default_llm_url() -> String {
    GEMINI_BASE_URL.into()
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_history_turns() -> usize {
    6
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Holds the chat history database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Watchlist file, one symbol per line.
    #[serde(default = "default_watchlist")]
    pub watchlist: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
            watchlist: default_watchlist(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Yahoo `range`; when unset the widest range for `interval` is used.
    pub range: Option<String>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// Series shorter than this are reported as "no data" by the scanner.
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            interval: default_interval(),
            range: None,
            requests_per_second: default_requests_per_second(),
            max_retries: default_max_retries(),
            timeout_secs: default_provider_timeout(),
            min_bars: default_min_bars(),
        }
    }
}

impl ProviderConfig {
    /// Interval after validation; falls back to daily for unknown strings.
    pub fn interval(&self) -> Interval {
        Interval::from_str(&self.interval).unwrap_or(Interval::Day1)
    }

    pub fn range_for(&self, interval: Interval) -> String {
        self.range
            .clone()
            .unwrap_or_else(|| interval.default_range().to_owned())
    }
}

#[derive(Debug, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_low")]
    pub rsi_low: f64,
    #[serde(default = "default_rsi_high")]
    pub rsi_high: f64,
    #[serde(default = "default_volume_period")]
    pub volume_period: usize,
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: f64,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    #[serde(default = "default_bb_k")]
    pub bb_k: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            rsi_period: default_rsi_period(),
            rsi_low: default_rsi_low(),
            rsi_high: default_rsi_high(),
            volume_period: default_volume_period(),
            volume_multiplier: default_volume_multiplier(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bb_period: default_bb_period(),
            bb_k: default_bb_k(),
        }
    }
}

impl ScannerConfig {
    pub fn indicator_settings(&self) -> IndicatorSettings {
        IndicatorSettings {
            ema_fast: self.ema_fast,
            ema_slow: self.ema_slow,
            rsi_period: self.rsi_period,
            macd_fast: self.macd_fast,
            macd_slow: self.macd_slow,
            macd_signal: self.macd_signal,
            bb_period: self.bb_period,
            bb_k: self.bb_k,
            volume_period: self.volume_period,
        }
    }

    pub fn breakout_rule(&self) -> BreakoutRule {
        BreakoutRule {
            rsi_low: self.rsi_low,
            rsi_high: self.rsi_high,
            volume_multiplier: self.volume_multiplier,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,
    #[serde(default = "default_true")]
    pub zones: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            max_bars: default_max_bars(),
            zones: true,
        }
    }
}

impl ChartConfig {
    pub fn options(&self) -> ChartOptions {
        ChartOptions {
            max_bars: self.max_bars,
            zones: self.zones,
            ..ChartOptions::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Stored messages replayed into a chat prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Keep chat history in `general.data_dir`; otherwise it lives only for one run.
    #[serde(default = "default_true")]
    pub persist_history: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
            history_turns: default_history_turns(),
            persist_history: true,
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
///
/// A missing file yields the defaults.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    if !path.exists() {
        let config = AppConfig::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn invalid(field: impl Into<String>) -> Report<ConfigError> {
    Report::new(ConfigError::Validation {
        field: field.into(),
    })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_provider(config)?;
    validate_scanner(config)?;
    Ok(())
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let format = config.general.log_format.as_str();
    if format != "text" && format != "json" {
        return Err(invalid(format!(
            "general.log_format \"{format}\" must be \"text\" or \"json\""
        )));
    }
    Ok(())
}

fn validate_provider(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let provider = &config.provider;
    if Interval::from_str(&provider.interval).is_none() {
        return Err(invalid(format!(
            "provider.interval: unknown interval \"{}\"",
            provider.interval
        )));
    }
    if let Some(range) = &provider.range
        && !VALID_RANGES.contains(&range.as_str())
    {
        return Err(invalid(format!("provider.range: unknown range \"{range}\"")));
    }
    if provider.requests_per_second == 0 {
        return Err(invalid("provider.requests_per_second must be > 0"));
    }
    Ok(())
}

fn validate_scanner(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let scanner = &config.scanner;
    if scanner.concurrency == 0 {
        return Err(invalid("scanner.concurrency must be > 0"));
    }

    let periods = [
        ("ema_fast", scanner.ema_fast),
        ("ema_slow", scanner.ema_slow),
        ("rsi_period", scanner.rsi_period),
        ("volume_period", scanner.volume_period),
        ("macd_fast", scanner.macd_fast),
        ("macd_slow", scanner.macd_slow),
        ("macd_signal", scanner.macd_signal),
        ("bb_period", scanner.bb_period),
    ];
    if let Some((name, _)) = periods.iter().find(|(_, period)| *period == 0) {
        return Err(invalid(format!("scanner.{name} must be > 0")));
    }

    if scanner.ema_fast >= scanner.ema_slow {
        return Err(invalid("scanner.ema_fast must be < scanner.ema_slow"));
    }
    if scanner.macd_fast >= scanner.macd_slow {
        return Err(invalid("scanner.macd_fast must be < scanner.macd_slow"));
    }

    let rsi_bounds = 0.0..=100.0;
    if !rsi_bounds.contains(&scanner.rsi_low) || !rsi_bounds.contains(&scanner.rsi_high) {
        return Err(invalid("scanner.rsi_low / rsi_high must lie in [0, 100]"));
    }
    if scanner.rsi_low > scanner.rsi_high {
        return Err(invalid("scanner.rsi_low must be <= scanner.rsi_high"));
    }

    if scanner.volume_multiplier <= 0.0 {
        return Err(invalid("scanner.volume_multiplier must be > 0"));
    }
    if scanner.bb_k <= 0.0 {
        return Err(invalid("scanner.bb_k must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"
watchlist = "nifty50.txt"

[provider]
interval = "1h"
range = "6mo"
requests_per_second = 5
max_retries = 3

[scanner]
concurrency = 8
ema_fast = 20
ema_slow = 100
rsi_low = 55.0
rsi_high = 70.0
volume_multiplier = 2.0

[chart]
max_bars = 500
zones = false

[llm]
model = "gemini-1.5-pro"
history_turns = 10
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.provider.interval(), Interval::Hour1);
        assert_eq!(config.provider.range_for(Interval::Hour1), "6mo");
        assert_eq!(config.scanner.concurrency, 8);
        assert_eq!(config.scanner.indicator_settings().ema_slow, 100);
        assert_eq!(config.scanner.breakout_rule().rsi_low, 55.0);
        assert!(!config.chart.options().zones);
        assert_eq!(config.llm.history_turns, 10);
    }

    #[test]
    fn defaults_applied_when_sections_omitted() {
        let config = parse("");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.watchlist, "stocks.txt");
        assert_eq!(config.provider.interval(), Interval::Day1);
        assert_eq!(config.provider.range_for(Interval::Day1), "max");
        assert_eq!(config.provider.min_bars, 50);
        assert_eq!(config.scanner.concurrency, 4);
        assert_eq!(config.scanner.indicator_settings(), IndicatorSettings::default());
        assert_eq!(config.scanner.breakout_rule(), BreakoutRule::default());
        assert_eq!(config.chart.max_bars, 2000);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_interval_rejected() {
        let config = parse("[provider]\ninterval = \"2m\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_range_rejected() {
        let config = parse("[provider]\nrange = \"3y\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn inverted_ema_periods_rejected() {
        let config = parse("[scanner]\nema_fast = 200\nema_slow = 50\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn inverted_rsi_band_rejected() {
        let config = parse("[scanner]\nrsi_low = 80.0\nrsi_high = 60.0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_period_rejected() {
        let config = parse("[scanner]\nrsi_period = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = parse("[scanner]\nconcurrency = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_log_format_rejected() {
        let config = parse("[general]\nlog_format = \"xml\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load(Path::new("/nonexistent/titan-screener.toml")).unwrap();
        assert_eq!(config.scanner.ema_fast, 50);
    }
}
