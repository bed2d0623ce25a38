use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Bar interval supported by the application.
///
/// String representations match the config file format (e.g. `"1d"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Day1,
    Week1,
    Month1,
}

impl Interval {
    /// Parse a config-format string into an `Interval`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "1d" => Some(Self::Day1),
            "1wk" => Some(Self::Week1),
            "1mo" => Some(Self::Month1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Day1 => "1d",
            Self::Week1 => "1wk",
            Self::Month1 => "1mo",
        }
    }

    /// Return the Yahoo chart API `interval` parameter for this interval.
    pub fn yahoo_interval(self) -> &'static str {
        match self {
            Self::Hour1 => "60m",
            other => other.as_str(),
        }
    }

    /// Widest Yahoo `range` the chart API serves for this interval.
    pub fn default_range(self) -> &'static str {
        match self {
            Self::Min1 => "5d",
            Self::Min5 | Self::Min15 | Self::Min30 => "1mo",
            Self::Hour1 => "1y",
            Self::Day1 | Self::Week1 | Self::Month1 => "max",
        }
    }

    pub fn is_intraday(self) -> bool {
        matches!(
            self,
            Self::Min1 | Self::Min5 | Self::Min15 | Self::Min30 | Self::Hour1
        )
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OHLCV bar as delivered by a price provider.
///
/// Raw bars may carry NaN or zero fields; `PriceSeries::from_raw` and the
/// chart preparer drop those.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// OHLC all finite and strictly positive, volume finite and non-negative.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
    }
}

/// Label attached to a symbol after one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanVerdict {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "WAIT")]
    Wait,
}

impl fmt::Display for ScanVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Wait => write!(f, "WAIT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub symbol: String,
    pub current_price: f64,
    pub rsi: Option<f64>,
    pub volume_x: Option<f64>,
    pub verdict: ScanVerdict,
}

/// Position of the close relative to the fast and slow EMAs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendState {
    /// close > fast EMA > slow EMA
    Uptrend,
    /// close < fast EMA < slow EMA
    Downtrend,
    Mixed,
    Unknown,
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uptrend => write!(f, "uptrend (close > EMA fast > EMA slow)"),
            Self::Downtrend => write!(f, "downtrend (close < EMA fast < EMA slow)"),
            Self::Mixed => write!(f, "mixed"),
            Self::Unknown => write!(f, "unknown (insufficient history)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStructure {
    Bullish,
    Bearish,
    Sideways,
}

impl fmt::Display for MarketStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH (Higher Highs)"),
            Self::Bearish => write!(f, "BEARISH (Lower Lows)"),
            Self::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    StrongBuy,
    Wait,
    Avoid,
    Error,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG BUY",
            Self::Wait => "WAIT",
            Self::Avoid => "AVOID",
            Self::Error => "ERROR",
        }
    }

    /// Lenient parse of the label a language model returns.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "STRONG BUY" | "BUY" => Some(Self::StrongBuy),
            "WAIT" | "HOLD" => Some(Self::Wait),
            "AVOID" | "SELL" => Some(Self::Avoid),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unknown verdict: {raw}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub verdict: Verdict,
    pub reason: String,
    #[serde(rename = "stopLoss", deserialize_with = "lenient_price")]
    pub stop_loss: f64,
    #[serde(deserialize_with = "lenient_price")]
    pub target: f64,
}

impl AuditVerdict {
    pub fn error() -> Self {
        Self {
            verdict: Verdict::Error,
            reason: "AI connection failed. Please try again.".into(),
            stop_loss: 0.0,
            target: 0.0,
        }
    }

    /// Verdict for a symbol whose live price data could not be loaded.
    pub fn no_data() -> Self {
        Self {
            reason: "Could not fetch live data.".into(),
            ..Self::error()
        }
    }
}

/// Accepts `1234.5`, `"1234.5"`, `"₹1,234.50"` or `"approx 1180"`.
fn lenient_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                .filter(|c| *c != ',')
                .collect();
            digits
                .trim_end_matches('.')
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("not a price: {s}")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Up,
    Down,
}

impl Feedback {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub symbol: String,
    pub role: Role,
    pub content: String,
    pub feedback: Option<Feedback>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(symbol: &str, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_owned(),
            role,
            content: content.into(),
            feedback: None,
            created_at: Utc::now(),
        }
    }
}
