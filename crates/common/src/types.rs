use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One completed OHLC bucket of a given granularity. Prices are mid prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { open, high, low, close }
    }

    /// `low <= open, close <= high`. Upstream data violating this is still
    /// classified, but callers should log it.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }
}

/// Candle bucket width. Variant names double as OANDA granularity codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    H1,
    H2,
    H3,
    H4,
    H6,
    H8,
    H12,
    D,
}

impl Granularity {
    pub fn width_hours(self) -> u32 {
        match self {
            Granularity::H1 => 1,
            Granularity::H2 => 2,
            Granularity::H3 => 3,
            Granularity::H4 => 4,
            Granularity::H6 => 6,
            Granularity::H8 => 8,
            Granularity::H12 => 12,
            Granularity::D => 24,
        }
    }

    /// Whether a bucket of this width closes at the given local hour.
    pub fn is_due(self, hour: u32) -> bool {
        hour % self.width_hours() == 0
    }

    pub fn code(self) -> &'static str {
        match self {
            Granularity::H1 => "H1",
            Granularity::H2 => "H2",
            Granularity::H3 => "H3",
            Granularity::H4 => "H4",
            Granularity::H6 => "H6",
            Granularity::H8 => "H8",
            Granularity::H12 => "H12",
            Granularity::D => "D",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "H1" => Ok(Granularity::H1),
            "H2" => Ok(Granularity::H2),
            "H3" => Ok(Granularity::H3),
            "H4" => Ok(Granularity::H4),
            "H6" => Ok(Granularity::H6),
            "H8" => Ok(Granularity::H8),
            "H12" => Ok(Granularity::H12),
            "D" => Ok(Granularity::D),
            other => Err(format!("unknown granularity '{other}'")),
        }
    }
}

/// Result of classifying a candle pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLabel {
    Bullish,
    Bearish,
    /// No CRT pattern on the pair.
    Neutral,
}

impl std::fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalLabel::Bullish => write!(f, "Bullish"),
            SignalLabel::Bearish => write!(f, "Bearish"),
            SignalLabel::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Notification produced by a qualifying evaluation.
///
/// Renders as `[H1] Bullish CRT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub granularity: Granularity,
    pub label: SignalLabel,
}

impl Alert {
    /// `None` for a neutral label: there is nothing to announce.
    pub fn new(granularity: Granularity, label: SignalLabel) -> Option<Self> {
        match label {
            SignalLabel::Neutral => None,
            label => Some(Self { granularity, label }),
        }
    }

    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} CRT", self.granularity, self.label)
    }
}

/// Opaque notification destination: a phone number, a chat id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Recipient(String);

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for Recipient {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current state of the evaluation scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Idle,
    Evaluating,
}

impl EngineState {
    pub fn is_running(self) -> bool {
        self != EngineState::Stopped
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Idle => write!(f, "idle"),
            EngineState::Evaluating => write!(f, "evaluating"),
        }
    }
}
