use tracing::warn;

use common::{Candle, CrtRule, SignalLabel, SignalSettings};

use crate::PatternClassifier;

/// Candle Range Theory: a liquidity sweep of the prior candle's range
/// followed by a close back inside it.
///
/// Bullish: `current` trades below `prior.low` and closes above it.
/// Bearish: `current` trades above `prior.high` and closes below it.
/// Under [`CrtRule::Strict`] the sweep candle must not also break the
/// opposite side of the prior range.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrtClassifier {
    pub rule: CrtRule,
}

impl CrtClassifier {
    pub fn new(rule: CrtRule) -> Self {
        Self { rule }
    }

    fn is_bullish(&self, prior: &Candle, current: &Candle) -> bool {
        let swept_low = prior.low > current.low;
        let closed_back_above = current.close > prior.low;
        let contained = match self.rule {
            CrtRule::Strict => prior.high > current.high,
            CrtRule::Lenient => true,
        };
        swept_low && closed_back_above && contained
    }

    fn is_bearish(&self, prior: &Candle, current: &Candle) -> bool {
        let swept_high = prior.high < current.high;
        let closed_back_below = current.close < prior.high;
        let contained = match self.rule {
            CrtRule::Strict => prior.low < current.low,
            CrtRule::Lenient => true,
        };
        swept_high && closed_back_below && contained
    }
}

impl PatternClassifier for CrtClassifier {
    fn name(&self) -> &str {
        match self.rule {
            CrtRule::Strict => "crt-strict",
            CrtRule::Lenient => "crt-lenient",
        }
    }

    fn classify(&self, prior: &Candle, current: &Candle) -> SignalLabel {
        // Bullish is checked first and wins when both sides match.
        if self.is_bullish(prior, current) {
            SignalLabel::Bullish
        } else if self.is_bearish(prior, current) {
            SignalLabel::Bearish
        } else {
            SignalLabel::Neutral
        }
    }
}

/// Ignores the candles and always reports the configured label.
/// Used to exercise the alert path end to end without a live pattern.
#[derive(Debug, Clone, Copy)]
pub struct ForcedClassifier(pub SignalLabel);

impl PatternClassifier for ForcedClassifier {
    fn name(&self) -> &str {
        "forced"
    }

    fn classify(&self, _prior: &Candle, _current: &Candle) -> SignalLabel {
        self.0
    }
}

/// Pick the classifier selected by the settings.
pub fn build_classifier(settings: &SignalSettings) -> Box<dyn PatternClassifier> {
    match settings.forced_signal {
        Some(label) => {
            warn!(%label, "Forced signal active, candle pattern is ignored");
            Box::new(ForcedClassifier(label))
        }
        None => Box::new(CrtClassifier::new(settings.crt_rule)),
    }
}
