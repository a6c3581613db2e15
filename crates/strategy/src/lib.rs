pub mod classifier;
pub mod window;

pub use classifier::{build_classifier, CrtClassifier, ForcedClassifier};
pub use window::TradingWindowPolicy;

use common::{Candle, SignalLabel};

/// Two-candle pattern rule.
pub trait PatternClassifier: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Classify `current` against the `prior` closed candle.
    ///
    /// Must be pure and total: every input pair maps to a label.
    fn classify(&self, prior: &Candle, current: &Candle) -> SignalLabel;
}
