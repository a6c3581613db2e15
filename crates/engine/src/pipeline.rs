use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use common::{Alert, Candle, CandleSource, Granularity};
use notify::{DispatchReport, NotificationDispatcher};
use strategy::PatternClassifier;

/// Bars needed: two closed candles plus the one still forming.
const MIN_CANDLES: usize = 3;

/// What one evaluation did. Never an error: collaborator failures end here.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// Fewer than three bars came back.
    InsufficientData { received: usize },
    /// Fetch errored or timed out.
    FetchFailed(String),
    /// Candles classified, no pattern.
    NoSignal,
    Alerted { alert: Alert, report: DispatchReport },
}

/// Fetch, classify, notify for one granularity.
pub struct SignalPipeline {
    instrument: String,
    candle_count: usize,
    fetch_timeout: Duration,
    source: Arc<dyn CandleSource>,
    classifier: Box<dyn PatternClassifier>,
    dispatcher: NotificationDispatcher,
}

impl SignalPipeline {
    pub fn new(
        instrument: impl Into<String>,
        source: Arc<dyn CandleSource>,
        classifier: Box<dyn PatternClassifier>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            candle_count: MIN_CANDLES,
            fetch_timeout: Duration::from_secs(15),
            source,
            classifier,
            dispatcher,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_candle_count(mut self, count: usize) -> Self {
        self.candle_count = count.max(MIN_CANDLES);
        self
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub async fn evaluate(&self, granularity: Granularity) -> EvaluationOutcome {
        info!(instrument = %self.instrument, %granularity, "Fetching candles");

        let fetch = self
            .source
            .fetch_candles(&self.instrument, granularity, self.candle_count);
        let candles = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(candles)) => candles,
            Ok(Err(e)) => {
                error!(%granularity, error = %e, "Candle fetch failed");
                return EvaluationOutcome::FetchFailed(e.to_string());
            }
            Err(_) => {
                error!(
                    %granularity,
                    timeout_secs = self.fetch_timeout.as_secs(),
                    "Candle fetch timed out"
                );
                return EvaluationOutcome::FetchFailed("timed out".to_string());
            }
        };

        let Some((prior, current)) = closed_pair(&candles) else {
            warn!(%granularity, received = candles.len(), "Not enough candle data");
            return EvaluationOutcome::InsufficientData { received: candles.len() };
        };

        for candle in [prior, current] {
            if !candle.is_well_formed() {
                warn!(%granularity, ?candle, "Malformed candle from upstream");
            }
        }

        let label = self.classifier.classify(prior, current);
        debug!(%granularity, ?prior, ?current, %label, classifier = self.classifier.name(), "Classified");

        let Some(alert) = Alert::new(granularity, label) else {
            info!(%granularity, "No CRT signal");
            return EvaluationOutcome::NoSignal;
        };

        info!(%granularity, signal = %label, "CRT signal detected");
        let report = self.dispatcher.dispatch(&alert).await;
        EvaluationOutcome::Alerted { alert, report }
    }
}

/// The two most recently closed bars: second- and third-to-last, skipping
/// the bucket still forming at the end.
fn closed_pair(candles: &[Candle]) -> Option<(&Candle, &Candle)> {
    let n = candles.len();
    if n < MIN_CANDLES {
        return None;
    }
    Some((&candles[n - 3], &candles[n - 2]))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use common::{DirectSender, Error, Recipient, Result, SignalLabel};
    use notify::Channel;
    use strategy::{CrtClassifier, ForcedClassifier};

    use super::*;

    struct ScriptedSource {
        candles: Vec<Candle>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(candles: Vec<Candle>) -> Arc<Self> {
            Arc::new(Self { candles, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl CandleSource for ScriptedSource {
        async fn fetch_candles(&self, _: &str, _: Granularity, _: usize) -> Result<Vec<Candle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candles.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl CandleSource for BrokenSource {
        async fn fetch_candles(&self, _: &str, _: Granularity, _: usize) -> Result<Vec<Candle>> {
            Err(Error::DataUnavailable("upstream 502".into()))
        }
    }

    struct StalledSource;

    #[async_trait]
    impl CandleSource for StalledSource {
        async fn fetch_candles(&self, _: &str, _: Granularity, _: usize) -> Result<Vec<Candle>> {
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }
    }

    /// Panics if classify is ever called.
    struct Unreachable;

    impl PatternClassifier for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn classify(&self, _: &Candle, _: &Candle) -> SignalLabel {
            panic!("classifier must not run");
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<String>>);

    #[async_trait]
    impl DirectSender for Inbox {
        async fn send_direct(&self, _: &Recipient, text: &str) -> Result<()> {
            self.0.lock().await.push(text.to_string());
            Ok(())
        }
    }

    fn candle(low: f64, high: f64, close: f64) -> Candle {
        Candle::new(close, high, low, close)
    }

    fn reference_candles() -> Vec<Candle> {
        vec![
            candle(100.0, 110.0, 108.0),
            candle(95.0, 105.0, 106.0),
            // still forming
            candle(104.0, 107.0, 106.5),
        ]
    }

    fn dispatcher_with(inboxes: &[(&str, Arc<Inbox>)]) -> NotificationDispatcher {
        inboxes.iter().fold(
            NotificationDispatcher::new(Duration::from_secs(5)),
            |d, (name, inbox)| d.with_channel(Channel::direct(*name, inbox.clone(), Recipient::new("r"))),
        )
    }

    #[tokio::test]
    async fn bullish_pair_alerts_every_channel() {
        let whatsapp = Arc::new(Inbox::default());
        let telegram = Arc::new(Inbox::default());
        let pipeline = SignalPipeline::new(
            "XAU_USD",
            ScriptedSource::new(reference_candles()),
            Box::new(CrtClassifier::default()),
            dispatcher_with(&[("whatsapp", whatsapp.clone()), ("telegram", telegram.clone())]),
        );

        let outcome = pipeline.evaluate(Granularity::H1).await;

        assert!(matches!(
            outcome,
            EvaluationOutcome::Alerted { alert, .. } if alert.label == SignalLabel::Bullish
        ));
        assert_eq!(*whatsapp.0.lock().await, vec!["[H1] Bullish CRT".to_string()]);
        assert_eq!(*telegram.0.lock().await, vec!["[H1] Bullish CRT".to_string()]);
    }

    #[tokio::test]
    async fn forming_bar_is_ignored() {
        // Only the last bar would make this bearish; the closed pair is neutral.
        let candles = vec![
            candle(100.0, 110.0, 105.0),
            candle(101.0, 109.0, 104.0),
            candle(102.0, 120.0, 103.0),
        ];
        let pipeline = SignalPipeline::new(
            "XAU_USD",
            ScriptedSource::new(candles),
            Box::new(CrtClassifier::default()),
            NotificationDispatcher::new(Duration::from_secs(5)),
        );
        assert_eq!(pipeline.evaluate(Granularity::H4).await, EvaluationOutcome::NoSignal);
    }

    #[tokio::test]
    async fn two_candles_skip_classification() {
        let inbox = Arc::new(Inbox::default());
        let source = ScriptedSource::new(reference_candles()[..2].to_vec());
        let pipeline = SignalPipeline::new(
            "XAU_USD",
            source.clone(),
            Box::new(Unreachable),
            dispatcher_with(&[("whatsapp", inbox.clone())]),
        );

        let outcome = pipeline.evaluate(Granularity::H1).await;

        assert_eq!(outcome, EvaluationOutcome::InsufficientData { received: 2 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(inbox.0.lock().await.is_empty());
    }

    #[tokio::test]
    async fn fetch_error_is_contained() {
        let inbox = Arc::new(Inbox::default());
        let pipeline = SignalPipeline::new(
            "XAU_USD",
            Arc::new(BrokenSource),
            Box::new(ForcedClassifier(SignalLabel::Bullish)),
            dispatcher_with(&[("whatsapp", inbox.clone())]),
        );

        let outcome = pipeline.evaluate(Granularity::H1).await;

        assert!(matches!(outcome, EvaluationOutcome::FetchFailed(_)));
        assert!(inbox.0.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_fetch_times_out() {
        let pipeline = SignalPipeline::new(
            "XAU_USD",
            Arc::new(StalledSource),
            Box::new(ForcedClassifier(SignalLabel::Bullish)),
            NotificationDispatcher::new(Duration::from_secs(5)),
        )
        .with_fetch_timeout(Duration::from_secs(20));

        let outcome = pipeline.evaluate(Granularity::H1).await;
        assert_eq!(outcome, EvaluationOutcome::FetchFailed("timed out".into()));
    }

    #[tokio::test]
    async fn forced_signal_reaches_channels() {
        let inbox = Arc::new(Inbox::default());
        let candles = vec![candle(1.0, 2.0, 1.5); 3];
        let pipeline = SignalPipeline::new(
            "XAU_USD",
            ScriptedSource::new(candles),
            Box::new(ForcedClassifier(SignalLabel::Bearish)),
            dispatcher_with(&[("whatsapp", inbox.clone())]),
        );

        pipeline.evaluate(Granularity::H4).await;
        assert_eq!(*inbox.0.lock().await, vec!["[H4] Bearish CRT".to_string()]);
    }
}
