use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use common::{Alert, BroadcastSender, DirectSender, Recipient, RecipientSource};

/// One notification destination.
pub struct Channel {
    name: String,
    kind: ChannelKind,
}

enum ChannelKind {
    /// A single fixed recipient.
    Direct {
        sender: Arc<dyn DirectSender>,
        recipient: Recipient,
    },
    /// Everyone in `audience` at dispatch time.
    Broadcast {
        sender: Arc<dyn BroadcastSender>,
        audience: Arc<dyn RecipientSource>,
    },
}

impl Channel {
    pub fn direct(
        name: impl Into<String>,
        sender: Arc<dyn DirectSender>,
        recipient: Recipient,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Direct { sender, recipient },
        }
    }

    pub fn broadcast(
        name: impl Into<String>,
        sender: Arc<dyn BroadcastSender>,
        audience: Arc<dyn RecipientSource>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Broadcast { sender, audience },
        }
    }
}

/// Delivery counts for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: String,
    pub delivered: usize,
    pub failed: usize,
}

/// Per-channel results of one dispatch, in channel order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub channels: Vec<ChannelReport>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.channels.iter().map(|c| c.delivered).sum()
    }

    pub fn failed(&self) -> usize {
        self.channels.iter().map(|c| c.failed).sum()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelReport> {
        self.channels.iter().find(|c| c.channel == name)
    }
}

/// Fans an alert out to every configured channel.
///
/// Channels are attempted one after another and fail independently: an
/// error or timeout on one is logged and counted, then the next channel is
/// tried. Nothing is retried and nothing is returned as an error.
pub struct NotificationDispatcher {
    channels: Vec<Channel>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            send_timeout,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.add_channel(channel);
        self
    }

    pub fn add_channel(&mut self, channel: Channel) {
        info!(channel = %channel.name, "Notification channel registered");
        self.channels.push(channel);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let text = alert.text();
        if self.channels.is_empty() {
            warn!(alert = %text, "No notification channels configured, alert dropped");
            return DispatchReport::default();
        }

        let mut report = DispatchReport::default();
        for channel in &self.channels {
            let (delivered, failed) = self.deliver(channel, &text).await;
            report.channels.push(ChannelReport {
                channel: channel.name.clone(),
                delivered,
                failed,
            });
        }

        info!(
            alert = %text,
            delivered = report.delivered(),
            failed = report.failed(),
            "Alert dispatched"
        );
        report
    }

    async fn deliver(&self, channel: &Channel, text: &str) -> (usize, usize) {
        match &channel.kind {
            ChannelKind::Direct { sender, recipient } => {
                match tokio::time::timeout(self.send_timeout, sender.send_direct(recipient, text))
                    .await
                {
                    Ok(Ok(())) => {
                        info!(channel = %channel.name, %recipient, "Alert sent");
                        (1, 0)
                    }
                    Ok(Err(e)) => {
                        error!(channel = %channel.name, %recipient, error = %e, "Failed to send alert");
                        (0, 1)
                    }
                    Err(_) => {
                        error!(
                            channel = %channel.name,
                            %recipient,
                            timeout_secs = self.send_timeout.as_secs(),
                            "Alert send timed out"
                        );
                        (0, 1)
                    }
                }
            }
            ChannelKind::Broadcast { sender, audience } => {
                let recipients = audience.snapshot().await;
                if recipients.is_empty() {
                    debug!(channel = %channel.name, "Broadcast channel has no recipients");
                    return (0, 0);
                }
                let outcome = sender
                    .send_broadcast(&recipients, text, self.send_timeout)
                    .await;
                if outcome.failed > 0 {
                    warn!(
                        channel = %channel.name,
                        delivered = outcome.delivered,
                        failed = outcome.failed,
                        "Broadcast partially failed"
                    );
                } else {
                    info!(channel = %channel.name, delivered = outcome.delivered, "Broadcast sent");
                }
                (outcome.delivered, outcome.failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use common::{Error, Granularity, Result, SignalLabel};

    use super::*;

    /// Records every message; fails for recipients listed in `reject`.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(Recipient, String)>>,
        reject: BTreeSet<Recipient>,
    }

    #[async_trait]
    impl DirectSender for RecordingSender {
        async fn send_direct(&self, recipient: &Recipient, text: &str) -> Result<()> {
            if self.reject.contains(recipient) {
                return Err(Error::notification("recording", "rejected"));
            }
            self.sent.lock().await.push((recipient.clone(), text.to_string()));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl DirectSender for FailingSender {
        async fn send_direct(&self, _recipient: &Recipient, _text: &str) -> Result<()> {
            Err(Error::Http("503 Service Unavailable".into()))
        }
    }

    struct StalledSender;

    #[async_trait]
    impl DirectSender for StalledSender {
        async fn send_direct(&self, _recipient: &Recipient, _text: &str) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Takes `delay` per message; never answers for recipients in `stall`.
    struct SlowSender {
        delay: Duration,
        stall: BTreeSet<Recipient>,
        delivered: std::sync::atomic::AtomicUsize,
    }

    impl SlowSender {
        fn new(delay: Duration, stall: BTreeSet<Recipient>) -> Arc<Self> {
            Arc::new(Self {
                delay,
                stall,
                delivered: Default::default(),
            })
        }
    }

    #[async_trait]
    impl DirectSender for SlowSender {
        async fn send_direct(&self, recipient: &Recipient, _text: &str) -> Result<()> {
            if self.stall.contains(recipient) {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.delay).await;
            self.delivered.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedAudience(BTreeSet<Recipient>);

    #[async_trait]
    impl RecipientSource for FixedAudience {
        async fn snapshot(&self) -> BTreeSet<Recipient> {
            self.0.clone()
        }
    }

    fn bullish_h1() -> Alert {
        Alert::new(Granularity::H1, SignalLabel::Bullish).unwrap()
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_the_next() {
        let good = Arc::new(RecordingSender::default());
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(5))
            .with_channel(Channel::direct("a", Arc::new(FailingSender), Recipient::new("x")))
            .with_channel(Channel::direct("b", good.clone(), Recipient::new("y")));

        let report = dispatcher.dispatch(&bullish_h1()).await;

        let sent = good.sent.lock().await;
        assert_eq!(sent.as_slice(), &[(Recipient::new("y"), "[H1] Bullish CRT".to_string())]);
        assert_eq!(report.channel("a").unwrap().failed, 1);
        assert_eq!(report.channel("b").unwrap().delivered, 1);
    }

    #[tokio::test]
    async fn broadcast_counts_each_recipient() {
        let sender = Arc::new(RecordingSender {
            reject: [Recipient::from(2)].into(),
            ..Default::default()
        });
        let audience = Arc::new(FixedAudience(
            [Recipient::from(1), Recipient::from(2), Recipient::from(3)].into(),
        ));
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(5))
            .with_channel(Channel::broadcast("telegram", sender.clone(), audience));

        let report = dispatcher.dispatch(&bullish_h1()).await;

        assert_eq!(report.delivered(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(sender.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn empty_audience_is_not_a_failure() {
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(5)).with_channel(
            Channel::broadcast(
                "telegram",
                Arc::new(RecordingSender::default()),
                Arc::new(FixedAudience(BTreeSet::new())),
            ),
        );

        let report = dispatcher.dispatch(&bullish_h1()).await;
        assert_eq!(report.delivered(), 0);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_channel_times_out_and_others_still_run() {
        let good = Arc::new(RecordingSender::default());
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(10))
            .with_channel(Channel::direct("stalled", Arc::new(StalledSender), Recipient::new("x")))
            .with_channel(Channel::direct("good", good.clone(), Recipient::new("y")));

        let report = dispatcher.dispatch(&bullish_h1()).await;

        assert_eq!(report.channel("stalled").unwrap().failed, 1);
        assert_eq!(report.channel("good").unwrap().delivered, 1);
    }

    #[tokio::test]
    async fn no_channels_drops_alert_quietly() {
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(5));
        assert!(dispatcher.is_empty());
        let report = dispatcher.dispatch(&bullish_h1()).await;
        assert!(report.channels.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_broadcast_reaches_every_recipient() {
        let sender = SlowSender::new(Duration::from_secs(1), BTreeSet::new());
        let audience = Arc::new(FixedAudience((0..30i64).map(Recipient::from).collect()));
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(15))
            .with_channel(Channel::broadcast("telegram", sender.clone(), audience));

        let report = dispatcher.dispatch(&bullish_h1()).await;

        assert_eq!(sender.delivered.load(std::sync::atomic::Ordering::SeqCst), 30);
        assert_eq!(report.delivered(), 30);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_recipient_times_out_alone() {
        let sender = SlowSender::new(Duration::from_secs(1), [Recipient::from(2)].into());
        let audience = Arc::new(FixedAudience(
            [Recipient::from(1), Recipient::from(2), Recipient::from(3)].into(),
        ));
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(5))
            .with_channel(Channel::broadcast("telegram", sender.clone(), audience));

        let report = dispatcher.dispatch(&bullish_h1()).await;

        let telegram = report.channel("telegram").unwrap();
        assert_eq!(telegram.delivered, 2);
        assert_eq!(telegram.failed, 1);
        assert_eq!(sender.delivered.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
