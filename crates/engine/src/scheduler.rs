use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use common::{Clock, EngineState, Granularity, SignalSettings};
use strategy::TradingWindowPolicy;

use crate::pipeline::SignalPipeline;
use crate::slots::{DedupKey, ProcessedSlots};

/// What the scheduler decided for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    OutsideWindow,
    /// Not the aligned minute, or past the tolerance seconds.
    NotAligned,
    AlreadyProcessed(DedupKey),
    /// Aligned and new, but no configured granularity closes this hour.
    NothingDue(DedupKey),
    Fire {
        key: DedupKey,
        granularities: Vec<Granularity>,
    },
}

/// Clock-driven evaluation loop with half-hour slot deduplication.
///
/// Owns its `ProcessedSlots`; evaluation runs inside the tick, so two
/// evaluations of the same scheduler never overlap.
pub struct EvaluationScheduler {
    clock: Arc<dyn Clock>,
    time_zone: Tz,
    window: TradingWindowPolicy,
    alignment_minute: u32,
    tick_tolerance_secs: u32,
    granularities: Vec<Granularity>,
    tick_interval: Duration,
    processed: ProcessedSlots,
    pipeline: SignalPipeline,
    state: Arc<RwLock<EngineState>>,
}

impl EvaluationScheduler {
    pub fn new(
        settings: &SignalSettings,
        clock: Arc<dyn Clock>,
        pipeline: SignalPipeline,
        state: Arc<RwLock<EngineState>>,
    ) -> Self {
        Self {
            clock,
            time_zone: settings.time_zone,
            window: TradingWindowPolicy::new(settings.test_override_window),
            alignment_minute: settings.alignment_minute,
            tick_tolerance_secs: settings.tick_tolerance_secs,
            granularities: settings.granularities.clone(),
            tick_interval: settings.tick_interval(),
            processed: ProcessedSlots::new(settings.dedup_capacity),
            pipeline,
            state,
        }
    }

    pub fn processed(&self) -> &ProcessedSlots {
        &self.processed
    }

    /// Gate one tick. Records the slot when the decision is to fire.
    pub fn decide(&mut self, now: DateTime<Utc>) -> TickDecision {
        let local = now.with_timezone(&self.time_zone);
        trace!(time = %local.format("%a %H:%M:%S"), "Tick");

        if !self.window.permits(&local) {
            return TickDecision::OutsideWindow;
        }
        if local.minute() != self.alignment_minute || local.second() > self.tick_tolerance_secs {
            return TickDecision::NotAligned;
        }

        let key = DedupKey::from_local(&local);
        if self.processed.contains(&key) {
            return TickDecision::AlreadyProcessed(key);
        }

        let hour = local.hour();
        let due: Vec<Granularity> = self
            .granularities
            .iter()
            .copied()
            .filter(|g| g.is_due(hour))
            .collect();

        self.processed.insert(key);
        if due.is_empty() {
            debug!(slot = %key, "No granularity closes this hour");
            return TickDecision::NothingDue(key);
        }
        TickDecision::Fire { key, granularities: due }
    }

    /// Sample the clock once and evaluate if the tick qualifies.
    pub async fn tick(&mut self) -> TickDecision {
        let decision = self.decide(self.clock.now());

        if let TickDecision::Fire { key, granularities } = &decision {
            info!(slot = %key, ?granularities, "Evaluation slot reached");
            *self.state.write().await = EngineState::Evaluating;
            for &granularity in granularities {
                let outcome = self.pipeline.evaluate(granularity).await;
                debug!(slot = %key, %granularity, ?outcome, "Evaluation finished");
            }
            *self.state.write().await = EngineState::Idle;
        }
        decision
    }

    /// Run for the life of the process. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            instrument = %self.pipeline.instrument(),
            granularities = ?self.granularities,
            time_zone = %self.time_zone,
            alignment_minute = self.alignment_minute,
            "CRT scheduler started, waiting for candle closes"
        );
        *self.state.write().await = EngineState::Idle;

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut was_open = None;

        loop {
            interval.tick().await;
            let decision = self.tick().await;

            let open = decision != TickDecision::OutsideWindow;
            if was_open != Some(open) {
                if open {
                    info!("Inside trading hours");
                } else {
                    info!("Outside trading hours, waiting");
                }
                was_open = Some(open);
            }
        }
    }
}
