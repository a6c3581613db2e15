use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Candle, Granularity, Result};

/// Abstraction over the market-data provider.
///
/// `OandaClient` implements this for live data. Tests script their own.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Return the last `count` candles for `instrument`, oldest first.
    ///
    /// The final element is the bucket still forming. Fails with
    /// `Error::DataUnavailable` when fewer than `count` bars come back.
    async fn fetch_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Candle>>;
}

/// Wall-clock source for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
