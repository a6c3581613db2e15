use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Candle, CandleSource, Error, Granularity, Result};

/// REST client for the OANDA v20 instruments endpoint.
pub struct OandaClient {
    base_url: String,
    access_token: String,
    http: Client,
}

impl OandaClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            http,
        })
    }

    fn candles_url(&self, instrument: &str) -> String {
        format!("{}/v3/instruments/{}/candles", self.base_url, instrument)
    }
}

#[async_trait]
impl CandleSource for OandaClient {
    async fn fetch_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<Candle>> {
        debug!(%instrument, %granularity, count, "Requesting OANDA candles");
        let count_param = count.to_string();
        let resp = self
            .http
            .get(self.candles_url(instrument))
            .bearer_auth(&self.access_token)
            .query(&[
                ("granularity", granularity.code()),
                ("count", count_param.as_str()),
                ("price", "M"),
            ])
            .send()
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::DataUnavailable(format!("HTTP {status}: {body}")));
        }

        let candles = parse_candles(&body)?;
        if candles.len() < count {
            return Err(Error::DataUnavailable(format!(
                "requested {count} {granularity} candles, got {}",
                candles.len()
            )));
        }
        Ok(candles)
    }
}

fn parse_candles(body: &str) -> Result<Vec<Candle>> {
    let resp: CandlesResponse =
        serde_json::from_str(body).map_err(|e| Error::DataUnavailable(e.to_string()))?;

    resp.candles
        .into_iter()
        .map(|c| {
            let mid = c.mid.ok_or_else(|| {
                Error::DataUnavailable(format!("candle at {} has no mid prices", c.time))
            })?;
            Ok(Candle::new(
                parse_price(&mid.o)?,
                parse_price(&mid.h)?,
                parse_price(&mid.l)?,
                parse_price(&mid.c)?,
            ))
        })
        .collect()
}

fn parse_price(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::DataUnavailable(format!("bad price '{raw}': {e}")))
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CandlesResponse {
    candles: Vec<CandleEntry>,
}

#[derive(Deserialize)]
struct CandleEntry {
    #[serde(default)]
    time: String,
    mid: Option<PriceBar>,
}

/// OANDA sends prices as decimal strings.
#[derive(Deserialize)]
struct PriceBar {
    o: String,
    h: String,
    l: String,
    c: String,
}
