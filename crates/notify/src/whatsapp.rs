use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{DirectSender, Error, Recipient, Result, TwilioConfig};

const BASE_URL: &str = "https://api.twilio.com";

/// WhatsApp delivery through the Twilio Messages API.
pub struct TwilioWhatsApp {
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
    http: Client,
}

impl TwilioWhatsApp {
    pub fn new(cfg: &TwilioConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            account_sid: cfg.account_sid.clone(),
            auth_token: cfg.auth_token.clone(),
            from_number: whatsapp_address(&cfg.from_number),
            base_url: BASE_URL.to_string(),
            http,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

/// Twilio routes to WhatsApp only for `whatsapp:`-prefixed numbers.
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

#[async_trait]
impl DirectSender for TwilioWhatsApp {
    async fn send_direct(&self, recipient: &Recipient, text: &str) -> Result<()> {
        let to = whatsapp_address(recipient.as_str());
        let resp = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("From", self.from_number.as_str()),
                ("To", to.as_str()),
                ("Body", text),
            ])
            .send()
            .await
            .map_err(|e| Error::notification("whatsapp", e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::notification("whatsapp", e))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TwilioError>(&body)
                .map(|e| format!("HTTP {status}: {} (code {})", e.message, e.code.unwrap_or_default()))
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return Err(Error::notification("whatsapp", reason));
        }

        let sid = serde_json::from_str::<MessageResponse>(&body)
            .map(|m| m.sid)
            .unwrap_or_default();
        debug!(%to, %sid, "WhatsApp message accepted");
        Ok(())
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Deserialize)]
struct TwilioError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}
