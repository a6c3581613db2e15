use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Candle fetch failed or returned fewer bars than requested.
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    /// A notification channel could not deliver a message.
    #[error("Notification failed on {channel}: {reason}")]
    NotificationFailure { channel: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn notification(channel: impl Into<String>, reason: impl ToString) -> Self {
        Error::NotificationFailure {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
