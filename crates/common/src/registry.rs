use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::info;

use crate::{Error, Recipient, RecipientSource, Result};

/// Persistence for the subscriber set.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn load(&self) -> Result<BTreeSet<Recipient>>;

    async fn save(&self, recipients: &BTreeSet<Recipient>) -> Result<()>;
}

/// SQLite-backed subscriber store.
pub struct SqliteSubscriberStore {
    db: SqlitePool,
}

impl SqliteSubscriberStore {
    /// Connect and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        // In-memory databases exist per connection, so keep the pool at one.
        let db = SqlitePoolOptions::new()
            .max_connections(if database_url.contains(":memory:") { 1 } else { 4 })
            .connect(database_url)
            .await?;
        sqlx::migrate!("../../migrations").run(&db).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl SubscriberStore for SqliteSubscriberStore {
    async fn load(&self) -> Result<BTreeSet<Recipient>> {
        let rows = sqlx::query("SELECT recipient FROM subscribers")
            .fetch_all(&self.db)
            .await?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("recipient")
                    .map(Recipient::new)
                    .map_err(Error::from)
            })
            .collect()
    }

    async fn save(&self, recipients: &BTreeSet<Recipient>) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let existing: BTreeSet<Recipient> = sqlx::query("SELECT recipient FROM subscribers")
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("recipient").map(Recipient::new))
            .collect::<Result<_, sqlx::Error>>()?;

        for gone in existing.difference(recipients) {
            sqlx::query("DELETE FROM subscribers WHERE recipient = ?1")
                .bind(gone.as_str())
                .execute(&mut *tx)
                .await?;
        }
        for added in recipients.difference(&existing) {
            sqlx::query("INSERT INTO subscribers (recipient) VALUES (?1) ON CONFLICT(recipient) DO NOTHING")
                .bind(added.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// The set of broadcast recipients.
///
/// Mutations hold the write lock across persistence, so concurrent
/// subscribe/unsubscribe calls are applied and saved one at a time and a
/// reader never observes a half-applied change.
pub struct SubscriberRegistry {
    store: Arc<dyn SubscriberStore>,
    members: RwLock<BTreeSet<Recipient>>,
}

impl SubscriberRegistry {
    /// Load the persisted set once at startup.
    pub async fn load(store: Arc<dyn SubscriberStore>) -> Result<Self> {
        let members = store.load().await?;
        info!(count = members.len(), "Subscriber registry loaded");
        Ok(Self {
            store,
            members: RwLock::new(members),
        })
    }

    /// Add a recipient. Returns `false` if it was already subscribed.
    pub async fn add(&self, recipient: Recipient) -> Result<bool> {
        let mut members = self.members.write().await;
        if members.contains(&recipient) {
            return Ok(false);
        }
        let mut next = members.clone();
        next.insert(recipient.clone());
        self.store.save(&next).await?;
        *members = next;
        info!(recipient = %recipient, "Subscriber added");
        Ok(true)
    }

    /// Remove a recipient. Returns `false` if it was not subscribed.
    pub async fn remove(&self, recipient: &Recipient) -> Result<bool> {
        let mut members = self.members.write().await;
        if !members.contains(recipient) {
            return Ok(false);
        }
        let mut next = members.clone();
        next.remove(recipient);
        self.store.save(&next).await?;
        *members = next;
        info!(recipient = %recipient, "Subscriber removed");
        Ok(true)
    }

    pub async fn contains(&self, recipient: &Recipient) -> bool {
        self.members.read().await.contains(recipient)
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

#[async_trait]
impl RecipientSource for SubscriberRegistry {
    async fn snapshot(&self) -> BTreeSet<Recipient> {
        self.members.read().await.clone()
    }
}
