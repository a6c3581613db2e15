pub mod config;
pub mod delivery;
pub mod error;
pub mod market;
pub mod registry;
pub mod types;

pub use config::{Config, CrtRule, SignalSettings, TwilioConfig};
pub use delivery::{BroadcastOutcome, BroadcastSender, DirectSender, RecipientSource};
pub use error::{Error, Result};
pub use market::{CandleSource, Clock, SystemClock};
pub use registry::{SqliteSubscriberStore, SubscriberRegistry, SubscriberStore};
pub use types::*;
