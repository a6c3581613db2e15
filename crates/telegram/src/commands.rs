use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tokio::sync::RwLock;
use tracing::{error, info};

use common::{EngineState, Recipient, SubscriberRegistry};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub registry: Arc<SubscriberRegistry>,
    pub engine_state: Arc<RwLock<EngineState>>,
    pub instrument: String,
}

/// Telegram commands exposed to subscribers.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "CRT alert bot commands:")]
pub enum Command {
    #[command(description = "Show this help")]
    Help,
    #[command(description = "Introduce the bot")]
    Start,
    #[command(description = "Receive CRT alerts in this chat")]
    Subscribe,
    #[command(description = "Stop receiving CRT alerts")]
    Unsubscribe,
    #[command(description = "Show bot and subscription status")]
    Status,
}

/// Start the Telegram command listener in long-polling mode.
///
/// Runs independently of the scheduler; the registry is the only state
/// the two share.
pub async fn start_bot(token: String, deps: BotDeps) {
    let bot = Bot::new(token);
    let deps = Arc::new(deps);

    info!("Telegram command listener starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(handle_help))
        .branch(case![Command::Start].endpoint(handle_start))
        .branch(case![Command::Subscribe].endpoint(handle_subscribe))
        .branch(case![Command::Unsubscribe].endpoint(handle_unsubscribe))
        .branch(case![Command::Status].endpoint(handle_status));

    Update::filter_message().branch(command_handler)
}

async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

async fn handle_start(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let text = format!(
        "CRT alert bot for {}.\n\
         Send /subscribe to receive Bullish/Bearish CRT alerts in this chat.",
        deps.instrument
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_subscribe(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let recipient = Recipient::from(msg.chat.id.0);
    let reply = match deps.registry.add(recipient.clone()).await {
        Ok(added) => subscribe_reply(added),
        Err(e) => {
            error!(%recipient, error = %e, "Failed to persist subscription");
            "Subscription failed, please try again later."
        }
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_unsubscribe(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let recipient = Recipient::from(msg.chat.id.0);
    let reply = match deps.registry.remove(&recipient).await {
        Ok(removed) => unsubscribe_reply(removed),
        Err(e) => {
            error!(%recipient, error = %e, "Failed to persist unsubscription");
            "Unsubscribe failed, please try again later."
        }
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let state = *deps.engine_state.read().await;
    let subscribed = deps
        .registry
        .contains(&Recipient::from(msg.chat.id.0))
        .await;
    let text = status_text(&deps.instrument, state, subscribed);
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

fn subscribe_reply(added: bool) -> &'static str {
    if added {
        "Subscribed. CRT alerts will arrive in this chat."
    } else {
        "This chat is already subscribed."
    }
}

fn unsubscribe_reply(removed: bool) -> &'static str {
    if removed {
        "Unsubscribed. No more CRT alerts will be sent here."
    } else {
        "This chat was not subscribed."
    }
}

fn status_text(instrument: &str, state: EngineState, subscribed: bool) -> String {
    format!(
        "CRT Bot Status\n\
         Instrument: {instrument}\n\
         Scheduler: {state}\n\
         This chat: {}",
        if subscribed { "subscribed" } else { "not subscribed" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lowercase_commands() {
        assert_eq!(Command::parse("/subscribe", "crtbot").unwrap(), Command::Subscribe);
        assert_eq!(Command::parse("/unsubscribe", "crtbot").unwrap(), Command::Unsubscribe);
        assert_eq!(Command::parse("/status@crtbot", "crtbot").unwrap(), Command::Status);
        assert!(Command::parse("/buy", "crtbot").is_err());
    }

    #[test]
    fn replies_distinguish_repeat_requests() {
        assert_ne!(subscribe_reply(true), subscribe_reply(false));
        assert_ne!(unsubscribe_reply(true), unsubscribe_reply(false));
    }

    #[test]
    fn status_mentions_state_and_subscription() {
        let text = status_text("XAU_USD", EngineState::Idle, true);
        assert!(text.contains("XAU_USD"));
        assert!(text.contains("idle"));
        assert!(text.contains("This chat: subscribed"));
    }
}
