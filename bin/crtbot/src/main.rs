use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    CandleSource, Config, EngineState, Recipient, SqliteSubscriberStore, SubscriberRegistry,
    SystemClock,
};
use engine::{EvaluationScheduler, OandaClient, SignalPipeline};
use notify::{Channel, NotificationDispatcher, TwilioWhatsApp};
use strategy::build_classifier;
use telegram_ctrl::{start_bot, BotDeps, TelegramSender};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "CRT bot failed to start");
        std::process::exit(1);
    }
}

async fn run() -> common::Result<()> {
    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let settings = cfg.signal.clone();
    info!(
        instrument = %settings.instrument,
        granularities = ?settings.granularities,
        time_zone = %settings.time_zone,
        "CRT bot starting"
    );
    if settings.test_override_window {
        warn!("Trading window override active, evaluating around the clock");
    }

    // ── Subscriber registry ───────────────────────────────────────────────────
    let store = SqliteSubscriberStore::connect(&cfg.database_url).await?;
    let registry = Arc::new(SubscriberRegistry::load(Arc::new(store)).await?);

    // ── Notification channels ─────────────────────────────────────────────────
    let mut dispatcher = NotificationDispatcher::new(settings.send_timeout());

    if let Some(twilio) = &cfg.twilio {
        let whatsapp = TwilioWhatsApp::new(twilio, settings.send_timeout())?;
        dispatcher.add_channel(Channel::direct(
            "whatsapp",
            Arc::new(whatsapp),
            Recipient::new(twilio.to_number.clone()),
        ));
    }

    if let Some(token) = &cfg.telegram_token {
        let telegram = TelegramSender::new(token.clone(), settings.send_timeout())?;
        dispatcher.add_channel(Channel::broadcast(
            "telegram",
            Arc::new(telegram),
            registry.clone(),
        ));
    }

    if dispatcher.is_empty() {
        warn!("No notification channels configured; signals will only be logged");
    }

    // ── Pipeline + scheduler ──────────────────────────────────────────────────
    let source: Arc<dyn CandleSource> = Arc::new(OandaClient::new(
        cfg.oanda_base_url.clone(),
        cfg.oanda_access_token.clone(),
        settings.fetch_timeout(),
    )?);
    let pipeline = SignalPipeline::new(
        settings.instrument.clone(),
        source,
        build_classifier(&settings),
        dispatcher,
    )
    .with_fetch_timeout(settings.fetch_timeout())
    .with_candle_count(settings.candle_count);

    let engine_state = Arc::new(RwLock::new(EngineState::Stopped));
    let scheduler = EvaluationScheduler::new(
        &settings,
        Arc::new(SystemClock),
        pipeline,
        engine_state.clone(),
    );

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    if let Some(token) = cfg.telegram_token.clone() {
        let deps = BotDeps {
            registry: registry.clone(),
            engine_state: engine_state.clone(),
            instrument: settings.instrument.clone(),
        };
        tokio::spawn(start_bot(token, deps));
    }

    let api_state = api::AppState {
        engine_state: engine_state.clone(),
        registry: registry.clone(),
        instrument: settings.instrument.clone(),
    };
    let port = cfg.status_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, port).await {
            error!(error = %e, "Status API stopped");
        }
    });

    tokio::spawn(scheduler.run());

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting.");
    Ok(())
}
