//! Competitor intelligence digest bot.
//!
//! Mines Gong call transcripts for externally-voiced competitor mentions,
//! synthesizes them into insights alongside public market signals, and
//! routes the weekly digest through a Slack approval flow before posting.

pub mod competitors;
pub mod compose;
pub mod config;
pub mod digest;
pub mod error;
pub mod gong;
pub mod handlers;
pub mod market_intel;
pub mod mentions;
pub mod pipeline;
pub mod render;
pub mod retry;
pub mod scheduler;
pub mod slack;
pub mod store;
pub mod synthesizer;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::BotError;
use crate::gong::GongClient;
use crate::handlers::Handler;
use crate::market_intel::{IntelProvider, MarketIntelCollector};
use crate::pipeline::{GenerationGate, Pipeline, Trigger};
use crate::slack::{ChatPlatform, SlackClient};
use crate::store::DigestStore;
use crate::synthesizer::{InsightSynthesizer, OpenAiClient};

/// Wire up clients, channels, and tasks, then run until a task stops.
///
/// `run_immediately` queues one generation at startup in addition to the
/// cron cadence.
pub async fn run(config: Config, run_immediately: bool) -> Result<(), BotError> {
    let config = Arc::new(config);

    let schedule = scheduler::parse_cron(&config.digest_cron)?;
    let tz = scheduler::parse_timezone(&config.timezone)?;

    let platform: Arc<dyn ChatPlatform> =
        Arc::new(SlackClient::new(config.slack_bot_token.clone()));
    let llm = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    ));
    let gong = GongClient::new(
        config.gong_base_url.clone(),
        config.gong_access_key.clone(),
        config.gong_secret_key.clone(),
    );

    let store = DigestStore::new();
    let gate = GenerationGate::new();

    // Capacity 1: at most one generation pending behind the running one.
    let (trigger_tx, trigger_rx) = mpsc::channel::<Trigger>(1);
    let (event_tx, event_rx) = mpsc::channel(32);

    let pipeline = Arc::new(Pipeline {
        gong,
        synthesizer: llm.clone() as Arc<dyn InsightSynthesizer>,
        intel: Arc::new(MarketIntelCollector::new(llm)) as Arc<dyn IntelProvider>,
        platform: platform.clone(),
        store: store.clone(),
        config: config.clone(),
    });

    if run_immediately {
        log::info!("Immediate generation requested");
        if trigger_tx.send(Trigger::Scheduled).await.is_err() {
            return Err(BotError::ChatPlatform(
                "trigger channel closed before startup".to_string(),
            ));
        }
    }

    let worker = tokio::spawn(pipeline::run_worker(pipeline, gate.clone(), trigger_rx));
    let sched = tokio::spawn(scheduler::run(schedule, tz, trigger_tx.clone()));

    let handler = Handler::new(store, platform, config, trigger_tx, gate);
    let events = tokio::spawn(handler.run(event_rx));
    let _bridge = slack::spawn_stdin_events(event_tx);

    log::info!("Competitor digest bot running");

    tokio::select! {
        _ = worker => log::info!("Generation worker stopped"),
        _ = sched => log::info!("Scheduler stopped"),
        _ = events => log::info!("Event handler stopped"),
    }

    Ok(())
}
