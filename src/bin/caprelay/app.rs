use std::path::PathBuf;
use std::sync::Arc;

use caprelay::Result;
use caprelay::config::Config;
use caprelay::feed::FeedClient;
use caprelay::monitor::FailureMonitor;
use caprelay::scheduler::{Scheduler, SchedulerSettings};
use caprelay::server::{self, AppState};
use caprelay::sinks::{BroadcastSink, Dispatcher, PushSink, Sink, TelegramSink};
use caprelay::store::HistoryStore;
use caprelay::telemetry::init_tracing;
use tracing::{info, warn};

use super::cli::Cli;

const DEFAULT_CONFIG: &str = "config.toml";

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.log_filter.as_deref(), cli.json_logs)?;

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = Config::from_env_and_file(&config_path)?;

    if let Some(interval) = cli.interval {
        config.poll_interval = interval;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let client = FeedClient::new(
        config.feed.url.clone(),
        config.feed.request_timeout,
        config.feed.connect_timeout,
    )?;

    let broadcast = Arc::new(BroadcastSink::new(config.broadcast_capacity));
    let events = broadcast.sender();
    let mut sinks: Vec<Arc<dyn Sink>> = vec![broadcast as Arc<dyn Sink>];

    let mut telegram: Option<Arc<TelegramSink>> = None;
    if let Some(settings) = &config.telegram {
        let sink = Arc::new(TelegramSink::new(
            &settings.api_url,
            &settings.token,
            settings.chat_id.clone(),
            config.sink_timeout,
        )?);
        telegram = Some(Arc::clone(&sink));
        sinks.push(sink);
    } else {
        info!("telegram sink disabled, no bot token configured");
    }

    if let Some(settings) = &config.push {
        sinks.push(Arc::new(PushSink::new(
            settings.url.clone(),
            settings.api_key.clone(),
            settings.topic.clone(),
            config.sink_timeout,
        )?));
    } else {
        info!("push sink disabled, no api key configured");
    }

    let dispatcher = Arc::new(Dispatcher::new(sinks, config.sink_timeout, cli.dry_run));
    let store = Arc::new(HistoryStore::new());
    let monitor = Arc::new(FailureMonitor::default());

    let state = AppState {
        store: Arc::clone(&store),
        dispatcher: Arc::clone(&dispatcher),
        monitor: Arc::clone(&monitor),
        events,
    };
    let server = tokio::spawn(server::serve(config.server.bind, state));

    let settings = SchedulerSettings {
        poll_interval: config.poll_interval,
        idle_delay: config.idle_delay,
        liveness_every: config.liveness_every,
    };
    let mut scheduler = Scheduler::new(client, store, dispatcher, monitor, telegram, settings);

    if cli.once {
        scheduler.run_cycle().await;
    } else {
        scheduler.run().await;
    }

    server.abort();
    if let Ok(Err(err)) = server.await {
        warn!(error = %err, "http server terminated with an error");
    }

    Ok(())
}
