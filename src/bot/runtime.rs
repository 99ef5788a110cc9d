//! Bot runtime - receives updates in polling or webhook mode and feeds them
//! to the dispatch core until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::types::Update as TelegramUpdate;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::telegram::ThrottledBot;
use super::update::Update;
use super::webhook;
use crate::config::{BotMode, Config};
use crate::dispatcher::Dispatcher;
use crate::plugins::PluginRegistry;

/// How long queued worker-pool jobs get to finish on shutdown.
const POOL_GRACE: Duration = Duration::from_secs(1);

/// Dispatch tasks still running, so shutdown can abort them.
type InFlight = Arc<Mutex<JoinSet<()>>>;

/// Run the bot until ctrl-c or SIGTERM, then tear everything down.
pub async fn run(config: &Config, bot: ThrottledBot, registry: Arc<PluginRegistry>) -> Result<()> {
    let core = Arc::new(Dispatcher::new(Arc::clone(&registry)));
    let in_flight: InFlight = Arc::new(Mutex::new(JoinSet::new()));

    let mut listener = teloxide::dispatching::Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![Arc::clone(&core), Arc::clone(&in_flight)])
        .build();
    let token = listener.shutdown_token();

    let listening = match config.bot_mode {
        BotMode::Polling => {
            info!("Starting bot in polling mode...");
            tokio::spawn(async move { listener.dispatch().await })
        }
        BotMode::Webhook => {
            info!("Starting bot in webhook mode...");
            let updates = webhook::listener(config, &bot).await?;
            tokio::spawn(async move {
                listener
                    .dispatch_with_listener(
                        updates,
                        LoggingErrorHandler::with_custom_text("Error from update listener"),
                    )
                    .await
            })
        }
    };

    let state = registry.state();
    info!("Bot @{} is up", state.me.username);
    state.channel_log("bot started").await;

    shutdown_signal().await;
    info!("Shutting down...");

    core.stop();

    match token.shutdown() {
        Ok(done) => done.await,
        Err(e) => warn!("Update listener was not running: {}", e),
    }
    if let Err(e) = listening.await {
        warn!("Update listener task failed: {}", e);
    }

    state.store.close().await;

    let mut tasks = std::mem::take(&mut *in_flight.lock());
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    registry.unload_all().await;
    state.pool.shutdown(POOL_GRACE).await;

    info!("Shutdown complete");
    Ok(())
}

/// Every update goes to the dispatch core on its own task.
fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::endpoint(
        |update: TelegramUpdate, core: Arc<Dispatcher>, in_flight: InFlight| async move {
            let Some(update) = Update::from_telegram(&update) else {
                debug!("Ignoring unsupported update {}", update.id.0);
                return Ok(());
            };
            let mut tasks = in_flight.lock();
            while tasks.try_join_next().is_some() {}
            tasks.spawn(async move {
                core.dispatch(update).await;
            });
            Ok(())
        },
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
