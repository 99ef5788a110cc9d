//! Update dispatch.
//!
//! Every update walks the priority groups in ascending order. Within a
//! group, candidates are tried in registration order until one's filter
//! passes; that handler's [`Propagation`] decides what happens next. A
//! failing handler or filter is logged and never takes down its siblings.

mod handler;
mod rate_limit;
mod router;
mod spec;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Error;
use tracing::{debug, error, warn};

use crate::bot::{AppState, Update, UpdateKind};
use crate::error::{BackupError, DispatchError, ProtocolError};
use crate::filters::{FilterContext, Scratch};
use crate::plugins::PluginRegistry;

pub use handler::{Context, Handler, Propagation};
pub use rate_limit::RateLimiter;
pub use router::{Registration, Router};
pub use spec::{Binder, CommandSpec};

/// Summary of one dispatch, mostly for tests and debug logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub invoked: usize,
    pub failed: usize,
    pub stopped_early: bool,
    /// Not processed at all: shutting down or rate limited.
    pub dropped: bool,
}

pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    limiter: RateLimiter,
    stopping: AtomicBool,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        let limiter = RateLimiter::new(&registry.state().caches);
        Self {
            registry,
            limiter,
            stopping: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Refuse every update from now on.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub async fn dispatch(&self, update: Update) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if self.is_stopping() {
            outcome.dropped = true;
            return outcome;
        }

        let state = self.registry.state();
        let kind = update.kind();
        let invoker = update.sender().map(|s| s.id);
        let limited_invoker = invoker.filter(|id| !state.staff.is_staff(*id));

        if kind == UpdateKind::Command
            && let Some(user_id) = limited_invoker
            && self.limiter.is_limited(user_id)
        {
            debug!("Dropping command from rate limited user {}", user_id);
            outcome.dropped = true;
            return outcome;
        }

        let update = Arc::new(update);
        for (group, candidates) in self.registry.router().candidates(kind) {
            for registration in candidates {
                let mut scratch = Scratch::default();
                if !self.passes(&registration, &update, state, &mut scratch).await {
                    continue;
                }

                if !self.registry.is_loaded(&registration.owner) {
                    let e = DispatchError::Unroutable {
                        owner: registration.owner.to_string(),
                        handler: registration.name.clone(),
                    };
                    error!("{}", e);
                    continue;
                }

                debug!(
                    "Invoking {}::{} in group {}",
                    registration.owner, registration.name, group
                );
                let ctx = Context {
                    state: state.clone(),
                    update: Arc::clone(&update),
                    scratch,
                    registry: Arc::clone(&self.registry),
                };
                outcome.invoked += 1;
                let result = registration.handler.handle(ctx).await;

                if registration.kind == UpdateKind::Command
                    && let Some(user_id) = limited_invoker
                {
                    self.limiter.record(user_id);
                }

                match result {
                    Ok(Propagation::Stop) => {
                        outcome.stopped_early = true;
                        return outcome;
                    }
                    Ok(Propagation::ForceContinue) => continue,
                    Ok(Propagation::Continue) => break,
                    Err(e) => {
                        outcome.failed += 1;
                        self.report(&registration, &update, state, &e).await;
                        break;
                    }
                }
            }
        }
        outcome
    }

    /// Evaluate a candidate's filter. Errors count as a denial.
    async fn passes(
        &self,
        registration: &Registration,
        update: &Update,
        state: &AppState,
        scratch: &mut Scratch,
    ) -> bool {
        let Some(filter) = &registration.filter else {
            return true;
        };
        let mut ctx = FilterContext {
            update,
            state,
            scratch,
        };
        match filter.check(&mut ctx).await {
            Ok(passed) => passed,
            Err(e) => {
                error!(
                    chat = ?update.chat_id(),
                    plugin = %registration.owner,
                    handler = %registration.name,
                    "Filter {} failed: {:#}",
                    filter.name(),
                    e
                );
                false
            }
        }
    }

    async fn report(&self, registration: &Registration, update: &Update, state: &AppState, e: &Error) {
        let chat = update.chat_id();
        let invoker = update.sender().map(|s| s.id);
        let input = update.text().unwrap_or_default();

        if let Some(protocol) = e.downcast_ref::<ProtocolError>()
            && protocol.is_transient()
        {
            warn!(
                ?chat,
                ?invoker,
                input,
                plugin = %registration.owner,
                handler = %registration.name,
                "Handler gave up: {}",
                protocol
            );
            return;
        }

        error!(
            ?chat,
            ?invoker,
            input,
            plugin = %registration.owner,
            handler = %registration.name,
            "Handler failed: {:#}",
            e
        );

        if e.downcast_ref::<BackupError>().is_some()
            && let Some(chat_id) = chat
        {
            let text = state.text(chat_id, "error-generic", &[]).await;
            let reply_to = update.message().map(|m| m.message_id);
            if let Err(e) = state.client.send_message(chat_id, &text, reply_to).await {
                warn!("Failed to report error to chat {}: {}", chat_id, e);
            }
        }
    }
}
