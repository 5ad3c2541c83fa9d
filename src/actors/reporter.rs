//! Reporter actor: runs one reporter's lifecycle against its event queue.

use super::bus::Subscriber;
use crate::config::SmokerConfig;
use crate::domain::SmokerEvent;
use crate::error::ReporterError;
use crate::plugin::{Component, Reporter, ReporterContext};
use crate::services::guarded;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Drives one reporter.
///
/// Events arriving while `setup` runs wait in the queue and are delivered
/// in order afterwards.
pub struct ReporterActor {
    reporter: Component<dyn Reporter>,
    ctx: ReporterContext,
    queue: mpsc::UnboundedReceiver<Arc<SmokerEvent>>,
}

impl ReporterActor {
    /// Create the actor and the queue the bus should feed
    pub fn new(reporter: Component<dyn Reporter>, config: Arc<SmokerConfig>) -> (Self, Subscriber) {
        let (tx, queue) = mpsc::unbounded_channel();
        let ctx = ReporterContext {
            id: reporter.id.clone(),
            config,
        };
        (
            Self {
                reporter,
                ctx,
                queue,
            },
            tx,
        )
    }

    /// Id of the driven reporter
    pub fn id(&self) -> &str {
        &self.reporter.id
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<Vec<ReporterError>> {
        tokio::spawn(self.run())
    }

    /// Run until the terminal event, returning every hook failure
    pub async fn run(mut self) -> Vec<ReporterError> {
        let reporter = Arc::clone(&self.reporter.payload);
        let mut errors = Vec::new();

        if let Err(message) = guarded(reporter.setup(&self.ctx)).await {
            tracing::warn!("Reporter {} failed to set up: {}", self.ctx.id, message);
            errors.push(self.error("setup", message));
            return errors;
        }

        while let Some(event) = self.queue.recv().await {
            if let Err(message) = guarded(reporter.on_event(&self.ctx, &event)).await {
                tracing::warn!("Reporter {} failed on {}: {}", self.ctx.id, event.kind(), message);
                errors.push(self.error(event.kind(), message));
            }
            if event.is_terminal() {
                break;
            }
        }

        if let Err(message) = guarded(reporter.teardown(&self.ctx)).await {
            tracing::warn!("Reporter {} failed to tear down: {}", self.ctx.id, message);
            errors.push(self.error("teardown", message));
        }
        errors
    }

    fn error(&self, hook: &str, message: String) -> ReporterError {
        ReporterError {
            reporter: self.ctx.id.clone(),
            hook: hook.to_string(),
            message,
        }
    }
}
