//! The event bus.
//!
//! Actors emit through cloned [`EventSender`]s into one channel. A single
//! writer task drains it and fans each event out to one unbounded queue per
//! reporter, so every reporter observes the same order.

use crate::domain::SmokerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Queue feeding one reporter
pub type Subscriber = mpsc::UnboundedSender<Arc<SmokerEvent>>;

/// Handle actors use to place events on the bus
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SmokerEvent>,
}

impl EventSender {
    /// Place an event on the bus
    pub fn emit(&self, event: SmokerEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("Event bus closed, dropping {}", e.0.kind());
        }
    }
}

/// The running bus
#[derive(Debug)]
pub struct EventBus {
    sender: EventSender,
    writer: JoinHandle<usize>,
}

impl EventBus {
    /// Start the writer task for the given reporter queues
    pub fn start(subscribers: Vec<(String, Subscriber)>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(pump(rx, subscribers));
        Self {
            sender: EventSender { tx },
            writer,
        }
    }

    /// A new sender for an actor
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Emit directly from the bus owner
    pub fn emit(&self, event: SmokerEvent) {
        self.sender.emit(event);
    }

    /// Wait for the writer to deliver everything up to the terminal event.
    ///
    /// Returns the number of events written.
    pub async fn finish(self) -> usize {
        drop(self.sender);
        match self.writer.await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Event bus writer failed: {}", e);
                0
            }
        }
    }
}

async fn pump(
    mut rx: mpsc::UnboundedReceiver<SmokerEvent>,
    mut subscribers: Vec<(String, Subscriber)>,
) -> usize {
    let mut written = 0;
    while let Some(event) = rx.recv().await {
        written += 1;
        tracing::debug!("Event {}", event.kind());
        let terminal = event.is_terminal();
        let event = Arc::new(event);

        subscribers.retain(|(id, queue)| {
            let delivered = queue.send(Arc::clone(&event)).is_ok();
            if !delivered {
                tracing::debug!("Reporter {} stopped listening", id);
            }
            delivered
        });

        if terminal {
            break;
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SmokeResults;

    fn skipped(script: &str) -> SmokerEvent {
        SmokerEvent::ScriptSkipped {
            pkg_manager: "npm@9.0.0".to_string(),
            package: "pkg@1.0.0".to_string(),
            script: script.to_string(),
        }
    }

    fn kinds(rx: &mut mpsc::UnboundedReceiver<Arc<SmokerEvent>>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(match &*event {
                SmokerEvent::ScriptSkipped { script, .. } => script.clone(),
                other => other.kind().to_string(),
            });
        }
        out
    }

    #[tokio::test]
    async fn test_fan_out_preserves_order() {
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let bus = EventBus::start(vec![("a".to_string(), a_tx), ("b".to_string(), b_tx)]);

        let sender = bus.sender();
        sender.emit(skipped("one"));
        sender.emit(skipped("two"));
        bus.emit(SmokerEvent::SmokeOk {
            results: Box::new(SmokeResults::aggregate(Vec::new(), Vec::new(), false)),
        });
        // Written after the terminal event; never delivered
        sender.emit(skipped("late"));

        assert_eq!(bus.finish().await, 3);
        let expected = vec!["one", "two", "smoke-ok"];
        assert_eq!(kinds(&mut a_rx), expected);
        assert_eq!(kinds(&mut b_rx), expected);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        drop(a_rx);
        let bus = EventBus::start(vec![("a".to_string(), a_tx), ("b".to_string(), b_tx)]);

        bus.emit(skipped("one"));
        bus.emit(SmokerEvent::SmokeError {
            error: "boom".to_string(),
        });

        bus.finish().await;
        assert_eq!(kinds(&mut b_rx), vec!["one", "smoke-error"]);
    }
}
