//! Event definitions and fan-in for task observers.
//!
//! Every pump and control operation reports through a shared `EventHub`, which
//! fans the per-task feeds into one stream tagged by task id. Observers (the
//! CLI printer, a tray UI, tests) subscribe and get their own channel; dropping
//! the returned `EventStream` cancels the subscription.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// An event on the supervisor's observable feed.
///
/// Events for a single task arrive in the order the task produced them;
/// interleaving between different tasks is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A decoded line of output (or an error report rendered as output).
    Output { task_id: String, line: String },
    /// The task transitioned between `Stopped` and `Running`.
    Status { task_id: String, running: bool },
}

impl TaskEvent {
    pub fn output(task_id: &str, line: impl Into<String>) -> Self {
        TaskEvent::Output {
            task_id: task_id.to_string(),
            line: line.into(),
        }
    }

    pub fn status(task_id: &str, running: bool) -> Self {
        TaskEvent::Status {
            task_id: task_id.to_string(),
            running,
        }
    }
}

/// Fan-in point for all task events.
///
/// Senders are unbounded so a slow or departed observer can never stall an
/// output pump; closed subscriptions are pruned on the next emit.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<TaskEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer. The subscription lives until the stream is
    /// dropped.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("subscriber list poisoned").push(tx);
        EventStream { rx }
    }

    /// Delivers an event to every live observer.
    pub fn emit(&self, event: TaskEvent) {
        let mut subscribers = self.subscribers.lock().expect("subscriber list poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// A cancellable subscription to the event feed. Drop it to unsubscribe.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl EventStream {
    /// Waits for the next event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        hub.emit(TaskEvent::output("t1", "hello"));
        assert_eq!(first.recv().await, Some(TaskEvent::output("t1", "hello")));
        assert_eq!(second.recv().await, Some(TaskEvent::output("t1", "hello")));
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let hub = EventHub::new();
        let stream = hub.subscribe();
        drop(stream);
        // Must not fail or block with no one listening.
        hub.emit(TaskEvent::status("t1", true));
        let mut live = hub.subscribe();
        hub.emit(TaskEvent::status("t1", false));
        assert_eq!(live.recv().await, Some(TaskEvent::status("t1", false)));
    }
}
