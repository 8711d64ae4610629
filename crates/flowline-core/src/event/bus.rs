//! Fan-out of engine lifecycle events.
//!
//! Every run publishes `ExecutionStarted`, then `StepStarted` and
//! `StepCompleted`/`StepFailed` per step, then `ExecutionFinished`. Events of
//! concurrent runs interleave on one bus; subscribers tell them apart by
//! [`EngineEvent::execution_id`].

use flowline_types::event::EngineEvent;
use tokio::sync::broadcast;

/// Broadcast channel shared by one or more engines.
///
/// Events are not buffered for late subscribers, and a subscriber more than
/// `capacity` events behind sees `Lagged` and skips ahead. Publishing never
/// blocks a run.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Send to whoever is subscribed; dropped when nobody is.
    pub fn publish(&self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("engine event dropped, no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::execution::ExecutionStatus;
    use uuid::Uuid;

    fn step_started(execution_id: Uuid, step: &str) -> EngineEvent {
        EngineEvent::StepStarted {
            execution_id,
            step_id: step.to_string(),
            tool: "noop".to_string(),
        }
    }

    #[tokio::test]
    async fn interleaved_runs_are_separable_by_execution_id() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let (run_a, run_b) = (Uuid::now_v7(), Uuid::now_v7());

        bus.publish(step_started(run_a, "fetch"));
        bus.publish(step_started(run_b, "fetch"));
        bus.publish(EngineEvent::ExecutionFinished {
            execution_id: run_a,
            status: ExecutionStatus::Completed,
            steps_executed: 1,
        });

        let mut of_a = Vec::new();
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            if event.execution_id() == run_a {
                of_a.push(event);
            }
        }
        assert_eq!(of_a.len(), 2);
        assert!(matches!(
            of_a[1],
            EngineEvent::ExecutionFinished { status: ExecutionStatus::Completed, .. }
        ));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(16);
        let run = Uuid::now_v7();
        bus.publish(step_started(run, "first"));

        let mut rx = bus.subscribe();
        bus.publish(step_started(run, "second"));

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::StepStarted { ref step_id, .. } if step_id == "second"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        let run = Uuid::now_v7();
        for i in 0..5 {
            bus.publish(step_started(run, &format!("s{i}")));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
    }

    #[test]
    fn clones_publish_to_the_same_subscribers() {
        let bus = EventBus::new(0);
        let _rx = bus.subscribe();
        let shared = bus.clone();
        assert_eq!(shared.subscriber_count(), 1);
        shared.publish(step_started(Uuid::now_v7(), "a"));
        assert!(format!("{bus:?}").contains("subscribers: 1"));
    }
}
