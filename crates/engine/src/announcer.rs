//! The announcer: distributes lifecycle events to registered listeners.
//!
//! Synchronous listeners run under the case lock, in transition order, and
//! must not call back into the engine for the same case. Deferred
//! listeners receive the same batch, in the same order, after the
//! triggering operation releases the lock. A listener failure never aborts
//! the engine operation: it is logged and re-announced as an
//! `exception_raised` event with the `listener_failure` code, and that
//! re-announcement is itself never re-entrant.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use mizzen_execution::EngineEvent;
use parking_lot::RwLock;

/// When a listener receives events relative to the triggering operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Under the case lock, as transitions happen. The listener must not
    /// call back into the engine for the same case.
    Synchronous,
    /// After the triggering operation returns, as a batch.
    Deferred,
}

/// A lifecycle event consumer.
pub trait EngineListener: Send + Sync {
    /// Handle one event. An `Err` is isolated and re-announced as a
    /// `listener_failure` exception event.
    fn on_event(&self, event: &EngineEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Handle returned at registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    mode: DeliveryMode,
    listener: Arc<dyn EngineListener>,
}

/// The listener registry and delivery fan-out.
#[derive(Default)]
pub struct Announcer {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl Announcer {
    /// An announcer with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener in the given delivery mode.
    pub fn register(&self, listener: Arc<dyn EngineListener>, mode: DeliveryMode) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration {
            id,
            mode,
            listener,
        });
        id
    }

    /// Remove a listener. Unknown ids are a no-op.
    pub fn unregister(&self, id: ListenerId) {
        self.registrations.write().retain(|r| r.id != id);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registrations.read().len()
    }

    /// Deliver a batch to synchronous listeners, in order. Returns the
    /// `listener_failure` exception events generated along the way so the
    /// caller can fold them into the deferred batch.
    pub fn announce_sync(&self, events: &[EngineEvent]) -> Vec<EngineEvent> {
        let mut failures = Vec::new();
        for event in events {
            self.deliver(event, DeliveryMode::Synchronous, &mut failures);
        }
        // Failure events reach synchronous listeners too, but a failure
        // while handling a failure event is only logged.
        for failure in &failures {
            self.deliver_exception(failure, DeliveryMode::Synchronous);
        }
        failures
    }

    /// Deliver a batch to deferred listeners, in order.
    pub fn announce_deferred(&self, events: &[EngineEvent]) {
        let mut failures = Vec::new();
        for event in events {
            self.deliver(event, DeliveryMode::Deferred, &mut failures);
        }
        for failure in &failures {
            self.deliver_exception(failure, DeliveryMode::Deferred);
        }
    }

    fn deliver(&self, event: &EngineEvent, mode: DeliveryMode, failures: &mut Vec<EngineEvent>) {
        let registrations = self.registrations.read();
        for registration in registrations.iter().filter(|r| r.mode == mode) {
            if let Err(err) = registration.listener.on_event(event) {
                tracing::warn!(
                    kind = event.kind(),
                    case = %event.case_id(),
                    error = %err,
                    "listener failed; isolating"
                );
                failures.push(EngineEvent::ExceptionRaised {
                    timestamp: Utc::now(),
                    case: event.case_id(),
                    item: event.work_item().cloned(),
                    code: "listener_failure".into(),
                    message: err.to_string(),
                });
            }
        }
    }

    fn deliver_exception(&self, event: &EngineEvent, mode: DeliveryMode) {
        let registrations = self.registrations.read();
        for registration in registrations.iter().filter(|r| r.mode == mode) {
            if let Err(err) = registration.listener.on_event(event) {
                tracing::warn!(error = %err, "listener failed while handling listener_failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizzen_core::CaseId;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_on: None,
            })
        }

        fn failing_on(kind: &'static str) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_on: Some(kind),
            })
        }

        fn kinds(&self) -> Vec<String> {
            self.seen.lock().clone()
        }
    }

    impl EngineListener for Recorder {
        fn on_event(
            &self,
            event: &EngineEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.seen.lock().push(event.kind().to_string());
            if self.fail_on == Some(event.kind()) {
                return Err("induced failure".into());
            }
            Ok(())
        }
    }

    fn launched(case: u64) -> EngineEvent {
        EngineEvent::CaseLaunched {
            timestamp: Utc::now(),
            case: CaseId::root(case),
            spec: mizzen_core::SpecKey::new("u", "1"),
        }
    }

    fn completed(case: u64) -> EngineEvent {
        EngineEvent::CaseCompleted {
            timestamp: Utc::now(),
            case: CaseId::root(case),
        }
    }

    #[test]
    fn sync_listeners_see_events_in_order() {
        let announcer = Announcer::new();
        let recorder = Recorder::new();
        announcer.register(recorder.clone(), DeliveryMode::Synchronous);

        announcer.announce_sync(&[launched(1), completed(1)]);
        assert_eq!(recorder.kinds(), vec!["case_launched", "case_completed"]);
    }

    #[test]
    fn deferred_listeners_do_not_see_sync_delivery() {
        let announcer = Announcer::new();
        let deferred = Recorder::new();
        announcer.register(deferred.clone(), DeliveryMode::Deferred);

        announcer.announce_sync(&[launched(1)]);
        assert!(deferred.kinds().is_empty());

        announcer.announce_deferred(&[launched(1)]);
        assert_eq!(deferred.kinds(), vec!["case_launched"]);
    }

    #[test]
    fn listener_failure_is_isolated_and_reannounced() {
        let announcer = Announcer::new();
        let flaky = Recorder::failing_on("case_launched");
        let healthy = Recorder::new();
        announcer.register(flaky, DeliveryMode::Synchronous);
        announcer.register(healthy.clone(), DeliveryMode::Synchronous);

        let failures = announcer.announce_sync(&[launched(1), completed(1)]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind(), "exception_raised");

        // The healthy listener saw both events plus the failure event.
        assert_eq!(
            healthy.kinds(),
            vec!["case_launched", "case_completed", "exception_raised"]
        );
    }

    #[test]
    fn failure_during_failure_delivery_is_not_reentrant() {
        let announcer = Announcer::new();
        // Fails on the exception event itself.
        let flaky = Recorder::failing_on("exception_raised");
        let also_flaky = Recorder::failing_on("case_launched");
        announcer.register(also_flaky, DeliveryMode::Synchronous);
        announcer.register(flaky.clone(), DeliveryMode::Synchronous);

        // Terminates despite a failure while delivering the failure event.
        let failures = announcer.announce_sync(&[launched(1)]);
        assert_eq!(failures.len(), 1);
        assert_eq!(flaky.kinds(), vec!["case_launched", "exception_raised"]);
    }

    #[test]
    fn unregister_stops_delivery() {
        let announcer = Announcer::new();
        let recorder = Recorder::new();
        let id = announcer.register(recorder.clone(), DeliveryMode::Synchronous);
        announcer.announce_sync(&[launched(1)]);
        announcer.unregister(id);
        announcer.announce_sync(&[completed(1)]);
        assert_eq!(recorder.kinds(), vec!["case_launched"]);
        assert_eq!(announcer.listener_count(), 0);
    }
}
