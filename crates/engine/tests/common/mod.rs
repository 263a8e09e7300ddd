//! Shared helpers for the engine integration suites.
#![allow(dead_code)] // each test binary uses a different subset

use std::sync::Arc;

use mizzen_engine::{DeliveryMode, Engine, EngineListener};
use mizzen_execution::EngineEvent;
use parking_lot::Mutex;

/// Records every event it sees, rendered as `kind` or `kind(task)` /
/// `kind(task#index)` for work item events.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rendered(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn contains(&self, rendered: &str) -> bool {
        self.events.lock().iter().any(|e| e == rendered)
    }

    pub fn count_of(&self, rendered: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == rendered).count()
    }

    /// Index of the first occurrence, for ordering assertions.
    pub fn position(&self, rendered: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == rendered)
    }
}

impl EngineListener for EventLog {
    fn on_event(
        &self,
        event: &EngineEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().push(render(event));
        Ok(())
    }
}

pub fn render(event: &EngineEvent) -> String {
    match event.work_item() {
        Some(item) => match item.index {
            Some(i) => format!("{}({}#{i})", event.kind(), item.task),
            None => format!("{}({})", event.kind(), item.task),
        },
        None => event.kind().to_string(),
    }
}

/// Attach a deferred event log to an engine.
pub fn attach_log(engine: &Engine) -> Arc<EventLog> {
    let log = EventLog::new();
    engine.register_listener(log.clone(), DeliveryMode::Deferred);
    log
}
