// Event Emitter Port
// The job engine's event bus; persists step events for audit

use crate::context::ExecContext;
use crate::domain::EventData;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("event emission failed: {0}")]
pub struct EmitError(pub String);

/// Event emitter (job engine collaborator); the bus adds the emission timestamp
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, ctx: &ExecContext, data: EventData) -> Result<(), EmitError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    /// Records every event with the time it was received
    #[derive(Default)]
    pub struct RecordingEmitter {
        events: Mutex<Vec<(DateTime<Utc>, EventData)>>,
    }

    impl RecordingEmitter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<EventData> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(_, e)| e.clone())
                .collect()
        }

        pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
            self.events.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl EventEmitter for RecordingEmitter {
        async fn emit(&self, _ctx: &ExecContext, data: EventData) -> Result<(), EmitError> {
            self.events.lock().unwrap().push((Utc::now(), data));
            Ok(())
        }
    }

    /// Rejects every event
    pub struct FailingEmitter;

    #[async_trait]
    impl EventEmitter for FailingEmitter {
        async fn emit(&self, _ctx: &ExecContext, data: EventData) -> Result<(), EmitError> {
            Err(EmitError(format!("event bus unavailable for '{}'", data.name)))
        }
    }
}
