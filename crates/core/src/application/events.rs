// Event Emitter Adapter
// Serializes payloads and hands them to the event bus, restricted to the
// step's declared allow-list.

use crate::context::ExecContext;
use crate::domain::{EventData, EventName, Target};
use crate::error::{Result, StepError};
use crate::port::EventEmitter;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub struct StepEmitter {
    allowed: &'static [EventName],
    emitter: Arc<dyn EventEmitter>,
}

impl StepEmitter {
    /// Fails if any of `emits` is missing from `allowed`
    pub fn new(
        allowed: &'static [EventName],
        emits: &[EventName],
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self> {
        if let Some(missing) = emits.iter().find(|name| !allowed.contains(name)) {
            return Err(StepError::Config(format!(
                "event '{}' is emitted but not in the registered event list {:?}",
                missing,
                allowed.iter().map(EventName::as_str).collect::<Vec<_>>()
            )));
        }
        Ok(Self { allowed, emitter })
    }

    pub async fn emit<P: Serialize + ?Sized>(
        &self,
        ctx: &ExecContext,
        name: EventName,
        payload: &P,
        target: &Target,
    ) -> Result<()> {
        if !self.allowed.contains(&name) {
            return Err(StepError::Event(format!(
                "event '{}' is not registered for this step",
                name
            )));
        }

        let payload = serde_json::to_string(payload)?;
        debug!(event = %name, target = %target, bytes = payload.len(), "Emitting event");

        let data = EventData {
            name,
            target: target.clone(),
            payload,
        };
        self.emitter
            .emit(ctx, data)
            .await
            .map_err(|e| StepError::Event(format!("cannot emit event '{}': {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventPayload, EVENT_STDERR, EVENT_STDOUT};
    use crate::port::event_emitter::mocks::{FailingEmitter, RecordingEmitter};
    use serde::ser::Error as _;

    const ONLY_STDOUT: &[EventName] = &[EVENT_STDOUT];
    const BOTH: &[EventName] = &[EVENT_STDOUT, EVENT_STDERR];

    #[test]
    fn test_construction_checks_allow_list() {
        let err = StepEmitter::new(
            ONLY_STDOUT,
            &[EVENT_STDOUT, EVENT_STDERR],
            Arc::new(RecordingEmitter::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StepError::Config(_)));
        assert!(err.to_string().contains("Stderr"));
    }

    #[tokio::test]
    async fn test_emit_serializes_payload() {
        let recorder = Arc::new(RecordingEmitter::new());
        let emitter = StepEmitter::new(BOTH, BOTH, recorder.clone()).unwrap();
        let target = Target::new("t1");

        emitter
            .emit(
                &ExecContext::background(),
                EVENT_STDOUT,
                &EventPayload::new("hello \"world\""),
                &target,
            )
            .await
            .unwrap();

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EVENT_STDOUT);
        assert_eq!(events[0].target, target);
        assert_eq!(events[0].payload, r#"{"Msg":"hello \"world\""}"#);
    }

    #[tokio::test]
    async fn test_unregistered_name_rejected() {
        let recorder = Arc::new(RecordingEmitter::new());
        let emitter = StepEmitter::new(ONLY_STDOUT, &[], recorder.clone()).unwrap();

        let err = emitter
            .emit(
                &ExecContext::background(),
                EVENT_STDERR,
                &EventPayload::new("x"),
                &Target::new("t1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Event(_)));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_emitter_failure_propagates() {
        let emitter = StepEmitter::new(BOTH, BOTH, Arc::new(FailingEmitter)).unwrap();
        let err = emitter
            .emit(
                &ExecContext::background(),
                EVENT_STDOUT,
                &EventPayload::new("x"),
                &Target::new("t1"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot emit event 'Stdout'"));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _s: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to serialize"))
        }
    }

    #[tokio::test]
    async fn test_serialization_failure() {
        let emitter = StepEmitter::new(BOTH, BOTH, Arc::new(RecordingEmitter::new())).unwrap();
        let err = emitter
            .emit(
                &ExecContext::background(),
                EVENT_STDOUT,
                &Unserializable,
                &Target::new("t1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Serialization(_)));
    }
}
