// Per-target fan-out
// One task per target; a panicking runner must not take down its siblings.

use super::runner::TargetRunner;
use crate::context::ExecContext;
use crate::domain::Target;
use crate::error::{Result, StepError};
use crate::port::Step;
use std::sync::Arc;
use tracing::error;

/// Verdict for one target
#[derive(Debug)]
pub struct TargetResult {
    pub target: Target,
    pub result: Result<()>,
}

/// Run `runner` against every target concurrently; results keep input order
pub async fn for_each_target<S>(
    ctx: &ExecContext,
    runner: Arc<TargetRunner<S>>,
    targets: Vec<Target>,
) -> Vec<TargetResult>
where
    S: Step + 'static,
{
    let handles: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let runner = Arc::clone(&runner);
            let ctx = ctx.child();
            let task_target = target.clone();
            let handle = tokio::spawn(async move { runner.run(&ctx, &task_target).await });
            (target, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (target, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                // Task panicked or was cancelled
                if join_err.is_panic() {
                    error!(target = %target, "Target runner panicked: {:?}", join_err);
                } else {
                    error!(target = %target, "Target runner cancelled: {:?}", join_err);
                }
                Err(StepError::Internal(format!(
                    "runner for {} did not complete: {}",
                    target, join_err
                )))
            }
        };
        results.push(TargetResult { target, result });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::capture::drive_process;
    use crate::application::registry::TransportRegistry;
    use crate::domain::{
        CapturedOutput, EventName, Outcome, StepOptions, TransportParameters, EVENT_STDERR,
        EVENT_STDOUT,
    };
    use crate::port::event_emitter::mocks::RecordingEmitter;
    use crate::port::transport::mocks::{
        FixedTransportFactory, ProcessScript, ScriptedSessionTransport,
    };
    use crate::port::Transport;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Params {
        transport: TransportParameters,
    }

    /// Panics on the target named "boom"
    struct FragileStep {
        raw: serde_json::Value,
        options: StepOptions,
    }

    #[async_trait]
    impl Step for FragileStep {
        type Params = Params;
        const NAME: &'static str = "Fragile";
        const EVENTS: &'static [EventName] = &[EVENT_STDOUT, EVENT_STDERR];

        fn raw_params(&self) -> &serde_json::Value {
            &self.raw
        }

        fn options(&self) -> &StepOptions {
            &self.options
        }

        fn transport_params<'a>(&self, params: &'a Params) -> &'a TransportParameters {
            &params.transport
        }

        fn validate(&self, _params: &Params) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, ctx: &ExecContext, transport: &Transport, _: &Params) -> Outcome {
            let session = match transport.as_session() {
                Ok(s) => s,
                Err(e) => return Outcome::LaunchFailed(e.into()),
            };
            match session.new_process(ctx, None, vec!["true".to_string()]).await {
                Ok(mut proc) => drive_process(ctx, proc.as_mut()).await,
                Err(e) => Outcome::LaunchFailed(e.into()),
            }
        }

        fn parse_output(&self, output: &CapturedOutput, _: &Params) -> Result<()> {
            if output.stdout() == b"boom" {
                panic!("fragile step exploded");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panic_is_isolated_per_target() {
        let mut registry = TransportRegistry::new();
        registry.register(
            "fake",
            Arc::new(FixedTransportFactory(Transport::Session(Arc::new(
                ScriptedSessionTransport::new(ProcessScript::with_output("boom", "")),
            )))),
        );
        let recorder = Arc::new(RecordingEmitter::new());
        let step = Arc::new(FragileStep {
            raw: json!({"transport": {"proto": "{{ .ID }}"}}),
            options: StepOptions::default(),
        });
        let runner = Arc::new(TargetRunner::new(step, Arc::new(registry), recorder).unwrap());

        let results = for_each_target(
            &ExecContext::background(),
            runner,
            vec![Target::new("fake"), Target::new("other")],
        )
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].target.id, "fake");
        assert!(matches!(results[0].result, Err(StepError::Internal(_))));
        // "other" resolves to an unregistered protocol and fails on its own
        assert!(results[1]
            .result
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("unsupported transport protocol 'other'"));
    }
}
