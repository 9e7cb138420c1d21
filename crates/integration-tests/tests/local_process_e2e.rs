//! Runner over real local processes
//!
//! A shell step writes a structured error document to stderr the way the
//! vendor tools do; exercises pipe capture, exit mapping and step timeouts
//! with `/bin/sh` on the local transport.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use steprun_core::application::{
    drive_process, parse_error_output, SoftFailurePolicy, TargetRunner,
};
use steprun_core::domain::{
    CapturedOutput, EventName, EventPayload, Outcome, StepOptions, Target, TransportParameters,
    EVENT_STDERR, EVENT_STDOUT,
};
use steprun_core::port::event_emitter::mocks::RecordingEmitter;
use steprun_core::port::{Step, Transport};
use steprun_core::{ExecContext, Result, StepError};
use steprun_steps::default_registry;

#[derive(Deserialize)]
struct ShellParams {
    transport: TransportParameters,
    script: String,
}

struct ShellStep {
    raw: Value,
    options: StepOptions,
}

impl ShellStep {
    fn new(script: &str, timeout: Option<&str>) -> Self {
        let options = match timeout {
            Some(t) => serde_json::from_value(json!({"timeout": t})).unwrap(),
            None => StepOptions::default(),
        };
        Self {
            raw: json!({
                "transport": {"proto": "local", "options": {"dir": "/"}},
                "script": script,
            }),
            options,
        }
    }
}

#[async_trait]
impl Step for ShellStep {
    type Params = ShellParams;

    const NAME: &'static str = "Shell";
    const EVENTS: &'static [EventName] = &[EVENT_STDOUT, EVENT_STDERR];

    fn raw_params(&self) -> &Value {
        &self.raw
    }

    fn options(&self) -> &StepOptions {
        &self.options
    }

    fn transport_params<'a>(&self, params: &'a ShellParams) -> &'a TransportParameters {
        &params.transport
    }

    fn validate(&self, _params: &ShellParams) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &ExecContext, transport: &Transport, params: &ShellParams) -> Outcome {
        let session = match transport.as_session() {
            Ok(session) => session,
            Err(e) => return Outcome::LaunchFailed(e.into()),
        };
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), params.script.clone()];
        match session.new_process(ctx, None, argv).await {
            Ok(mut proc) => drive_process(ctx, proc.as_mut()).await,
            Err(e) => Outcome::LaunchFailed(e.into()),
        }
    }

    fn parse_output(&self, output: &CapturedOutput, _params: &ShellParams) -> Result<()> {
        parse_error_output(output.stderr(), &SoftFailurePolicy::strict())
    }
}

async fn run(step: ShellStep) -> (Result<()>, Vec<String>) {
    let recorder = Arc::new(RecordingEmitter::new());
    let runner = TargetRunner::new(
        Arc::new(step),
        Arc::new(default_registry()),
        recorder.clone(),
    )
    .unwrap();
    let result = runner
        .run(&ExecContext::background(), &Target::new("localhost"))
        .await;
    let messages = recorder
        .events()
        .iter()
        .map(|e| e.payload_as::<EventPayload>().unwrap().msg)
        .collect();
    (result, messages)
}

#[tokio::test]
async fn test_both_streams_become_events() {
    let (result, messages) =
        run(ShellStep::new(r#"pwd; printf '{"error":""}' >&2"#, None)).await;

    assert!(result.is_ok(), "{:?}", result);
    assert_eq!(messages, vec!["/\n".to_string(), r#"{"error":""}"#.to_string()]);
}

#[tokio::test]
async fn test_stderr_error_document_fails_step() {
    let (result, messages) =
        run(ShellStep::new(r#"printf '{"error":"fan failure"}' >&2"#, None)).await;

    assert_eq!(result.unwrap_err().to_string(), "fan failure");
    assert_eq!(messages[1], r#"{"error":"fan failure"}"#);
}

#[tokio::test]
async fn test_undecodable_stderr_is_decode_error() {
    let (result, _) = run(ShellStep::new("echo oops >&2", None)).await;
    assert!(matches!(result, Err(StepError::Decode(_))));
}

#[tokio::test]
async fn test_non_zero_exit_fails_step() {
    let (result, messages) = run(ShellStep::new("echo partial; exit 4", None)).await;

    assert!(result.unwrap_err().to_string().contains("exited with status 4"));
    assert_eq!(messages[0], "partial\n");
}

#[tokio::test]
async fn test_step_timeout_stops_process() {
    let started = Instant::now();
    let (result, messages) = run(ShellStep::new("echo begun; exec sleep 30", Some("200ms"))).await;

    assert!(matches!(result, Err(StepError::Interrupted(_))));
    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(messages.len(), 2);
}
