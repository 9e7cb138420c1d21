// Transport Port
// Pluggable mechanism for reaching a remote endpoint: either spawn a process in a
// session (SessionTransport) or issue typed request/response calls (ApiTransport).

use crate::context::{ContextError, ExecContext};
use crate::domain::{
    ApiResponse, JobId, JobState, ListData, RetryData, StartData, StatusData, StopData,
    VersionData,
};
use crate::error::StepError;
use crate::port::expander::ParamExpander;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, DuplexStream};

/// Readable output stream of a remote process
pub type OutputPipe = Pin<Box<dyn AsyncRead + Send>>;

/// In-memory buffer between a stream producer and its `OutputPipe` (64 KiB)
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Create a connected (writer, reader) pair; dropping the writer ends the stream
pub fn output_pipe() -> (DuplexStream, OutputPipe) {
    let (writer, reader) = tokio::io::duplex(PIPE_BUFFER_SIZE);
    (writer, Box::pin(reader))
}

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unsupported transport protocol '{0}'")]
    UnsupportedProtocol(String),

    #[error("invalid server address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("invalid transport options: {0}")]
    InvalidOptions(String),

    #[error("failed to launch '{command}': {reason}")]
    Launch { command: String, reason: String },

    #[error("'{verb}' request failed: {reason}")]
    Request { verb: String, reason: String },

    /// Response arrived but could not be decoded; `body` is the raw response
    #[error("{context}: '{body}'")]
    Decode { context: String, body: String },

    /// Structured error object returned by the server
    #[error("server rejected '{verb}' request: {msg}")]
    Remote { verb: String, msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Interrupted(#[from] ContextError),

    /// Context ended before the command was launched; nothing ran
    #[error("launch interrupted: {0}")]
    LaunchInterrupted(ContextError),

    #[error("invalid transport state: {0}")]
    InvalidState(String),
}

impl TransportError {
    /// True when nothing ran on the remote side
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            TransportError::UnsupportedProtocol(_)
                | TransportError::InvalidAddress { .. }
                | TransportError::InvalidOptions(_)
                | TransportError::Launch { .. }
                | TransportError::Request { .. }
                | TransportError::LaunchInterrupted(_)
        )
    }
}

/// Lifecycle of a process handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Started,
    Exited,
}

/// A command spawned through a session transport
///
/// Pipes must be taken before `start`. `start` failing means nothing ran;
/// `wait` failing means the command ran and failed (non-zero exit is a
/// `DomainError`), or the context ended first.
#[async_trait]
pub trait ProcessHandle: Send {
    fn argv(&self) -> &[String];

    fn state(&self) -> ProcessState;

    fn stdout_pipe(&mut self) -> Result<OutputPipe, TransportError>;

    fn stderr_pipe(&mut self) -> Result<OutputPipe, TransportError>;

    async fn start(&mut self, ctx: &ExecContext) -> Result<(), TransportError>;

    async fn wait(&mut self, ctx: &ExecContext) -> Result<(), StepError>;
}

/// Session-based execution (one remote session per process)
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Prepare a process; `privilege` (e.g. "sudo") is prepended to `argv`
    async fn new_process(
        &self,
        ctx: &ExecContext,
        privilege: Option<&str>,
        argv: Vec<String>,
    ) -> Result<Box<dyn ProcessHandle>, TransportError>;
}

/// Request/response execution against a job-control server
///
/// A non-success reply carrying a structured error is `TransportError::Remote`;
/// a success reply may still embed an error in `ApiResponse::error`.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn version(
        &self,
        ctx: &ExecContext,
        requestor: &str,
    ) -> Result<ApiResponse<VersionData>, TransportError>;

    async fn start(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_descriptor: &str,
    ) -> Result<ApiResponse<StartData>, TransportError>;

    async fn stop(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_id: JobId,
    ) -> Result<ApiResponse<StopData>, TransportError>;

    async fn status(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_id: JobId,
    ) -> Result<ApiResponse<StatusData>, TransportError>;

    async fn retry(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_id: JobId,
    ) -> Result<ApiResponse<RetryData>, TransportError>;

    async fn list(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        states: &[JobState],
        tags: &[String],
    ) -> Result<ApiResponse<ListData>, TransportError>;
}

/// A constructed transport: one of the two capability families
#[derive(Clone)]
pub enum Transport {
    Session(Arc<dyn SessionTransport>),
    Api(Arc<dyn ApiTransport>),
}

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Session(_) => "session",
            Transport::Api(_) => "api",
        }
    }

    pub fn as_session(&self) -> Result<&dyn SessionTransport, TransportError> {
        match self {
            Transport::Session(t) => Ok(t.as_ref()),
            Transport::Api(_) => Err(TransportError::InvalidState(
                "expected a session transport, got an api transport".to_string(),
            )),
        }
    }

    pub fn as_api(&self) -> Result<&dyn ApiTransport, TransportError> {
        match self {
            Transport::Api(t) => Ok(t.as_ref()),
            Transport::Session(_) => Err(TransportError::InvalidState(
                "expected an api transport, got a session transport".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport::{}", self.kind())
    }
}

/// Builds a transport for one protocol from its (unexpanded) options
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        options: &serde_json::Value,
        expander: &dyn ParamExpander,
    ) -> Result<Transport, TransportError>;
}

/// Expand protocol options against the target and decode them; absent options decode as `{}`
pub fn decode_options<T: DeserializeOwned>(
    options: &serde_json::Value,
    expander: &dyn ParamExpander,
) -> Result<T, TransportError> {
    let empty = serde_json::Value::Object(serde_json::Map::new());
    let raw = if options.is_null() { &empty } else { options };
    let expanded = expander
        .expand(raw)
        .map_err(|e| TransportError::InvalidOptions(e.to_string()))?;
    serde_json::from_value(expanded).map_err(|e| TransportError::InvalidOptions(e.to_string()))
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{ApiError, DomainError, JobStatus};
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;

    /// What a scripted process does once started
    #[derive(Debug, Clone, Default)]
    pub struct ProcessScript {
        pub stdout: Vec<u8>,
        pub stderr: Vec<u8>,
        pub exit_code: i32,
        /// Fail `start` with this reason
        pub launch_error: Option<String>,
        /// Never exit on its own; `wait` returns only when the context ends
        pub hang: bool,
    }

    impl ProcessScript {
        pub fn with_output(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
            Self {
                stdout: stdout.into(),
                stderr: stderr.into(),
                ..Default::default()
            }
        }
    }

    /// Session transport whose processes replay a script
    #[derive(Default)]
    pub struct ScriptedSessionTransport {
        script: ProcessScript,
        calls: Arc<Mutex<Vec<(Option<String>, Vec<String>)>>>,
    }

    impl ScriptedSessionTransport {
        pub fn new(script: ProcessScript) -> Self {
            Self {
                script,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// (privilege wrapper, argv) of every process created so far
        pub fn calls(&self) -> Vec<(Option<String>, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionTransport for ScriptedSessionTransport {
        async fn new_process(
            &self,
            _ctx: &ExecContext,
            privilege: Option<&str>,
            argv: Vec<String>,
        ) -> Result<Box<dyn ProcessHandle>, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((privilege.map(str::to_string), argv.clone()));
            Ok(Box::new(ScriptedProcess {
                argv,
                script: self.script.clone(),
                state: ProcessState::NotStarted,
                stdout: None,
                stderr: None,
            }))
        }
    }

    pub struct ScriptedProcess {
        argv: Vec<String>,
        script: ProcessScript,
        state: ProcessState,
        stdout: Option<DuplexStream>,
        stderr: Option<DuplexStream>,
    }

    async fn feed(writer: Option<DuplexStream>, bytes: Vec<u8>) {
        if let Some(mut w) = writer {
            let _ = w.write_all(&bytes).await;
        }
    }

    #[async_trait]
    impl ProcessHandle for ScriptedProcess {
        fn argv(&self) -> &[String] {
            &self.argv
        }

        fn state(&self) -> ProcessState {
            self.state
        }

        fn stdout_pipe(&mut self) -> Result<OutputPipe, TransportError> {
            let (w, r) = output_pipe();
            self.stdout = Some(w);
            Ok(r)
        }

        fn stderr_pipe(&mut self) -> Result<OutputPipe, TransportError> {
            let (w, r) = output_pipe();
            self.stderr = Some(w);
            Ok(r)
        }

        async fn start(&mut self, ctx: &ExecContext) -> Result<(), TransportError> {
            if let Some(err) = ctx.error() {
                return Err(TransportError::Interrupted(err));
            }
            if let Some(reason) = &self.script.launch_error {
                return Err(TransportError::Launch {
                    command: self.argv.join(" "),
                    reason: reason.clone(),
                });
            }
            self.state = ProcessState::Started;
            tokio::spawn(feed(self.stdout.take(), self.script.stdout.clone()));
            tokio::spawn(feed(self.stderr.take(), self.script.stderr.clone()));
            Ok(())
        }

        async fn wait(&mut self, ctx: &ExecContext) -> Result<(), StepError> {
            if self.state != ProcessState::Started {
                return Err(TransportError::InvalidState("process not started".to_string()).into());
            }
            if self.script.hang {
                return Err(ctx.done().await.into());
            }
            self.state = ProcessState::Exited;
            match self.script.exit_code {
                0 => Ok(()),
                code => Err(DomainError::ExitStatus {
                    code,
                    command: self.argv.join(" "),
                }
                .into()),
            }
        }
    }

    /// Factory handing out one pre-built transport regardless of options
    pub struct FixedTransportFactory(pub Transport);

    impl TransportFactory for FixedTransportFactory {
        fn create(
            &self,
            _options: &serde_json::Value,
            _expander: &dyn ParamExpander,
        ) -> Result<Transport, TransportError> {
            Ok(self.0.clone())
        }
    }

    /// Canned behavior for every verb of the mock API transport
    #[derive(Debug, Clone)]
    pub enum MockApiBehavior {
        /// Success reply, optionally embedding an error object
        Respond {
            status: Option<JobStatus>,
            error: Option<String>,
        },
        /// Non-success reply with a structured error
        Reject(String),
        /// Request never reached the server
        Unreachable(String),
        /// Reply body that is not a valid response object
        Malformed(String),
    }

    pub struct MockApiTransport {
        behavior: MockApiBehavior,
        call_count: Mutex<usize>,
    }

    impl MockApiTransport {
        pub fn new(behavior: MockApiBehavior) -> Self {
            Self {
                behavior,
                call_count: Mutex::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }

        fn reply<T>(&self, verb: &str, data: T) -> Result<ApiResponse<T>, TransportError> {
            *self.call_count.lock().unwrap() += 1;
            match &self.behavior {
                MockApiBehavior::Respond { error, .. } => Ok(ApiResponse {
                    server_id: "mock-server".to_string(),
                    response_type: format!("ResponseType{}", verb),
                    data,
                    error: error.clone().map(ApiError::new),
                }),
                MockApiBehavior::Reject(msg) => Err(TransportError::Remote {
                    verb: verb.to_string(),
                    msg: msg.clone(),
                }),
                MockApiBehavior::Unreachable(reason) => Err(TransportError::Request {
                    verb: verb.to_string(),
                    reason: reason.clone(),
                }),
                MockApiBehavior::Malformed(body) => Err(TransportError::Decode {
                    context: "response is not a valid API response object".to_string(),
                    body: body.clone(),
                }),
            }
        }
    }

    #[async_trait]
    impl ApiTransport for MockApiTransport {
        async fn version(
            &self,
            _ctx: &ExecContext,
            _requestor: &str,
        ) -> Result<ApiResponse<VersionData>, TransportError> {
            self.reply("Version", VersionData { version: 1 })
        }

        async fn start(
            &self,
            _ctx: &ExecContext,
            _requestor: &str,
            _job_descriptor: &str,
        ) -> Result<ApiResponse<StartData>, TransportError> {
            self.reply("Start", StartData { job_id: 1 })
        }

        async fn stop(
            &self,
            _ctx: &ExecContext,
            _requestor: &str,
            _job_id: JobId,
        ) -> Result<ApiResponse<StopData>, TransportError> {
            self.reply("Stop", StopData {})
        }

        async fn status(
            &self,
            _ctx: &ExecContext,
            _requestor: &str,
            _job_id: JobId,
        ) -> Result<ApiResponse<StatusData>, TransportError> {
            let status = match &self.behavior {
                MockApiBehavior::Respond { status, .. } => status.clone(),
                _ => None,
            };
            self.reply("Status", StatusData { status })
        }

        async fn retry(
            &self,
            _ctx: &ExecContext,
            _requestor: &str,
            job_id: JobId,
        ) -> Result<ApiResponse<RetryData>, TransportError> {
            self.reply("Retry", RetryData { job_id, run_id: 2 })
        }

        async fn list(
            &self,
            _ctx: &ExecContext,
            _requestor: &str,
            _states: &[JobState],
            _tags: &[String],
        ) -> Result<ApiResponse<ListData>, TransportError> {
            self.reply("List", ListData { job_ids: vec![1, 2] })
        }
    }
}
