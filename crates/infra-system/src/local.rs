// Local session transport
// Runs commands as child processes of this host; cancellation terminates the
// child gracefully (SIGTERM, then SIGKILL after the grace window).
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, DuplexStream};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use steprun_core::application::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use steprun_core::domain::DomainError;
use steprun_core::port::{
    decode_options, output_pipe, OutputPipe, ParamExpander, ProcessHandle, ProcessState,
    SessionTransport, Transport, TransportError, TransportFactory,
};
use steprun_core::{ExecContext, StepError};

/// Options of the `local` protocol
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalOptions {
    /// Working directory of spawned commands (inherited when absent)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

pub struct LocalTransport {
    options: LocalOptions,
}

impl LocalTransport {
    pub fn new(options: LocalOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionTransport for LocalTransport {
    async fn new_process(
        &self,
        _ctx: &ExecContext,
        privilege: Option<&str>,
        argv: Vec<String>,
    ) -> Result<Box<dyn ProcessHandle>, TransportError> {
        if argv.is_empty() {
            return Err(TransportError::Launch {
                command: String::new(),
                reason: "empty argument vector".to_string(),
            });
        }
        let argv: Vec<String> = privilege.map(str::to_string).into_iter().chain(argv).collect();

        Ok(Box::new(LocalProcess {
            argv,
            dir: self.options.dir.clone(),
            state: ProcessState::NotStarted,
            stdout: None,
            stderr: None,
            child: None,
        }))
    }
}

pub struct LocalTransportFactory;

impl TransportFactory for LocalTransportFactory {
    fn create(
        &self,
        options: &serde_json::Value,
        expander: &dyn ParamExpander,
    ) -> Result<Transport, TransportError> {
        let options: LocalOptions = decode_options(options, expander)?;
        Ok(Transport::Session(Arc::new(LocalTransport::new(options))))
    }
}

/// Child process handle; output is forwarded into bridged pipes once started
pub struct LocalProcess {
    argv: Vec<String>,
    dir: Option<PathBuf>,
    state: ProcessState,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    child: Option<Child>,
}

impl LocalProcess {
    fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    fn take_pipe(&mut self, stream: &'static str) -> Result<(DuplexStream, OutputPipe), TransportError> {
        if self.state != ProcessState::NotStarted {
            return Err(TransportError::InvalidState(format!(
                "{} pipe requested after start",
                stream
            )));
        }
        Ok(output_pipe())
    }
}

/// Copy a child stream into its bridge; dropping the writer signals end-of-stream
fn forward<R>(stream: &'static str, reader: Option<R>, writer: Option<DuplexStream>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    if let (Some(mut reader), Some(mut writer)) = (reader, writer) {
        tokio::spawn(async move {
            if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
                debug!(stream, error = %e, "Stopped forwarding child output");
            }
        });
    }
}

#[async_trait]
impl ProcessHandle for LocalProcess {
    fn argv(&self) -> &[String] {
        &self.argv
    }

    fn state(&self) -> ProcessState {
        self.state
    }

    fn stdout_pipe(&mut self) -> Result<OutputPipe, TransportError> {
        let (writer, reader) = self.take_pipe("stdout")?;
        self.stdout = Some(writer);
        Ok(reader)
    }

    fn stderr_pipe(&mut self) -> Result<OutputPipe, TransportError> {
        let (writer, reader) = self.take_pipe("stderr")?;
        self.stderr = Some(writer);
        Ok(reader)
    }

    async fn start(&mut self, ctx: &ExecContext) -> Result<(), TransportError> {
        if self.state != ProcessState::NotStarted {
            return Err(TransportError::InvalidState("process already started".to_string()));
        }
        if let Some(err) = ctx.error() {
            return Err(TransportError::LaunchInterrupted(err));
        }

        let mut command = Command::new(&self.argv[0]);
        command
            .args(&self.argv[1..])
            .stdin(Stdio::null())
            .stdout(if self.stdout.is_some() { Stdio::piped() } else { Stdio::null() })
            .stderr(if self.stderr.is_some() { Stdio::piped() } else { Stdio::null() })
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| TransportError::Launch {
            command: self.command_line(),
            reason: e.to_string(),
        })?;

        info!(
            command = %self.command_line(),
            pid = ?child.id(),
            "Started local process"
        );

        forward("stdout", child.stdout.take(), self.stdout.take());
        forward("stderr", child.stderr.take(), self.stderr.take());

        self.child = Some(child);
        self.state = ProcessState::Started;
        Ok(())
    }

    async fn wait(&mut self, ctx: &ExecContext) -> Result<(), StepError> {
        let command = self.command_line();
        let child = match (self.state, self.child.as_mut()) {
            (ProcessState::Started, Some(child)) => child,
            _ => {
                return Err(
                    TransportError::InvalidState("process not started".to_string()).into(),
                )
            }
        };

        let finished = tokio::select! {
            status = child.wait() => Ok(status),
            err = ctx.done() => Err(err),
        };

        let status = match finished {
            Ok(status) => status.map_err(TransportError::Io)?,
            Err(err) => {
                warn!(command = %command, reason = %err, "Context done before process exit");
                kill_graceful(child).await;
                self.state = ProcessState::Exited;
                return Err(err.into());
            }
        };
        self.state = ProcessState::Exited;

        debug!(command = %command, status = %status, "Local process exited");
        if status.success() {
            return Ok(());
        }
        Err(match status.code() {
            Some(code) => DomainError::ExitStatus { code, command },
            None => DomainError::Terminated { command },
        }
        .into())
    }
}

/// Kill process with SIGTERM first, then SIGKILL if needed
async fn kill_graceful(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            info!(pid = %pid, "Sending SIGTERM for graceful shutdown");
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => {
                    if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, child.wait())
                        .await
                        .is_ok()
                    {
                        info!(pid = %pid, "Process exited gracefully after SIGTERM");
                        return;
                    }
                    warn!(pid = %pid, "Process did not exit after SIGTERM, sending SIGKILL");
                }
                Err(e) => warn!(pid = %pid, error = %e, "SIGTERM failed"),
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill process");
    }
}
