// SSH session transport
// One ssh2 session per process. libssh2 is blocking, so connecting runs on the
// blocking pool and a pump thread moves channel output into the bridged pipes.
use async_trait::async_trait;
use serde::Deserialize;
use ssh2::{Channel, Session};
use std::fmt;
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use steprun_core::domain::{DomainError, StepDuration};
use steprun_core::port::{
    decode_options, output_pipe, OutputPipe, ParamExpander, ProcessHandle, ProcessState,
    SessionTransport, Transport, TransportError, TransportFactory,
};
use steprun_core::{ExecContext, StepError};

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PUMP_BUFFER_SIZE: usize = 8 * 1024;
const PUMP_IDLE_INTERVAL: Duration = Duration::from_millis(10);

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_connect_timeout() -> StepDuration {
    DEFAULT_CONNECT_TIMEOUT.into()
}

/// Options of the `ssh` protocol
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshOptions {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    /// Connect and handshake timeout
    #[serde(default = "default_connect_timeout")]
    pub timeout: StepDuration,
}

impl fmt::Debug for SshOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identity_file", &self.identity_file)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SshOptions {
    fn validate(&self) -> Result<(), TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidOptions("ssh host must be set".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(TransportError::InvalidOptions("ssh user must be set".to_string()));
        }
        Ok(())
    }

    fn connect_timeout(&self) -> Duration {
        match self.timeout.as_duration() {
            d if d.is_zero() => DEFAULT_CONNECT_TIMEOUT,
            d => d,
        }
    }
}

pub struct SshTransport {
    options: Arc<SshOptions>,
}

impl SshTransport {
    pub fn new(options: SshOptions) -> Result<Self, TransportError> {
        options.validate()?;
        Ok(Self {
            options: Arc::new(options),
        })
    }
}

#[async_trait]
impl SessionTransport for SshTransport {
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

        Ok(Box::new(SshProcess {
            options: Arc::clone(&self.options),
            argv,
            state: ProcessState::NotStarted,
            stdout: None,
            stderr: None,
            exit: None,
            abort: Arc::new(AtomicBool::new(false)),
        }))
    }
}

pub struct SshTransportFactory;

impl TransportFactory for SshTransportFactory {
    fn create(
        &self,
        options: &serde_json::Value,
        expander: &dyn ParamExpander,
    ) -> Result<Transport, TransportError> {
        let options: SshOptions = decode_options(options, expander)?;
        Ok(Transport::Session(Arc::new(SshTransport::new(options)?)))
    }
}

/// Quote an argument for the remote POSIX shell
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,@+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// How the remote command ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteExit {
    Code(i32),
    Signal(String),
}

type ExitReport = Result<RemoteExit, String>;

/// Map the pump's report to the `wait` verdict
fn exit_verdict(report: ExitReport, command: String) -> Result<(), StepError> {
    match report {
        Ok(RemoteExit::Code(0)) => Ok(()),
        Ok(RemoteExit::Code(code)) => Err(DomainError::ExitStatus { code, command }.into()),
        Ok(RemoteExit::Signal(signal)) => {
            warn!(command = %command, signal = %signal, "Remote command killed by signal");
            Err(DomainError::Terminated { command }.into())
        }
        Err(reason) => Err(TransportError::Io(std::io::Error::other(reason)).into()),
    }
}

pub struct SshProcess {
    options: Arc<SshOptions>,
    argv: Vec<String>,
    state: ProcessState,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit: Option<oneshot::Receiver<ExitReport>>,
    abort: Arc<AtomicBool>,
}

impl SshProcess {
    fn command_line(&self) -> String {
        self.argv
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn check_not_started(&self, stream: &str) -> Result<(), TransportError> {
        if self.state != ProcessState::NotStarted {
            return Err(TransportError::InvalidState(format!(
                "{} pipe requested after start",
                stream
            )));
        }
        Ok(())
    }
}

impl Drop for SshProcess {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessHandle for SshProcess {
    fn argv(&self) -> &[String] {
        &self.argv
    }

    fn state(&self) -> ProcessState {
        self.state
    }

    fn stdout_pipe(&mut self) -> Result<OutputPipe, TransportError> {
        self.check_not_started("stdout")?;
        let (writer, reader) = output_pipe();
        self.stdout = Some(writer);
        Ok(reader)
    }

    fn stderr_pipe(&mut self) -> Result<OutputPipe, TransportError> {
        self.check_not_started("stderr")?;
        let (writer, reader) = output_pipe();
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

        let command = self.command_line();
        let options = Arc::clone(&self.options);
        let remote = command.clone();
        let abort = Arc::clone(&self.abort);
        let connect =
            tokio::task::spawn_blocking(move || open_channel(&options, &remote, &abort));

        let joined = match ctx.run(connect).await {
            Ok(joined) => joined,
            Err(err) => {
                // keep the detached connect from reaching exec
                self.abort.store(true, Ordering::SeqCst);
                return Err(TransportError::LaunchInterrupted(err));
            }
        };
        let (session, channel) = joined
            .map_err(|e| TransportError::Launch {
                command: command.clone(),
                reason: format!("connection task failed: {}", e),
            })?
            .map_err(|reason| TransportError::Launch {
                command: command.clone(),
                reason,
            })?;

        info!(
            host = %self.options.host,
            port = self.options.port,
            command = %command,
            "Started remote process"
        );

        let pump = Pump {
            session,
            channel,
            stdout: self.stdout.take(),
            stderr: self.stderr.take(),
            abort: Arc::clone(&self.abort),
            runtime: Handle::current(),
            close_timeout: self.options.connect_timeout(),
        };
        let (tx, rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(pump.run());
        });

        self.exit = Some(rx);
        self.state = ProcessState::Started;
        Ok(())
    }

    async fn wait(&mut self, ctx: &ExecContext) -> Result<(), StepError> {
        let mut exit = match (self.state, self.exit.take()) {
            (ProcessState::Started, Some(exit)) => exit,
            _ => {
                return Err(
                    TransportError::InvalidState("process not started".to_string()).into(),
                )
            }
        };
        let command = self.command_line();

        let finished = tokio::select! {
            report = &mut exit => Ok(report),
            err = ctx.done() => Err(err),
        };
        self.state = ProcessState::Exited;

        let report = match finished {
            Ok(report) => report,
            Err(err) => {
                warn!(command = %command, reason = %err, "Context done before remote exit, closing channel");
                self.abort.store(true, Ordering::SeqCst);
                return Err(err.into());
            }
        };

        match report {
            Ok(report) => exit_verdict(report, command),
            Err(_) => Err(TransportError::InvalidState(
                "session pump stopped without an exit status".to_string(),
            )
            .into()),
        }
    }
}

/// Connect, authenticate and exec `command` unless `abort` was raised first
fn open_channel(
    options: &SshOptions,
    command: &str,
    abort: &AtomicBool,
) -> Result<(Session, Channel), String> {
    let addr = (options.host.as_str(), options.port)
        .to_socket_addrs()
        .map_err(|e| format!("failed to resolve host '{}': {}", options.host, e))?
        .next()
        .ok_or_else(|| format!("no addresses found for host '{}'", options.host))?;

    let timeout = options.connect_timeout();
    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| format!("failed to connect to {}: {}", addr, e))?;

    let mut session =
        Session::new().map_err(|e| format!("failed to create ssh session: {}", e))?;
    session.set_timeout(timeout.as_millis() as u32);
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| format!("ssh handshake with {} failed: {}", addr, e))?;

    authenticate(&session, options)?;
    debug!(host = %options.host, user = %options.user, "SSH session authenticated");

    // execution is bounded by the caller's context, not by libssh2
    session.set_timeout(0);
    let mut channel = session
        .channel_session()
        .map_err(|e| format!("failed to open channel: {}", e))?;
    if abort.load(Ordering::SeqCst) {
        return Err("launch abandoned before exec".to_string());
    }
    channel
        .exec(command)
        .map_err(|e| format!("failed to execute command: {}", e))?;

    Ok((session, channel))
}

fn authenticate(session: &Session, options: &SshOptions) -> Result<(), String> {
    let user = options.user.as_str();

    if let Some(password) = &options.password {
        session
            .userauth_password(user, password)
            .map_err(|e| format!("password authentication failed for user {}: {}", user, e))?;
        return Ok(());
    }

    if let Some(key) = &options.identity_file {
        match session.userauth_pubkey_file(user, None, key, None) {
            Ok(()) => return Ok(()),
            Err(e) => warn!(key = ?key, error = %e, "Public key authentication failed"),
        }
    }

    session.userauth_agent(user).map_err(|e| {
        format!(
            "ssh authentication failed for user {}. Tried: {}, agent: {}",
            user,
            options
                .identity_file
                .as_ref()
                .map(|k| k.display().to_string())
                .unwrap_or_else(|| "no key specified".to_string()),
            e
        )
    })?;

    if !session.authenticated() {
        return Err(format!("ssh authentication failed for user {}", user));
    }
    Ok(())
}

enum Progress {
    Data,
    Idle,
    Eof,
}

/// Blocking loop moving channel output into the pipes until both streams end
struct Pump {
    session: Session,
    channel: Channel,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    abort: Arc<AtomicBool>,
    runtime: Handle,
    close_timeout: Duration,
}

impl Pump {
    fn run(mut self) -> ExitReport {
        self.session.set_blocking(false);
        let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            if self.abort.load(Ordering::SeqCst) {
                self.close();
                return Err("remote session aborted".to_string());
            }

            let mut idle = true;
            if stdout_open {
                let mut stream = self.channel.stream(0);
                match self.forward(&mut stream, StreamId::Stdout, &mut buf) {
                    Ok(Progress::Data) => idle = false,
                    Ok(Progress::Idle) => {}
                    Ok(Progress::Eof) => stdout_open = false,
                    Err(e) => return Err(format!("reading remote stdout failed: {}", e)),
                }
            }
            if stderr_open {
                let mut stream = self.channel.stderr();
                match self.forward(&mut stream, StreamId::Stderr, &mut buf) {
                    Ok(Progress::Data) => idle = false,
                    Ok(Progress::Idle) => {}
                    Ok(Progress::Eof) => stderr_open = false,
                    Err(e) => return Err(format!("reading remote stderr failed: {}", e)),
                }
            }
            if idle {
                std::thread::sleep(PUMP_IDLE_INTERVAL);
            }
        }

        // both writers are gone here, readers see end-of-stream
        self.session.set_blocking(true);
        self.channel
            .wait_close()
            .map_err(|e| format!("failed to close channel: {}", e))?;
        // a command killed by a signal reports exit-signal and a zero exit-status
        let signal = self
            .channel
            .exit_signal()
            .map_err(|e| format!("failed to get exit signal: {}", e))?;
        if let Some(name) = signal.exit_signal {
            return Ok(RemoteExit::Signal(name));
        }
        self.channel
            .exit_status()
            .map(RemoteExit::Code)
            .map_err(|e| format!("failed to get exit status: {}", e))
    }

    fn forward(
        &mut self,
        stream: &mut ssh2::Stream,
        id: StreamId,
        buf: &mut [u8],
    ) -> std::io::Result<Progress> {
        match stream.read(buf) {
            Ok(0) if self.channel.eof() => {
                self.sink(id).take();
                Ok(Progress::Eof)
            }
            Ok(0) => Ok(Progress::Idle),
            Ok(n) => {
                let runtime = self.runtime.clone();
                let sink = self.sink(id);
                if let Some(writer) = sink.as_mut() {
                    if runtime.block_on(writer.write_all(&buf[..n])).is_err() {
                        // reader is gone; keep consuming so the remote side can exit
                        sink.take();
                    }
                }
                Ok(Progress::Data)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Progress::Idle),
            Err(e) => Err(e),
        }
    }

    fn sink(&mut self, id: StreamId) -> &mut Option<DuplexStream> {
        match id {
            StreamId::Stdout => &mut self.stdout,
            StreamId::Stderr => &mut self.stderr,
        }
    }

    fn close(&mut self) {
        self.stdout.take();
        self.stderr.take();
        self.session.set_timeout(self.close_timeout.as_millis() as u32);
        self.session.set_blocking(true);
        if let Err(e) = self.channel.close() {
            debug!(error = %e, "Failed to close aborted channel");
        }
    }
}

#[derive(Clone, Copy)]
enum StreamId {
    Stdout,
    Stderr,
}
