// Steprun Infrastructure - Session Transports
// Implements: SessionTransport for local child processes and ssh sessions

pub mod local;
pub mod ssh;

pub use local::{LocalOptions, LocalTransport, LocalTransportFactory};
pub use ssh::{SshOptions, SshTransport, SshTransportFactory};
