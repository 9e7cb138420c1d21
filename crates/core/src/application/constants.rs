// Execution constants (No magic values)
use std::time::Duration;

/// How long output draining may continue after the process has exited (2s)
/// Bounds a run whose remote side keeps a stream open after exit or cancellation
pub const DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Graceful process termination window before a forced kill (5s)
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Privilege-elevation wrapper used by steps that need root on the target
pub const PRIVILEGE_WRAPPER: &str = "sudo";
