// Steprun Core - Domain Logic & Ports
// NO infrastructure dependencies (Hexagonal Architecture)

pub mod application;
pub mod context;
pub mod domain;
pub mod error;
pub mod port;

pub use context::{ContextError, ExecContext, TimeoutScope};
pub use error::{Result, StepError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
