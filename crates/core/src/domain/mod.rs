// Domain Layer - Entities and value types

pub mod api;
pub mod error;
pub mod event;
pub mod outcome;
pub mod output;
pub mod params;
pub mod target;

// Re-exports
pub use api::{
    ApiError, ApiResponse, JobId, JobState, JobStatus, ListData, RetryData, RunId, StartData,
    StatusData, StopData, VersionData,
};
pub use error::DomainError;
pub use event::{EventData, EventName, EventPayload, EVENT_STDERR, EVENT_STDOUT};
pub use outcome::Outcome;
pub use output::CapturedOutput;
pub use params::{parse_duration, StepDuration, StepOptions, TransportParameters, TRANSPORT_KEYWORD};
pub use target::Target;
