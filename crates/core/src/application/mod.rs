// Application Layer - Execution orchestration

pub mod capture;
pub mod constants;
pub mod events;
pub mod fan_out;
pub mod parser;
pub mod registry;
pub mod runner;

// Re-exports
pub use capture::drive_process;
pub use events::StepEmitter;
pub use fan_out::{for_each_target, TargetResult};
pub use parser::{
    parse_error_output, OutputParser, SoftFailurePolicy, StderrErrorParser, BIOS_LOCKED_MSG,
};
pub use registry::TransportRegistry;
pub use runner::{ExpanderFactory, TargetRunner};
