// Port Layer - Interfaces for external collaborators

pub mod event_emitter;
pub mod expander;
pub mod step;
pub mod transport;

// Re-exports
pub use event_emitter::{EmitError, EventEmitter};
pub use expander::{expand_object, ParamExpander, TargetExpander};
pub use step::Step;
pub use transport::{
    decode_options, output_pipe, ApiTransport, OutputPipe, ProcessHandle, ProcessState,
    SessionTransport, Transport, TransportError, TransportFactory,
};
