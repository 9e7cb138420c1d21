// Default transport registry: every protocol this workspace ships

use std::sync::Arc;
use steprun_core::application::TransportRegistry;
use steprun_infra_system::{LocalTransportFactory, SshTransportFactory};
use steprun_sdk::HttpTransportFactory;

pub const PROTO_LOCAL: &str = "local";
pub const PROTO_SSH: &str = "ssh";
pub const PROTO_HTTP: &str = "http";

pub fn default_registry() -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    registry
        .register(PROTO_LOCAL, Arc::new(LocalTransportFactory))
        .register(PROTO_SSH, Arc::new(SshTransportFactory))
        .register(PROTO_HTTP, Arc::new(HttpTransportFactory));
    registry
}
