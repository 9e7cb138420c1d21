// Transport Registry
// Protocol name -> factory; adding a protocol means registering a factory

use crate::port::{ParamExpander, Transport, TransportError, TransportFactory};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: HashMap<String, Arc<dyn TransportFactory>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `proto`
    pub fn register(
        &mut self,
        proto: impl Into<String>,
        factory: Arc<dyn TransportFactory>,
    ) -> &mut Self {
        self.factories.insert(proto.into(), factory);
        self
    }

    pub fn contains(&self, proto: &str) -> bool {
        self.factories.contains_key(proto)
    }

    /// Registered protocol names, sorted
    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the transport for `proto`, expanding its options first
    pub fn new_transport(
        &self,
        proto: &str,
        options: &serde_json::Value,
        expander: &dyn ParamExpander,
    ) -> Result<Transport, TransportError> {
        let factory = self
            .factories
            .get(proto)
            .ok_or_else(|| TransportError::UnsupportedProtocol(proto.to_string()))?;

        debug!(proto = %proto, "Creating transport");
        factory.create(options, expander)
    }
}
