// Step Port
// A test step plugs its parameters, validation, action and output rules into
// the generic TargetRunner.

use crate::context::ExecContext;
use crate::domain::{
    CapturedOutput, EventName, Outcome, StepOptions, TransportParameters, TRANSPORT_KEYWORD,
};
use crate::error::Result;
use crate::port::transport::Transport;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

static NO_OPTIONS: serde_json::Value = serde_json::Value::Null;

#[async_trait]
pub trait Step: Send + Sync {
    /// Typed parameters, decoded after expansion against the target
    type Params: DeserializeOwned + Send + Sync;

    const NAME: &'static str;

    /// Events this step may emit
    const EVENTS: &'static [EventName];

    /// Unexpanded step input
    fn raw_params(&self) -> &serde_json::Value;

    fn options(&self) -> &StepOptions;

    fn transport_params<'a>(&self, params: &'a Self::Params) -> &'a TransportParameters;

    /// Transport options as written, before expansion; the transport factory expands them
    fn raw_transport_options(&self) -> &serde_json::Value {
        self.raw_params()
            .get(TRANSPORT_KEYWORD)
            .and_then(|transport| transport.get("options"))
            .unwrap_or(&NO_OPTIONS)
    }

    /// Preconditions checked before any remote action
    fn validate(&self, params: &Self::Params) -> Result<()>;

    /// Perform the remote action
    async fn execute(
        &self,
        ctx: &ExecContext,
        transport: &Transport,
        params: &Self::Params,
    ) -> Outcome;

    /// Detect domain failures reported inside captured output
    fn parse_output(&self, output: &CapturedOutput, params: &Self::Params) -> Result<()>;
}
