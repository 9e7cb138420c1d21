// Target Runner
// Orchestrates one step execution against one target: timeout scope,
// parameter expansion, validation, transport construction, execution,
// output classification and event emission.

use super::events::StepEmitter;
use super::registry::TransportRegistry;
use crate::context::ExecContext;
use crate::domain::{EventPayload, Outcome, Target, EVENT_STDERR, EVENT_STDOUT};
use crate::error::Result;
use crate::port::{expand_object, EventEmitter, ParamExpander, Step, TargetExpander};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the parameter expander for a target
pub type ExpanderFactory = Arc<dyn Fn(&Target) -> Box<dyn ParamExpander> + Send + Sync>;

pub struct TargetRunner<S: Step> {
    step: Arc<S>,
    registry: Arc<TransportRegistry>,
    emitter: StepEmitter,
    expander_factory: ExpanderFactory,
}

impl<S: Step> TargetRunner<S> {
    /// Fails if the step's event list does not cover the stdout/stderr events
    pub fn new(
        step: Arc<S>,
        registry: Arc<TransportRegistry>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self> {
        let emitter = StepEmitter::new(S::EVENTS, &[EVENT_STDOUT, EVENT_STDERR], emitter)?;
        Ok(Self {
            step,
            registry,
            emitter,
            expander_factory: Arc::new(|target: &Target| {
                Box::new(TargetExpander::new(target)) as Box<dyn ParamExpander>
            }),
        })
    }

    /// Replace the default `TargetExpander`
    pub fn with_expander(mut self, factory: ExpanderFactory) -> Self {
        self.expander_factory = factory;
        self
    }

    pub fn step(&self) -> &S {
        &self.step
    }

    pub async fn run(&self, ctx: &ExecContext, target: &Target) -> Result<()> {
        info!(step = S::NAME, target = %target, "Executing on target");

        let scope = self.step.options().timeout().map(|t| ctx.with_timeout(t));
        let run_ctx = scope.as_deref().unwrap_or(ctx);

        let expander = (self.expander_factory)(target);
        let params: S::Params = expand_object(expander.as_ref(), self.step.raw_params())?;
        self.step.validate(&params)?;

        // options go to the factory unexpanded, it expands them once
        let transport = self.registry.new_transport(
            &self.step.transport_params(&params).proto,
            self.step.raw_transport_options(),
            expander.as_ref(),
        )?;

        let (output, result) = match self.step.execute(run_ctx, &transport, &params).await {
            Outcome::LaunchFailed(e) => {
                warn!(step = S::NAME, target = %target, error = %e, "Launch failed");
                return Err(e);
            }
            Outcome::Completed { output, result } => (output, result),
        };

        // a domain error found in the output takes precedence over the execution verdict
        let verdict = self.step.parse_output(&output, &params).and(result);

        // evidence is recorded even when the step's own timeout has fired
        self.emitter
            .emit(ctx, EVENT_STDOUT, &EventPayload::new(output.stdout_lossy()), target)
            .await?;
        self.emitter
            .emit(ctx, EVENT_STDERR, &EventPayload::new(output.stderr_lossy()), target)
            .await?;

        match &verdict {
            Ok(()) => info!(step = S::NAME, target = %target, "Execution succeeded"),
            Err(e) => warn!(step = S::NAME, target = %target, error = %e, "Execution failed"),
        }
        verdict
    }
}
