// JobStatus step
// Queries the job-control server for one job's status over an API transport.
// The status document becomes the stdout evidence, the server's error message
// the stderr evidence.

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use steprun_core::domain::{
    CapturedOutput, DomainError, EventName, JobId, Outcome, StepOptions, TransportParameters,
    EVENT_STDERR, EVENT_STDOUT,
};
use steprun_core::port::{Step, Transport, TransportError};
use steprun_core::{ExecContext, Result, StepError};
use tracing::debug;

use crate::input::StepInput;

pub const NAME: &str = "JobStatus";

const DEFAULT_REQUESTOR: &str = "steprun";

fn default_requestor() -> String {
    DEFAULT_REQUESTOR.to_string()
}

/// Accepts `42` or `"42"`; expanded templates always produce strings
fn job_id_from_any<'de, D>(deserializer: D) -> std::result::Result<JobId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(JobId),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(id) => Ok(id),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid job id '{}'", s))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusParams {
    pub transport: TransportParameters,
    pub parameter: JobStatusParameter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusParameter {
    #[serde(rename = "JobID", deserialize_with = "job_id_from_any")]
    pub job_id: JobId,
    #[serde(rename = "Requestor", default = "default_requestor")]
    pub requestor: String,
}

pub struct JobStatusStep {
    input: StepInput,
}

impl JobStatusStep {
    pub fn new(raw: Value) -> Result<Self> {
        Ok(Self {
            input: StepInput::parse(raw)?,
        })
    }

    pub fn validate_parameters(&self) -> Result<()> {
        self.input.validate_structure()
    }
}

#[async_trait]
impl Step for JobStatusStep {
    type Params = JobStatusParams;

    const NAME: &'static str = NAME;
    const EVENTS: &'static [EventName] = &[EVENT_STDOUT, EVENT_STDERR];

    fn raw_params(&self) -> &Value {
        self.input.raw()
    }

    fn options(&self) -> &StepOptions {
        self.input.options()
    }

    fn transport_params<'a>(&self, params: &'a JobStatusParams) -> &'a TransportParameters {
        &params.transport
    }

    fn validate(&self, params: &JobStatusParams) -> Result<()> {
        if params.parameter.job_id == 0 {
            return Err(StepError::validation("JobID must be set"));
        }
        if params.parameter.requestor.trim().is_empty() {
            return Err(StepError::validation("Requestor must not be empty"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        transport: &Transport,
        params: &JobStatusParams,
    ) -> Outcome {
        let api = match transport.as_api() {
            Ok(api) => api,
            Err(e) => return Outcome::LaunchFailed(e.into()),
        };
        let p = &params.parameter;

        match api.status(ctx, &p.requestor, p.job_id).await {
            Ok(resp) => {
                debug!(job_id = p.job_id, server_id = %resp.server_id, "Received job status");
                let stderr = resp
                    .error
                    .map(|e| e.msg.into_bytes())
                    .unwrap_or_default();
                match serde_json::to_vec(&resp.data) {
                    Ok(stdout) => Outcome::completed(CapturedOutput::new(stdout, stderr), Ok(())),
                    Err(e) => {
                        Outcome::completed(CapturedOutput::new(Vec::new(), stderr), Err(e.into()))
                    }
                }
            }
            Err(e) if e.is_launch_failure() => Outcome::LaunchFailed(e.into()),
            Err(TransportError::Remote { msg, .. }) => Outcome::completed(
                CapturedOutput::new(Vec::new(), msg.clone().into_bytes()),
                Err(DomainError::Remote(msg).into()),
            ),
            Err(e) => Outcome::completed(CapturedOutput::default(), Err(e.into())),
        }
    }

    /// Any server-reported message is a failure
    fn parse_output(&self, output: &CapturedOutput, _params: &JobStatusParams) -> Result<()> {
        if output.stderr().is_empty() {
            return Ok(());
        }
        Err(DomainError::Remote(output.stderr_lossy()).into())
    }
}
