// BiosSettingsSet step
// Sets one BIOS option on the target through the vendor tool's `wmi set`
// command, run with elevated privileges over ssh.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use steprun_core::application::constants::PRIVILEGE_WRAPPER;
use steprun_core::application::{
    drive_process, OutputParser, SoftFailurePolicy, StderrErrorParser, BIOS_LOCKED_MSG,
};
use steprun_core::domain::{
    CapturedOutput, EventName, Outcome, StepOptions, TransportParameters, EVENT_STDERR,
    EVENT_STDOUT,
};
use steprun_core::port::{Step, Transport};
use steprun_core::{ExecContext, Result, StepError};
use tracing::debug;

use crate::input::StepInput;
use crate::registry::PROTO_SSH;

pub const NAME: &str = "BiosSettingsSet";

const WMI_COMMAND: &str = "wmi";
const SET_SUBCOMMAND: &str = "set";
const JSON_FLAG: &str = "--json";

#[derive(Debug, Clone, Deserialize)]
pub struct BiosSettingsParams {
    pub transport: TransportParameters,
    pub parameter: BiosParameter,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiosParameter {
    #[serde(rename = "ToolPath", default)]
    pub tool_path: String,
    #[serde(rename = "Password", default)]
    pub password: String,
    #[serde(rename = "KeyPath", default)]
    pub key_path: String,
    #[serde(rename = "Option", default)]
    pub option: String,
    #[serde(rename = "Value", default)]
    pub value: String,
    /// Tolerate the "options are locked" precondition
    #[serde(rename = "ShallFail", default)]
    pub shall_fail: bool,
}

impl BiosParameter {
    fn auth_flag(&self) -> String {
        if !self.password.is_empty() {
            format!("--password={}", self.password)
        } else {
            format!("--private-key={}", self.key_path)
        }
    }

    /// `[tool, "wmi", "set", "--option=..", "--value=..", <auth>, "--json"]`
    pub fn argv(&self) -> Vec<String> {
        vec![
            self.tool_path.clone(),
            WMI_COMMAND.to_string(),
            SET_SUBCOMMAND.to_string(),
            format!("--option={}", self.option),
            format!("--value={}", self.value),
            self.auth_flag(),
            JSON_FLAG.to_string(),
        ]
    }
}

pub struct BiosSettingsSet {
    input: StepInput,
}

impl BiosSettingsSet {
    pub fn new(raw: Value) -> Result<Self> {
        Ok(Self {
            input: StepInput::parse(raw)?,
        })
    }

    pub fn validate_parameters(&self) -> Result<()> {
        self.input.validate_structure()
    }

    fn parser(params: &BiosSettingsParams) -> StderrErrorParser {
        StderrErrorParser::new(SoftFailurePolicy::new(
            [BIOS_LOCKED_MSG],
            params.parameter.shall_fail,
        ))
    }
}

#[async_trait]
impl Step for BiosSettingsSet {
    type Params = BiosSettingsParams;

    const NAME: &'static str = NAME;
    const EVENTS: &'static [EventName] = &[EVENT_STDOUT, EVENT_STDERR];

    fn raw_params(&self) -> &Value {
        self.input.raw()
    }

    fn options(&self) -> &StepOptions {
        self.input.options()
    }

    fn transport_params<'a>(&self, params: &'a BiosSettingsParams) -> &'a TransportParameters {
        &params.transport
    }

    fn validate(&self, params: &BiosSettingsParams) -> Result<()> {
        if params.transport.proto != PROTO_SSH {
            return Err(StepError::validation(format!(
                "only {:?} is supported as protocol in this step, got {:?}",
                PROTO_SSH, params.transport.proto
            )));
        }

        let p = &params.parameter;
        match (p.password.is_empty(), p.key_path.is_empty()) {
            (true, true) => {
                return Err(StepError::validation(
                    "password or certificate file must be set",
                ))
            }
            (false, false) => {
                return Err(StepError::validation(
                    "only one of password or certificate file may be set",
                ))
            }
            _ => {}
        }

        if p.option.is_empty() || p.value.is_empty() {
            return Err(StepError::validation("bios option and value must be set"));
        }
        if p.tool_path.is_empty() {
            return Err(StepError::validation("tool path must be set"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ExecContext,
        transport: &Transport,
        params: &BiosSettingsParams,
    ) -> Outcome {
        let session = match transport.as_session() {
            Ok(session) => session,
            Err(e) => return Outcome::LaunchFailed(e.into()),
        };

        let argv = params.parameter.argv();
        debug!(tool = %params.parameter.tool_path, option = %params.parameter.option, "Setting BIOS option");

        match session.new_process(ctx, Some(PRIVILEGE_WRAPPER), argv).await {
            Ok(mut proc) => drive_process(ctx, proc.as_mut()).await,
            Err(e) => Outcome::LaunchFailed(e.into()),
        }
    }

    fn parse_output(&self, output: &CapturedOutput, params: &BiosSettingsParams) -> Result<()> {
        Self::parser(params).parse(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(parameter: Value) -> BiosSettingsParams {
        serde_json::from_value(json!({
            "transport": {"proto": "ssh", "options": {"host": "dut", "user": "root"}},
            "parameter": parameter,
        }))
        .unwrap()
    }

    fn step() -> BiosSettingsSet {
        BiosSettingsSet::new(json!({
            "transport": {"proto": "ssh"},
            "parameter": {},
        }))
        .unwrap()
    }

    #[test]
    fn test_argv_with_password() {
        let p = params(json!({
            "ToolPath": "/opt/bios/tool",
            "Password": "secret",
            "Option": "BootOrder",
            "Value": "pxe",
        }));
        assert_eq!(
            p.parameter.argv(),
            vec![
                "/opt/bios/tool",
                "wmi",
                "set",
                "--option=BootOrder",
                "--value=pxe",
                "--password=secret",
                "--json"
            ]
        );
    }

    #[test]
    fn test_argv_with_key() {
        let p = params(json!({
            "ToolPath": "tool",
            "KeyPath": "/keys/bios.pem",
            "Option": "SecureBoot",
            "Value": "Enabled",
        }));
        assert_eq!(p.parameter.argv()[5], "--private-key=/keys/bios.pem");
    }

    #[test]
    fn test_validation_rules() {
        let step = step();
        let valid = json!({"ToolPath": "tool", "Password": "pw", "Option": "A", "Value": "B"});
        assert!(step.validate(&params(valid)).is_ok());

        let cases = [
            (
                json!({"ToolPath": "tool", "Option": "A", "Value": "B"}),
                "password or certificate file must be set",
            ),
            (
                json!({"ToolPath": "tool", "Password": "pw", "KeyPath": "k", "Option": "A", "Value": "B"}),
                "only one of password or certificate file may be set",
            ),
            (
                json!({"ToolPath": "tool", "Password": "pw", "Option": "A"}),
                "bios option and value must be set",
            ),
            (
                json!({"Password": "pw", "Option": "A", "Value": "B"}),
                "tool path must be set",
            ),
        ];
        for (parameter, expected) in cases {
            let err = step.validate(&params(parameter)).unwrap_err();
            assert!(err.to_string().contains(expected), "{} vs {}", err, expected);
        }
    }

    #[test]
    fn test_only_ssh_is_accepted() {
        let mut p = params(json!({"ToolPath": "t", "Password": "pw", "Option": "A", "Value": "B"}));
        p.transport.proto = "local".to_string();
        let err = step().validate(&p).unwrap_err();
        assert!(matches!(err, StepError::Validation(_)));
        assert!(err.to_string().contains("\"ssh\""));
    }

    #[test]
    fn test_locked_message_policy() {
        let locked = CapturedOutput::new(
            Vec::new(),
            format!(r#"{{"error":"{}"}}"#, BIOS_LOCKED_MSG).into_bytes(),
        );
        let mut p = params(json!({"ToolPath": "t", "Password": "pw", "Option": "A", "Value": "B"}));

        p.parameter.shall_fail = true;
        assert!(step().parse_output(&locked, &p).is_ok());

        p.parameter.shall_fail = false;
        let err = step().parse_output(&locked, &p).unwrap_err();
        assert_eq!(err.to_string(), BIOS_LOCKED_MSG);
    }

    #[test]
    fn test_validate_parameters_checks_structure() {
        let missing = BiosSettingsSet::new(json!({"parameter": {}})).unwrap();
        assert!(missing.validate_parameters().is_err());
        assert!(step().validate_parameters().is_ok());
    }
}
