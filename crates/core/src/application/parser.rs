// Output/Error Parser
// Turns captured bytes into success or a structured domain error, with
// caller-controlled tolerance for known benign preconditions.

use crate::domain::{CapturedOutput, DomainError};
use crate::error::{Result, StepError};
use serde::Deserialize;
use tracing::debug;

/// Reported by the BIOS settings tool when settings must be unlocked first
pub const BIOS_LOCKED_MSG: &str = "BIOS options are locked, needs unlocking.";

/// Structured error object written by remote tools: `{"error": "<message>"}`
#[derive(Debug, Default, Deserialize)]
struct ToolError {
    #[serde(rename = "error", default)]
    msg: String,
}

/// Which messages count as benign, and whether the caller opted in to tolerate them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftFailurePolicy {
    benign: Vec<String>,
    tolerate: bool,
}

impl SoftFailurePolicy {
    /// Every non-empty message is an error
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn new<I, S>(benign: I, tolerate: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            benign: benign.into_iter().map(Into::into).collect(),
            tolerate,
        }
    }

    /// Messages must match exactly; both tiers must agree
    pub fn tolerates(&self, msg: &str) -> bool {
        self.tolerate && self.benign.iter().any(|b| b == msg)
    }
}

/// Parse a structured error document
///
/// Empty input is success. Non-empty input that does not decode is a
/// `StepError::Decode`. A decoded non-empty message is a `DomainError`
/// unless the policy tolerates it.
pub fn parse_error_output(raw: &[u8], policy: &SoftFailurePolicy) -> Result<()> {
    if raw.is_empty() {
        return Ok(());
    }

    let decoded: ToolError = serde_json::from_slice(raw).map_err(|e| {
        StepError::Decode(format!(
            "failed to unmarshal error output '{}': {}",
            String::from_utf8_lossy(raw),
            e
        ))
    })?;

    if decoded.msg.is_empty() {
        return Ok(());
    }
    if policy.tolerates(&decoded.msg) {
        debug!(message = %decoded.msg, "Tolerating benign remote error");
        return Ok(());
    }
    Err(DomainError::Remote(decoded.msg).into())
}

/// Pluggable per-use-case classification of captured output
pub trait OutputParser: Send + Sync {
    fn parse(&self, output: &CapturedOutput) -> Result<()>;
}

/// Reads the structured error object from stderr
#[derive(Debug, Clone, Default)]
pub struct StderrErrorParser {
    policy: SoftFailurePolicy,
}

impl StderrErrorParser {
    pub fn new(policy: SoftFailurePolicy) -> Self {
        Self { policy }
    }
}

impl OutputParser for StderrErrorParser {
    fn parse(&self, output: &CapturedOutput) -> Result<()> {
        parse_error_output(output.stderr(), &self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bios_policy(tolerate: bool) -> SoftFailurePolicy {
        SoftFailurePolicy::new([BIOS_LOCKED_MSG], tolerate)
    }

    #[test]
    fn test_empty_and_blank_message_succeed() {
        assert!(parse_error_output(b"", &SoftFailurePolicy::strict()).is_ok());
        assert!(parse_error_output(br#"{"error":""}"#, &SoftFailurePolicy::strict()).is_ok());
        assert!(parse_error_output(b"{}", &SoftFailurePolicy::strict()).is_ok());
    }

    #[test]
    fn test_malformed_input_is_decode_error() {
        for raw in [&b"not json"[..], b"[1,2]", b"{\"error\": 5}", b"  ", b"null"] {
            let err = parse_error_output(raw, &bios_policy(true)).unwrap_err();
            assert!(matches!(err, StepError::Decode(_)), "input {:?}", raw);
        }
    }

    #[test]
    fn test_benign_message_needs_opt_in() {
        let raw = format!(r#"{{"error":"{}"}}"#, BIOS_LOCKED_MSG);

        assert!(parse_error_output(raw.as_bytes(), &bios_policy(true)).is_ok());

        let err = parse_error_output(raw.as_bytes(), &bios_policy(false)).unwrap_err();
        assert!(matches!(err, StepError::Domain(DomainError::Remote(_))));
        assert_eq!(err.to_string(), BIOS_LOCKED_MSG);
    }

    #[test]
    fn test_near_miss_is_not_tolerated() {
        let raw = br#"{"error":"BIOS options are locked"}"#;
        let err = parse_error_output(raw, &bios_policy(true)).unwrap_err();
        assert_eq!(err.to_string(), "BIOS options are locked");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let raw = br#"{"error":"option not found"}"#;
        let first = parse_error_output(raw, &bios_policy(true)).unwrap_err().to_string();
        let second = parse_error_output(raw, &bios_policy(true)).unwrap_err().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stderr_parser_ignores_stdout() {
        let parser = StderrErrorParser::new(SoftFailurePolicy::strict());
        let output = CapturedOutput::new(b"garbage".to_vec(), br#"{"error":""}"#.to_vec());
        assert!(parser.parse(&output).is_ok());
    }
}
