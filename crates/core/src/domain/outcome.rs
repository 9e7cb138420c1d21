// Outcome of one execution attempt
// A launch failure never carries output; a completed execution always does.

use super::output::CapturedOutput;
use crate::error::StepError;

#[derive(Debug)]
pub enum Outcome {
    /// The process or call could not be started; nothing ran
    LaunchFailed(StepError),

    /// The process or call ran; `result` is the execution verdict
    Completed {
        output: CapturedOutput,
        result: Result<(), StepError>,
    },
}

impl Outcome {
    pub fn completed(output: CapturedOutput, result: Result<(), StepError>) -> Self {
        Outcome::Completed { output, result }
    }

    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Outcome::LaunchFailed(_))
    }

    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            Outcome::LaunchFailed(_) => None,
            Outcome::Completed { output, .. } => Some(output),
        }
    }

    /// Collapse into the run verdict, dropping captured output
    pub fn into_result(self) -> Result<(), StepError> {
        match self {
            Outcome::LaunchFailed(e) => Err(e),
            Outcome::Completed { result, .. } => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn test_launch_failure_has_no_output() {
        let outcome = Outcome::LaunchFailed(StepError::Internal("refused".to_string()));
        assert!(outcome.is_launch_failure());
        assert!(outcome.output().is_none());
        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn test_completed_failure_keeps_output() {
        let outcome = Outcome::completed(
            CapturedOutput::new(b"out".to_vec(), b"err".to_vec()),
            Err(DomainError::remote("boom").into()),
        );
        assert!(!outcome.is_launch_failure());
        assert_eq!(outcome.output().unwrap().stdout(), b"out");
        assert_eq!(outcome.into_result().unwrap_err().to_string(), "boom");
    }
}
