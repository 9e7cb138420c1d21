// Step input
// `{"transport": {...}, "parameter": {...}, "options": {"timeout": "30s"}}`
// Transport and parameter blocks stay raw until expanded against a target;
// options are target-independent and decoded once.

use serde_json::Value;
use steprun_core::domain::{StepOptions, TransportParameters, TRANSPORT_KEYWORD};
use steprun_core::{Result, StepError};

pub const PARAMETER_KEYWORD: &str = "parameter";
pub const OPTIONS_KEYWORD: &str = "options";

#[derive(Debug, Clone)]
pub struct StepInput {
    raw: Value,
    options: StepOptions,
}

impl StepInput {
    pub fn parse(raw: Value) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| StepError::validation("step input must be a JSON object"))?;

        let options = match object.get(OPTIONS_KEYWORD) {
            None | Some(Value::Null) => StepOptions::default(),
            Some(opts) => serde_json::from_value(opts.clone()).map_err(|e| {
                StepError::validation(format!("failed to deserialize options: {}", e))
            })?,
        };

        Ok(Self { raw, options })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn options(&self) -> &StepOptions {
        &self.options
    }

    /// Load-time check: both blocks present, transport block well-formed
    pub fn validate_structure(&self) -> Result<()> {
        let transport = self
            .raw
            .get(TRANSPORT_KEYWORD)
            .filter(|v| !v.is_null())
            .ok_or_else(|| StepError::validation("transport cannot be empty"))?;
        serde_json::from_value::<TransportParameters>(transport.clone()).map_err(|e| {
            StepError::validation(format!("failed to deserialize transport: {}", e))
        })?;

        if self.raw.get(PARAMETER_KEYWORD).filter(|v| !v.is_null()).is_none() {
            return Err(StepError::validation("parameter cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_parses_timeout() {
        let input = StepInput::parse(json!({
            "transport": {"proto": "ssh"},
            "parameter": {},
            "options": {"timeout": "90s"}
        }))
        .unwrap();

        assert_eq!(input.options().timeout(), Some(Duration::from_secs(90)));
        assert!(input.validate_structure().is_ok());
    }

    #[test]
    fn test_missing_options_means_unbounded() {
        let input = StepInput::parse(json!({"transport": {"proto": "ssh"}, "parameter": {}})).unwrap();
        assert_eq!(input.options().timeout(), None);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(StepInput::parse(json!([1, 2])).is_err());
        assert!(StepInput::parse(json!({"options": {"timeout": "soon"}})).is_err());

        let no_transport = StepInput::parse(json!({"parameter": {}})).unwrap();
        let err = no_transport.validate_structure().unwrap_err();
        assert_eq!(err.to_string(), "Validation error: transport cannot be empty");

        let bad_transport = StepInput::parse(json!({"transport": "ssh", "parameter": {}})).unwrap();
        assert!(bad_transport.validate_structure().is_err());

        let no_parameter = StepInput::parse(json!({"transport": {"proto": "ssh"}})).unwrap();
        assert!(no_parameter.validate_structure().is_err());
    }
}
