// Parameter Expander Port
// Expands raw step parameters against a target's attributes

use crate::domain::Target;
use crate::error::{Result, StepError};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parameter expansion (job engine collaborator)
pub trait ParamExpander: Send + Sync {
    /// Expand every templated value in `raw`
    fn expand(&self, raw: &Value) -> Result<Value>;
}

/// Expand `raw` and decode it into typed parameters
pub fn expand_object<T: DeserializeOwned>(expander: &dyn ParamExpander, raw: &Value) -> Result<T> {
    let expanded = expander.expand(raw)?;
    serde_json::from_value(expanded)
        .map_err(|e| StepError::validation(format!("cannot decode expanded parameters: {}", e)))
}

/// Default expander: substitutes `{{ .Field }}` placeholders with target attributes
pub struct TargetExpander {
    target: Target,
}

impl TargetExpander {
    pub fn new(target: &Target) -> Self {
        Self {
            target: target.clone(),
        }
    }

    fn expand_str(&self, s: &str) -> Result<String> {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or_else(|| StepError::validation(format!("unterminated template in '{}'", s)))?;
            let expr = after[..close].trim();
            let field = expr.strip_prefix('.').ok_or_else(|| {
                StepError::validation(format!("unsupported template expression '{}'", expr))
            })?;
            let value = self.target.attribute(field).ok_or_else(|| {
                StepError::validation(format!(
                    "target {} has no value for '{}'",
                    self.target, field
                ))
            })?;
            out.push_str(&value);
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl ParamExpander for TargetExpander {
    fn expand(&self, raw: &Value) -> Result<Value> {
        Ok(match raw {
            Value::String(s) => Value::String(self.expand_str(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.expand(v))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut expanded = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    expanded.insert(k.clone(), self.expand(v)?);
                }
                Value::Object(expanded)
            }
            other => other.clone(),
        })
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Returns input unchanged
    pub struct IdentityExpander;

    impl ParamExpander for IdentityExpander {
        fn expand(&self, raw: &Value) -> Result<Value> {
            Ok(raw.clone())
        }
    }

    /// Always fails
    pub struct FailingExpander(pub String);

    impl ParamExpander for FailingExpander {
        fn expand(&self, _raw: &Value) -> Result<Value> {
            Err(StepError::validation(self.0.clone()))
        }
    }
}
