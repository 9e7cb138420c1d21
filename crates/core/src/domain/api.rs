// Job-control API Model
// Typed responses produced by an API transport

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job identifier assigned by the job-control server
pub type JobId = u64;

/// Run identifier within a job
pub type RunId = u64;

/// Job states as named by the job-control server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "JobStateUnknown")]
    Unknown,
    #[serde(rename = "JobStateStarted")]
    Started,
    #[serde(rename = "JobStateCompleted")]
    Completed,
    #[serde(rename = "JobStateFailed")]
    Failed,
    #[serde(rename = "JobStatePaused")]
    Paused,
    #[serde(rename = "JobStatePauseFailed")]
    PauseFailed,
    #[serde(rename = "JobStateCancelling")]
    Cancelling,
    #[serde(rename = "JobStateCancelled")]
    Cancelled,
    #[serde(rename = "JobStateCancellationFailed")]
    CancellationFailed,
}

impl JobState {
    pub const ALL: [JobState; 9] = [
        JobState::Unknown,
        JobState::Started,
        JobState::Completed,
        JobState::Failed,
        JobState::Paused,
        JobState::PauseFailed,
        JobState::Cancelling,
        JobState::Cancelled,
        JobState::CancellationFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Unknown => "JobStateUnknown",
            JobState::Started => "JobStateStarted",
            JobState::Completed => "JobStateCompleted",
            JobState::Failed => "JobStateFailed",
            JobState::Paused => "JobStatePaused",
            JobState::PauseFailed => "JobStatePauseFailed",
            JobState::Cancelling => "JobStateCancelling",
            JobState::Cancelled => "JobStateCancelled",
            JobState::CancellationFailed => "JobStateCancellationFailed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .find(|st| st.as_str() == s || st.as_str().trim_start_matches("JobState") == s)
            .copied()
            .ok_or_else(|| format!("unknown job state '{}'", s))
    }
}

/// Error object carried by an API response; servers send it as a string or `{"msg": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub msg: String,
}

impl ApiError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for ApiError {}

impl<'de> Deserialize<'de> for ApiError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Object {
                #[serde(alias = "Msg", alias = "error", alias = "Error")]
                msg: String,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(msg) => ApiError { msg },
            Raw::Object { msg } => ApiError { msg },
        })
    }
}

/// Typed API response; constructed per request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub server_id: String,
    pub response_type: String,
    pub data: T,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Extract the payload, turning an embedded error into `Err`
    pub fn into_data(self) -> Result<T, ApiError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.data),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    #[serde(rename = "Version", default)]
    pub version: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartData {
    #[serde(rename = "JobID", default)]
    pub job_id: JobId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopData {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "StateErrMsg", default, skip_serializing_if = "String::is_empty")]
    pub state_error: String,
    /// Fields this layer does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    #[serde(rename = "Status", default)]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryData {
    #[serde(rename = "JobID", default)]
    pub job_id: JobId,
    #[serde(rename = "RunID", default)]
    pub run_id: RunId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListData {
    pub job_ids: Vec<JobId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_accepts_string_and_object() {
        let e: ApiError = serde_json::from_str(r#""job not found""#).unwrap();
        assert_eq!(e.msg, "job not found");

        let e: ApiError = serde_json::from_str(r#"{"msg": "job not found"}"#).unwrap();
        assert_eq!(e.msg, "job not found");

        assert!(serde_json::from_str::<ApiError>("42").is_err());
    }

    #[test]
    fn test_job_state_names() {
        assert_eq!(JobState::Started.to_string(), "JobStateStarted");
        assert_eq!("JobStateFailed".parse::<JobState>().unwrap(), JobState::Failed);
        assert_eq!("Paused".parse::<JobState>().unwrap(), JobState::Paused);
        assert!("Sleeping".parse::<JobState>().is_err());
    }

    #[test]
    fn test_into_data() {
        let ok = ApiResponse {
            server_id: "srv".to_string(),
            response_type: "ResponseTypeStart".to_string(),
            data: StartData { job_id: 3 },
            error: None,
        };
        assert_eq!(ok.into_data().unwrap().job_id, 3);

        let failed = ApiResponse {
            server_id: "srv".to_string(),
            response_type: "ResponseTypeStart".to_string(),
            data: StartData::default(),
            error: Some(ApiError::new("bad descriptor")),
        };
        assert_eq!(failed.into_data().unwrap_err().msg, "bad descriptor");
    }
}
