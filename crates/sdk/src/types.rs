//! Wire types of the job-control HTTP API
//!
//! `Data` stays undecoded until the verb knows its payload type.

use serde::Deserialize;
use steprun_core::domain::ApiError;

/// Success body (HTTP 200): `{"ServerID", "Type", "Data", "Error"}`
#[derive(Debug, Deserialize)]
pub(crate) struct PartialResponse {
    #[serde(rename = "ServerID", default)]
    pub server_id: String,
    #[serde(rename = "Type", default)]
    pub response_type: String,
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
    #[serde(rename = "Error", default)]
    pub error: Option<ApiError>,
}

/// Error body (any other status): `{"msg"}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub msg: String,
}
