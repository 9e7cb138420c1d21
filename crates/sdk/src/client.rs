//! Job-control HTTP API client

use crate::error::{body_unreadable, request_failed};
use crate::types::{ErrorBody, PartialResponse};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use steprun_core::domain::{
    ApiResponse, JobId, JobState, ListData, RetryData, StartData, StatusData, StopData,
    VersionData,
};
use steprun_core::port::{
    decode_options, ApiTransport, ParamExpander, Transport, TransportError, TransportFactory,
};
use steprun_core::ExecContext;
use tracing::{debug, info};

/// Client for the job-control server
///
/// Every verb is a form-encoded `POST <base>/<verb>` tagged with the caller's
/// `requestor` identity.
///
/// # Example
///
/// ```no_run
/// # use steprun_sdk::HttpApiClient;
/// # use steprun_core::{port::ApiTransport, ExecContext};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpApiClient::new("http://localhost:8080")?;
/// let resp = client.status(&ExecContext::background(), "steprun", 42).await?;
/// println!("{:?}", resp.data.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    inner: reqwest::Client,
    base_url: Url,
}

impl HttpApiClient {
    /// Fails with `InvalidAddress` unless `addr` is an http(s) URL
    pub fn new(addr: &str) -> Result<Self, TransportError> {
        Ok(Self {
            inner: reqwest::Client::new(),
            base_url: parse_base_url(addr)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, verb: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/{}", url.path().trim_end_matches('/'), verb);
        url.set_path(&path);
        url
    }

    async fn request<T>(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        verb: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<ApiResponse<T>, TransportError>
    where
        T: DeserializeOwned + Default,
    {
        params.push(("requestor", requestor.to_string()));
        let url = self.endpoint(verb);
        info!(url = %url, requestor, params = ?params, "Requesting job-control server");

        let exchange = async {
            let response = self
                .inner
                .post(url.clone())
                .form(&params)
                .send()
                .await
                .map_err(|e| request_failed(verb, e))?;
            let status = response.status();
            let body = response.bytes().await.map_err(|e| body_unreadable(verb, e))?;
            Ok::<_, TransportError>((status, body))
        };
        let (status, body) = ctx.run(exchange).await??;
        info!(verb, status = %status, "The server responded");

        decode_response(verb, status, &body)
    }
}

/// Only http and https base URLs are accepted
fn parse_base_url(addr: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidAddress {
        addr: addr.to_string(),
        reason,
    };
    match Url::parse(addr) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!(
                "unsupported URL scheme '{}', please specify either http or https",
                other
            ))),
        },
        Err(_) if !addr.contains(':') => Err(invalid("server URL scheme not specified".to_string())),
        Err(e) => Err(invalid(format!("failed to parse server address: {}", e))),
    }
}

fn decode_response<T>(
    verb: &str,
    status: StatusCode,
    body: &[u8],
) -> Result<ApiResponse<T>, TransportError>
where
    T: DeserializeOwned + Default,
{
    let raw_body = || String::from_utf8_lossy(body).into_owned();

    if status != StatusCode::OK {
        let err: ErrorBody = serde_json::from_slice(body).map_err(|e| TransportError::Decode {
            context: format!(
                "'{}' response ({}) is not a valid API error object ({})",
                verb, status, e
            ),
            body: raw_body(),
        })?;
        return Err(TransportError::Remote {
            verb: verb.to_string(),
            msg: err.msg,
        });
    }

    let partial: PartialResponse =
        serde_json::from_slice(body).map_err(|e| TransportError::Decode {
            context: format!("'{}' response is not a valid API response object ({})", verb, e),
            body: raw_body(),
        })?;

    let data = if partial.data.is_null() {
        T::default()
    } else {
        serde_json::from_value(partial.data).map_err(|e| TransportError::Decode {
            context: format!("cannot decode '{}' response data ({})", verb, e),
            body: raw_body(),
        })?
    };
    debug!(verb, server_id = %partial.server_id, "Decoded API response");

    Ok(ApiResponse {
        server_id: partial.server_id,
        response_type: partial.response_type,
        data,
        error: partial.error,
    })
}

#[async_trait]
impl ApiTransport for HttpApiClient {
    async fn version(
        &self,
        ctx: &ExecContext,
        requestor: &str,
    ) -> Result<ApiResponse<VersionData>, TransportError> {
        self.request(ctx, requestor, "version", Vec::new()).await
    }

    async fn start(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_descriptor: &str,
    ) -> Result<ApiResponse<StartData>, TransportError> {
        let params = vec![("jobDesc", job_descriptor.to_string())];
        self.request(ctx, requestor, "start", params).await
    }

    async fn stop(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_id: JobId,
    ) -> Result<ApiResponse<StopData>, TransportError> {
        let params = vec![("jobID", job_id.to_string())];
        self.request(ctx, requestor, "stop", params).await
    }

    async fn status(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_id: JobId,
    ) -> Result<ApiResponse<StatusData>, TransportError> {
        let params = vec![("jobID", job_id.to_string())];
        self.request(ctx, requestor, "status", params).await
    }

    async fn retry(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        job_id: JobId,
    ) -> Result<ApiResponse<RetryData>, TransportError> {
        let params = vec![("jobID", job_id.to_string())];
        self.request(ctx, requestor, "retry", params).await
    }

    async fn list(
        &self,
        ctx: &ExecContext,
        requestor: &str,
        states: &[JobState],
        tags: &[String],
    ) -> Result<ApiResponse<ListData>, TransportError> {
        let mut params = Vec::new();
        if !states.is_empty() {
            let names: Vec<&str> = states.iter().map(JobState::as_str).collect();
            params.push(("states", names.join(",")));
        }
        if !tags.is_empty() {
            params.push(("tags", tags.join(",")));
        }
        self.request(ctx, requestor, "list", params).await
    }
}

/// Options of the `http` protocol
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpOptions {
    pub addr: String,
}

pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(
        &self,
        options: &serde_json::Value,
        expander: &dyn ParamExpander,
    ) -> Result<Transport, TransportError> {
        let options: HttpOptions = decode_options(options, expander)?;
        Ok(Transport::Api(Arc::new(HttpApiClient::new(&options.addr)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::time::Duration;
    use steprun_core::ContextError;

    type FormData = Form<HashMap<String, String>>;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn ok_body(response_type: &str, data: Value) -> Json<Value> {
        Json(json!({
            "ServerID": "test-server",
            "Type": response_type,
            "Data": data,
            "Error": null,
        }))
    }

    #[tokio::test]
    async fn test_status_decodes_typed_payload() {
        async fn status(Form(form): FormData) -> (AxumStatus, Json<Value>) {
            if form.get("requestor").map(String::as_str) != Some("tester")
                || form.get("jobID").map(String::as_str) != Some("42")
            {
                return (AxumStatus::BAD_REQUEST, Json(json!({"msg": "bad form"})));
            }
            let data = json!({"Status": {"Name": "bios-update", "State": "JobStateCompleted"}});
            (AxumStatus::OK, ok_body("ResponseTypeStatus", data))
        }
        let base = serve(Router::new().route("/status", post(status))).await;
        let client = HttpApiClient::new(&base).unwrap();

        let resp = client
            .status(&ExecContext::background(), "tester", 42)
            .await
            .unwrap();

        assert_eq!(resp.server_id, "test-server");
        assert_eq!(resp.response_type, "ResponseTypeStatus");
        assert!(resp.error.is_none());
        let status = resp.data.status.unwrap();
        assert_eq!(status.name, "bios-update");
        assert_eq!(status.state, "JobStateCompleted");
    }

    #[tokio::test]
    async fn test_non_success_status_is_structured_error() {
        async fn status() -> (AxumStatus, Json<Value>) {
            (
                AxumStatus::INTERNAL_SERVER_ERROR,
                Json(json!({"msg": "job not found"})),
            )
        }
        let base = serve(Router::new().route("/status", post(status))).await;
        let client = HttpApiClient::new(&base).unwrap();

        let err = client
            .status(&ExecContext::background(), "tester", 7)
            .await
            .unwrap_err();

        match &err {
            TransportError::Remote { verb, msg } => {
                assert_eq!(verb, "status");
                assert_eq!(msg, "job not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("job not found"));
        assert!(!err.is_launch_failure());
    }

    #[tokio::test]
    async fn test_embedded_error_is_kept_on_success_reply() {
        async fn stop() -> Json<Value> {
            Json(json!({
                "ServerID": "test-server",
                "Type": "ResponseTypeStop",
                "Data": null,
                "Error": "job 3 already completed",
            }))
        }
        let base = serve(Router::new().route("/stop", post(stop))).await;
        let client = HttpApiClient::new(&base).unwrap();

        let resp = client
            .stop(&ExecContext::background(), "tester", 3)
            .await
            .unwrap();

        assert_eq!(resp.data, StopData {});
        assert_eq!(resp.into_data().unwrap_err().msg, "job 3 already completed");
    }

    #[tokio::test]
    async fn test_malformed_body_includes_raw_text() {
        async fn version() -> &'static str {
            "<html>proxy error</html>"
        }
        let base = serve(Router::new().route("/version", post(version))).await;
        let client = HttpApiClient::new(&base).unwrap();

        let err = client
            .version(&ExecContext::background(), "tester")
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Decode { .. }));
        assert!(err.to_string().contains("<html>proxy error</html>"));
    }

    #[tokio::test]
    async fn test_list_joins_states_and_tags_under_base_path() {
        async fn list(Form(form): FormData) -> (AxumStatus, Json<Value>) {
            let expected_states = "JobStateCompleted,JobStateFailed";
            if form.get("states").map(String::as_str) != Some(expected_states)
                || form.get("tags").map(String::as_str) != Some("bios,nightly")
            {
                return (AxumStatus::BAD_REQUEST, Json(json!({"msg": "bad form"})));
            }
            (AxumStatus::OK, ok_body("ResponseTypeList", json!([4, 8])))
        }
        let base = serve(Router::new().route("/api/v1/list", post(list))).await;
        let client = HttpApiClient::new(&format!("{}/api/v1/", base)).unwrap();

        let resp = client
            .list(
                &ExecContext::background(),
                "tester",
                &[JobState::Completed, JobState::Failed],
                &["bios".to_string(), "nightly".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(resp.data.job_ids, vec![4, 8]);
    }

    #[tokio::test]
    async fn test_start_and_retry_payloads() {
        async fn start(Form(form): FormData) -> Json<Value> {
            let job_id = if form.get("jobDesc").is_some_and(|d| d.contains("JobName")) {
                11
            } else {
                0
            };
            ok_body("ResponseTypeStart", json!({"JobID": job_id}))
        }
        async fn retry() -> Json<Value> {
            ok_body("ResponseTypeRetry", json!({"JobID": 11, "RunID": 2}))
        }
        let base = serve(
            Router::new()
                .route("/start", post(start))
                .route("/retry", post(retry)),
        )
        .await;
        let client = HttpApiClient::new(&base).unwrap();
        let ctx = ExecContext::background();

        let started = client
            .start(&ctx, "tester", r#"{"JobName": "bios"}"#)
            .await
            .unwrap();
        assert_eq!(started.data.job_id, 11);

        let retried = client.retry(&ctx, "tester", 11).await.unwrap();
        assert_eq!(retried.data, RetryData { job_id: 11, run_id: 2 });
    }

    #[test]
    fn test_address_without_scheme_is_rejected() {
        let err = HttpApiClient::new("example.com").unwrap_err();
        match err {
            TransportError::InvalidAddress { addr, reason } => {
                assert_eq!(addr, "example.com");
                assert_eq!(reason, "server URL scheme not specified");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(HttpApiClient::new("example.com")
            .unwrap_err()
            .is_launch_failure());
    }

    #[test]
    fn test_unsupported_scheme_is_rejected() {
        let err = HttpApiClient::new("ftp://example.com").unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme 'ftp'"));
        assert!(HttpApiClient::new("https://example.com").is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_launch_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = HttpApiClient::new(&format!("http://127.0.0.1:{}", port)).unwrap();

        let err = client
            .version(&ExecContext::background(), "tester")
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Request { .. }));
        assert!(err.is_launch_failure());
    }

    #[tokio::test]
    async fn test_deadline_aborts_in_flight_request() {
        async fn slow() -> Json<Value> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ok_body("ResponseTypeVersion", json!({"Version": 1}))
        }
        let base = serve(Router::new().route("/version", post(slow))).await;
        let client = HttpApiClient::new(&base).unwrap();
        let root = ExecContext::background();
        let scope = root.with_timeout(Duration::from_millis(100));

        let err = tokio::time::timeout(Duration::from_secs(5), client.version(&scope, "tester"))
            .await
            .expect("request must stop at the deadline")
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Interrupted(ContextError::DeadlineExceeded)
        ));
    }

    #[test]
    fn test_factory_builds_api_transport() {
        use steprun_core::domain::Target;
        use steprun_core::port::TargetExpander;

        let expander = TargetExpander::new(&Target::new("server-1"));
        let transport = HttpTransportFactory
            .create(&json!({"addr": "http://{{ .ID }}:8080"}), &expander)
            .unwrap();
        assert_eq!(transport.kind(), "api");

        let err = HttpTransportFactory
            .create(&json!({"addr": "server-1"}), &expander)
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { .. }));
    }
}
