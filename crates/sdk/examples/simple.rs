//! Simple SDK Example
//!
//! Queries a job-control server for its version and the jobs that failed.
//!
//! # Usage
//!
//! ```bash
//! STEPRUN_SERVER_URL=http://localhost:8080 cargo run --package steprun-sdk --example simple
//! ```

use steprun_core::domain::JobState;
use steprun_core::port::ApiTransport;
use steprun_core::ExecContext;
use steprun_sdk::HttpApiClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr =
        std::env::var("STEPRUN_SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let client = HttpApiClient::new(&addr)?;
    let ctx = ExecContext::background();

    let version = client.version(&ctx, "sdk-example").await?;
    println!("Server {} (API v{})", version.server_id, version.data.version);

    let failed = client
        .list(&ctx, "sdk-example", &[JobState::Failed], &[])
        .await?
        .into_data()?;
    println!("Failed jobs: {:?}", failed.job_ids);

    Ok(())
}
