//! Steprun SDK - HTTP API transport
//!
//! Typed client for the job-control server, usable directly or as the `http`
//! protocol of a transport registry.
//!
//! # Example
//!
//! ```no_run
//! use steprun_core::port::ApiTransport;
//! use steprun_core::ExecContext;
//! use steprun_sdk::HttpApiClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpApiClient::new("http://localhost:8080")?;
//!     let resp = client.version(&ExecContext::background(), "steprun").await?;
//!
//!     println!("Server {} speaks API version {}", resp.server_id, resp.data.version);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::{HttpApiClient, HttpOptions, HttpTransportFactory};
