//! Client core for the YACHAQ Requester API.
//!
//! # Overview
//! Creates data-access requests, verifies signed data capsules, files
//! disputes and reads tier/analytics data over HTTP/JSON. Every operation is
//! "build request, execute, classify response".
//!
//! # Design
//! - [`RequesterApi`] is stateless and does no I/O: `build_*` produces an
//!   [`HttpRequest`], `parse_*` classifies an [`HttpResponse`].
//! - [`YachaqClient`] executes those requests with `reqwest` and holds the
//!   bearer token, which `authenticate` replaces on success.
//! - [`envelope`] turns a response into either the typed payload or one
//!   [`SdkError`] variant; reserved status codes are checked before the body.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.
//!
//! ```no_run
//! use std::str::FromStr;
//!
//! use rust_decimal::Decimal;
//! use yachaq_core::{ClientConfig, OutputMode, RequestConfig, YachaqClient};
//!
//! # async fn run() -> Result<(), yachaq_core::SdkError> {
//! let client = YachaqClient::new(ClientConfig::default().with_api_key("your-api-key"))?;
//! client.authenticate(None).await?;
//! let created = client
//!     .create_request(&RequestConfig::new(
//!         ["health:steps"],
//!         Decimal::from_str("5.00").unwrap(),
//!         OutputMode::AggregateOnly,
//!     ))
//!     .await?;
//! println!("{:?}", created.request_id);
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod types;

pub use api::RequesterApi;
pub use client::YachaqClient;
pub use config::ClientConfig;
pub use envelope::Envelope;
pub use error::{ErrorKind, SdkError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use types::*;
