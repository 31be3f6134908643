//! Base client for the Censys JSON REST API.
//!
//! [`ApiClient`] owns the HTTP session and turns every call into either the
//! decoded JSON payload or a typed [`Error`]. Endpoint-specific clients build
//! on top of it and plug in their own [`ClassifyError`] to map domain error
//! codes onto [`ErrorKind`]s.
//!
//! ```no_run
//! use censys::{ApiClient, ApiRequest};
//!
//! # fn main() -> censys::Result<()> {
//! let client = ApiClient::builder()
//!     .url("https://search.censys.io/api")
//!     .build()?;
//! let hosts = client.call(&ApiRequest::get("/v2/hosts/search").query("q", "services.port: 22"))?;
//! println!("{}", hosts["result"]["total"]);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod http;

pub use classify::{ClassifyError, ErrorContext, GenericClassifier, StatusClassifier};
pub use config::{API_URL_ENV, ClientBuilder, ClientConfig, Credentials};
pub use error::{ApiError, Error, ErrorKind, Result};
pub use http::{ApiClient, ApiRequest, RetryPolicy};
