//! HTTP client module with retry logic and error handling.

mod client;
mod request;
mod retry;

pub use client::ApiClient;
pub use request::{ApiRequest, join_url};
pub use retry::{MAX_RETRY_TIME, RetryPolicy, retry};
