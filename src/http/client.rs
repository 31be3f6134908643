//! Blocking API client with built-in retry logic and error classification.

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::request::{ApiRequest, join_url};
use super::retry::{RetryPolicy, retry};
use crate::classify::{ClassifyError, ErrorContext};
use crate::config::{ClientBuilder, ClientConfig};
use crate::error::{ApiError, Error, Result, UNKNOWN};

/// Client for a JSON REST API.
///
/// Owns one HTTP session. Calls block the current thread, including backoff
/// sleeps; use one client per thread when calling concurrently.
pub struct ApiClient {
    config: ClientConfig,
    session: Client,
    retry_policy: RetryPolicy,
    classifier: Box<dyn ClassifyError>,
}

impl ApiClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client with default settings for `url`, or for the URL in the environment.
    pub fn new(url: Option<String>) -> Result<Self> {
        match url {
            Some(url) => Self::builder().url(url).build(),
            None => Self::builder().build(),
        }
    }

    pub(crate) fn from_config(
        config: ClientConfig,
        classifier: Box<dyn ClassifyError>,
    ) -> Result<Self> {
        let session = config.session()?;
        let retry_policy =
            RetryPolicy::new(config.max_retries()).with_initial_delay(config.initial_backoff());

        debug!(
            "Created API client for {} (timeout {:?}, {} attempts)",
            config.base_url(),
            config.timeout(),
            retry_policy.max_tries()
        );

        Ok(Self {
            config,
            session,
            retry_policy,
            classifier,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Full URL for `endpoint` under the configured base URL.
    pub fn url_for(&self, endpoint: &str) -> String {
        join_url(self.config.base_url(), endpoint)
    }

    /// Sends `request` and returns the decoded JSON payload.
    ///
    /// Rate limits, request flooding and timeouts are retried with exponential
    /// backoff; every other error is returned on first occurrence.
    #[tracing::instrument(
        skip(self, request),
        fields(method = %request.method(), endpoint = request.endpoint())
    )]
    pub fn call(&self, request: &ApiRequest) -> Result<Value> {
        let operation_name = format!("{} {}", request.method(), request.endpoint());
        retry(&self.retry_policy, &operation_name, Error::is_retryable, || {
            self.call_once(request)
        })
    }

    /// Like [`call`](Self::call), deserializing the payload into `T`.
    pub fn call_as<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let value = self.call(request)?;
        serde_json::from_value(value).map_err(Error::Serialize)
    }

    pub fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.call(&ApiRequest::get(endpoint).query_pairs(query))
    }

    pub fn post(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        self.call(&with_body(ApiRequest::post(endpoint).query_pairs(query), body)?)
    }

    pub fn put(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        self.call(&with_body(ApiRequest::put(endpoint).query_pairs(query), body)?)
    }

    pub fn delete(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.call(&ApiRequest::delete(endpoint).query_pairs(query))
    }

    /// Single attempt without retry.
    fn call_once(&self, request: &ApiRequest) -> Result<Value> {
        let url = self.url_for(request.endpoint());
        debug!("{} {}...", request.method(), url);

        let mut builder = self
            .session
            .request(request.method().clone(), &url)
            .query(request.query_params());
        if let Some(body) = request.body() {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }
        if let Some(credentials) = self.config.credentials() {
            builder = credentials.apply(builder);
        }

        let response = builder.send().map_err(|e| self.transport_error(e, &url))?;
        let status = response.status().as_u16();
        let response_url = response.url().to_string();
        let body = response.text().map_err(|e| self.transport_error(e, &url))?;

        debug!("{} {} -> HTTP {}", request.method(), url, status);

        decode_response(status, &response_url, body, self.classifier.as_ref())
    }

    fn transport_error(&self, error: reqwest::Error, url: &str) -> Error {
        if error.is_timeout() {
            debug!("Request to {} timed out: {}", url, error);
            Error::Timeout {
                url: url.to_string(),
                timeout: self.config.timeout(),
            }
        } else {
            Error::Http(error)
        }
    }
}

/// Empty bodies (`null`, `{}`, `[]`) are not sent.
fn with_body(request: ApiRequest, body: Option<&Value>) -> Result<ApiRequest> {
    match body {
        Some(body) if !is_empty_body(body) => request.json(body),
        _ => Ok(request),
    }
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(object) => object.is_empty(),
        Value::Array(array) => array.is_empty(),
        _ => false,
    }
}

/// Turns a response into the payload or a classified error.
///
/// A 200 without a parseable body is a success with an empty object; a 200
/// whose payload has an `error` key is treated as a failure.
fn decode_response(
    status: u16,
    url: &str,
    body: String,
    classifier: &dyn ClassifyError,
) -> Result<Value> {
    if status == 200 {
        match serde_json::from_str::<Value>(&body) {
            Ok(payload) if !has_error_key(&payload) => return Ok(payload),
            Ok(_) => {}
            Err(_) => return Ok(Value::Object(Map::new())),
        }
    }

    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(source) => {
            return Err(Error::JsonDecode {
                url: url.to_string(),
                status_code: status,
                body,
                source,
            });
        }
    };

    let message = text_field(&payload, &["error", "message"]);
    let constant =
        text_field(&payload, &["error_type", "status"]).unwrap_or_else(|| UNKNOWN.to_string());
    // Only an absent key defaults; a present null or empty value is kept
    let error_code = match payload.get("errorCode") {
        None => UNKNOWN.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let details = payload
        .get("details")
        .cloned()
        .unwrap_or_else(|| Value::String(UNKNOWN.to_string()));

    let kind = classifier.classify(&ErrorContext {
        status,
        error_code: error_code.clone(),
        constant: constant.clone(),
    });

    debug!("HTTP {} from {} classified as {}", status, url, kind);

    Err(Error::Api(ApiError {
        status_code: status,
        kind,
        constant,
        message,
        error_code,
        details,
        body,
    }))
}

fn has_error_key(payload: &Value) -> bool {
    payload
        .as_object()
        .is_some_and(|object| object.contains_key("error"))
}

/// First of `keys` holding a non-empty value, rendered as text.
fn text_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
}
