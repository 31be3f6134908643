//! Client configuration: base URL resolution, session headers, proxies and credentials.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use reqwest::{
    Proxy,
    blocking::{Client, RequestBuilder},
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};

use crate::classify::{ClassifyError, StatusClassifier};
use crate::error::{Error, Result};
use crate::http::ApiClient;

/// Environment variable holding the API base URL when none is passed explicitly.
pub const API_URL_ENV: &str = "CENSYS_API_URL";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default max number of attempts per call.
pub const DEFAULT_MAX_RETRIES: usize = 10;

/// Default user agent identifier, appended to [`HTTP_AGENT`].
pub const DEFAULT_USER_AGENT: &str = concat!("censys/", env!("CENSYS_VERSION"));

/// Leading user agent segment naming the HTTP library.
pub const HTTP_AGENT: &str = "reqwest";

/// Delay before the first retry. Later retries double it.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

const ACCEPT_JSON: &str = "application/json, */*";

/// Credentials sent with every request of a client.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP basic auth, e.g. an API id and secret.
    Basic { username: String, password: String },
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// A key sent in a named header, e.g. `Censys-Api-Key`.
    ApiKey { header: String, value: String },
}

impl Credentials {
    fn scheme(&self) -> &'static str {
        match self {
            Credentials::Basic { .. } => "basic",
            Credentials::Bearer(_) => "bearer",
            Credentials::ApiKey { .. } => "api key",
        }
    }

    /// Header-borne credentials go into the session's default headers.
    fn insert_header(&self, headers: &mut HeaderMap) -> Result<()> {
        let (name, mut value) = match self {
            Credentials::Basic { .. } => return Ok(()),
            Credentials::Bearer(token) => (
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| Error::Config(format!("invalid bearer token: {}", e)))?,
            ),
            Credentials::ApiKey { header, value } => (
                HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
                    Error::Config(format!("invalid header name {:?}: {}", header, e))
                })?,
                HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("invalid value for {}: {}", header, e)))?,
            ),
        };
        value.set_sensitive(true);
        headers.insert(name, value);
        Ok(())
    }

    /// Basic auth is attached per request.
    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            _ => request,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
            Credentials::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("value", &"***")
                .finish(),
        }
    }
}

/// Resolved, immutable client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    timeout: Duration,
    max_retries: usize,
    user_agent: String,
    proxies: Vec<(String, String)>,
    credentials: Option<Credentials>,
    initial_backoff: Duration,
}

impl ClientConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Full `User-Agent` header value, library segment included.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Proxies that will be used, keyed by scheme (`https` or `all`).
    pub fn proxies(&self) -> &[(String, String)] {
        &self.proxies
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Headers sent with every request.
    pub fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| Error::Config(format!("invalid user agent: {}", e)))?,
        );
        if let Some(credentials) = &self.credentials {
            credentials.insert_header(&mut headers)?;
        }
        Ok(headers)
    }

    /// Builds the persistent HTTP session for this configuration.
    pub(crate) fn session(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .default_headers(self.default_headers()?)
            .timeout(self.timeout);

        for (scheme, url) in &self.proxies {
            let proxy = match scheme.as_str() {
                "https" => Proxy::https(url.as_str()),
                _ => Proxy::all(url.as_str()),
            }
            .map_err(|e| Error::Config(format!("invalid {} proxy {:?}: {}", scheme, url, e)))?;
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }
}

/// Builder for [`ApiClient`].
///
/// Unset values fall back to the defaults in this module; the base URL falls
/// back to [`API_URL_ENV`].
#[derive(Default)]
pub struct ClientBuilder {
    url: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<usize>,
    user_agent: Option<String>,
    proxies: BTreeMap<String, String>,
    credentials: Option<Credentials>,
    initial_backoff: Option<Duration>,
    classifier: Option<Box<dyn ClassifyError>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// A zero timeout means the default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Max attempts per call, first attempt included. Zero means the default.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Identifier appended to the library segment of the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Adds a proxy for `scheme` (`https` or `all`). `http` proxies are discarded.
    pub fn proxy(mut self, scheme: impl Into<String>, url: impl Into<String>) -> Self {
        self.proxies.insert(scheme.into(), url.into());
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = Some(delay);
        self
    }

    /// Replaces the default [`StatusClassifier`].
    pub fn classifier(mut self, classifier: impl ClassifyError + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        self.build_with_env(|key| env::var(key).ok())
    }

    #[tracing::instrument(skip(self, env_var))]
    pub(crate) fn build_with_env<F>(self, env_var: F) -> Result<ApiClient>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = resolve_base_url(self.url, env_var)?;

        let proxies = supported_proxies(self.proxies)?;

        let user_agent = [
            HTTP_AGENT,
            self.user_agent
                .as_deref()
                .filter(|ua| !ua.is_empty())
                .unwrap_or(DEFAULT_USER_AGENT),
        ]
        .join(" ");

        if let Some(credentials) = &self.credentials {
            debug!("Using {} credentials", credentials.scheme());
        }

        let config = ClientConfig {
            base_url,
            timeout: self
                .timeout
                .filter(|t| !t.is_zero())
                .unwrap_or(DEFAULT_TIMEOUT),
            max_retries: self
                .max_retries
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            user_agent,
            proxies,
            credentials: self.credentials,
            initial_backoff: self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF),
        };

        let classifier = self
            .classifier
            .unwrap_or_else(|| Box::new(StatusClassifier));

        ApiClient::from_config(config, classifier)
    }
}

/// Explicit URL first, then the environment.
fn resolve_base_url<F>(explicit: Option<String>, env_var: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .filter(|url| !url.is_empty())
        .or_else(|| env_var(API_URL_ENV).filter(|url| !url.is_empty()))
        .ok_or_else(|| {
            Error::Config(format!(
                "No API url configured. Pass a url or set {}.",
                API_URL_ENV
            ))
        })
}

fn supported_proxies(proxies: BTreeMap<String, String>) -> Result<Vec<(String, String)>> {
    let mut supported = Vec::new();
    for (scheme, url) in proxies {
        match scheme.as_str() {
            "http" => warn!("HTTP proxies will not be used: {}", url),
            "https" | "all" => supported.push((scheme, url)),
            other => {
                return Err(Error::Config(format!(
                    "unsupported proxy scheme {:?}",
                    other
                )));
            }
        }
    }
    Ok(supported)
}
