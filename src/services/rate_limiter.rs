//! Rate-limited HTTP transport for the TMDB, Bangumi and override download
//! clients
//!
//! Each upstream gets its own governor quota and retry schedule. Status codes
//! are classified once here: 404 is an answer, 408/429/5xx and connection
//! failures are retried with exponential backoff, everything else fails on
//! the first attempt.

use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// User agent sent to APIs that ask clients to identify themselves
pub const USER_AGENT: &str = concat!("seasonsplit/", env!("CARGO_PKG_VERSION"));

/// Upstream services this crate talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiService {
    Tmdb,
    Bangumi,
    /// Static documents such as the season override file
    Download,
}

impl ApiService {
    pub fn name(self) -> &'static str {
        match self {
            ApiService::Tmdb => "tmdb",
            ApiService::Bangumi => "bangumi",
            ApiService::Download => "download",
        }
    }

    fn quota(self) -> Quota {
        let (per_second, burst) = match self {
            // ~40 requests per 10 seconds
            ApiService::Tmdb => (4, 10),
            // No published limit; a sequel walk issues a handful of calls per title
            ApiService::Bangumi => (2, 5),
            ApiService::Download => (1, 2),
        };
        Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN))
    }

    pub fn retry_config(self) -> RetryConfig {
        match self {
            ApiService::Tmdb | ApiService::Bangumi => RetryConfig {
                max_attempts: 3,
                initial_interval: Duration::from_millis(500),
                max_interval: Duration::from_secs(10),
            },
            ApiService::Download => RetryConfig {
                max_attempts: 3,
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(30),
            },
        }
    }
}

/// How a response status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// The resource does not exist; not an error
    NotFound,
    Transient,
    Permanent,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::NOT_FOUND {
        StatusClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        StatusClass::Transient
    } else {
        StatusClass::Permanent
    }
}

/// A failed attempt, tagged with whether another attempt may help
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("{0:#}")]
    Transient(anyhow::Error),
    #[error("{0:#}")]
    Permanent(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of
/// attempts
pub async fn retry_async<T, F, Fut>(operation: F, config: &RetryConfig, operation_name: &str) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut backoff = config.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Permanent(e)) => return Err(e),
            Err(AttemptError::Transient(e)) => e,
        };

        let delay = match backoff.next_backoff() {
            Some(delay) if attempt < config.max_attempts => delay,
            _ => {
                warn!(operation = %operation_name, attempts = attempt, error = %format!("{error:#}"), "Giving up");
                return Err(error);
            }
        };
        warn!(
            operation = %operation_name,
            attempt,
            retry_in = ?delay,
            error = %format!("{error:#}"),
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// HTTP client bound to one upstream's quota and retry schedule
pub struct RateLimitedClient {
    client: Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    service: ApiService,
    retry: RetryConfig,
}

impl RateLimitedClient {
    pub fn new(service: ApiService) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(service = service.name(), error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self::with_client(service, client)
    }

    pub fn with_client(service: ApiService, client: Client) -> Self {
        Self {
            client,
            limiter: RateLimiter::direct(service.quota()),
            service,
            retry: service.retry_config(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn service(&self) -> ApiService {
        self.service
    }

    /// Send the request `build` produces and decode its JSON body.
    ///
    /// `build` runs once per attempt. Returns `Ok(None)` on 404.
    pub async fn fetch_json<T, F>(&self, build: F, operation: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        retry_async(
            move || {
                let request = build(&self.client);
                async move { self.attempt::<T>(request).await }
            },
            &self.retry,
            operation,
        )
        .await
    }

    async fn attempt<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, AttemptError> {
        let name = self.service.name();
        self.limiter.until_ready().await;

        let response = request
            .send()
            .await
            .map_err(|e| AttemptError::Transient(anyhow::Error::new(e).context(format!("{name} request failed"))))?;
        let status = response.status();
        debug!(service = name, url = %response.url(), status = status.as_u16(), "Response received");

        match classify_status(status) {
            StatusClass::Success => response
                .json::<T>()
                .await
                .map(Some)
                .with_context(|| format!("Failed to parse {name} response"))
                .map_err(AttemptError::Permanent),
            StatusClass::NotFound => Ok(None),
            StatusClass::Transient => Err(AttemptError::Transient(anyhow!("{name} returned status {status}"))),
            StatusClass::Permanent => Err(AttemptError::Permanent(anyhow!(
                "{name} rejected request with status {status}"
            ))),
        }
    }
}
