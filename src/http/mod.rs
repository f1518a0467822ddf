//! Shared HTTP client construction and the retry policy applied to every
//! external call.

use reqwest::{Client, RequestBuilder, Response};
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::warn;

use crate::config::NetworkConfig;
use crate::error::ServiceError;

/// Bounded retry: `retries` extra attempts, transient failures only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            retries: config.retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, ServiceError> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?)
}

/// Run `operation`, retrying according to `policy` while the error is
/// transient.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    service: &'static str,
    operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let strategy = FixedInterval::new(policy.delay).take(policy.retries);
    RetryIf::start(strategy, operation, |err: &ServiceError| {
        let transient = err.is_transient();
        if transient {
            warn!(service, error = %err, "transient failure, retrying");
        }
        transient
    })
    .await
}

/// Send a request built by `make_request`, mapping non-2xx statuses to
/// [`ServiceError::Status`].
pub async fn send_with_retry<F>(
    policy: RetryPolicy,
    service: &'static str,
    make_request: F,
) -> Result<Response, ServiceError>
where
    F: Fn() -> RequestBuilder,
{
    retry_transient(policy, service, || {
        let request = make_request();
        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ServiceError::Status(status.as_u16()));
            }
            Ok(response)
        }
    })
    .await
}
