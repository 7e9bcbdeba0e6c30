use std::time::{Duration, Instant};

use tracing::debug;
use url::Url;

use super::types::{ProbeOutcome, ProbeTarget};

const USER_AGENT: &str = concat!("apimon/", env!("CARGO_PKG_VERSION"));

/// Checker trait - issues one probe against a target
///
/// Implementations never fail: transport problems are reported as
/// [`ProbeOutcome::Failed`].
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    async fn send(&self, target: &ProbeTarget, timeout: Duration) -> Result<u16, String> {
        let url = Url::parse(&target.url).map_err(|e| format!("Invalid URL: {e}"))?;

        let mut request = self.client.request(target.method.into(), url).timeout(timeout);
        for (name, value) in target.headers.iter() {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| describe_error(&e, timeout))?;
        Ok(response.status().as_u16())
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &ProbeTarget) -> ProbeOutcome {
        let timeout = Duration::from_secs(target.timeout_seconds.max(1));
        let start = Instant::now();

        let result = self.send(target, timeout).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(status_code) => {
                debug!("{} {} -> {} in {}ms", target.method, target.url, status_code, elapsed_ms);
                ProbeOutcome::Completed { elapsed_ms, status_code }
            }
            Err(error) => {
                debug!("{} {} failed after {}ms: {}", target.method, target.url, elapsed_ms, error);
                ProbeOutcome::Failed { elapsed_ms, error }
            }
        }
    }
}

fn describe_error(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("timeout of {}ms exceeded", timeout.as_millis())
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else if err.is_builder() {
        format!("invalid request: {err}")
    } else {
        format!("HTTP request failed: {err}")
    }
}
