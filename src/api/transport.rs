//! Purpose: Blocking HTTP transport for manifest and asset downloads.
//! Exports: `Transport`, `HttpTransport`, `DEFAULT_TIMEOUT`, `USER_AGENT`.
//! Role: The resolver's only path to the network; swapped for in-memory fakes in tests.
//! Invariants: Non-2xx responses and connection failures are fatal `Transport` errors.
//! Invariants: One timeout bounds each fetch; there are no retries.
use std::io::Read;
use std::time::Duration;

use url::Url;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const USER_AGENT: &str = "UnityPlayer/2022.3.46f1 (UnityWebRequest/1.0, libcurl/8.5.0-DEV)";

pub trait Transport {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, Error>;
}

#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, Error> {
        let response = self
            .agent
            .get(url.as_str())
            .set("Accept", "*/*")
            .set("Accept-Encoding", "identity")
            .call();

        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                return Err(Error::new(ErrorKind::Transport)
                    .with_message(format!("HTTP {code}: {}", resp.status_text()))
                    .with_status(code)
                    .with_url(url.as_str()));
            }
            Err(ureq::Error::Transport(err)) => {
                let message = match err.kind() {
                    ureq::ErrorKind::Io if is_timeout(&err) => {
                        format!("request timed out after {}s", self.timeout.as_secs())
                    }
                    _ => "request failed".to_string(),
                };
                return Err(Error::new(ErrorKind::Transport)
                    .with_message(message)
                    .with_url(url.as_str())
                    .with_source(err));
            }
        };

        let capacity = response
            .header("Content-Length")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = Vec::with_capacity(capacity);
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| {
                Error::new(ErrorKind::Transport)
                    .with_message("failed to read response body")
                    .with_url(url.as_str())
                    .with_source(err)
            })?;
        Ok(body)
    }
}

fn is_timeout(err: &ureq::Transport) -> bool {
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
}
