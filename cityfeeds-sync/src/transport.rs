//! HTTP transport seam.
//!
//! Everything that touches the network goes through [`Transport`], so a
//! whole batch shares one connection pool and one timeout policy, and tests
//! can substitute canned responses.

use std::io::Read;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

use crate::error::SyncError;

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    /// URL the response came from, after redirects.
    pub final_url: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The feed service signals API errors with a JSON body instead of a
    /// binary payload.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }

    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_reader(self.body)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("final_url", &self.final_url)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Blocking `GET` with query parameters.
///
/// HTTP error statuses are returned as responses; only network-level
/// failures are errors.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, SyncError>;
}

/// [`Transport`] backed by a shared `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(concat!("cityfeeds/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, SyncError> {
        let mut request = self.agent.get(url);
        for (name, value) in query {
            request = request.query(name, value);
        }
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => {
                return Err(SyncError::Transport {
                    url: url.to_string(),
                    message: err.to_string(),
                })
            }
        };
        Ok(HttpResponse {
            status: response.status(),
            final_url: response.get_url().to_string(),
            content_type: response.header("Content-Type").map(str::to_owned),
            content_length: response
                .header("Content-Length")
                .and_then(|len| len.trim().parse().ok()),
            body: response.into_reader(),
        })
    }
}

/// Minimum spacing between calls, shared by every city of a batch.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Block until the caller may issue its request.
    pub fn wait(&self) {
        let delay = {
            let mut next_slot = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = next_slot.map_or(now, |slot| slot.max(now));
            *next_slot = Some(slot + self.interval);
            slot - now
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: Option<&str>, status: u16) -> HttpResponse {
        HttpResponse {
            status,
            final_url: "http://example.com".into(),
            content_type: content_type.map(str::to_owned),
            content_length: None,
            body: Box::new(std::io::empty()),
        }
    }

    #[test]
    fn json_detection_ignores_charset_and_case() {
        assert!(response(Some("application/json"), 200).is_json());
        assert!(response(Some("Application/JSON; charset=utf-8"), 200).is_json());
        assert!(!response(Some("application/zip"), 200).is_json());
        assert!(!response(None, 200).is_json());
    }

    #[test]
    fn success_range() {
        assert!(response(None, 204).is_success());
        assert!(!response(None, 302).is_success());
        assert!(!response(None, 404).is_success());
    }

    #[test]
    fn rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        let started = Instant::now();
        limiter.wait();
        limiter.wait();
        limiter.wait();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn rate_limiter_first_call_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let started = Instant::now();
        limiter.wait();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
