//! Works web API client: wire types, query construction, and a blocking
//! HTTP implementation with rate limiting and bounded retry.
//!
//! The incremental source depends only on the [`WorksApi`] trait, so tests
//! (and embedders) can supply a scripted implementation instead of a network
//! client.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ApiError;

/// Base URL of the works API.
pub const BASE_URL: &str = "https://api.crossref.org/";

/// Records requested per page.
pub const PAGE_ROWS: u64 = 1_000;

/// Wildcard token that starts a cursor-paginated walk.
pub const INITIAL_CURSOR: &str = "*";

/// Retry budget for a single request.
const MAX_ATTEMPTS: u32 = 10;

/// Request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Top-level works API response.
#[derive(Debug, Clone, Deserialize)]
pub struct WorksResponse {
    /// Response payload
    pub message: WorksMessage,
}

/// The nested `message` object of a works response.
#[derive(Debug, Clone, Deserialize)]
pub struct WorksMessage {
    /// Total matching records; populated on probe queries
    #[serde(rename = "total-results", default)]
    pub total_results: Option<u64>,

    /// Record batch for this page
    pub items: Vec<Value>,

    /// Opaque token for requesting the next page; session-only, never
    /// persisted
    #[serde(rename = "next-cursor")]
    pub next_cursor: Option<String>,
}

/// The "fetch a query, honoring a rate limit and retrying transient failures"
/// capability consumed by the incremental source.
pub trait WorksApi {
    /// Fetch a query string (no leading slash) and return the parsed
    /// `message` object.
    fn fetch(&mut self, query: &str) -> Result<WorksMessage, ApiError>;
}

/// Build a works query string.
///
/// `cursor` pagination with ascending indexed-date sort; `only_doi` restricts
/// the projection to the identifier, for cheap probe queries.
pub fn form_query(
    from_date: &str,
    filter_clause: Option<&str>,
    rows: u64,
    cursor: &str,
    only_doi: bool,
) -> String {
    let mut filter = format!("filter=from-index-date:{from_date}");
    if let Some(clause) = filter_clause {
        filter.push(',');
        filter.push_str(clause);
    }

    let mut params = vec![filter, format!("rows={rows}"), format!("cursor={cursor}")];

    if only_doi {
        params.push("select=DOI".to_string());
    }

    params.push("sort=indexed".to_string());
    params.push("order=asc".to_string());

    format!("works?{}", params.join("&"))
}

/// Blocking works API client.
///
/// Requests go to the polite pool (contact email in the `User-Agent`), are
/// spaced to the advertised rate limit, and transient failures (transport
/// errors, 429, 5xx) are retried with bounded exponential backoff.
pub struct CrossrefClient {
    http: reqwest::blocking::Client,
    base_url: String,
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl CrossrefClient {
    /// Create a client identifying itself with the given contact email.
    pub fn new(contact_email: &str) -> Result<Self, ApiError> {
        let user_agent = format!(
            "refstore/{} (mailto:{contact_email})",
            env!("CARGO_PKG_VERSION"),
        );

        let http = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            // polite-pool default until the server advertises otherwise
            min_interval: Duration::from_secs(1) / 50,
            last_request: None,
        })
    }

    /// Point the client at a different base URL. Intended for tests against a
    /// local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Discover the advertised rate limit from the `x-ratelimit-limit` and
    /// `x-ratelimit-interval` response headers of a probe request, keeping
    /// the default on any failure.
    pub fn discover_rate_limit(&mut self) {
        let default_msg = "Rate limit could not be identified; using defaults";

        let response = match self.http.get(&self.base_url).send() {
            Ok(response) => response,
            Err(_) => {
                warn!("{default_msg}");
                return;
            }
        };

        let Some((calls, interval_s)) = rate_limit_from_headers(response.headers()) else {
            warn!("{default_msg}");
            return;
        };

        self.min_interval = Duration::from_secs(interval_s) / calls;
        info!(calls, interval_s, "Set API rate limit");
    }

    fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_request = Some(Instant::now());
    }
}

fn rate_limit_from_headers(headers: &reqwest::header::HeaderMap) -> Option<(u32, u64)> {
    let calls: u32 = headers.get("x-ratelimit-limit")?.to_str().ok()?.parse().ok()?;

    // interval arrives as e.g. "1s"
    let interval_s: u64 = headers
        .get("x-ratelimit-interval")?
        .to_str()
        .ok()?
        .strip_suffix('s')?
        .parse()
        .ok()?;

    (calls > 0).then_some((calls, interval_s))
}

fn backoff_delay(attempt: u32) -> Duration {
    let delay_s = 1u64 << attempt.saturating_sub(1).min(6);
    Duration::from_secs(delay_s.min(60))
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

impl WorksApi for CrossrefClient {
    fn fetch(&mut self, query: &str) -> Result<WorksMessage, ApiError> {
        let url = format!("{}{query}", self.base_url);

        for attempt in 1..=MAX_ATTEMPTS {
            self.throttle();

            let outcome = self.http.get(&url).send();

            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(err.into());
                    }
                    warn!(error = %err, attempt, "Transport error, retrying");
                    std::thread::sleep(backoff_delay(attempt));
                    continue;
                }
            };

            let status = response.status();

            if is_transient_status(status) {
                if attempt == MAX_ATTEMPTS {
                    break;
                }
                warn!(status = status.as_u16(), attempt, "Transient status, retrying");
                std::thread::sleep(backoff_delay(attempt));
                continue;
            }

            if !status.is_success() {
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    url,
                });
            }

            debug!(%url, "Fetched page");

            let body = response.bytes()?;
            let parsed: WorksResponse = serde_json::from_slice(&body)
                .map_err(|err| ApiError::MalformedResponse(err.to_string()))?;

            return Ok(parsed.message);
        }

        Err(ApiError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_query_full_page() {
        let query = form_query("2024-01-01", Some("type:journal-article"), PAGE_ROWS, "*", false);
        assert_eq!(
            query,
            "works?filter=from-index-date:2024-01-01,type:journal-article\
             &rows=1000&cursor=*&sort=indexed&order=asc"
        );
    }

    #[test]
    fn test_form_query_probe() {
        let query = form_query("2024-11", None, 1, "*", true);
        assert_eq!(
            query,
            "works?filter=from-index-date:2024-11&rows=1&cursor=*&select=DOI&sort=indexed&order=asc"
        );
    }

    #[test]
    fn test_message_deserialization() {
        let body = br#"{
            "message": {
                "total-results": 120131,
                "items": [{"DOI": "10.1/a"}],
                "next-cursor": "AoJ3+"
            }
        }"#;
        let parsed: WorksResponse = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed.message.total_results, Some(120131));
        assert_eq!(parsed.message.items.len(), 1);
        assert_eq!(parsed.message.next_cursor.as_deref(), Some("AoJ3+"));
    }

    #[test]
    fn test_message_rejects_wrong_shapes() {
        // items must be an array
        let body = br#"{"message": {"items": {"a": 1}, "next-cursor": "x"}}"#;
        assert!(serde_json::from_slice::<WorksResponse>(body).is_err());

        // message must be an object
        let body = br#"{"message": [1, 2, 3]}"#;
        assert!(serde_json::from_slice::<WorksResponse>(body).is_err());

        // top level must carry a message
        let body = br#"[1, 2, 3]"#;
        assert!(serde_json::from_slice::<WorksResponse>(body).is_err());
    }

    #[test]
    fn test_rate_limit_header_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-ratelimit-limit", "50".parse().unwrap());
        headers.insert("x-ratelimit-interval", "1s".parse().unwrap());
        assert_eq!(rate_limit_from_headers(&headers), Some((50, 1)));

        headers.remove("x-ratelimit-interval");
        assert_eq!(rate_limit_from_headers(&headers), None);
    }

    #[test]
    fn test_backoff_is_bounded() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert!(backoff_delay(20) <= Duration::from_secs(60));
    }
}
