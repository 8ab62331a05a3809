//! Request transport for the remote repository's contents API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::util::compact_text;

const API_VERSION: &str = "2022-11-28";
const CLIENT_NAME: &str = concat!("lorebook/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Put,
    Delete,
}

/// Options for one transport request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn put(body: Value) -> Self {
        Self {
            method: Method::Put,
            body: Some(body),
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn delete(body: Value) -> Self {
        Self {
            method: Method::Delete,
            body: Some(body),
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Performs requests against repository-relative API paths such as
/// `contents/documents/<id>.md`.
///
/// Failures are reported with the error kinds the sync engine understands:
/// [`Error::NotFound`], [`Error::Auth`], [`Error::RateLimit`],
/// [`Error::ConflictOnWrite`] and [`Error::Transport`].
#[async_trait]
pub trait RequestTransport: Send + Sync {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<Value>;
}

/// Transport backed by the GitHub REST API
#[derive(Clone)]
pub struct GitHubTransport {
    client: Client,
    repo_url: String,
    token: String,
}

impl std::fmt::Debug for GitHubTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubTransport")
            .field("repo_url", &self.repo_url)
            .finish_non_exhaustive()
    }
}

impl GitHubTransport {
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Configuration(format!("HTTP client: {error}")))?;
        Ok(Self {
            client,
            repo_url: config.repo_url(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        let encoded: Vec<_> = path
            .trim_matches('/')
            .split('/')
            .map(urlencoding::encode)
            .collect();
        format!("{}/{}", self.repo_url, encoded.join("/"))
    }
}

#[async_trait]
impl RequestTransport for GitHubTransport {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<Value> {
        let url = self.url(path);
        let mut request = match options.method {
            Method::Get => self.client.get(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        }
        .bearer_auth(&self.token)
        .header(ACCEPT, "application/vnd.github+json")
        .header("X-GitHub-Api-Version", API_VERSION)
        .header(USER_AGENT, CLIENT_NAME);

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        tracing::debug!(method = ?options.method, %path, "remote request");
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            let text = response.text().await.map_err(transport_error)?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let (remaining, retry_after) = rate_limit_hints(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(status, remaining, retry_after, &body, path))
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Transport("request timed out".into())
    } else {
        Error::Transport(error.to_string())
    }
}

fn rate_limit_hints(headers: &HeaderMap) -> (Option<u64>, Option<Duration>) {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    };

    let remaining = header_u64("x-ratelimit-remaining");
    let retry_after = header_u64("retry-after").map(Duration::from_secs).or_else(|| {
        // The reset header is sent on every response; it only matters once exhausted.
        if remaining != Some(0) {
            return None;
        }
        let reset = header_u64("x-ratelimit-reset")?;
        let now = u64::try_from(chrono::Utc::now().timestamp()).ok()?;
        Some(Duration::from_secs(reset.saturating_sub(now)))
    });
    (remaining, retry_after)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Map a failed response onto the remote error kinds
pub(crate) fn classify_response(
    status: StatusCode,
    rate_limit_remaining: Option<u64>,
    retry_after: Option<Duration>,
    body: &str,
    path: &str,
) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(path.to_string()),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit { retry_after },
        StatusCode::FORBIDDEN if rate_limit_remaining == Some(0) || retry_after.is_some() => {
            Error::RateLimit { retry_after }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(parse_api_error(status, body))
        }
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::ConflictOnWrite {
                path: path.to_string(),
            }
        }
        _ => Error::Transport(parse_api_error(status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const PATH: &str = "contents/documents/a.md";

    #[test]
    fn classifies_not_found_and_auth() {
        assert!(matches!(
            classify_response(StatusCode::NOT_FOUND, None, None, "", PATH),
            Error::NotFound(path) if path == PATH
        ));
        let err = classify_response(
            StatusCode::UNAUTHORIZED,
            None,
            None,
            r#"{"message":"Bad credentials"}"#,
            PATH,
        );
        assert!(matches!(err, Error::Auth(message) if message == "Bad credentials (401)"));
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, Some(42), None, "nope", PATH),
            Error::Auth(_)
        ));
    }

    #[test]
    fn classifies_rate_limits() {
        let err = classify_response(
            StatusCode::FORBIDDEN,
            Some(0),
            Some(Duration::from_secs(30)),
            "",
            PATH,
        );
        assert!(matches!(
            err,
            Error::RateLimit { retry_after: Some(after) } if after == Duration::from_secs(30)
        ));
        assert!(matches!(
            classify_response(StatusCode::TOO_MANY_REQUESTS, None, None, "", PATH),
            Error::RateLimit { retry_after: None }
        ));
    }

    #[test]
    fn classifies_write_conflicts() {
        for status in [
            StatusCode::CONFLICT,
            StatusCode::PRECONDITION_FAILED,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert!(matches!(
                classify_response(status, None, None, "", PATH),
                Error::ConflictOnWrite { .. }
            ));
        }
    }

    #[test]
    fn other_failures_are_transport_errors() {
        let err = classify_response(StatusCode::BAD_GATEWAY, None, None, "", PATH);
        assert!(matches!(err, Error::Transport(message) if message == "HTTP 502"));
        assert!(err_is_retryable(StatusCode::SERVICE_UNAVAILABLE));
    }

    fn err_is_retryable(status: StatusCode) -> bool {
        classify_response(status, None, None, "", PATH).is_retryable()
    }

    #[test]
    fn rate_limit_hints_prefer_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("retry-after", HeaderValue::from_static("12"));
        let (remaining, retry_after) = rate_limit_hints(&headers);
        assert_eq!(remaining, Some(0));
        assert_eq!(retry_after, Some(Duration::from_secs(12)));

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("4102444800"));
        let (remaining, retry_after) = rate_limit_hints(&headers);
        assert_eq!(remaining, Some(4999));
        assert_eq!(retry_after, None);

        let (remaining, retry_after) = rate_limit_hints(&HeaderMap::new());
        assert_eq!(remaining, None);
        assert_eq!(retry_after, None);
    }

    #[test]
    fn url_encodes_each_segment() {
        let config = RemoteConfig::new("lore-keeper", "notes", "ghp_x");
        let transport = GitHubTransport::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.url("/contents/my docs/a.md"),
            "https://api.github.com/repos/lore-keeper/notes/contents/my%20docs/a.md"
        );
    }
}
