//! Rate-limited client for the GitHub-compatible search API.
//!
//! Every successful response is followed by a pause derived from the
//! `X-RateLimit-*` headers, taken after the body has been read, so callers
//! never have to think about quotas.
//! Pagination is driven solely by `Link: <...>; rel="next"`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const API_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = "harvest-cli";
const API_VERSION: &str = "2022-11-28";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Quota exhausted or access denied. Fatal for the current query.
    #[error("GitHub API refused the request (403): {0}")]
    Forbidden(String),
    #[error("GitHub API error ({code}): {message}")]
    Status { code: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Forbidden(_))
    }
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
}

/// Sanitize an API error body to prevent credential leakage.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
    ];

    if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
        return crate::util::truncate(&parsed.message, MAX_ERROR_BODY_LEN);
    }

    let truncated = crate::util::truncate(body.trim(), MAX_ERROR_BODY_LEN);
    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(error details redacted - may contain sensitive data)".to_string();
        }
    }
    truncated
}

/// Pause owed after a response, given its rate-limit headers.
///
/// Below the low-water mark we wait for the window to reset; otherwise the
/// remaining window is spread evenly over the remaining requests.
pub fn throttle_delay(remaining: u64, reset_epoch: i64, now_epoch: i64, low_water_mark: u64) -> Duration {
    let window = reset_epoch - now_epoch;
    if window <= 0 {
        return Duration::ZERO;
    }
    if remaining < low_water_mark {
        return Duration::from_secs(window as u64);
    }
    Duration::from_secs_f64(window as f64 / remaining.max(1) as f64)
}

/// The `rel="next"` target of a `Link` header, if declared.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoHit {
    pub full_name: String,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RepoHit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub number: u32,
    pub items: Vec<RepoHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    low_water_mark: u64,
}

/// Quota state read off a response, applied once its body is consumed.
#[derive(Debug, Clone, Copy)]
struct RateLimit {
    remaining: i64,
    reset: i64,
}

impl RateLimit {
    fn from_headers(headers: &reqwest::header::HeaderMap) -> Option<Self> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };
        Some(Self {
            remaining: read("X-RateLimit-Remaining")?,
            reset: read("X-RateLimit-Reset")?,
        })
    }
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, low_water_mark: u64) -> anyhow::Result<Self> {
        Self::with_timeout(
            base_url,
            token,
            low_water_mark,
            Duration::from_secs(API_TIMEOUT_SECS),
        )
    }

    /// `timeout` bounds a single request including its body; quota pauses
    /// are not counted against it.
    pub fn with_timeout(
        base_url: &str,
        token: Option<String>,
        low_water_mark: u64,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            low_water_mark,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ApiError::Transport(format!("invalid API URL: {}", e)))
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        tracing::debug!(url, "GET");
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Forbidden(sanitize_error_body(&body)));
        }
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: sanitize_error_body(&body),
            });
        }
        Ok(resp)
    }

    /// GET and decode a JSON body, returning it with the `rel="next"` link.
    /// The quota pause happens only after the body is fully read.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, Option<String>), ApiError> {
        let resp = self.get(url).await?;
        let limit = RateLimit::from_headers(resp.headers());
        let next = resp
            .headers()
            .get("Link")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_link);
        let body = resp
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if let Some(limit) = limit {
            self.throttle(limit).await;
        }
        Ok((body, next))
    }

    async fn throttle(&self, limit: RateLimit) {
        let delay = throttle_delay(
            limit.remaining.max(0) as u64,
            limit.reset,
            chrono::Utc::now().timestamp(),
            self.low_water_mark,
        );
        if !delay.is_zero() {
            tracing::debug!(
                remaining = limit.remaining,
                "rate limit pause of {:.1}s",
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Check the configured token against the authenticated-user endpoint.
    /// Returns the login, or `None` when running unauthenticated.
    pub async fn validate_token(&self) -> Result<Option<String>, ApiError> {
        #[derive(Deserialize)]
        struct User {
            login: String,
        }

        if self.token.is_none() {
            return Ok(None);
        }
        let url = self.endpoint("/user")?;
        let (user, _) = self.get_json::<User>(url.as_str()).await?;
        Ok(Some(user.login))
    }

    /// Lazily paged repository search, always starting at page 1.
    pub fn search(&self, terms: &[String]) -> Result<SearchPager<'_>, ApiError> {
        let query = terms.join(" OR ");
        let mut url = self.endpoint("/search/repositories")?;
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("page", "1");
        Ok(SearchPager {
            client: self,
            query,
            next_url: Some(url.to_string()),
            page: 0,
        })
    }

    /// Root directory listing of a repository.
    pub async fn list_contents(&self, full_name: &str) -> Result<Vec<ContentEntry>, ApiError> {
        let url = self.endpoint(&format!("/repos/{}/contents", full_name.trim_matches('/')))?;
        let (entries, _) = self.get_json::<Vec<ContentEntry>>(url.as_str()).await?;
        Ok(entries)
    }
}

pub struct SearchPager<'a> {
    client: &'a ApiClient,
    query: String,
    next_url: Option<String>,
    page: u32,
}

impl SearchPager<'_> {
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Fetch the next page. `None` once no next link is known, including
    /// after any failed page.
    pub async fn next_page(&mut self) -> Option<Result<SearchPage, ApiError>> {
        let url = self.next_url.take()?;
        self.page += 1;
        let (body, next) = match self.client.get_json::<SearchResponse>(&url).await {
            Ok(decoded) => decoded,
            Err(err) => return Some(Err(err)),
        };
        self.next_url = next;
        Some(Ok(SearchPage {
            number: self.page,
            items: body.items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok_json(body: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(body)
            .insert_header("X-RateLimit-Remaining", "30")
            .insert_header("X-RateLimit-Reset", "0")
    }

    #[test]
    fn throttle_spreads_window_over_remaining() {
        assert_eq!(throttle_delay(10, 1_100, 1_000, 5), Duration::from_secs(10));
        assert_eq!(throttle_delay(0, 1_100, 1_000, 0), Duration::from_secs(100));
        assert_eq!(throttle_delay(4, 1_060, 1_000, 5), Duration::from_secs(60));
        assert_eq!(throttle_delay(4, 1_000, 1_060, 5), Duration::ZERO);
        assert_eq!(throttle_delay(100, 1_000, 1_000, 5), Duration::ZERO);
    }

    #[test]
    fn next_link_is_found_among_relations() {
        let header = r#"<https://api.github.com/search/repositories?q=x&page=1>; rel="prev", <https://api.github.com/search/repositories?q=x&page=3>; rel="next", <https://api.github.com/search/repositories?q=x&page=9>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/search/repositories?q=x&page=3")
        );
        assert_eq!(parse_next_link(r#"<https://x/?page=1>; rel="prev""#), None);
        assert_eq!(parse_next_link(""), None);
    }

    #[test]
    fn error_bodies_are_sanitized() {
        assert_eq!(
            sanitize_error_body(r#"{"message":"API rate limit exceeded"}"#),
            "API rate limit exceeded"
        );
        assert!(sanitize_error_body("bad token ghp_abc").contains("redacted"));
        assert_eq!(sanitize_error_body(&"x".repeat(500)).chars().count(), MAX_ERROR_BODY_LEN);
    }

    #[tokio::test]
    async fn pager_follows_next_links_until_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "nuclei-templates OR nuclei-scripts"))
            .and(query_param("page", "1"))
            .respond_with(
                ok_json(json!({"items": [{"full_name": "a/one", "html_url": "https://github.com/a/one"}]}))
                    .insert_header(
                        "Link",
                        format!("<{}/search/repositories?q=x&page=2>; rel=\"next\"", server.uri()),
                    ),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("page", "2"))
            .respond_with(ok_json(
                json!({"items": [{"full_name": "b/two", "html_url": "https://github.com/b/two", "stars": 3}]}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None, 5).unwrap();
        let terms = vec!["nuclei-templates".to_string(), "nuclei-scripts".to_string()];
        let mut pager = client.search(&terms).unwrap();
        assert_eq!(pager.query(), "nuclei-templates OR nuclei-scripts");

        let first = pager.next_page().await.unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(first.items[0].full_name, "a/one");
        let second = pager.next_page().await.unwrap().unwrap();
        assert_eq!(second.number, 2);
        assert_eq!(second.items[0].html_url, "https://github.com/b/two");
        assert!(pager.next_page().await.is_none());
    }

    #[tokio::test]
    async fn forbidden_is_fatal_and_ends_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"message": "API rate limit exceeded"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None, 5).unwrap();
        let terms = vec!["x".to_string()];
        let mut pager = client.search(&terms).unwrap();
        let err = pager.next_page().await.unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err, ApiError::Forbidden("API rate limit exceeded".to_string()));
        assert!(pager.next_page().await.is_none());
    }

    #[tokio::test]
    async fn other_status_and_bad_json_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/missing/contents"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/a/garbled/contents"))
            .respond_with(ok_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None, 5).unwrap();
        assert_eq!(
            client.list_contents("a/missing").await.unwrap_err(),
            ApiError::Status {
                code: 404,
                message: "Not Found".to_string()
            }
        );
        assert!(matches!(
            client.list_contents("a/garbled").await.unwrap_err(),
            ApiError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn contents_listing_decodes_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/a/rules/contents"))
            .respond_with(ok_json(json!([
                {"name": "cve.yaml", "type": "file", "size": 10},
                {"name": "http", "type": "dir"}
            ])))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None, 5).unwrap();
        let entries = client.list_contents("a/rules").await.unwrap();
        assert_eq!(
            entries,
            vec![
                ContentEntry {
                    name: "cve.yaml".to_string(),
                    kind: "file".to_string()
                },
                ContentEntry {
                    name: "http".to_string(),
                    kind: "dir".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn quota_pause_longer_than_timeout_keeps_the_response() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp() + 3;
        Mock::given(method("GET"))
            .and(path("/repos/a/rules/contents"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "cve.yaml", "type": "file"}]))
                    .insert_header("X-RateLimit-Remaining", "1")
                    .insert_header("X-RateLimit-Reset", reset.to_string().as_str()),
            )
            .mount(&server)
            .await;

        let client =
            ApiClient::with_timeout(&server.uri(), None, 5, Duration::from_secs(1)).unwrap();
        let started = std::time::Instant::now();
        let entries = client.list_contents("a/rules").await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(
            entries,
            vec![ContentEntry {
                name: "cve.yaml".to_string(),
                kind: "file".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn token_is_validated_with_bearer_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("Authorization", "Bearer good"))
            .respond_with(ok_json(json!({"login": "octo"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("Authorization", "Bearer bad"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
            .mount(&server)
            .await;

        let good = ApiClient::new(&server.uri(), Some("good".to_string()), 5).unwrap();
        assert_eq!(good.validate_token().await.unwrap().as_deref(), Some("octo"));

        let bad = ApiClient::new(&server.uri(), Some("bad".to_string()), 5).unwrap();
        assert!(matches!(
            bad.validate_token().await.unwrap_err(),
            ApiError::Status { code: 401, .. }
        ));

        let anonymous = ApiClient::new(&server.uri(), None, 5).unwrap();
        assert_eq!(anonymous.validate_token().await.unwrap(), None);
    }
}
