use std::time::Duration;

use anyhow::{Context, Result};
use reqwest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::{self, Kind};
use crate::auth::AuthState;
use crate::sources::SourceEmail;

pub const MAX_RESULTS_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub max_results: u32,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, max_results: u32) -> Self {
        QueryRequest {
            query: query.into(),
            max_results: max_results.clamp(*MAX_RESULTS_RANGE.start(), *MAX_RESULTS_RANGE.end()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchMetadata {
    #[serde(default)]
    pub gmail_query_used: Option<String>,
    #[serde(default)]
    pub processing_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResponse {
    AuthRequired { error: String },
    DomainError { error: String },
    Success {
        answer: Option<String>,
        sources: Vec<SourceEmail>,
        search_metadata: Option<SearchMetadata>,
    },
}

#[derive(Debug, Deserialize)]
struct RawQueryResponse {
    #[serde(default)]
    requires_auth: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    sources: Option<Vec<SourceEmail>>,
    #[serde(default)]
    search_metadata: Option<SearchMetadata>,
    /// Sent instead of `search_metadata` when the search found nothing.
    #[serde(default)]
    translated_query: Option<String>,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl QueryResponse {
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawQueryResponse =
            serde_json::from_value(value).context("Unexpected query response shape")?;

        if truthy(&raw.requires_auth) {
            return Ok(QueryResponse::AuthRequired { error: error_text(&raw.error) });
        }
        if truthy(&raw.error) {
            return Ok(QueryResponse::DomainError { error: error_text(&raw.error) });
        }

        let search_metadata = match (raw.search_metadata, raw.translated_query) {
            (Some(mut meta), translated) => {
                if meta.gmail_query_used.is_none() {
                    meta.gmail_query_used = translated;
                }
                Some(meta)
            }
            (None, Some(translated)) => Some(SearchMetadata {
                gmail_query_used: Some(translated),
                ..Default::default()
            }),
            (None, None) => None,
        };

        Ok(QueryResponse::Success {
            answer: raw.answer,
            sources: raw.sources.unwrap_or_default(),
            search_metadata,
        })
    }

    /// The effective Gmail search the backend ran, when it reports one.
    pub fn search_used(&self) -> Option<&str> {
        match self {
            QueryResponse::Success { search_metadata: Some(meta), .. } => meta
                .gmail_query_used
                .as_deref()
                .filter(|q| !q.trim().is_empty()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogoutResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Thin client over the assistant backend. Every endpoint answers JSON, also
/// for 4xx/5xx statuses, so bodies are decoded regardless of status code.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn with_config(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(BackendClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;
        serde_json::from_str(&body)
            .with_context(|| format!("Backend returned non-JSON body (HTTP {})", status))
    }

    pub async fn auth_status(&self) -> Result<AuthState> {
        activity::log_with(Kind::Api, "Checking authentication status...");
        let response = self.client.get(self.url("/auth/status")).send().await?;
        let value = Self::read_json(response).await?;
        let state: AuthState = serde_json::from_value(value).context("Unexpected auth status shape")?;

        activity::log_with(
            Kind::Success,
            format!(
                "Auth status: {}",
                if state.authenticated { "Authenticated" } else { "Not authenticated" }
            ),
        );
        Ok(state)
    }

    /// Ask the backend to run its OAuth flow. Returns the signed-in state, or
    /// a signed-out state when the backend did not report success.
    pub async fn login(&self) -> Result<AuthState> {
        activity::log_with(Kind::Auth, "Starting Gmail authentication...");
        let response = self.client.get(self.url("/auth/gmail")).send().await?;
        let value = Self::read_json(response).await?;
        let login: LoginResponse = serde_json::from_value(value).context("Unexpected login response shape")?;

        if login.status.as_deref() == Some("authenticated") {
            Ok(AuthState::signed_in(login.email))
        } else {
            Ok(AuthState::signed_out())
        }
    }

    /// Returns true when the backend confirmed the session is gone.
    pub async fn logout(&self) -> Result<bool> {
        activity::log_with(Kind::Auth, "User initiated logout");
        let response = self.client.post(self.url("/auth/logout")).send().await?;
        let value = Self::read_json(response).await?;
        let logout: LogoutResponse = serde_json::from_value(value).context("Unexpected logout response shape")?;
        Ok(logout.status.as_deref() == Some("logged_out"))
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        activity::log_with(
            Kind::Api,
            format!(
                "Sending query: \"{}\" (analyzing {} emails)",
                request.query, request.max_results
            ),
        );

        let response = self
            .client
            .post(self.url("/query"))
            .json(request)
            .send()
            .await?;

        let value = Self::read_json(response).await?;
        QueryResponse::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Read;
    use std::sync::mpsc;
    use std::thread;

    struct Recorded {
        method: String,
        url: String,
        body: String,
    }

    /// Serve `replies` in order on an ephemeral port, one per request.
    fn fake_backend(replies: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<Recorded>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for (status, body) in replies {
                let mut request = match server.recv() {
                    Ok(r) => r,
                    Err(_) => return,
                };
                let mut received = String::new();
                let _ = request.as_reader().read_to_string(&mut received);
                let _ = tx.send(Recorded {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    body: received,
                });
                let response = tiny_http::Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
        });

        (format!("http://127.0.0.1:{}/api", port), rx)
    }

    fn client(base: String) -> BackendClient {
        BackendClient::with_config(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_classify_auth_required_first() {
        let response = QueryResponse::from_value(json!({
            "error": "Not authenticated. Please click \"Authenticate\" first.",
            "requires_auth": true
        }))
        .unwrap();
        assert_eq!(
            response,
            QueryResponse::AuthRequired {
                error: "Not authenticated. Please click \"Authenticate\" first.".into()
            }
        );
    }

    #[test]
    fn test_classify_domain_error() {
        let response = QueryResponse::from_value(json!({"error": "No query provided"})).unwrap();
        assert_eq!(response, QueryResponse::DomainError { error: "No query provided".into() });

        let response = QueryResponse::from_value(json!({"requires_auth": false, "error": "boom"})).unwrap();
        assert!(matches!(response, QueryResponse::DomainError { .. }));
    }

    #[test]
    fn test_falsy_error_is_success() {
        let response = QueryResponse::from_value(json!({"error": "", "answer": "ok", "sources": null})).unwrap();
        assert_eq!(
            response,
            QueryResponse::Success { answer: Some("ok".into()), sources: vec![], search_metadata: None }
        );
    }

    #[test]
    fn test_success_with_metadata() {
        let response = QueryResponse::from_value(json!({
            "answer": "# Invoices\n- one",
            "sources": [{"subject": "Invoice", "message_id": "m1"}, {"subject": "Receipt"}],
            "search_metadata": {"gmail_query_used": "subject:invoice newer_than:7d", "emails_found": 2}
        }))
        .unwrap();

        assert_eq!(response.search_used(), Some("subject:invoice newer_than:7d"));
        match response {
            QueryResponse::Success { sources, .. } => {
                assert_eq!(sources.len(), 2);
                assert_eq!(sources[0].subject.as_deref(), Some("Invoice"));
                assert_eq!(sources[1].subject.as_deref(), Some("Receipt"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_translated_query_fallback() {
        let response = QueryResponse::from_value(json!({
            "answer": "No emails found for 'receipts'.",
            "sources": [],
            "translated_query": "receipts"
        }))
        .unwrap();
        assert_eq!(response.search_used(), Some("receipts"));
    }

    #[test]
    fn test_request_clamps_max_results() {
        assert_eq!(QueryRequest::new("q", 0).max_results, 1);
        assert_eq!(QueryRequest::new("q", 500).max_results, 100);
        assert_eq!(QueryRequest::new("q", 42).max_results, 42);
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let (base, rx) = fake_backend(vec![(
            200,
            r#"{"answer": "**Two** meetings", "sources": [{"subject": "Standup"}]}"#,
        )]);
        let client = client(base);

        let response = client.query(&QueryRequest::new("meetings this week", 15)).await.unwrap();
        assert!(matches!(response, QueryResponse::Success { ref sources, .. } if sources.len() == 1));

        let recorded = rx.recv().unwrap();
        assert_eq!(recorded.method, "POST");
        assert_eq!(recorded.url, "/api/query");
        let body: Value = serde_json::from_str(&recorded.body).unwrap();
        assert_eq!(body, json!({"query": "meetings this week", "max_results": 15}));
    }

    #[tokio::test]
    async fn test_error_status_body_is_still_read() {
        let (base, _rx) = fake_backend(vec![(
            401,
            r#"{"error": "Authentication expired. Please re-authenticate with Gmail.", "requires_auth": true}"#,
        )]);
        let response = client(base).query(&QueryRequest::new("x", 10)).await.unwrap();
        assert!(matches!(response, QueryResponse::AuthRequired { .. }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_transport_error() {
        let (base, _rx) = fake_backend(vec![(502, "<html>Bad Gateway</html>")]);
        let err = client(base).query(&QueryRequest::new("x", 10)).await.unwrap_err();
        assert!(err.to_string().contains("non-JSON"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind and drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let result = client(format!("http://127.0.0.1:{}/api", port)).auth_status().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_auth_endpoints() {
        let (base, rx) = fake_backend(vec![
            (200, r#"{"authenticated": true, "email": "me@gmail.com"}"#),
            (200, r#"{"status": "authenticated", "email": "me@gmail.com"}"#),
            (500, r#"{"error": "credentials.json missing"}"#),
            (200, r#"{"status": "logged_out", "message": "bye"}"#),
            (500, r#"{"error": "disk full"}"#),
        ]);
        let client = client(base);

        let status = client.auth_status().await.unwrap();
        assert_eq!(status, AuthState::signed_in(Some("me@gmail.com".into())));

        assert_eq!(client.login().await.unwrap(), AuthState::signed_in(Some("me@gmail.com".into())));
        assert_eq!(client.login().await.unwrap(), AuthState::signed_out());
        assert!(client.logout().await.unwrap());
        assert!(!client.logout().await.unwrap());

        let calls: Vec<_> = rx.try_iter().map(|r| (r.method, r.url)).collect();
        assert_eq!(
            calls,
            vec![
                ("GET".to_string(), "/api/auth/status".to_string()),
                ("GET".to_string(), "/api/auth/gmail".to_string()),
                ("GET".to_string(), "/api/auth/gmail".to_string()),
                ("POST".to_string(), "/api/auth/logout".to_string()),
                ("POST".to_string(), "/api/auth/logout".to_string()),
            ]
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = client("http://localhost:5000/api/".to_string());
        assert_eq!(client.base_url(), "http://localhost:5000/api");
        assert_eq!(client.url("/query"), "http://localhost:5000/api/query");
    }
}
