use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{info, warn};
use reqwest::{header, StatusCode};
use serde_json::json;
use shared::{FileAction, FileOutcome, ProblemRecord, PushReport, PushResult};
use thiserror::Error;

use crate::settings::{Credentials, SettingsReference};
use crate::util::redact_secrets;

static API_BASE: &str = "https://api.github.com";
static ACCEPT: &str = "application/vnd.github.v3+json";
static USER_AGENT: &str = concat!("leetpush/", env!("CARGO_PKG_VERSION"));
static PUSH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed: the token was rejected (HTTP 401)")]
    Authentication,

    #[error("authorization failed: the token lacks the required repository permissions (HTTP 403)")]
    Authorization,

    #[error("repository not found (HTTP 404)")]
    RepositoryNotFound,

    #[error("conflict: the file changed on the remote during the push, try again (HTTP 409)")]
    Conflict,

    #[error("the remote rejected the content: {0} (HTTP 422)")]
    Validation(String),

    #[error("remote API error (HTTP {status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("the remote response did not match the expected schema")]
    Schema,

    #[error("the configured token cannot be sent as a request header")]
    InvalidToken,
}

/// Format hint only; authorization is decided by the remote 401/403.
pub fn looks_like_token(token: &str) -> bool {
    token.starts_with("ghp_") || token.starts_with("github_pat_")
}

fn classify_status(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::Authentication,
        StatusCode::FORBIDDEN => Error::Authorization,
        StatusCode::NOT_FOUND => Error::RepositoryNotFound,
        StatusCode::CONFLICT => Error::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(message),
        status => Error::Api { status, message },
    }
}

/// Remote-supplied error text, redacted. GitHub wraps it as
/// `{"message": …}`; anything else is dropped rather than echoed blindly.
async fn read_error_message(response: reqwest::Response) -> String {
    let message = match response.json::<serde_json::Value>().await {
        Ok(value) => value
            .get("message")
            .and_then(|message| message.as_str())
            .unwrap_or_default()
            .to_string(),
        Err(_) => String::new(),
    };
    redact_secrets(&message)
}

/// One file of a publish batch, content already base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishFile {
    pub path: String,
    pub content: String,
}

/// Markdown description document published next to the solution file.
fn render_readme(record: &ProblemRecord) -> String {
    let description = html2md::parse_html(&record.description);
    let mut readme = format!(
        "# {}\n\n{}\n\n## Solution\n\n- Language: {}\n- [Solution code](./{}{})\n",
        record.title,
        description.trim(),
        record.language,
        record.slug,
        record.extension,
    );
    if let Some(url) = &record.url {
        readme.push_str(&format!("- [Problem link]({})\n", url));
    }
    readme
}

/// The two files a record maps to: the raw solution and its description.
fn derive_files(record: &ProblemRecord) -> Vec<PublishFile> {
    vec![
        PublishFile {
            path: format!("{}/{}{}", record.slug, record.slug, record.extension),
            content: BASE64.encode(record.code.as_bytes()),
        },
        PublishFile {
            path: format!("{}/README.md", record.slug),
            content: BASE64.encode(render_readme(record).as_bytes()),
        },
    ]
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_api_base(API_BASE)
    }

    pub fn with_api_base(api_base: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(PUSH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn headers(&self, credentials: &Credentials) -> Result<header::HeaderMap, Error> {
        let mut auth = header::HeaderValue::from_str(&format!("token {}", credentials.token))
            .map_err(|_| Error::InvalidToken)?;
        auth.set_sensitive(true);
        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
        Ok(headers)
    }

    fn contents_url(&self, credentials: &Credentials, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, credentials.owner, credentials.repo, path
        )
    }

    /// Login of the token's user, for comparing against the configured
    /// owner.
    pub async fn authenticated_user(&self, credentials: &Credentials) -> Result<String, Error> {
        let response = self
            .client
            .get(format!("{}/user", self.api_base))
            .headers(self.headers(credentials)?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, read_error_message(response).await));
        }
        let value: serde_json::Value = response.json().await?;
        value
            .get("login")
            .and_then(|login| login.as_str())
            .map(str::to_string)
            .ok_or(Error::Schema)
    }

    /// Content hash of the file if it already exists remotely. Fetched
    /// immediately before each write and never cached across publishes.
    async fn probe_file(
        &self,
        credentials: &Credentials,
        path: &str,
    ) -> Result<Option<String>, Error> {
        let response = self
            .client
            .get(self.contents_url(credentials, path))
            .headers(self.headers(credentials)?)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                let value: serde_json::Value = response.json().await?;
                value
                    .get("sha")
                    .and_then(|sha| sha.as_str())
                    .map(|sha| Some(sha.to_string()))
                    .ok_or(Error::Schema)
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(classify_status(status, read_error_message(response).await)),
        }
    }

    /// Create-or-update write. The sha must be present exactly when
    /// updating; the remote answers 409 otherwise.
    async fn write_file(
        &self,
        credentials: &Credentials,
        file: &PublishFile,
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), Error> {
        let mut body = json!({
            "message": message,
            "content": file.content,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }
        let response = self
            .client
            .put(self.contents_url(credentials, &file.path))
            .headers(self.headers(credentials)?)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(classify_status(status, read_error_message(response).await))
    }

    async fn push_file(
        &self,
        credentials: &Credentials,
        title: &str,
        file: &PublishFile,
    ) -> Result<FileAction, Error> {
        let existing = self.probe_file(credentials, &file.path).await?;
        let (action, message) = match &existing {
            Some(_) => (FileAction::Updated, format!("Update {} solution", title)),
            None => (FileAction::Created, format!("Add {} solution", title)),
        };
        self.write_file(credentials, file, &message, existing.as_deref())
            .await?;
        Ok(action)
    }

    /// Publish both files of a record. Files are independent resources, not
    /// a transaction: one failing never aborts the other, and there is no
    /// rollback.
    pub async fn publish(&self, credentials: &Credentials, record: &ProblemRecord) -> PushReport {
        let mut outcomes = Vec::with_capacity(2);
        for file in derive_files(record) {
            let outcome = match self.push_file(credentials, &record.title, &file).await {
                Ok(action) => {
                    info!("{:?} {}", action, file.path);
                    Ok(action)
                }
                Err(error) => {
                    warn!("Could not push {}: {}", file.path, error);
                    Err(error.to_string())
                }
            };
            outcomes.push(FileOutcome {
                path: file.path,
                result: outcome,
            });
        }
        let succeeded = outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .count();
        PushReport {
            succeeded,
            outcomes,
        }
    }
}

/// Publisher entry point for a `pushToGitHub` request: read the settings
/// store, fail fast without credentials, publish otherwise.
pub async fn handle_push(
    client: &GitHubClient,
    settings: &SettingsReference,
    record: &ProblemRecord,
) -> PushResult {
    let credentials = {
        let Ok(settings) = settings.read() else {
            warn!("Cannot read the settings store");
            return PushResult::NotConfigured {
                message: "the settings store is unavailable".to_string(),
            };
        };
        settings.credentials()
    };
    match credentials {
        Ok(credentials) => PushResult::Pushed(client.publish(&credentials, record).await),
        Err(error) => {
            warn!("Push refused: {}", error);
            PushResult::NotConfigured {
                message: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, RwLock};

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use test_case::test_case;

    use super::*;
    use crate::settings::Settings;

    fn credentials() -> Credentials {
        Credentials {
            token: "ghp_test".to_string(),
            owner: "octocat".to_string(),
            repo: "solutions".to_string(),
        }
    }

    fn record() -> ProblemRecord {
        ProblemRecord {
            title: "Two Sum".to_string(),
            description: "<p>Given an array of integers...</p>".to_string(),
            code: "def f(): pass".to_string(),
            language: "Python3".to_string(),
            extension: ".py".to_string(),
            slug: "two-sum".to_string(),
            url: Some("https://leetcode.com/problems/two-sum/".to_string()),
            timestamp: 0,
        }
    }

    #[test_case(StatusCode::UNAUTHORIZED, "authentication"; "bad token")]
    #[test_case(StatusCode::FORBIDDEN, "authorization"; "missing scope")]
    #[test_case(StatusCode::NOT_FOUND, "repository not found"; "missing repository")]
    #[test_case(StatusCode::CONFLICT, "conflict"; "stale sha")]
    #[test_case(StatusCode::UNPROCESSABLE_ENTITY, "rejected the content"; "validation")]
    #[test_case(StatusCode::BAD_GATEWAY, "remote API error"; "anything else")]
    fn classify_status(status: StatusCode, needle: &str) {
        let error = super::classify_status(status, "details".to_string());
        assert!(error.to_string().contains(needle), "{}", error);
    }

    #[test]
    fn classified_errors_are_distinct() {
        let statuses = [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::CONFLICT,
            StatusCode::UNPROCESSABLE_ENTITY,
        ];
        let messages: std::collections::HashSet<String> = statuses
            .iter()
            .map(|status| super::classify_status(*status, "x".to_string()).to_string())
            .collect();
        assert_eq!(messages.len(), statuses.len());
    }

    #[test]
    fn derived_files_and_readme() {
        let files = derive_files(&record());
        assert_eq!(files[0].path, "two-sum/two-sum.py");
        assert_eq!(files[1].path, "two-sum/README.md");
        assert_eq!(files[0].content, BASE64.encode(b"def f(): pass"));

        let readme = render_readme(&record());
        assert!(readme.starts_with("# Two Sum\n"));
        assert!(readme.contains("Given an array of integers..."));
        assert!(readme.contains("[Solution code](./two-sum.py)"));
        assert!(readme.contains("https://leetcode.com/problems/two-sum/"));
    }

    #[test_case("ghp_abc", true; "classic")]
    #[test_case("github_pat_abc", true; "fine grained")]
    #[test_case("hunter2", false; "not a token")]
    fn looks_like_token(token: &str, expected: bool) {
        assert_eq!(super::looks_like_token(token), expected);
    }

    #[derive(Clone, Default)]
    struct FakeGitHub {
        // path -> sha of the pre-existing file
        files: Arc<Mutex<HashMap<String, String>>>,
        writes: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
        probes: Arc<AtomicUsize>,
        fail_writes_with: Arc<Mutex<Option<StatusCode>>>,
    }

    async fn get_contents(
        State(fake): State<FakeGitHub>,
        Path((_, _, path)): Path<(String, String, String)>,
    ) -> axum::response::Response {
        fake.probes.fetch_add(1, Ordering::SeqCst);
        match fake.files.lock().unwrap().get(&path) {
            Some(sha) => (
                StatusCode::OK,
                Json(serde_json::json!({"path": path, "sha": sha})),
            )
                .into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"message": "Not Found"})),
            )
                .into_response(),
        }
    }

    async fn put_contents(
        State(fake): State<FakeGitHub>,
        Path((_, _, path)): Path<(String, String, String)>,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        fake.writes.lock().unwrap().push((path, body));
        if let Some(status) = *fake.fail_writes_with.lock().unwrap() {
            return (
                status,
                Json(serde_json::json!({"message": "write refused"})),
            )
                .into_response();
        }
        (StatusCode::CREATED, Json(serde_json::json!({}))).into_response()
    }

    async fn serve(fake: FakeGitHub) -> SocketAddr {
        let app = Router::new()
            .route(
                "/repos/:owner/:repo/contents/*path",
                get(get_contents).put(put_contents),
            )
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        address
    }

    fn client_for(address: SocketAddr) -> GitHubClient {
        GitHubClient::with_api_base(&format!("http://{}", address)).unwrap()
    }

    #[tokio::test]
    async fn missing_files_are_created_without_a_sha() {
        let fake = FakeGitHub::default();
        let address = serve(fake.clone()).await;
        let client = client_for(address);

        let report = client.publish(&credentials(), &record()).await;
        assert_eq!(report.succeeded, 2);
        assert!(report.is_complete());
        assert_eq!(
            report.outcomes[0].result.as_ref().unwrap(),
            &FileAction::Created
        );

        let writes = fake.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        let (path, body) = &writes[0];
        assert_eq!(path, "two-sum/two-sum.py");
        assert_eq!(body["message"], "Add Two Sum solution");
        assert!(body.get("sha").is_none());
    }

    #[tokio::test]
    async fn existing_files_are_updated_with_their_sha() {
        let fake = FakeGitHub::default();
        fake.files
            .lock()
            .unwrap()
            .insert("two-sum/two-sum.py".to_string(), "abc123".to_string());
        let address = serve(fake.clone()).await;
        let client = client_for(address);

        let report = client.publish(&credentials(), &record()).await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(
            report.outcomes[0].result.as_ref().unwrap(),
            &FileAction::Updated
        );
        assert_eq!(
            report.outcomes[1].result.as_ref().unwrap(),
            &FileAction::Created
        );

        let writes = fake.writes.lock().unwrap();
        assert_eq!(writes[0].1["message"], "Update Two Sum solution");
        assert_eq!(writes[0].1["sha"], "abc123");
        assert!(writes[1].1.get("sha").is_none());
    }

    #[tokio::test]
    async fn refused_writes_become_partial_reports() {
        let fake = FakeGitHub::default();
        *fake.fail_writes_with.lock().unwrap() = Some(StatusCode::CONFLICT);
        let address = serve(fake.clone()).await;
        let client = client_for(address);

        let report = client.publish(&credentials(), &record()).await;
        assert_eq!(report.succeeded, 0);
        assert!(!report.is_complete());
        // Both files were still attempted independently.
        assert_eq!(fake.writes.lock().unwrap().len(), 2);
        let error = report.outcomes[0].result.as_ref().unwrap_err();
        assert!(error.contains("conflict"), "{}", error);
    }

    #[tokio::test]
    async fn missing_credentials_make_no_remote_calls() {
        let fake = FakeGitHub::default();
        let address = serve(fake.clone()).await;
        let client = client_for(address);

        let settings = Arc::new(RwLock::new(Settings::default()));
        let result = handle_push(&client, &settings, &record()).await;

        assert!(matches!(result, PushResult::NotConfigured { .. }));
        assert_eq!(fake.probes.load(Ordering::SeqCst), 0);
        assert!(fake.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn authenticated_user_returns_the_login() {
        async fn user() -> Json<serde_json::Value> {
            Json(serde_json::json!({"login": "octocat"}))
        }
        let app = Router::new().route("/user", get(user));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = client_for(address);
        let login = client.authenticated_user(&credentials()).await.unwrap();
        assert_eq!(login, "octocat");
    }
}
