use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use shared::SubmissionFinished;

static USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
static FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of the problem page at extraction time: the rendered markup and,
/// when available, the code editor's in-memory buffer.
#[derive(Debug, Clone)]
pub struct PageSurface {
    pub document: String,
    pub editor: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug)]
pub enum Error {
    /// The page could not be fetched.
    Request(reqwest::Error),

    /// The page answered with a non-success status.
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait SurfaceProvider {
    /// Capture the current page state for the given finished submission.
    async fn snapshot(&self, submission: &SubmissionFinished) -> Result<PageSurface, Error>;
}

/// Fetches the submission detail page over HTTP. The client keeps a cookie
/// store so the site's session travels with the request.
pub struct HttpSurfaceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSurfaceProvider {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SurfaceProvider for HttpSurfaceProvider {
    async fn snapshot(&self, submission: &SubmissionFinished) -> Result<PageSurface, Error> {
        let url = format!(
            "{}/submissions/detail/{}/",
            self.base_url, submission.submission_id
        );
        debug!("Capturing page snapshot from {}", url);
        let response = self.client.get(&url).send().await.map_err(Error::Request)?;
        if !response.status().is_success() {
            return Err(Error::Status(response.status()));
        }
        let final_url = response.url().to_string();
        let document = response.text().await.map_err(Error::Request)?;
        Ok(PageSurface {
            document,
            editor: None,
            url: Some(final_url),
        })
    }
}
