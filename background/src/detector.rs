use std::collections::HashSet;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use shared::{PageMessage, SubmissionFinished, SubmissionResult};
use tokio::sync::mpsc;

/// Entries kept before a sweep wipes the whole set.
pub static PROCESSED_CAPACITY: usize = 100;

static CHECK_MARKER: &str = "/submissions/detail/";
static CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A completed request observed by the browser runtime, delivered through
/// the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub url: String,

    #[serde(default)]
    pub tab_id: Option<i64>,
}

#[derive(Debug)]
pub enum CheckError {
    /// The check request could not be sent or its body could not be parsed.
    Request(reqwest::Error),

    /// The check endpoint answered with a non-success status.
    Status(StatusCode),
}

/// The URL is a submission status check: `…/submissions/detail/{id}/check`
/// with an optional trailing slash and query string.
pub fn is_check_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let Some(position) = path.find(CHECK_MARKER) else {
        return false;
    };
    let rest = &path[position + CHECK_MARKER.len()..];
    let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
    segments.next().is_some() && segments.next() == Some("check") && segments.next().is_none()
}

/// Check URLs that already reached a terminal verdict. The host page polls
/// the same URL repeatedly while a submission is judging, so a URL is added
/// only once its result is terminal; adding earlier would hide the eventual
/// accepted verdict, never adding would push duplicates.
pub struct ProcessedSubmissions {
    seen: HashSet<String>,
    capacity: usize,
}

impl ProcessedSubmissions {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            capacity,
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn mark(&mut self, url: String) {
        self.seen.insert(url);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Wholesale clear once over capacity. Trades perfect history for
    /// bounded memory; the host site does not reuse check URLs, so a
    /// reprocessed ancient URL is a benign edge case.
    pub fn sweep(&mut self) {
        if self.len() > self.capacity {
            let cleared = self.len();
            self.seen.clear();
            info!("Cleared {} processed submissions", cleared);
        }
    }
}

/// Watches completed requests for submission status checks and notifies the
/// page context at most once per accepted submission.
pub struct Detector {
    client: reqwest::Client,
    processed: ProcessedSubmissions,
    page: mpsc::Sender<PageMessage>,
}

impl Detector {
    pub fn new(page: mpsc::Sender<PageMessage>) -> Result<Self, reqwest::Error> {
        // The cookie store carries the site session the same way the page's
        // own polling requests do.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(CHECK_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            processed: ProcessedSubmissions::new(PROCESSED_CAPACITY),
            page,
        })
    }

    pub fn sweep(&mut self) {
        self.processed.sweep();
    }

    async fn fetch_result(&self, url: &str) -> Result<SubmissionResult, CheckError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(CheckError::Request)?;
        if !response.status().is_success() {
            return Err(CheckError::Status(response.status()));
        }
        response
            .json::<SubmissionResult>()
            .await
            .map_err(CheckError::Request)
    }

    pub async fn handle_event(&mut self, event: RequestEvent) {
        if !is_check_url(&event.url) {
            return;
        }
        if self.processed.contains(&event.url) {
            debug!("Submission already processed, skipping: {}", event.url);
            return;
        }
        debug!(
            "Checking submission status from {} (tab {:?})",
            event.url, event.tab_id
        );

        let result = match self.fetch_result(&event.url).await {
            Ok(result) => result,
            Err(error) => {
                // Transient; the page will poll again and re-trigger us.
                warn!("Could not check submission status: {:?}", error);
                return;
            }
        };

        if !result.is_terminal() {
            debug!("Submission {} is still judging", result.submission_id);
            return;
        }

        // Terminal either way; only now is it safe to stop watching the URL.
        self.processed.mark(event.url);

        if result.is_accepted() {
            info!(
                "Accepted submission {} detected ({}, {})",
                result.submission_id, result.runtime, result.memory
            );
            let finished = SubmissionFinished::from_result(&result);
            if let Err(error) = self
                .page
                .send(PageMessage::SubmissionFinished(finished))
                .await
            {
                // The page context may be gone; nothing to retry against.
                warn!("Could not notify the page context: {}", error);
            }
        } else {
            info!(
                "Submission {} not accepted: {}",
                result.submission_id, result.verdict
            );
        }
    }
}
