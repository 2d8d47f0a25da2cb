use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::oneshot;

pub static CONFIG_QUALIFIER: &str = "";
pub static CONFIG_ORGANIZATION: &str = "leetpush";
pub static CONFIG_APPLICATION: &str = "Leetpush";

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

/// Judge state reported by the submission check endpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionState {
    Pending,
    Started,
    Success,
    #[default]
    #[serde(other)]
    Other,
}

/// Parsed body of a submission check response. Immutable once fetched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionResult {
    #[serde(default)]
    pub state: SubmissionState,
    #[serde(default, rename = "status_msg")]
    pub verdict: String,
    #[serde(default, rename = "status_runtime")]
    pub runtime: String,
    #[serde(default, rename = "status_memory")]
    pub memory: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub submission_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub question_id: String,
    #[serde(default)]
    pub lang: String,
}

impl SubmissionResult {
    pub fn is_accepted(&self) -> bool {
        self.state == SubmissionState::Success && self.verdict == "Accepted"
    }

    /// The judge will not change its answer for this submission anymore.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self.state,
            SubmissionState::Pending | SubmissionState::Started
        )
    }
}

// The endpoint encodes identifiers sometimes as strings and sometimes as
// numbers, depending on the page cohort.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Number(number) => number.to_string(),
        _ => String::new(),
    })
}

/// Payload of the `submissionFinished` message sent to the page context.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFinished {
    pub status: String,
    pub runtime: String,
    pub memory: String,
    pub submission_id: String,
    pub question_id: String,
    pub language: String,
    pub timestamp: u64,
}

impl SubmissionFinished {
    pub fn from_result(result: &SubmissionResult) -> Self {
        Self {
            status: result.verdict.clone(),
            runtime: result.runtime.clone(),
            memory: result.memory.clone(),
            submission_id: result.submission_id.clone(),
            question_id: result.question_id.clone(),
            language: result.lang.clone(),
            timestamp: now_millis(),
        }
    }
}

/// Everything scraped from the problem page for one accepted submission.
/// Built once by the extractor and read-only afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRecord {
    pub title: String,
    pub description: String,
    pub code: String,
    pub language: String,
    pub extension: String,
    pub slug: String,
    pub url: Option<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FileAction {
    Created,
    Updated,
}

/// Outcome of a single file upsert within a publish batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub result: Result<FileAction, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushReport {
    pub succeeded: usize,
    pub outcomes: Vec<FileOutcome>,
}

impl PushReport {
    /// Every file in the batch was written.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.outcomes.len()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum PushResult {
    Pushed(PushReport),
    NotConfigured { message: String },
}

/// Messages delivered to the page context.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum PageMessage {
    SubmissionFinished(SubmissionFinished),
}

/// Requests the page context sends to the background context.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum BackgroundRequest {
    Ping,
    TestConnection,
    PushToGitHub(ProblemRecord),
}

#[derive(Debug, Deserialize, Serialize)]
pub enum BackgroundResponse {
    Pong { timestamp: u64 },
    Connected { version: String },
    Push(PushResult),
}

/// A background request bundled with its reply channel.
#[derive(Debug)]
pub struct BackgroundEnvelope {
    pub request: BackgroundRequest,
    pub reply: oneshot::Sender<BackgroundResponse>,
}
