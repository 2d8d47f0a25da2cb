use std::time::Duration;

use log::{debug, info, warn};
use shared::{
    BackgroundEnvelope, BackgroundRequest, BackgroundResponse, PageMessage, PushResult,
    SubmissionFinished,
};
use tokio::sync::{mpsc, oneshot};

use crate::extract;
use crate::notify::{Notifier, ToastKind};
use crate::surface::SurfaceProvider;

/// The page rewrites its result markup asynchronously after the network
/// signal arrives; snapshots taken earlier see the previous state.
pub static SETTLE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug)]
pub enum RelayError {
    /// The background context is gone.
    ChannelClosed,

    /// The background context dropped the request without answering.
    NoReply,
}

async fn send_request(
    outbox: &mpsc::Sender<BackgroundEnvelope>,
    request: BackgroundRequest,
) -> Result<BackgroundResponse, RelayError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    outbox
        .send(BackgroundEnvelope {
            request,
            reply: reply_tx,
        })
        .await
        .map_err(|_| RelayError::ChannelClosed)?;
    reply_rx.await.map_err(|_| RelayError::NoReply)
}

fn toast<N: Notifier>(notifier: &N, kind: ToastKind, title: &str, message: &str) {
    if let Err(error) = notifier.show(kind, title, message) {
        debug!("Could not display notification: {:?}", error);
    }
}

async fn handle_submission<S: SurfaceProvider, N: Notifier>(
    outbox: &mpsc::Sender<BackgroundEnvelope>,
    provider: &S,
    notifier: &N,
    settle: Duration,
    submission: SubmissionFinished,
) {
    info!(
        "Submission {} finished: {} ({}, {})",
        submission.submission_id, submission.status, submission.runtime, submission.memory
    );

    // Give the page time to render the verdict before looking at it.
    tokio::time::sleep(settle).await;

    let surface = match provider.snapshot(&submission).await {
        Ok(surface) => surface,
        Err(error) => {
            warn!("Could not capture the page: {:?}", error);
            toast(
                notifier,
                ToastKind::Error,
                "Error",
                "Failed to capture the problem page",
            );
            return;
        }
    };

    if !extract::verify_accepted(&surface) {
        info!("Page does not show an accepted result, skipping push");
        toast(
            notifier,
            ToastKind::Info,
            "Submission Not Accepted",
            "Only accepted solutions are pushed to GitHub",
        );
        return;
    }

    toast(
        notifier,
        ToastKind::Success,
        "Accepted!",
        "Extracting solution data...",
    );

    let record = match extract::problem_record(&surface, Some(&submission.language)) {
        Ok(record) => record,
        Err(error) => {
            warn!("Extraction failed: {:?}", error);
            toast(
                notifier,
                ToastKind::Error,
                "Error",
                "Failed to extract problem data",
            );
            return;
        }
    };

    info!(
        "Extracted {} ({}, {} bytes of code)",
        record.title,
        record.language,
        record.code.len()
    );
    toast(
        notifier,
        ToastKind::Info,
        "Pushing",
        "Uploading solution to GitHub...",
    );

    match send_request(outbox, BackgroundRequest::PushToGitHub(record)).await {
        Ok(BackgroundResponse::Push(result)) => report_result(notifier, result),
        Ok(other) => warn!("Unexpected push reply: {:?}", other),
        Err(error) => {
            warn!("Could not reach the background context: {:?}", error);
            toast(
                notifier,
                ToastKind::Error,
                "Error",
                "Failed to hand the solution to the publisher",
            );
        }
    }
}

fn report_result<N: Notifier>(notifier: &N, result: PushResult) {
    match result {
        PushResult::NotConfigured { message } => {
            toast(notifier, ToastKind::Error, "GitHub is not configured", &message);
        }
        PushResult::Pushed(report) if report.is_complete() => {
            toast(
                notifier,
                ToastKind::Success,
                "Pushed to GitHub",
                &format!("{} files committed", report.succeeded),
            );
        }
        PushResult::Pushed(report) => {
            let failures = report
                .outcomes
                .iter()
                .filter_map(|outcome| {
                    outcome
                        .result
                        .as_ref()
                        .err()
                        .map(|error| format!("{}: {}", outcome.path, error))
                })
                .collect::<Vec<_>>()
                .join("; ");
            toast(
                notifier,
                ToastKind::Error,
                "Push incomplete",
                &format!(
                    "{} of {} files committed. {}",
                    report.succeeded,
                    report.outcomes.len(),
                    failures
                ),
            );
        }
    }
}

/// Page-context event loop. Consumes `submissionFinished` notifications
/// until the channel closes.
pub async fn run<S: SurfaceProvider, N: Notifier>(
    mut inbox: mpsc::Receiver<PageMessage>,
    outbox: mpsc::Sender<BackgroundEnvelope>,
    provider: S,
    notifier: N,
    settle: Duration,
) {
    // Confirm the background context answers before settling in.
    match send_request(&outbox, BackgroundRequest::Ping).await {
        Ok(BackgroundResponse::Pong { .. }) => debug!("Background context is reachable"),
        Ok(other) => warn!("Unexpected ping reply: {:?}", other),
        Err(error) => warn!("Background context did not answer the ping: {:?}", error),
    }

    while let Some(message) = inbox.recv().await {
        match message {
            PageMessage::SubmissionFinished(submission) => {
                handle_submission(&outbox, &provider, &notifier, settle, submission).await;
            }
        }
    }
    debug!("Page context channel closed");
}
