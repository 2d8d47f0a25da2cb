use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn, LevelFilter};
use notify::Watcher;
use page::notify::LogNotifier;
use page::surface::HttpSurfaceProvider;
use shared::{now_millis, BackgroundEnvelope, BackgroundRequest, BackgroundResponse};
use simple_logger::SimpleLogger;
use tokio::sync::mpsc;

mod bridge;
mod detector;
mod github;
mod settings;
mod util;

/// Local-only: events come from a browser shim on the same machine.
static BRIDGE_ADDRESS: &str = "127.0.0.1:8095";
static PAGE_BASE_URL: &str = "https://leetcode.com";
static SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

async fn handle_request(
    github: &github::GitHubClient,
    settings: &settings::SettingsReference,
    envelope: BackgroundEnvelope,
) {
    let response = match envelope.request {
        BackgroundRequest::Ping => BackgroundResponse::Pong {
            timestamp: now_millis(),
        },
        BackgroundRequest::TestConnection => BackgroundResponse::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        BackgroundRequest::PushToGitHub(record) => {
            info!(
                "Received problem data for push: {} ({}, {} chars of code)",
                record.title,
                record.language,
                record.code.len()
            );
            BackgroundResponse::Push(github::handle_push(github, settings, &record).await)
        }
    };
    if envelope.reply.send(response).is_err() {
        debug!("Page context dropped the reply channel");
    }
}

/// Best-effort startup check of the configured credentials. Publishing
/// decides for itself on every push; this only surfaces problems early.
async fn verify_credentials(
    github: &github::GitHubClient,
    settings: &settings::SettingsReference,
) {
    let credentials = {
        let Ok(settings) = settings.read() else {
            return;
        };
        settings.credentials()
    };
    let credentials = match credentials {
        Ok(credentials) => credentials,
        Err(error) => {
            info!("GitHub publishing is not configured yet: {}", error);
            return;
        }
    };
    if !github::looks_like_token(&credentials.token) {
        warn!("The configured token does not look like a GitHub personal access token");
    }
    match github.authenticated_user(&credentials).await {
        Ok(login) if login.eq_ignore_ascii_case(&credentials.owner) => {
            info!("Authenticated with GitHub as {}", login);
        }
        Ok(login) => {
            warn!(
                "Authenticated with GitHub as {}, but the configured owner is {}",
                login, credentials.owner
            );
        }
        Err(error) => warn!("Could not verify the GitHub credentials: {}", error),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .unwrap();

    let Ok(settings_path) = settings::Settings::get_path() else {
        error!("Could not determine the settings path");
        return Ok(());
    };
    let settings = match settings::Settings::load(&settings_path) {
        Ok(settings) => Arc::new(RwLock::new(settings)),
        Err(error) => {
            error!(
                "Could not load settings from {}: {:?}",
                settings_path.display(),
                error
            );
            return Ok(());
        }
    };
    info!("Loaded settings");
    if let Some(timestamp) = settings.read().ok().and_then(|s| s.last_sync_timestamp) {
        debug!("Last successful sync at {}", timestamp);
    }

    // Reload the settings if the file is changed.
    let w_settings = settings.clone();
    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let Some(path) = event.paths.first() else {
                    return;
                };
                if let Ok(new_settings) = settings::Settings::load(path.as_path()) {
                    let Ok(mut settings_write) = w_settings.write() else {
                        return;
                    };
                    *settings_write = new_settings;
                }
            }
            Err(e) => warn!("Error monitoring settings file: {}", e),
        })?;
    match watcher.watch(settings_path.as_path(), notify::RecursiveMode::NonRecursive) {
        Ok(()) => debug!("Monitoring {} for changes", settings_path.display()),
        Err(_) => warn!(
            "Can't monitor settings file {} for changes",
            settings_path.display()
        ),
    };

    let github = match github::GitHubClient::new() {
        Ok(github) => github,
        Err(error) => {
            error!("Could not build the GitHub client: {}", error);
            return Ok(());
        }
    };
    verify_credentials(&github, &settings).await;

    let (event_tx, mut event_rx) = mpsc::channel::<detector::RequestEvent>(64);
    let (page_tx, page_rx) = mpsc::channel(16);
    let (request_tx, mut request_rx) = mpsc::channel::<BackgroundEnvelope>(16);

    let listener = match tokio::net::TcpListener::bind(BRIDGE_ADDRESS).await {
        Ok(listener) => listener,
        Err(error) => {
            error!("Could not bind the bridge to {}: {}", BRIDGE_ADDRESS, error);
            return Ok(());
        }
    };
    info!("Bridge listening on {}", BRIDGE_ADDRESS);
    tokio::spawn(bridge::serve(
        listener,
        bridge::BridgeState {
            settings: settings.clone(),
            events: event_tx,
        },
    ));

    let provider = match HttpSurfaceProvider::new(PAGE_BASE_URL) {
        Ok(provider) => provider,
        Err(error) => {
            error!("Could not build the page client: {}", error);
            return Ok(());
        }
    };
    tokio::spawn(page::task::run(
        page_rx,
        request_tx,
        provider,
        LogNotifier,
        page::task::SETTLE_DELAY,
    ));

    let mut detector = match detector::Detector::new(page_tx) {
        Ok(detector) => detector,
        Err(error) => {
            error!("Could not build the detection client: {}", error);
            return Ok(());
        }
    };
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

    info!("Listening for submission events");
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => detector.handle_event(event).await,
            Some(envelope) = request_rx.recv() => handle_request(&github, &settings, envelope).await,
            _ = sweep.tick() => detector.sweep(),
            else => break,
        }
    }
    Ok(())
}
