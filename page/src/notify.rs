use log::{error, info};

/// Success and info toasts auto-dismiss on a real surface; error toasts
/// stay until dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug)]
pub enum Error {
    /// The notification surface went away.
    TargetGone,
}

/// Best-effort user notification. Callers log a failed delivery and move
/// on; a toast is never worth failing the pipeline over.
pub trait Notifier {
    fn show(&self, kind: ToastKind, title: &str, message: &str) -> Result<(), Error>;
}

/// Writes toasts to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, kind: ToastKind, title: &str, message: &str) -> Result<(), Error> {
        match kind {
            ToastKind::Success | ToastKind::Info => info!("{}: {}", title, message),
            ToastKind::Error => error!("{}: {}", title, message),
        }
        Ok(())
    }
}
