use dealflow_core::Principal;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Surfaces the outcome of a pipeline operation to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Yields the signed-in user, if any.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<Principal>;
}

/// Writes notices to the log instead of a UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Success => info!(notice = message, "pipeline notice"),
            NoticeKind::Error => warn!(notice = message, "pipeline notice"),
        }
    }
}
