use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use dealflow_core::Principal;
use dealflow_engine::{NoticeKind, Notifier, SessionProvider};

/// Installs a test-writer subscriber once per process. `RUST_LOG` overrides
/// the default `warn` filter.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Keeps every notice in arrival order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(NoticeKind::Error)
    }

    pub fn successes(&self) -> Vec<String> {
        self.messages(NoticeKind::Success)
    }

    pub fn len(&self) -> usize {
        self.notices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.lock().is_empty()
    }

    pub fn clear(&self) {
        self.notices.lock().clear();
    }

    fn messages(&self, kind: NoticeKind) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|n| n.kind == kind)
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        self.notices.lock().push(Notice {
            kind,
            message: message.to_string(),
        });
    }
}

/// A session whose user the test sets directly.
#[derive(Debug, Default)]
pub struct StaticSession {
    user: Mutex<Option<Principal>>,
}

impl StaticSession {
    pub fn signed_in(principal: Principal) -> Self {
        Self {
            user: Mutex::new(Some(principal)),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn set(&self, principal: Option<Principal>) {
        *self.user.lock() = principal;
    }
}

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<Principal> {
        *self.user.lock()
    }
}
