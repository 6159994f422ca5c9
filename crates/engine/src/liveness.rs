use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag marking whether the view that issued an operation still exists.
/// Each in-flight operation holds a clone and checks it before applying results.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revocation_is_shared() {
        let token = Liveness::new();
        let held = token.clone();
        assert!(held.is_alive());
        token.revoke();
        assert!(!held.is_alive());
    }
}
