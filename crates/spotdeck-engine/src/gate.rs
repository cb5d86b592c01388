use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Optional shared-secret check in front of mutating commands.
///
/// This is a UX deterrent, not a security boundary: the secret is compared
/// in plain text with no hashing, no constant-time comparison and no rate
/// limiting. Without a configured secret the gate always passes.
#[derive(Clone, Debug)]
pub struct AuthGate {
    expected: Option<Arc<str>>,
    authenticated: Arc<AtomicBool>,
}

impl AuthGate {
    pub fn new(expected: Option<String>) -> Self {
        let expected: Option<Arc<str>> = expected.filter(|s| !s.is_empty()).map(Arc::from);
        Self {
            authenticated: Arc::new(AtomicBool::new(expected.is_none())),
            expected,
        }
    }

    pub fn is_active(&self) -> bool {
        self.expected.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.expected.is_none() || self.authenticated.load(Ordering::SeqCst)
    }

    /// Compare `candidate` with the configured secret and remember the result.
    pub fn check(&self, candidate: &str) -> bool {
        let ok = match &self.expected {
            None => true,
            Some(expected) => candidate == &**expected,
        };
        self.authenticated.store(ok, Ordering::SeqCst);
        info!("gate: check {}", if ok { "passed" } else { "failed" });
        ok
    }

    /// Sign out. No effect in unsecured mode.
    pub fn reset(&self) {
        self.authenticated.store(self.expected.is_none(), Ordering::SeqCst);
    }
}
