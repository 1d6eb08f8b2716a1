//! Connectivity preflight

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reports whether the transport currently has a network path
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity source for hosts without a reachability observer
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Shared flag toggled by the host application's reachability observer
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag(Arc<AtomicBool>);

impl ConnectivityFlag {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_clones_share_state() {
        let flag = ConnectivityFlag::default();
        let observer = flag.clone();
        assert!(flag.is_online());

        observer.set_online(false);
        assert!(!flag.is_online());
        assert!(AlwaysOnline.is_online());
    }
}
