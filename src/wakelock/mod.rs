//! Keeping the host awake during a session
//!
//! Wake locks are best-effort: failing to acquire one is logged by the
//! controller and never ends a session.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing::info;

/// Host sleep prevention
pub trait WakeLock: Send + Sync {
    /// Acquire the lock. No-op if already held.
    fn acquire(&self) -> Result<()>;

    /// Release the lock. No-op if not held.
    fn release(&self);

    /// Whether the lock is currently held. Platforms may revoke it.
    fn is_held(&self) -> bool;

    /// Drop whatever is held and ask the platform again. Used after the
    /// platform revoked the lock behind our back, when `is_held` may
    /// still report true.
    fn reacquire(&self) -> Result<()> {
        self.release();
        self.acquire()
    }
}

/// Wake lock backed by the OS power management API
pub struct KeepAwakeLock {
    reason: String,
    guard: Mutex<Option<keepawake::KeepAwake>>,
}

impl KeepAwakeLock {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            guard: Mutex::new(None),
        }
    }
}

impl WakeLock for KeepAwakeLock {
    fn acquire(&self) -> Result<()> {
        let mut guard = self.guard.lock().map_err(|e| anyhow!(e.to_string()))?;
        if guard.is_none() {
            let ka = keepawake::Builder::default()
                .display(true)
                .idle(true)
                .sleep(true)
                .reason(self.reason.as_str())
                .app_name("Loqa Tutor")
                .app_reverse_domain("ai.loqa.tutor")
                .create()
                .map_err(|e| anyhow!("Failed to block sleep: {e}"))?;
            *guard = Some(ka);
            info!("Wake lock acquired");
        }
        Ok(())
    }

    fn release(&self) {
        let mut guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        if guard.take().is_some() {
            info!("Wake lock released");
        }
    }

    fn is_held(&self) -> bool {
        self.guard
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

/// Wake lock for hosts without power management support
#[derive(Debug, Default)]
pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    fn release(&self) {}

    fn is_held(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepawake_lock_starts_released() {
        let lock = KeepAwakeLock::new("test");
        assert!(!lock.is_held());
        lock.release();
        assert!(!lock.is_held());
    }

    struct CountingLock {
        held: Mutex<bool>,
        requests: Mutex<usize>,
    }

    impl WakeLock for CountingLock {
        fn acquire(&self) -> Result<()> {
            let mut held = self.held.lock().unwrap();
            if !*held {
                *held = true;
                *self.requests.lock().unwrap() += 1;
            }
            Ok(())
        }

        fn release(&self) {
            *self.held.lock().unwrap() = false;
        }

        fn is_held(&self) -> bool {
            *self.held.lock().unwrap()
        }
    }

    #[test]
    fn reacquire_asks_the_platform_again() {
        let lock = CountingLock {
            held: Mutex::new(false),
            requests: Mutex::new(0),
        };
        lock.acquire().unwrap();
        lock.acquire().unwrap();
        assert_eq!(*lock.requests.lock().unwrap(), 1);

        lock.reacquire().unwrap();
        assert!(lock.is_held());
        assert_eq!(*lock.requests.lock().unwrap(), 2);
    }

    #[test]
    fn noop_lock_reports_held() {
        let lock = NoopWakeLock;
        assert!(lock.acquire().is_ok());
        assert!(lock.is_held());
    }
}
