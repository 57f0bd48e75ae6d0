//! Cooperative shutdown for the publish run loop.
//!
//! SIGINT and SIGTERM set a shared flag. The run loop only ever blocks in
//! [`Shutdown::wait`], which polls that flag, so a signal takes effect at
//! the next inter-cycle sleep and never interrupts a git operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing::debug;

use crate::error::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Shutdown request flag, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag on SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    pub fn register_signals(&self) -> Result<()> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.requested))?;
        }
        debug!("Registered shutdown signal handlers");
        Ok(())
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` if shutdown was requested.
    #[must_use]
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_times_out() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_request_interrupts_wait() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.request();
        });

        let started = Instant::now();
        assert!(shutdown.wait(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
