//! Cancellation of pending takes

use crate::handle::Event;
use windows::core::Result;

/// Request to stop waiting for the next message
///
/// Clones share one manual-reset event, so a signal can be handed to another
/// thread (a Ctrl-C handler, a shutdown path) and fired from there. Once set it
/// stays set until [`reset`](Self::reset), cancelling every take that observes it.
#[derive(Debug, Clone)]
pub struct CancelSignal(Event);

impl CancelSignal {
    /// Create an unsignaled cancel signal
    pub fn new() -> Result<Self> {
        Ok(Self(Event::manual()?))
    }

    /// Cancel all current and future takes observing this signal
    pub fn cancel(&self) {
        if let Err(e) = self.0.set() {
            tracing::warn!(error = %e, "failed to set cancel signal");
        }
    }

    /// Check whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.0.is_signaled()
    }

    /// Clear the signal so it can be reused
    pub fn reset(&self) {
        if let Err(e) = self.0.reset() {
            tracing::warn!(error = %e, "failed to reset cancel signal");
        }
    }

    pub(crate) fn event(&self) -> &Event {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let signal = CancelSignal::new().unwrap();
        let remote = signal.clone();
        assert!(!signal.is_cancelled());

        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(signal.is_cancelled());
        assert!(signal.is_cancelled());

        signal.reset();
        assert!(!signal.is_cancelled());
    }
}
