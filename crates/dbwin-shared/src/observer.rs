//! The single consumer of a scope's debug output

use crate::cancel::CancelSignal;
use crate::channel::{AcquireError, Channel};
use crate::error::{Error, Result};
use crate::message::{Message, TextEncoding, decode};
use crate::pending::PendingTake;
use crate::scope::{ChannelNames, Scope};
use crate::BUFFER_SIZE;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use windows::Win32::Foundation::{WAIT_EVENT, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Threading::{INFINITE, WaitForMultipleObjects, WaitForSingleObject};

/// Settings for [`Observer::with_config`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverConfig {
    /// Namespace to attach to
    pub scope: Scope,
    /// Character set senders write in
    pub encoding: TextEncoding,
}

/// Channel plus the scratch space messages are decoded from
pub(crate) struct Attached {
    pub(crate) channel: Channel,
    scratch: Mutex<Vec<u8>>,
    encoding: TextEncoding,
}

impl Attached {
    /// Read the delivery "data-ready" announced, then hand the slot back
    ///
    /// Only call after a wait on "data-ready" succeeded. The slot is released
    /// even when decoding fails, before the error reaches the caller.
    pub(crate) fn take_delivered(&self) -> Result<Message> {
        let _slot = self.channel.release_slot();
        let mut scratch = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        let len = self.channel.buffer.copy_to(&mut scratch);

        match decode(&scratch[..len], self.encoding) {
            Ok(message) => {
                tracing::trace!(pid = message.pid, len = message.text.len(), "debug output");
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed debug-output delivery");
                Err(e.into())
            }
        }
    }
}

enum State {
    Attached(Arc<Attached>),
    Unattached(AcquireError),
    Disposed,
}

/// Consumer of one scope's debug output
///
/// Acquisition never fails outright. When another observer already owns the
/// scope, or the objects cannot be created, the observer is *unattached*: every
/// take just waits out its timeout and reports no message.
///
/// Takes borrow the observer mutably, so two takes can never run against the
/// same scratch buffer at once.
pub struct Observer {
    scope: Scope,
    state: State,
}

impl Observer {
    /// Attach to `scope`, decoding text in the system ANSI code page
    pub fn acquire(scope: Scope) -> Self {
        Self::with_config(ObserverConfig {
            scope,
            ..Default::default()
        })
    }

    /// Attach with explicit settings
    pub fn with_config(config: ObserverConfig) -> Self {
        Self::acquire_names(
            config.scope,
            &ChannelNames::for_scope(config.scope),
            config.encoding,
        )
    }

    pub(crate) fn acquire_names(scope: Scope, names: &ChannelNames, encoding: TextEncoding) -> Self {
        let state = match Channel::acquire(names) {
            Ok(channel) => {
                tracing::debug!(%scope, buffer = %names.buffer, "attached to debug output");
                State::Attached(Arc::new(Attached {
                    channel,
                    scratch: Mutex::new(vec![0u8; BUFFER_SIZE]),
                    encoding,
                }))
            }
            Err(e) => {
                tracing::warn!(%scope, error = %e, "debug output observer is unattached");
                State::Unattached(e)
            }
        };

        Self { scope, state }
    }

    /// Whether this observer owns its scope's channel
    pub fn is_attached(&self) -> bool {
        matches!(self.state, State::Attached(_))
    }

    /// Whether [`dispose`](Self::dispose) has been called
    pub fn is_disposed(&self) -> bool {
        matches!(self.state, State::Disposed)
    }

    /// Scope this observer was created for
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Why acquisition failed, for an unattached observer
    pub fn detach_reason(&self) -> Option<&AcquireError> {
        match &self.state {
            State::Unattached(e) => Some(e),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn attached(&self) -> Option<Arc<Attached>> {
        match &self.state {
            State::Attached(attached) => Some(Arc::clone(attached)),
            _ => None,
        }
    }

    /// Release the channel so another observer can attach
    ///
    /// Later takes fail with [`Error::Disposed`]. Calling this twice is a no-op.
    pub fn dispose(&mut self) {
        if let State::Attached(_) = std::mem::replace(&mut self.state, State::Disposed) {
            tracing::debug!(scope = %self.scope, "released debug output");
        }
    }

    /// Take a message if one is already waiting
    pub fn poll(&mut self) -> Result<Option<Message>> {
        self.try_take(Some(Duration::ZERO), None)
    }

    /// Block until a message arrives
    ///
    /// An unattached observer blocks forever; use [`try_take`](Self::try_take)
    /// with a cancel signal to stay interruptible.
    pub fn take(&mut self) -> Result<Option<Message>> {
        self.try_take(None, None)
    }

    /// Wait up to `timeout` for a message
    pub fn take_timeout(&mut self, timeout: Duration) -> Result<Option<Message>> {
        self.try_take(Some(timeout), None)
    }

    /// Wait for a message
    ///
    /// `timeout` of `None` waits forever. Returns `Ok(None)` when the wait
    /// times out and [`Error::Cancelled`] when `cancel` fires first. Once a
    /// delivery has been seen it is always read and released, even if `cancel`
    /// fires meanwhile.
    pub fn try_take(
        &mut self,
        timeout: Option<Duration>,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<Message>> {
        let attached = match &self.state {
            State::Disposed => return Err(Error::Disposed),
            State::Unattached(_) => {
                idle_wait(timeout, cancel);
                return Ok(None);
            }
            State::Attached(attached) => attached,
        };

        let data_ready = attached.channel.data_ready.raw();
        let millis = wait_millis(timeout);
        let outcome = match cancel {
            Some(cancel) => unsafe {
                WaitForMultipleObjects(&[data_ready, cancel.event().raw()], false, millis)
            },
            None => unsafe { WaitForSingleObject(data_ready, millis) },
        };

        if outcome == WAIT_OBJECT_0 {
            attached.take_delivered().map(Some)
        } else if outcome == WAIT_EVENT(WAIT_OBJECT_0.0 + 1) {
            Err(Error::Cancelled)
        } else if outcome == WAIT_TIMEOUT {
            Ok(None)
        } else {
            Err(Error::Os(windows::core::Error::from_win32()))
        }
    }

    /// Awaitable [`try_take`](Self::try_take)
    ///
    /// No thread is blocked while waiting: the wait is registered with the
    /// system thread pool, and the delivery is decoded and released on the
    /// pool thread that observes it. Works on any executor.
    ///
    /// Dropping the future cancels the take. This is not cancel-safe: if the
    /// delivery was already read when the future is dropped, that message is
    /// discarded (its slot is still released). Don't race this inside
    /// `select!` or a timeout wrapper when every message matters; pass
    /// `timeout` and `cancel` instead.
    pub async fn take_async(
        &mut self,
        timeout: Option<Duration>,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<Message>> {
        let attached = match &self.state {
            State::Disposed => return Err(Error::Disposed),
            State::Unattached(_) => None,
            State::Attached(attached) => Some(Arc::clone(attached)),
        };

        PendingTake::register(attached, timeout, cancel)?.await
    }
}

/// Wait timeout in the form the Win32 wait functions take
pub(crate) fn wait_millis(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => INFINITE,
        // Rounded up, so a nonzero timeout never becomes a poll
        Some(timeout) => timeout
            .as_nanos()
            .div_ceil(1_000_000)
            .min(u128::from(INFINITE - 1)) as u32,
    }
}

/// Stand-in for the data wait of an unattached observer
fn idle_wait(timeout: Option<Duration>, cancel: Option<&CancelSignal>) {
    match (cancel, timeout) {
        (Some(cancel), timeout) => unsafe {
            WaitForSingleObject(cancel.event().raw(), wait_millis(timeout));
        },
        (None, Some(timeout)) => std::thread::sleep(timeout),
        (None, None) => loop {
            std::thread::park();
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestSender, unique_names};
    use std::time::Instant;

    fn observer(names: &ChannelNames) -> Observer {
        Observer::acquire_names(Scope::Session, names, TextEncoding::Utf8)
    }

    #[test]
    fn test_first_observer_attaches() {
        let names = unique_names();
        let obs = observer(&names);
        assert!(obs.is_attached());
        assert!(!obs.is_disposed());
        assert!(obs.detach_reason().is_none());
        assert_eq!(obs.scope(), Scope::Session);
    }

    #[test]
    fn test_second_observer_is_unattached() {
        let names = unique_names();
        let first = observer(&names);
        let second = observer(&names);

        assert!(first.is_attached());
        assert!(!second.is_attached());
        assert!(matches!(
            second.detach_reason(),
            Some(AcquireError::AlreadyObserved { .. })
        ));
    }

    #[test]
    fn test_scope_is_free_again_after_dispose() {
        let names = unique_names();
        let mut first = observer(&names);
        let blocked = observer(&names);
        assert!(!blocked.is_attached());
        drop(blocked);

        first.dispose();
        assert!(first.is_disposed());
        assert!(observer(&names).is_attached());
    }

    #[test]
    fn test_racing_acquisitions_attach_once() {
        let names = unique_names();
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let names = names.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let obs = observer(&names);
                    let attached = obs.is_attached();
                    // Keep every observer alive until all threads have tried
                    barrier.wait();
                    attached
                })
            })
            .collect();

        let attached = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&a| a)
            .count();
        assert_eq!(attached, 1);

        // Losers left nothing behind, and the winner has been dropped
        assert!(observer(&names).is_attached());
    }

    #[test]
    fn test_poll_without_message_returns_immediately() {
        let names = unique_names();
        let mut obs = observer(&names);

        let start = Instant::now();
        assert!(obs.poll().unwrap().is_none());
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn test_take_timeout_expires() {
        let names = unique_names();
        let mut obs = observer(&names);

        let start = Instant::now();
        assert!(obs.take_timeout(Duration::from_millis(30)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_blocking_take_receives_delayed_message() {
        let names = unique_names();
        let mut obs = observer(&names);
        let sender = TestSender::open(&names).unwrap();

        let start = Instant::now();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            assert!(sender.send(4321, "hello", Duration::from_secs(5)));
        });

        let msg = obs.take().unwrap().expect("expected a message");
        assert_eq!(msg, Message::new(4321, "hello"));
        assert!(start.elapsed() >= Duration::from_millis(50));
        writer.join().unwrap();
    }

    #[test]
    fn test_cancel_before_data_is_not_a_timeout() {
        let names = unique_names();
        let mut obs = observer(&names);
        let cancel = CancelSignal::new().unwrap();

        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let result = obs.try_take(None, Some(&cancel));
        assert!(matches!(result, Err(Error::Cancelled)));
        canceller.join().unwrap();

        // The slot is still usable after the cancelled take
        cancel.reset();
        let sender = TestSender::open(&names).unwrap();
        assert!(sender.send(7, "after cancel", Duration::from_secs(1)));
        let msg = obs.try_take(Some(Duration::from_secs(1)), Some(&cancel)).unwrap();
        assert_eq!(msg, Some(Message::new(7, "after cancel")));
    }

    #[test]
    fn test_pending_message_wins_over_cancel() {
        let names = unique_names();
        let mut obs = observer(&names);
        let sender = TestSender::open(&names).unwrap();
        assert!(sender.send(8, "already here", Duration::from_secs(1)));

        let cancel = CancelSignal::new().unwrap();
        cancel.cancel();
        let msg = obs.try_take(Some(Duration::ZERO), Some(&cancel)).unwrap();
        assert_eq!(msg, Some(Message::new(8, "already here")));
    }

    #[test]
    fn test_each_take_releases_the_slot_once() {
        let names = unique_names();
        let mut obs = observer(&names);
        let sender = TestSender::open(&names).unwrap();

        assert!(sender.send(1, "one", Duration::from_secs(1)));
        // The slot is busy until the observer reads
        assert!(!sender.send(1, "blocked", Duration::from_millis(20)));
        assert_eq!(obs.poll().unwrap(), Some(Message::new(1, "one")));

        assert!(sender.send(2, "two", Duration::from_secs(1)));
        assert_eq!(obs.poll().unwrap(), Some(Message::new(2, "two")));

        // No message left, and no spurious extra release
        assert_eq!(obs.poll().unwrap(), None);
        assert!(sender.send(3, "three", Duration::from_secs(1)));
        assert!(!sender.send(3, "blocked", Duration::from_millis(20)));
    }

    #[test]
    fn test_unterminated_full_buffer() {
        let names = unique_names();
        let mut obs = observer(&names);
        let sender = TestSender::open(&names).unwrap();

        let mut bytes = 99i32.to_le_bytes().to_vec();
        bytes.resize(BUFFER_SIZE, b'x');
        assert!(sender.send_raw(&bytes, Duration::from_secs(1)));

        let msg = obs.poll().unwrap().expect("expected a message");
        assert_eq!(msg.pid, 99);
        assert_eq!(msg.text.len(), BUFFER_SIZE - 4);
    }

    #[test]
    fn test_unattached_take_waits_out_timeout() {
        let names = unique_names();
        let _owner = observer(&names);
        let mut obs = observer(&names);

        let start = Instant::now();
        assert!(obs.take_timeout(Duration::from_millis(30)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_unattached_take_stops_on_cancel() {
        let names = unique_names();
        let _owner = observer(&names);
        let mut obs = observer(&names);
        let cancel = CancelSignal::new().unwrap();
        cancel.cancel();

        let start = Instant::now();
        assert!(obs.try_take(None, Some(&cancel)).unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_disposed_observer_fails_fast() {
        let names = unique_names();
        let mut obs = observer(&names);
        obs.dispose();
        obs.dispose();

        let start = Instant::now();
        assert!(matches!(obs.take(), Err(Error::Disposed)));
        assert!(matches!(obs.poll(), Err(Error::Disposed)));
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn test_disposed_unattached_observer_fails_fast() {
        let names = unique_names();
        let _owner = observer(&names);
        let mut obs = observer(&names);
        obs.dispose();
        assert!(matches!(obs.take(), Err(Error::Disposed)));
        assert!(obs.detach_reason().is_none());
    }

    #[test]
    fn test_wait_millis() {
        assert_eq!(wait_millis(None), INFINITE);
        assert_eq!(wait_millis(Some(Duration::ZERO)), 0);
        assert_eq!(wait_millis(Some(Duration::from_millis(1500))), 1500);
        assert_eq!(wait_millis(Some(Duration::MAX)), INFINITE - 1);
    }

    #[test]
    fn test_wait_millis_rounds_up() {
        assert_eq!(wait_millis(Some(Duration::from_nanos(1))), 1);
        assert_eq!(wait_millis(Some(Duration::from_micros(999))), 1);
        assert_eq!(wait_millis(Some(Duration::from_micros(1001))), 2);
        assert_eq!(wait_millis(Some(Duration::from_millis(5))), 5);
    }
}
