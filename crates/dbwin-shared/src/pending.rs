//! Awaitable take built on thread-pool wait registrations
//!
//! A take registers one-shot waits on "data-ready" and, if given, on the
//! caller's cancel event. Whichever callback fires first moves the take from
//! `PENDING` to `SETTLING` and is then the only one allowed to produce an
//! outcome. Dropping the future competes for the same transition.
//!
//! ```text
//!            data-ready fired ──► decode + release slot ─┐
//! PENDING ──┤ timer expired    ──► no message            ├──► SETTLED
//!            cancel fired     ──► cancelled             │
//!            future dropped   ──► (nothing to report) ──┘
//! ```
//!
//! A data-ready callback that loses the race has already consumed the
//! auto-reset signal, so it sets "data-ready" again and the delivery stays
//! pending for the next take.

use crate::cancel::CancelSignal;
use crate::error::{Error, Result};
use crate::handle::Event;
use crate::message::Message;
use crate::observer::{Attached, wait_millis};
use std::ffi::c_void;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::sync::oneshot;
use windows::Win32::Foundation::{HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::System::Threading::{
    INFINITE, RegisterWaitForSingleObject, UnregisterWaitEx, WT_EXECUTEONLYONCE,
};

const PENDING: u8 = 0;
const SETTLING: u8 = 1;
const SETTLED: u8 = 2;

enum Outcome {
    Delivered(Result<Message>),
    TimedOut,
    Cancelled,
}

/// State the callbacks see through their context pointer
struct Shared {
    state: AtomicU8,
    /// `None` for an unattached observer, which only waits on cancel
    attached: Option<Arc<Attached>>,
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Shared {
    /// Single-winner transition out of `PENDING`
    fn begin_settle(&self) -> bool {
        self.state
            .compare_exchange(PENDING, SETTLING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self, outcome: Option<Outcome>) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let (Some(tx), Some(outcome)) = (tx, outcome) {
            // The receiver is gone only if the future is mid-drop; nothing to report then
            let _ = tx.send(outcome);
        }
        self.state.store(SETTLED, Ordering::Release);
    }
}

type WaitCallback = unsafe extern "system" fn(*mut c_void, bool);

/// Thread-pool wait that is removed, and waited out, on drop
struct RegisteredWait(HANDLE);

// SAFETY: wait handles may be unregistered from any thread
unsafe impl Send for RegisteredWait {}
// SAFETY: the handle is only used by `Drop`
unsafe impl Sync for RegisteredWait {}

impl RegisteredWait {
    fn register(
        object: HANDLE,
        callback: WaitCallback,
        shared: &Arc<Shared>,
        millis: u32,
    ) -> windows::core::Result<Self> {
        let mut wait = HANDLE::default();
        let context = Arc::as_ptr(shared) as *const c_void;
        unsafe {
            RegisterWaitForSingleObject(
                &mut wait,
                object,
                Some(callback),
                Some(context),
                millis,
                WT_EXECUTEONLYONCE,
            )?;
        }
        Ok(Self(wait))
    }
}

impl Drop for RegisteredWait {
    fn drop(&mut self) {
        // INVALID_HANDLE_VALUE: block until a running callback has returned
        unsafe {
            let _ = UnregisterWaitEx(self.0, Some(INVALID_HANDLE_VALUE));
        }
    }
}

/// Future returned by `Observer::take_async`
pub(crate) struct PendingTake {
    // Declared first: registrations must go before anything their callbacks touch
    waits: Vec<RegisteredWait>,
    shared: Arc<Shared>,
    rx: oneshot::Receiver<Outcome>,
    _watched: Option<Event>,
}

impl PendingTake {
    pub(crate) fn register(
        attached: Option<Arc<Attached>>,
        timeout: Option<Duration>,
        cancel: Option<&CancelSignal>,
    ) -> Result<Self> {
        let data_ready = attached
            .as_ref()
            .map(|attached| attached.channel.data_ready.raw());
        // Without data-ready or a cancel signal, a private event that is never
        // set carries the timeout
        let watched = match cancel {
            Some(cancel) => Some(cancel.event().clone()),
            None if data_ready.is_none() => Some(Event::manual()?),
            None => None,
        };

        let (tx, rx) = oneshot::channel();
        let mut take = Self {
            waits: Vec::with_capacity(2),
            shared: Arc::new(Shared {
                state: AtomicU8::new(PENDING),
                attached,
                tx: Mutex::new(Some(tx)),
            }),
            rx,
            _watched: watched.clone(),
        };

        let millis = wait_millis(timeout);

        // Cancel goes first so a failed registration never strands a consumed delivery
        if let Some(watched) = watched {
            // The timeout rides on the data wait when there is one
            let watched_millis = if data_ready.is_some() { INFINITE } else { millis };
            let wait =
                RegisteredWait::register(watched.raw(), on_cancel, &take.shared, watched_millis)?;
            take.waits.push(wait);
        }
        if let Some(data_ready) = data_ready {
            let wait = RegisteredWait::register(data_ready, on_data_ready, &take.shared, millis)?;
            take.waits.push(wait);
        }

        Ok(take)
    }

    #[cfg(test)]
    fn is_settled(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == SETTLED
    }
}

impl Future for PendingTake {
    type Output = Result<Option<Message>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.rx).poll(cx));
        // Settled; the remaining wait (usually cancel) is no longer needed
        self.waits.clear();

        let attached = self.shared.attached.is_some();
        Poll::Ready(match outcome {
            Ok(Outcome::Delivered(result)) => result.map(Some),
            Ok(Outcome::TimedOut) => Ok(None),
            // Unattached observers report no message, even when cut short
            Ok(Outcome::Cancelled) if !attached => Ok(None),
            Ok(Outcome::Cancelled) | Err(_) => Err(Error::Cancelled),
        })
    }
}

impl Drop for PendingTake {
    fn drop(&mut self) {
        if self.shared.begin_settle() {
            self.shared.finish(None);
        }
        self.waits.clear();
    }
}

unsafe extern "system" fn on_data_ready(context: *mut c_void, timed_out: bool) {
    // SAFETY: `PendingTake` unregisters this wait before releasing `Shared`
    let shared = unsafe { &*(context as *const Shared) };
    let Some(attached) = shared.attached.as_ref() else {
        return;
    };

    if !shared.begin_settle() {
        if !timed_out {
            let _ = attached.channel.data_ready.set();
        }
        return;
    }

    let outcome = if timed_out {
        Outcome::TimedOut
    } else {
        Outcome::Delivered(attached.take_delivered())
    };
    shared.finish(Some(outcome));
}

unsafe extern "system" fn on_cancel(context: *mut c_void, timed_out: bool) {
    // SAFETY: see `on_data_ready`
    let shared = unsafe { &*(context as *const Shared) };
    if !shared.begin_settle() {
        return;
    }
    shared.finish(Some(if timed_out {
        Outcome::TimedOut
    } else {
        Outcome::Cancelled
    }));
}
