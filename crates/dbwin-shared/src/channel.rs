//! Exclusive acquisition of a scope's buffer and handshake events

use crate::handle::{Created, Event, SharedBuffer};
use crate::scope::ChannelNames;
use thiserror::Error;

/// Why an observer could not attach to its scope
#[derive(Debug, Error)]
pub enum AcquireError {
    /// A handshake event already exists, so another observer owns the scope
    #[error("{name} already exists; another observer is attached")]
    AlreadyObserved {
        /// Name of the event that already existed
        name: String,
    },

    /// Creating or mapping a channel object failed
    #[error("failed to create {object}: {source}")]
    Create {
        /// Name of the object being created
        object: String,
        /// Underlying Win32 error
        #[source]
        source: windows::core::Error,
    },
}

/// The three objects of an attached channel
///
/// Partially acquired objects are owned by locals during [`Channel::acquire`],
/// so an early return releases each of them exactly once.
pub(crate) struct Channel {
    pub(crate) buffer: SharedBuffer,
    pub(crate) buffer_ready: Event,
    pub(crate) data_ready: Event,
}

impl Channel {
    /// Create the buffer, then "data-ready", then "ready-for-data"
    pub(crate) fn acquire(names: &ChannelNames) -> Result<Self, AcquireError> {
        let buffer = SharedBuffer::create_named(&names.buffer).map_err(|source| {
            AcquireError::Create {
                object: names.buffer.clone(),
                source,
            }
        })?;

        let data_ready = create_exclusive(&names.data_ready, false)?;

        // Signaled, so the first sender does not wait for us to look
        let buffer_ready = create_exclusive(&names.buffer_ready, true)?;

        Ok(Self {
            buffer,
            buffer_ready,
            data_ready,
        })
    }

    /// Hand the slot back to senders when dropped
    pub(crate) fn release_slot(&self) -> SlotRelease<'_> {
        SlotRelease(&self.buffer_ready)
    }
}

fn create_exclusive(name: &str, signaled: bool) -> Result<Event, AcquireError> {
    match Event::create_named(name, signaled) {
        Ok(Created::New(event)) => Ok(event),
        Ok(Created::Existing) => Err(AcquireError::AlreadyObserved {
            name: name.to_string(),
        }),
        Err(source) => Err(AcquireError::Create {
            object: name.to_string(),
            source,
        }),
    }
}

/// Signals "ready-for-data" on drop, on every exit path of a read
pub(crate) struct SlotRelease<'a>(&'a Event);

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.set() {
            tracing::warn!(error = %e, "failed to release debug-output slot");
        }
    }
}
