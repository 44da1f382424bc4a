//! Consumer side of the Windows debug-output channel (DBWIN)
//!
//! Any process may broadcast a string with `OutputDebugString`. The string
//! travels through a single-slot mailbox in shared memory guarded by two named
//! auto-reset events. At most one observer can be attached per scope.
//!
//! # Architecture
//!
//! - [`Scope`] / [`ChannelNames`] - naming of the three kernel objects
//! - [`wire`] - layout of the 4096-byte shared buffer
//! - [`Message`] / [`decode`] - turning one delivery into `(pid, text)`
//! - `Observer` (Windows only) - attaches to a scope and takes messages,
//!   blocking, with a timeout, cancellable, or as a future
//!
//! # Handshake
//!
//! ```text
//!  sender                              observer
//!  ──────                              ────────
//!  wait DBWIN_BUFFER_READY  ◄────────  set DBWIN_BUFFER_READY
//!  write pid + text to DBWIN_BUFFER
//!  set DBWIN_DATA_READY     ────────►  wait DBWIN_DATA_READY
//!                                      copy + decode buffer
//! ```
//!
//! The protocol has room for exactly one message in flight. A sender that
//! writes faster than the observer drains blocks inside `OutputDebugString`
//! for a short, platform-defined time and then drops the message. That loss is
//! a property of the platform's sender, not of this crate.

#![deny(missing_docs)]

pub mod error;
pub mod message;
pub mod scope;
pub mod wire;

#[cfg(windows)]
mod cancel;
#[cfg(windows)]
mod channel;
#[cfg(windows)]
pub mod emit;
#[cfg(windows)]
mod handle;
#[cfg(windows)]
mod observer;
#[cfg(windows)]
mod pending;
#[cfg(all(test, windows))]
mod testing;

pub use error::{DecodeError, Error, Result};
pub use message::{Message, TextEncoding, decode};
pub use scope::{ChannelNames, Scope};

#[cfg(windows)]
pub use cancel::CancelSignal;
#[cfg(windows)]
pub use channel::AcquireError;
#[cfg(windows)]
pub use observer::{Observer, ObserverConfig};

/// Size of the shared buffer in bytes
pub const BUFFER_SIZE: usize = 4096;

/// Base name of the shared buffer (file mapping)
pub const BUFFER_NAME: &str = "DBWIN_BUFFER";

/// Base name of the "ready-for-data" event (observer -> senders)
pub const BUFFER_READY_NAME: &str = "DBWIN_BUFFER_READY";

/// Base name of the "data-ready" event (sender -> observer)
pub const DATA_READY_NAME: &str = "DBWIN_DATA_READY";
