//! Sending side: broadcast a string through `OutputDebugStringA`
//!
//! The observer never sends. This is for applications that also want to
//! write to the channel, and for exercising an observer by hand.

use std::ffi::CString;
use std::sync::OnceLock;
use thiserror::Error;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::core::{PCSTR, s, w};

/// Error type for [`output_debug_string`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmitError {
    /// kernel32 does not export `OutputDebugStringA`
    #[error("OutputDebugStringA is not available on this system")]
    Unavailable,

    /// The text contains a NUL byte, which would end it early
    #[error("text contains an interior NUL byte")]
    InteriorNul,
}

type OutputDebugStringAFn = unsafe extern "system" fn(PCSTR);

/// Looked up once; `None` means the export is missing
static OUTPUT_DEBUG_STRING: OnceLock<Option<OutputDebugStringAFn>> = OnceLock::new();

fn resolve() -> Option<OutputDebugStringAFn> {
    unsafe {
        let kernel32 = GetModuleHandleW(w!("kernel32.dll")).ok()?;
        let proc = GetProcAddress(kernel32, s!("OutputDebugStringA"))?;
        let emit: OutputDebugStringAFn = std::mem::transmute(proc);
        Some(emit)
    }
}

/// Whether the platform's debug-output call exists
pub fn is_available() -> bool {
    OUTPUT_DEBUG_STRING.get_or_init(resolve).is_some()
}

/// Broadcast `text` to whichever observer is attached, if any
///
/// Bytes are passed through unchanged, so an observer should decode them as
/// UTF-8 to read back non-ASCII text written from Rust. The call returns once
/// the text is delivered, or after the platform gives up waiting for a busy
/// slot, in which case the text is silently dropped.
pub fn output_debug_string(text: impl AsRef<[u8]>) -> Result<(), EmitError> {
    let emit = OUTPUT_DEBUG_STRING
        .get_or_init(resolve)
        .ok_or(EmitError::Unavailable)?;
    let text = CString::new(text.as_ref()).map_err(|_| EmitError::InteriorNul)?;

    unsafe { emit(PCSTR(text.as_ptr() as *const u8)) };
    Ok(())
}
