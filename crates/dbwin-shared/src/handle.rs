//! Owned wrappers over the kernel objects the channel is built from
//!
//! Every wrapper closes its handle exactly once, on drop. Events are shared
//! through an `Arc`, so the handle stays open until the last clone (including
//! clones held by in-flight asynchronous waits) is gone.

use crate::BUFFER_SIZE;
use std::sync::Arc;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, INVALID_HANDLE_VALUE, WAIT_OBJECT_0,
};
use windows::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_READ, FILE_MAP_WRITE, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    PAGE_READWRITE, UnmapViewOfFile,
};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent, SetEvent, WaitForSingleObject};
use windows::core::{Error, HSTRING, PCWSTR, Result};

/// Handle that is closed on drop
#[derive(Debug)]
pub(crate) struct OwnedHandle(HANDLE);

// SAFETY: kernel object handles are process-wide and may be used from any thread
unsafe impl Send for OwnedHandle {}
// SAFETY: the handle value is never mutated after construction
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle {
    pub(crate) fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Outcome of creating a named object
pub(crate) enum Created<T> {
    /// This call created the object
    New(T),
    /// The name was already taken; our reference has been closed again
    Existing,
}

/// Auto-reset or manual-reset Win32 event
#[derive(Debug, Clone)]
pub(crate) struct Event(Arc<OwnedHandle>);

impl Event {
    /// Create a named auto-reset event, reporting whether it already existed
    pub(crate) fn create_named(name: &str, signaled: bool) -> Result<Created<Self>> {
        let name = HSTRING::from(name);
        let handle = unsafe { CreateEventW(None, false, signaled, &name)? };
        let already_exists = unsafe { GetLastError() } == ERROR_ALREADY_EXISTS;
        let event = Self(Arc::new(OwnedHandle(handle)));

        if already_exists {
            // Dropping `event` releases our reference without touching the object's state
            return Ok(Created::Existing);
        }
        Ok(Created::New(event))
    }

    /// Create an unnamed manual-reset event, initially unsignaled
    pub(crate) fn manual() -> Result<Self> {
        let handle = unsafe { CreateEventW(None, true, false, PCWSTR::null())? };
        Ok(Self(Arc::new(OwnedHandle(handle))))
    }

    pub(crate) fn set(&self) -> Result<()> {
        unsafe { SetEvent(self.raw()) }
    }

    pub(crate) fn reset(&self) -> Result<()> {
        unsafe { ResetEvent(self.raw()) }
    }

    /// Zero-timeout probe; consumes the signal of an auto-reset event
    pub(crate) fn is_signaled(&self) -> bool {
        unsafe { WaitForSingleObject(self.raw(), 0) == WAIT_OBJECT_0 }
    }

    pub(crate) fn raw(&self) -> HANDLE {
        self.0.raw()
    }
}

/// Pagefile-backed named mapping of `BUFFER_SIZE` bytes, mapped read/write
pub(crate) struct SharedBuffer {
    _mapping: OwnedHandle,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
}

// SAFETY: the view stays mapped for the lifetime of the value and the
// handshake serializes access to its contents across threads and processes
unsafe impl Send for SharedBuffer {}
// SAFETY: see above; `&self` methods only copy bytes in or out
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Create or open the mapping; an existing mapping is shared, not an error
    pub(crate) fn create_named(name: &str) -> Result<Self> {
        let name = HSTRING::from(name);
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                BUFFER_SIZE as u32,
                &name,
            )?
        };
        let mapping = OwnedHandle(mapping);

        let view = unsafe {
            MapViewOfFile(mapping.raw(), FILE_MAP_READ | FILE_MAP_WRITE, 0, 0, BUFFER_SIZE)
        };
        if view.Value.is_null() {
            return Err(Error::from_win32());
        }

        Ok(Self {
            _mapping: mapping,
            view,
        })
    }

    /// Copy the buffer contents into `out`, returning the number of bytes copied
    pub(crate) fn copy_to(&self, out: &mut [u8]) -> usize {
        let len = out.len().min(BUFFER_SIZE);
        unsafe {
            std::ptr::copy_nonoverlapping(self.view.Value as *const u8, out.as_mut_ptr(), len);
        }
        len
    }

    /// Overwrite the start of the buffer with `bytes`
    #[cfg(test)]
    pub(crate) fn write(&self, bytes: &[u8]) {
        let len = bytes.len().min(BUFFER_SIZE);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.view.Value as *mut u8, len);
        }
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(self.view);
        }
    }
}
