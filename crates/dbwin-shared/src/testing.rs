//! Sender side of the handshake, for tests only

use crate::handle::SharedBuffer;
use crate::scope::ChannelNames;
use crate::wire;
use crate::BUFFER_SIZE;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{
    GetCurrentProcessId, OpenEventW, SYNCHRONIZATION_ACCESS_RIGHTS, SetEvent, WaitForSingleObject,
};
use windows::core::{HSTRING, Result};

// Not exported from System::Threading
const SYNCHRONIZE: SYNCHRONIZATION_ACCESS_RIGHTS = SYNCHRONIZATION_ACCESS_RIGHTS(0x0010_0000);
const EVENT_MODIFY_STATE: SYNCHRONIZATION_ACCESS_RIGHTS = SYNCHRONIZATION_ACCESS_RIGHTS(0x0002);

/// Generate channel names no other test uses
pub(crate) fn unique_names() -> ChannelNames {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = unsafe { GetCurrentProcessId() };
    ChannelNames::with_prefix(&format!("Local\\dbwin_test_{pid}_{n}_"))
}

/// Plays the role of `OutputDebugString` against a named channel
pub(crate) struct TestSender {
    buffer: SharedBuffer,
    buffer_ready: HANDLE,
    data_ready: HANDLE,
}

// SAFETY: event handles are process-wide; the sender is moved into one thread at a time
unsafe impl Send for TestSender {}

impl TestSender {
    /// Open the objects an observer created
    pub(crate) fn open(names: &ChannelNames) -> Result<Self> {
        let buffer = SharedBuffer::create_named(&names.buffer)?;
        let buffer_ready =
            unsafe { OpenEventW(SYNCHRONIZE, false, &HSTRING::from(names.buffer_ready.as_str()))? };
        let data_ready = match unsafe {
            OpenEventW(EVENT_MODIFY_STATE, false, &HSTRING::from(names.data_ready.as_str()))
        } {
            Ok(h) => h,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(buffer_ready);
                }
                return Err(e);
            }
        };

        Ok(Self {
            buffer,
            buffer_ready,
            data_ready,
        })
    }

    /// Wait for the slot, write a delivery and signal it; false if the slot stayed busy
    pub(crate) fn send(&self, pid: i32, text: &str, timeout: Duration) -> bool {
        let mut bytes = vec![0u8; BUFFER_SIZE];
        let Some(used) = wire::encode(pid, text.as_bytes(), &mut bytes) else {
            return false;
        };
        self.send_raw(&bytes[..used], timeout)
    }

    pub(crate) fn send_raw(&self, bytes: &[u8], timeout: Duration) -> bool {
        let ready = unsafe { WaitForSingleObject(self.buffer_ready, timeout.as_millis() as u32) };
        if ready != WAIT_OBJECT_0 {
            return false;
        }
        self.buffer.write(bytes);
        unsafe { SetEvent(self.data_ready).is_ok() }
    }
}

impl Drop for TestSender {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.buffer_ready);
            let _ = CloseHandle(self.data_ready);
        }
    }
}
