//! Decoded debug-output messages

use crate::error::DecodeError;
use crate::wire;
use std::fmt;

/// One string taken from the channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    /// Process id the sender wrote in front of the text
    pub pid: i32,
    /// Text payload, without terminator
    pub text: String,
}

impl Message {
    /// Create a message
    pub fn new(pid: i32, text: impl Into<String>) -> Self {
        Self {
            pid,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.pid, self.text)
    }
}

/// Character set of the text bytes
///
/// `OutputDebugStringA` writes bytes in the sender's ANSI code page, which is
/// a per-machine setting. The default follows the local system. Pick an
/// explicit code page when observing senders configured differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// System ANSI code page (`CP_ACP`)
    #[default]
    Ansi,
    /// Explicit Windows code page identifier
    CodePage(u32),
    /// UTF-8, invalid sequences replaced
    Utf8,
}

impl TextEncoding {
    /// Convert text bytes to a string
    ///
    /// Off Windows there is no code page table, so `Ansi` and `CodePage`
    /// decode as lossy UTF-8.
    pub fn decode(self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            #[cfg(windows)]
            TextEncoding::Ansi => code_page::decode(windows::Win32::Globalization::CP_ACP, bytes),
            #[cfg(windows)]
            TextEncoding::CodePage(cp) => code_page::decode(cp, bytes),
            #[cfg(not(windows))]
            TextEncoding::Ansi | TextEncoding::CodePage(_) => {
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

#[cfg(windows)]
mod code_page {
    use windows::Win32::Globalization::{MULTI_BYTE_TO_WIDE_CHAR_FLAGS, MultiByteToWideChar};

    /// Multi-byte to UTF-16 through the system tables
    pub fn decode(code_page: u32, bytes: &[u8]) -> String {
        let flags = MULTI_BYTE_TO_WIDE_CHAR_FLAGS(0);
        // Inputs are bounded by the buffer size, so the i32 lengths cannot overflow
        let len = unsafe { MultiByteToWideChar(code_page, flags, bytes, None) };
        if len <= 0 {
            return String::from_utf8_lossy(bytes).into_owned();
        }

        let mut wide = vec![0u16; len as usize];
        let written = unsafe { MultiByteToWideChar(code_page, flags, bytes, Some(&mut wide)) };
        if written <= 0 {
            return String::from_utf8_lossy(bytes).into_owned();
        }

        String::from_utf16_lossy(&wide[..written as usize])
    }
}

/// Decode one delivery of `bytes.len()` bytes
///
/// The first four bytes are the sender pid. The text runs to the first NUL
/// after them or, when there is none, to the end of `bytes`. Nothing past
/// `bytes` is read, so callers pass only what was actually delivered.
pub fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<Message, DecodeError> {
    let pid = wire::read_pid(bytes).ok_or(DecodeError::TooShort { len: bytes.len() })?;
    let text = encoding.decode(wire::text_bytes(bytes));
    Ok(Message { pid, text })
}
