//! Layout of the shared buffer
//!
//! ```text
//! ┌──────────────────┐
//! │ pid: i32 (LE)    │  <- sender process id
//! │ text...          │  <- ANSI bytes, up to BUFFER_SIZE - 4
//! │ 0x00 (optional)  │  <- terminator, absent if the text fills the buffer
//! └──────────────────┘
//! ```

use crate::BUFFER_SIZE;

/// Size of the sender process id prefix
pub const PID_SIZE: usize = 4;

/// Longest text a sender can place in the buffer and still terminate it
pub const MAX_TEXT_LEN: usize = BUFFER_SIZE - PID_SIZE - 1;

/// Read the sender pid from the start of a delivery
pub fn read_pid(bytes: &[u8]) -> Option<i32> {
    let pid: [u8; PID_SIZE] = bytes.get(..PID_SIZE)?.try_into().ok()?;
    Some(i32::from_le_bytes(pid))
}

/// Text portion of a delivery: everything after the pid up to the first NUL,
/// or up to the end of `bytes` when no terminator is present
pub fn text_bytes(bytes: &[u8]) -> &[u8] {
    let Some(text) = bytes.get(PID_SIZE..) else {
        return &[];
    };
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    &text[..end]
}

/// Write a delivery the way a sender does, returning the number of bytes used
///
/// Text longer than what fits is truncated. The terminator is always written,
/// so `None` is returned when `out` cannot hold `PID_SIZE + 1` bytes.
pub fn encode(pid: i32, text: &[u8], out: &mut [u8]) -> Option<usize> {
    let room = out.len().checked_sub(PID_SIZE + 1)?.min(MAX_TEXT_LEN);
    let len = text.len().min(room);

    out[..PID_SIZE].copy_from_slice(&pid.to_le_bytes());
    out[PID_SIZE..PID_SIZE + len].copy_from_slice(&text[..len]);
    out[PID_SIZE + len] = 0;
    Some(PID_SIZE + len + 1)
}
