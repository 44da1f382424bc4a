//! Channel scopes and the kernel object names derived from them

use crate::{BUFFER_NAME, BUFFER_READY_NAME, DATA_READY_NAME};
use std::fmt;

/// Namespace the channel objects are created in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Visible to processes in the current logon session (`Local\`)
    #[default]
    Session,
    /// Visible to every session on the machine, including services (`Global\`)
    Global,
}

impl Scope {
    /// Object namespace prefix for this scope
    pub fn prefix(self) -> &'static str {
        match self {
            Scope::Session => "Local\\",
            Scope::Global => "Global\\",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Session => f.write_str("session"),
            Scope::Global => f.write_str("global"),
        }
    }
}

/// Fully prefixed names of the buffer and the two handshake events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    /// Shared buffer (file mapping) name
    pub buffer: String,
    /// "ready-for-data" event name
    pub buffer_ready: String,
    /// "data-ready" event name
    pub data_ready: String,
}

impl ChannelNames {
    /// Names used by `OutputDebugString` for the given scope
    pub fn for_scope(scope: Scope) -> Self {
        Self::with_prefix(scope.prefix())
    }

    /// Names under an arbitrary prefix, so tests can run isolated channels
    pub(crate) fn with_prefix(prefix: &str) -> Self {
        Self {
            buffer: format!("{prefix}{BUFFER_NAME}"),
            buffer_ready: format!("{prefix}{BUFFER_READY_NAME}"),
            data_ready: format!("{prefix}{DATA_READY_NAME}"),
        }
    }
}
