//! Close-code classification.
//!
//! Every close code falls in exactly one class. Codes outside the named
//! fatal and non-resumable sets (including the standard 1000/1001/1006) are
//! resumable.

use std::fmt;

/// Normal closure. The server discards the session when the client sends it.
pub const NORMAL_CLOSURE: u16 = 1000;
/// No status code was present in the close frame.
pub const NO_STATUS: u16 = 1005;
/// The socket ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Sent by the client when it abandons a connection it wants to resume.
pub const RECONNECT_CLOSURE: u16 = 4000;

/// Recovery strategy for a close code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseClass {
    /// Never reconnect.
    Fatal,
    /// Reconnect with a fresh identify.
    NonResumable,
    /// Reconnect and resume the session.
    Resumable,
}

impl CloseClass {
    /// Lowercase name for logs and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::NonResumable => "non_resumable",
            Self::Resumable => "resumable",
        }
    }
}

impl fmt::Display for CloseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The named close-code sets of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CloseCodeSets {
    /// Codes after which the session must not reconnect.
    pub fatal: &'static [u16],
    /// Codes after which the session reconnects without resuming.
    pub non_resumable: &'static [u16],
}

impl CloseCodeSets {
    /// Control-plane channel.
    ///
    /// Fatal: authentication failed (4004), invalid shard (4010), sharding
    /// required (4011), invalid API version (4012), invalid intents (4013),
    /// disallowed intents (4014). Non-resumable: invalid sequence (4007),
    /// session timed out (4009).
    pub const CONTROL: Self = Self {
        fatal: &[4004, 4010, 4011, 4012, 4013, 4014],
        non_resumable: &[4007, 4009],
    };

    /// Media-signaling channel.
    ///
    /// Fatal: authentication failed (4004), server not found (4011), unknown
    /// protocol (4012), disconnected (4014), unknown encryption mode (4016).
    /// Non-resumable: session no longer valid (4006), session timeout (4009).
    pub const MEDIA: Self = Self {
        fatal: &[4004, 4011, 4012, 4014, 4016],
        non_resumable: &[4006, 4009],
    };

    /// Classify `code`.
    pub fn classify(&self, code: u16) -> CloseClass {
        if self.fatal.contains(&code) {
            CloseClass::Fatal
        } else if self.non_resumable.contains(&code) {
            CloseClass::NonResumable
        } else {
            CloseClass::Resumable
        }
    }
}
