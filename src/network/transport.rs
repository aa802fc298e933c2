use crate::error::ErrorKind;
use crate::protocol::RespValue;
use std::time::Duration;

/// Error state reported by a transport handle.
///
/// Codes follow the classic C client's numbering so that foreign transports
/// can report them verbatim; anything unrecognised classifies as
/// `ErrorKind::TransportUnknown`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatus {
    pub code: i32,
    pub message: String,
}

impl TransportStatus {
    pub const OK: i32 = 0;
    pub const ERR_IO: i32 = 1;
    pub const ERR_OTHER: i32 = 2;
    pub const ERR_EOF: i32 = 3;
    pub const ERR_PROTOCOL: i32 = 4;
    pub const ERR_OOM: i32 = 5;

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Self::OK
    }

    pub fn classify(&self) -> ErrorKind {
        match self.code {
            Self::OK => ErrorKind::None,
            Self::ERR_IO => ErrorKind::TransportIo,
            Self::ERR_OTHER => ErrorKind::TransportOther,
            Self::ERR_EOF => ErrorKind::TransportEof,
            Self::ERR_PROTOCOL => ErrorKind::TransportProtocol,
            Self::ERR_OOM => ErrorKind::TransportOom,
            _ => ErrorKind::TransportUnknown,
        }
    }
}

/// One live connection to a backend.
///
/// A transport that hits an error stays in that state; callers are expected
/// to discard it and connect again.
pub trait Transport: Send {
    /// Send one command and wait for its reply. `None` means no reply could be
    /// read; `status()` then explains why.
    fn send(&mut self, parts: &[&[u8]]) -> Option<RespValue>;

    /// Apply a per-operation timeout. `None` disables it.
    fn set_timeout(&mut self, timeout: Option<Duration>);

    fn status(&self) -> TransportStatus;
}

/// Factory for transports.
pub trait Connector: Send + Sync {
    /// `None` when no handle could be created at all. A handle whose
    /// connection attempt failed is returned with a non-ok status.
    fn connect(&self, host: &str, port: u16, timeout: Option<Duration>)
        -> Option<Box<dyn Transport>>;
}
