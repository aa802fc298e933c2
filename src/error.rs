use std::fmt;
use thiserror::Error;

/// Closed set of failure states a [`Session`](crate::Session) can be in.
///
/// Every session keeps the current kind and the one before it; nothing older
/// is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    #[default]
    None,
    TransportNull,
    ReplyIsNull,
    FloatOutOfRange,
    DoubleOutOfRange,
    TransportIo,
    TransportEof,
    TransportProtocol,
    TransportOom,
    TransportOther,
    TransportUnknown,
    CommandUnsupported,
    UnexpectedInfoResult,
    ReplyError,
    TooLongCommand,
}

impl ErrorKind {
    pub fn is_none(self) -> bool {
        self == ErrorKind::None
    }

    /// True for the kinds produced by classifying a transport fault.
    pub fn is_transport(self) -> bool {
        matches!(
            self,
            ErrorKind::TransportIo
                | ErrorKind::TransportEof
                | ErrorKind::TransportProtocol
                | ErrorKind::TransportOom
                | ErrorKind::TransportOther
                | ErrorKind::TransportUnknown
        )
    }

    /// Human-readable description.
    ///
    /// `transport` is the transport's own message (may be empty) and `reply`
    /// is the server's error text when the last reply was an error reply.
    pub fn describe(self, transport: &str, reply: Option<&str>) -> String {
        let transport_suffix = if transport.is_empty() {
            String::new()
        } else {
            format!(". Transport error: {}", transport)
        };
        match self {
            ErrorKind::None => String::new(),
            ErrorKind::TransportNull => "transport handle is absent".to_string(),
            ErrorKind::ReplyIsNull => format!("reply is absent{}", transport_suffix),
            ErrorKind::FloatOutOfRange => {
                format!("number can not be represented by f32{}", transport_suffix)
            }
            ErrorKind::DoubleOutOfRange => {
                format!("number can not be represented by f64{}", transport_suffix)
            }
            ErrorKind::TransportIo => format!("transport io error: {}", transport),
            ErrorKind::TransportEof => format!("transport EOF error: {}", transport),
            ErrorKind::TransportProtocol => format!("transport protocol error: {}", transport),
            ErrorKind::TransportOom => format!("transport OOM error: {}", transport),
            ErrorKind::TransportOther => format!("transport error: {}", transport),
            ErrorKind::TransportUnknown => format!("unknown transport error: {}", transport),
            ErrorKind::CommandUnsupported => format!(
                "command is unsupported by this server version{}",
                transport_suffix
            ),
            ErrorKind::UnexpectedInfoResult => {
                format!("INFO returned an unexpected result{}", transport_suffix)
            }
            ErrorKind::ReplyError => format!(
                "reply returned error: {}",
                reply.unwrap_or("no error text in reply")
            ),
            ErrorKind::TooLongCommand => {
                format!("command has too many arguments{}", transport_suffix)
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Raised by a session configured with `raise_on_error`.
    #[error("{message}")]
    Raised { kind: ErrorKind, message: String },

    /// A typed operation failed on a session with `raise_on_error` off.
    /// The full description is available from `Session::error()`.
    #[error("command failed: {0}")]
    Failed(ErrorKind),

    #[error("Unexpected reply to '{command}': {reply}")]
    UnexpectedReply {
        command: &'static str,
        reply: String,
    },

    #[error("Tried to add a shard after keys were already routed")]
    ShardsLocked,

    #[error("Sharded session has no shards")]
    NoShards,

    #[error("No endpoints to route to")]
    NoEndpoints,

    #[error("Named pool '{0}' was never created")]
    UnknownPool(String),

    #[error("Named pool '{0}' already exists with different endpoints")]
    PoolMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The session failure kind behind this error, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Raised { kind, .. } | Error::Failed(kind) => Some(*kind),
            _ => None,
        }
    }
}
