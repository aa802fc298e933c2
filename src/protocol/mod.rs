//! Client side of the Redis serialization protocol

pub mod resp;

pub use resp::{encode_command, write_command, ReplyKind, RespParser, RespValue};
