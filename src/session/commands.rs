//! Typed commands on top of [`Session::call`]
//!
//! Every key argument is prefixed with the endpoint prefix before it is sent,
//! and keys coming back from SCAN have it stripped again. Commands whose
//! syntax depends on the server release branch on [`Session::version`].

use super::Session;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::RespValue;
use bytes::Bytes;
use std::time::Duration;

/// Upper bound on the keys one multi-key command may carry.
pub const MAX_KEYS_PER_COMMAND: usize = 50_000;

/// SCAN COUNT the server applies when none is sent.
pub const DEFAULT_SCAN_COUNT: u64 = 10;

/// First release with `SET key value [EX|PX] [NX|XX]`.
const VERSION_SET_OPTIONS: u32 = 20612;
/// First release accepting several members in one SADD.
const VERSION_VARIADIC_SADD: u32 = 20400;
/// First release accepting `INFO <section>`.
const VERSION_INFO_SECTION: u32 = 20600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    #[default]
    Always,
    IfExists,
    IfNotExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    #[default]
    Never,
    Seconds(u64),
    Millis(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Missing,
    NoExpiry,
    ExpiresIn(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    None,
    String,
    List,
    Set,
    ZSet,
    Hash,
    Stream,
    Other(String),
}

impl KeyType {
    fn parse(name: &str) -> Self {
        match name {
            "none" => KeyType::None,
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::ZSet,
            "hash" => KeyType::Hash,
            "stream" => KeyType::Stream,
            other => KeyType::Other(other.to_string()),
        }
    }
}

fn unexpected(command: &'static str, reply: &RespValue) -> Error {
    Error::UnexpectedReply {
        command,
        reply: format!("{:?}", reply),
    }
}

fn integer(command: &'static str, reply: &RespValue) -> Result<i64> {
    reply.as_integer().ok_or_else(|| unexpected(command, reply))
}

fn optional_bulk(command: &'static str, reply: &RespValue) -> Result<Option<Bytes>> {
    if reply.is_nil() {
        return Ok(None);
    }
    reply
        .as_bytes()
        .cloned()
        .map(Some)
        .ok_or_else(|| unexpected(command, reply))
}

fn bulk_list(command: &'static str, reply: &RespValue) -> Result<Vec<Bytes>> {
    let items = reply.as_array().ok_or_else(|| unexpected(command, reply))?;
    items
        .iter()
        .map(|item| item.as_bytes().cloned().ok_or_else(|| unexpected(command, reply)))
        .collect()
}

fn float(command: &'static str, reply: &RespValue) -> Result<f64> {
    reply
        .as_str()
        .and_then(|text| text.parse::<f64>().ok())
        .ok_or_else(|| unexpected(command, reply))
}

fn format_float(value: f64) -> String {
    value.to_string()
}

impl Session {
    fn prefixed_keys<K, I>(&mut self, keys: I) -> Result<Vec<Vec<u8>>>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        let keys: Vec<Vec<u8>> = keys
            .into_iter()
            .map(|key| self.add_prefix(key.as_ref()).into_owned())
            .collect();
        if keys.len() > MAX_KEYS_PER_COMMAND {
            return Err(self.reject(ErrorKind::TooLongCommand));
        }
        Ok(keys)
    }

    /// `head` followed by every element of `tail`.
    fn call_with(&mut self, head: &[&[u8]], tail: &[Vec<u8>]) -> Result<&RespValue> {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(head.len() + tail.len());
        parts.extend_from_slice(head);
        parts.extend(tail.iter().map(Vec::as_slice));
        self.call(&parts)
    }

    // strings

    pub fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let key = self.add_prefix(key.as_ref());
        optional_bulk("GET", self.call(&[b"GET", &key])?)
    }

    pub fn mget<K: AsRef<[u8]>>(
        &mut self,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Vec<Option<Bytes>>> {
        let keys = self.prefixed_keys(keys)?;
        let reply = self.call_with(&[b"MGET"], &keys)?;
        let items = reply.as_array().ok_or_else(|| unexpected("MGET", reply))?;
        items.iter().map(|item| optional_bulk("MGET", item)).collect()
    }

    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let key = self.add_prefix(key.as_ref());
        self.call(&[b"SET", &key, value.as_ref()])?;
        Ok(())
    }

    /// Conditional and/or expiring SET. Returns whether the value was written.
    ///
    /// Servers older than 2.6.12 have no combined form: `IfExists`, or an
    /// expiry together with `IfNotExists`, fails with `CommandUnsupported`.
    pub fn set_with(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        condition: SetCondition,
        expiry: Expiry,
    ) -> Result<bool> {
        let key = self.add_prefix(key.as_ref());
        let value = value.as_ref();
        let mut digits = itoa::Buffer::new();

        if self.version() >= VERSION_SET_OPTIONS {
            let mut parts: Vec<&[u8]> = Vec::with_capacity(6);
            parts.extend_from_slice(&[b"SET", &key, value]);
            match expiry {
                Expiry::Never => {}
                Expiry::Seconds(secs) => {
                    parts.push(b"EX");
                    parts.push(digits.format(secs).as_bytes());
                }
                Expiry::Millis(ms) => {
                    parts.push(b"PX");
                    parts.push(digits.format(ms).as_bytes());
                }
            }
            match condition {
                SetCondition::Always => {}
                SetCondition::IfExists => parts.push(b"XX"),
                SetCondition::IfNotExists => parts.push(b"NX"),
            }
            return Ok(!self.call(&parts)?.is_nil());
        }

        match (condition, expiry) {
            (SetCondition::IfExists, _) | (SetCondition::IfNotExists, Expiry::Seconds(_))
            | (SetCondition::IfNotExists, Expiry::Millis(_)) => {
                Err(self.reject(ErrorKind::CommandUnsupported))
            }
            (SetCondition::IfNotExists, Expiry::Never) => {
                Ok(integer("SETNX", self.call(&[b"SETNX", &key, value])?)? == 1)
            }
            (SetCondition::Always, Expiry::Seconds(secs)) => {
                self.call(&[b"SETEX", &key, digits.format(secs).as_bytes(), value])?;
                Ok(true)
            }
            (SetCondition::Always, Expiry::Millis(ms)) => {
                self.call(&[b"PSETEX", &key, digits.format(ms).as_bytes(), value])?;
                Ok(true)
            }
            (SetCondition::Always, Expiry::Never) => {
                self.call(&[b"SET", &key, value])?;
                Ok(true)
            }
        }
    }

    /// Multi-key SET. `IfNotExists` is all-or-nothing; `IfExists` has no
    /// server equivalent and fails with `CommandUnsupported`.
    pub fn mset<K, V>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
        condition: SetCondition,
    ) -> Result<bool>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if condition == SetCondition::IfExists {
            return Err(self.reject(ErrorKind::CommandUnsupported));
        }
        let mut args = Vec::new();
        for (key, value) in pairs {
            args.push(self.add_prefix(key.as_ref()).into_owned());
            args.push(value.as_ref().to_vec());
        }
        if args.len() / 2 > MAX_KEYS_PER_COMMAND {
            return Err(self.reject(ErrorKind::TooLongCommand));
        }

        if condition == SetCondition::IfNotExists {
            Ok(integer("MSETNX", self.call_with(&[b"MSETNX"], &args)?)? == 1)
        } else {
            self.call_with(&[b"MSET"], &args)?;
            Ok(true)
        }
    }

    /// Returns the length after the append.
    pub fn append(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        integer("APPEND", self.call(&[b"APPEND", &key, value.as_ref()])?)
    }

    pub fn strlen(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        integer("STRLEN", self.call(&[b"STRLEN", &key])?)
    }

    pub fn getset(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<Option<Bytes>> {
        let key = self.add_prefix(key.as_ref());
        optional_bulk("GETSET", self.call(&[b"GETSET", &key, value.as_ref()])?)
    }

    pub fn getrange(&mut self, key: impl AsRef<[u8]>, start: i64, end: i64) -> Result<Bytes> {
        let key = self.add_prefix(key.as_ref());
        let mut start_digits = itoa::Buffer::new();
        let mut end_digits = itoa::Buffer::new();
        let reply = self.call(&[
            b"GETRANGE",
            &key,
            start_digits.format(start).as_bytes(),
            end_digits.format(end).as_bytes(),
        ])?;
        reply.as_bytes().cloned().ok_or_else(|| unexpected("GETRANGE", reply))
    }

    pub fn setrange(
        &mut self,
        key: impl AsRef<[u8]>,
        offset: u64,
        value: impl AsRef<[u8]>,
    ) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        let mut digits = itoa::Buffer::new();
        integer(
            "SETRANGE",
            self.call(&[b"SETRANGE", &key, digits.format(offset).as_bytes(), value.as_ref()])?,
        )
    }

    pub fn incr(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        integer("INCR", self.call(&[b"INCR", &key])?)
    }

    pub fn incrby(&mut self, key: impl AsRef<[u8]>, increment: i64) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        let mut digits = itoa::Buffer::new();
        integer(
            "INCRBY",
            self.call(&[b"INCRBY", &key, digits.format(increment).as_bytes()])?,
        )
    }

    pub fn decr(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        integer("DECR", self.call(&[b"DECR", &key])?)
    }

    pub fn decrby(&mut self, key: impl AsRef<[u8]>, decrement: i64) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        let mut digits = itoa::Buffer::new();
        integer(
            "DECRBY",
            self.call(&[b"DECRBY", &key, digits.format(decrement).as_bytes()])?,
        )
    }

    /// Fails with `DoubleOutOfRange` when the new value is not finite.
    pub fn incrbyfloat(&mut self, key: impl AsRef<[u8]>, increment: f64) -> Result<f64> {
        let key = self.add_prefix(key.as_ref());
        let increment = format_float(increment);
        let value = float(
            "INCRBYFLOAT",
            self.call(&[b"INCRBYFLOAT", &key, increment.as_bytes()])?,
        )?;
        if !value.is_finite() {
            return Err(self.reject(ErrorKind::DoubleOutOfRange));
        }
        Ok(value)
    }

    /// Fails with `FloatOutOfRange` when the new value does not fit an `f32`.
    pub fn incrbyfloat_f32(&mut self, key: impl AsRef<[u8]>, increment: f32) -> Result<f32> {
        let key = self.add_prefix(key.as_ref());
        let increment = format_float(f64::from(increment));
        let value = float(
            "INCRBYFLOAT",
            self.call(&[b"INCRBYFLOAT", &key, increment.as_bytes()])?,
        )?;
        if !value.is_finite() || value.abs() > f64::from(f32::MAX) {
            return Err(self.reject(ErrorKind::FloatOutOfRange));
        }
        Ok(value as f32)
    }

    pub fn bitcount(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        integer("BITCOUNT", self.call(&[b"BITCOUNT", &key])?)
    }

    // keys

    /// Returns how many keys were removed.
    pub fn del<K: AsRef<[u8]>>(&mut self, keys: impl IntoIterator<Item = K>) -> Result<i64> {
        let keys = self.prefixed_keys(keys)?;
        integer("DEL", self.call_with(&[b"DEL"], &keys)?)
    }

    pub fn exists(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = self.add_prefix(key.as_ref());
        Ok(integer("EXISTS", self.call(&[b"EXISTS", &key])?)? > 0)
    }

    /// Set or clear (`Expiry::Never`) a key's expiry. Returns false when the
    /// key does not exist or had nothing to clear.
    pub fn expire(&mut self, key: impl AsRef<[u8]>, expiry: Expiry) -> Result<bool> {
        let key = self.add_prefix(key.as_ref());
        let mut digits = itoa::Buffer::new();
        let reply = match expiry {
            Expiry::Never => self.call(&[b"PERSIST", &key])?,
            Expiry::Seconds(secs) => {
                self.call(&[b"EXPIRE", &key, digits.format(secs).as_bytes()])?
            }
            Expiry::Millis(ms) => self.call(&[b"PEXPIRE", &key, digits.format(ms).as_bytes()])?,
        };
        Ok(integer("EXPIRE", reply)? == 1)
    }

    pub fn ttl(&mut self, key: impl AsRef<[u8]>) -> Result<Ttl> {
        let key = self.add_prefix(key.as_ref());
        match integer("PTTL", self.call(&[b"PTTL", &key])?)? {
            -2 => Ok(Ttl::Missing),
            -1 => Ok(Ttl::NoExpiry),
            ms => Ok(Ttl::ExpiresIn(Duration::from_millis(ms.max(0) as u64))),
        }
    }

    pub fn key_type(&mut self, key: impl AsRef<[u8]>) -> Result<KeyType> {
        let key = self.add_prefix(key.as_ref());
        let reply = self.call(&[b"TYPE", &key])?;
        let name = reply.as_str().ok_or_else(|| unexpected("TYPE", reply))?;
        Ok(KeyType::parse(name))
    }

    /// One SCAN step. Returns the next cursor (0 when done) and the keys with
    /// the endpoint prefix removed.
    pub fn scan(
        &mut self,
        cursor: u64,
        pattern: impl AsRef<[u8]>,
        count: u64,
    ) -> Result<(u64, Vec<Bytes>)> {
        let pattern = self.add_prefix(pattern.as_ref());
        let mut cursor_digits = itoa::Buffer::new();
        let mut count_digits = itoa::Buffer::new();

        let mut parts: Vec<&[u8]> = Vec::with_capacity(6);
        parts.extend_from_slice(&[b"SCAN", cursor_digits.format(cursor).as_bytes()]);
        if &*pattern != b"*" {
            parts.push(b"MATCH");
            parts.push(&pattern);
        }
        if count != DEFAULT_SCAN_COUNT {
            parts.push(b"COUNT");
            parts.push(count_digits.format(count).as_bytes());
        }

        let reply = self.call(&parts)?;
        let (next, keys) = match reply.as_array() {
            Some([next, keys]) => (next, keys),
            _ => return Err(unexpected("SCAN", reply)),
        };
        let next = next
            .as_str()
            .and_then(|text| text.parse::<u64>().ok())
            .ok_or_else(|| unexpected("SCAN", reply))?;
        let keys = bulk_list("SCAN", keys)?;

        let prefix = Bytes::from(self.config().prefix.clone().into_bytes());
        let keys = keys
            .into_iter()
            .map(|key| {
                if !prefix.is_empty() && key.starts_with(&prefix) {
                    key.slice(prefix.len()..)
                } else {
                    key
                }
            })
            .collect();
        Ok((next, keys))
    }

    // hashes

    /// Returns true when the field was created rather than overwritten.
    pub fn hset(
        &mut self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<bool> {
        let key = self.add_prefix(key.as_ref());
        Ok(integer("HSET", self.call(&[b"HSET", &key, field.as_ref(), value.as_ref()])?)? == 1)
    }

    pub fn hsetnx(
        &mut self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<bool> {
        let key = self.add_prefix(key.as_ref());
        Ok(integer(
            "HSETNX",
            self.call(&[b"HSETNX", &key, field.as_ref(), value.as_ref()])?,
        )? == 1)
    }

    pub fn hget(
        &mut self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
    ) -> Result<Option<Bytes>> {
        let key = self.add_prefix(key.as_ref());
        optional_bulk("HGET", self.call(&[b"HGET", &key, field.as_ref()])?)
    }

    pub fn hgetall(&mut self, key: impl AsRef<[u8]>) -> Result<Vec<(Bytes, Bytes)>> {
        let key = self.add_prefix(key.as_ref());
        let reply = self.call(&[b"HGETALL", &key])?;
        let flat = bulk_list("HGETALL", reply)?;
        if flat.len() % 2 != 0 {
            return Err(unexpected("HGETALL", reply));
        }
        let mut pairs = Vec::with_capacity(flat.len() / 2);
        let mut items = flat.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            pairs.push((field, value));
        }
        Ok(pairs)
    }

    pub fn hdel<F: AsRef<[u8]>>(
        &mut self,
        key: impl AsRef<[u8]>,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<i64> {
        let key = self.add_prefix(key.as_ref()).into_owned();
        let fields: Vec<Vec<u8>> = fields.into_iter().map(|f| f.as_ref().to_vec()).collect();
        integer("HDEL", self.call_with(&[b"HDEL", &key], &fields)?)
    }

    pub fn hincrby(
        &mut self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        increment: i64,
    ) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        let mut digits = itoa::Buffer::new();
        integer(
            "HINCRBY",
            self.call(&[b"HINCRBY", &key, field.as_ref(), digits.format(increment).as_bytes()])?,
        )
    }

    pub fn hincrbyfloat(
        &mut self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        increment: f64,
    ) -> Result<f64> {
        let key = self.add_prefix(key.as_ref());
        let increment = format_float(increment);
        let value = float(
            "HINCRBYFLOAT",
            self.call(&[b"HINCRBYFLOAT", &key, field.as_ref(), increment.as_bytes()])?,
        )?;
        if !value.is_finite() {
            return Err(self.reject(ErrorKind::DoubleOutOfRange));
        }
        Ok(value)
    }

    // sets

    /// Returns how many members were added. Servers older than 2.4.0 get one
    /// SADD per member.
    pub fn sadd<M: AsRef<[u8]>>(
        &mut self,
        key: impl AsRef<[u8]>,
        members: impl IntoIterator<Item = M>,
    ) -> Result<i64> {
        let key = self.add_prefix(key.as_ref()).into_owned();
        let members: Vec<Vec<u8>> = members.into_iter().map(|m| m.as_ref().to_vec()).collect();
        if members.len() > MAX_KEYS_PER_COMMAND {
            return Err(self.reject(ErrorKind::TooLongCommand));
        }

        if members.len() > 1 && self.version() < VERSION_VARIADIC_SADD {
            let mut added = 0;
            for member in &members {
                added += integer("SADD", self.call(&[b"SADD", &key, member])?)?;
            }
            return Ok(added);
        }
        integer("SADD", self.call_with(&[b"SADD", &key], &members)?)
    }

    pub fn srem<M: AsRef<[u8]>>(
        &mut self,
        key: impl AsRef<[u8]>,
        members: impl IntoIterator<Item = M>,
    ) -> Result<i64> {
        let key = self.add_prefix(key.as_ref()).into_owned();
        let members: Vec<Vec<u8>> = members.into_iter().map(|m| m.as_ref().to_vec()).collect();
        integer("SREM", self.call_with(&[b"SREM", &key], &members)?)
    }

    pub fn scard(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        integer("SCARD", self.call(&[b"SCARD", &key])?)
    }

    pub fn smembers(&mut self, key: impl AsRef<[u8]>) -> Result<Vec<Bytes>> {
        let key = self.add_prefix(key.as_ref());
        bulk_list("SMEMBERS", self.call(&[b"SMEMBERS", &key])?)
    }

    pub fn sinter<K: AsRef<[u8]>>(&mut self, keys: impl IntoIterator<Item = K>) -> Result<Vec<Bytes>> {
        let keys = self.prefixed_keys(keys)?;
        bulk_list("SINTER", self.call_with(&[b"SINTER"], &keys)?)
    }

    pub fn sunion<K: AsRef<[u8]>>(&mut self, keys: impl IntoIterator<Item = K>) -> Result<Vec<Bytes>> {
        let keys = self.prefixed_keys(keys)?;
        bulk_list("SUNION", self.call_with(&[b"SUNION"], &keys)?)
    }

    pub fn sdiff<K: AsRef<[u8]>>(&mut self, keys: impl IntoIterator<Item = K>) -> Result<Vec<Bytes>> {
        let keys = self.prefixed_keys(keys)?;
        bulk_list("SDIFF", self.call_with(&[b"SDIFF"], &keys)?)
    }

    // sorted sets

    /// Returns how many members were newly inserted.
    pub fn zadd<M: AsRef<[u8]>>(
        &mut self,
        key: impl AsRef<[u8]>,
        members: impl IntoIterator<Item = (M, f64)>,
    ) -> Result<i64> {
        let key = self.add_prefix(key.as_ref()).into_owned();
        let mut args = Vec::new();
        for (member, score) in members {
            args.push(format_float(score).into_bytes());
            args.push(member.as_ref().to_vec());
        }
        integer("ZADD", self.call_with(&[b"ZADD", &key], &args)?)
    }

    /// Returns the member's new score.
    pub fn zincrby(
        &mut self,
        key: impl AsRef<[u8]>,
        increment: f64,
        member: impl AsRef<[u8]>,
    ) -> Result<f64> {
        let key = self.add_prefix(key.as_ref());
        let increment = format_float(increment);
        float(
            "ZINCRBY",
            self.call(&[b"ZINCRBY", &key, increment.as_bytes(), member.as_ref()])?,
        )
    }

    pub fn zrange(&mut self, key: impl AsRef<[u8]>, start: i64, stop: i64) -> Result<Vec<Bytes>> {
        let key = self.add_prefix(key.as_ref());
        let mut start_digits = itoa::Buffer::new();
        let mut stop_digits = itoa::Buffer::new();
        bulk_list(
            "ZRANGE",
            self.call(&[
                b"ZRANGE",
                &key,
                start_digits.format(start).as_bytes(),
                stop_digits.format(stop).as_bytes(),
            ])?,
        )
    }

    pub fn zrange_with_scores(
        &mut self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
        order: Order,
    ) -> Result<Vec<(Bytes, f64)>> {
        let key = self.add_prefix(key.as_ref());
        let command: &'static str = match order {
            Order::Asc => "ZRANGE",
            Order::Desc => "ZREVRANGE",
        };
        let mut start_digits = itoa::Buffer::new();
        let mut stop_digits = itoa::Buffer::new();
        let reply = self.call(&[
            command.as_bytes(),
            &key,
            start_digits.format(start).as_bytes(),
            stop_digits.format(stop).as_bytes(),
            b"WITHSCORES",
        ])?;

        let flat = reply.as_array().ok_or_else(|| unexpected(command, reply))?;
        if flat.len() % 2 != 0 {
            return Err(unexpected(command, reply));
        }
        flat.chunks(2)
            .map(|pair| -> Result<(Bytes, f64)> {
                let member = pair[0]
                    .as_bytes()
                    .cloned()
                    .ok_or_else(|| unexpected(command, reply))?;
                Ok((member, float(command, &pair[1])?))
            })
            .collect()
    }

    /// With `Order::Desc` the ranks count from the highest score.
    pub fn zremrangebyrank(
        &mut self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
        order: Order,
    ) -> Result<i64> {
        let key = self.add_prefix(key.as_ref());
        let (start, stop) = match order {
            Order::Asc => (start, stop),
            Order::Desc => (-(stop + 1), -(start + 1)),
        };
        let mut start_digits = itoa::Buffer::new();
        let mut stop_digits = itoa::Buffer::new();
        integer(
            "ZREMRANGEBYRANK",
            self.call(&[
                b"ZREMRANGEBYRANK",
                &key,
                start_digits.format(start).as_bytes(),
                stop_digits.format(stop).as_bytes(),
            ])?,
        )
    }

    // server

    pub fn ping(&mut self) -> Result<()> {
        let reply = self.call(&[b"PING"])?;
        match reply.as_str() {
            Some("PONG") => Ok(()),
            _ => Err(unexpected("PING", reply)),
        }
    }

    pub fn echo(&mut self, message: impl AsRef<[u8]>) -> Result<Bytes> {
        let reply = self.call(&[b"ECHO", message.as_ref()])?;
        reply.as_bytes().cloned().ok_or_else(|| unexpected("ECHO", reply))
    }

    /// INFO text. A section needs server 2.6.0 or later.
    pub fn info(&mut self, section: Option<&str>) -> Result<String> {
        let reply = match section {
            Some(section) => {
                if self.version() < VERSION_INFO_SECTION {
                    return Err(self.reject(ErrorKind::CommandUnsupported));
                }
                self.call(&[b"INFO", section.as_bytes()])?
            }
            None => self.call(&[b"INFO"])?,
        };
        reply
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| unexpected("INFO", reply))
    }

    pub fn dbsize(&mut self) -> Result<i64> {
        integer("DBSIZE", self.call(&[b"DBSIZE"])?)
    }

    pub fn flushdb(&mut self) -> Result<()> {
        self.call(&[b"FLUSHDB"])?;
        Ok(())
    }
}
