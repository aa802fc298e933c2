#![allow(dead_code)]

//! In-memory stand-in for a Redis-compatible server.
//!
//! `FakeServer` implements `Connector`; every transport it hands out talks to
//! the same shared keyspace. Tests can refuse connections, break specific
//! commands, require a password and pick the advertised server version.

use bytes::Bytes;
use feox_client::network::{Connector, Transport, TransportStatus};
use feox_client::{EndpointConfig, RespValue};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const HOST: &str = "fake.local";

pub fn endpoint(port: u16) -> EndpointConfig {
    EndpointConfig::new(HOST, port).with_timeouts(100, 100)
}

#[derive(Clone, Copy)]
enum Failure {
    Always,
    Times(usize),
}

#[derive(Clone)]
enum Value {
    Str(Vec<u8>),
    Set(BTreeSet<Vec<u8>>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    ZSet(Vec<(Vec<u8>, f64)>),
}

#[derive(Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

type Db = HashMap<Vec<u8>, Entry>;

struct State {
    dbs: HashMap<u32, Db>,
    version: String,
    password: Option<String>,
    failing: HashMap<String, Failure>,
    rejecting: HashMap<String, String>,
    sent: Vec<String>,
}

struct Shared {
    state: Mutex<State>,
    connects: AtomicUsize,
    refusing: AtomicBool,
}

#[derive(Clone)]
pub struct FakeServer {
    shared: Arc<Shared>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::with_version("7.2.4")
    }

    pub fn with_version(version: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    dbs: HashMap::new(),
                    version: version.to_string(),
                    password: None,
                    failing: HashMap::new(),
                    rejecting: HashMap::new(),
                    sent: Vec::new(),
                }),
                connects: AtomicUsize::new(0),
                refusing: AtomicBool::new(false),
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn set_version(&self, version: &str) {
        self.shared.state.lock().version = version.to_string();
    }

    pub fn require_password(&self, password: &str) {
        self.shared.state.lock().password = Some(password.to_string());
    }

    /// Refuse to hand out transports at all.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refusing.store(refuse, Ordering::SeqCst);
    }

    /// Break the connection whenever `command` is sent.
    pub fn fail_command(&self, command: &str) {
        self.shared
            .state
            .lock()
            .failing
            .insert(command.to_string(), Failure::Always);
    }

    /// Break the connection the next `times` times `command` is sent.
    pub fn fail_command_times(&self, command: &str, times: usize) {
        self.shared
            .state
            .lock()
            .failing
            .insert(command.to_string(), Failure::Times(times));
    }

    /// Answer `command` with an error reply carrying `message`.
    pub fn reject_command(&self, command: &str, message: &str) {
        self.shared
            .state
            .lock()
            .rejecting
            .insert(command.to_string(), message.to_string());
    }

    pub fn heal(&self) {
        let mut state = self.shared.state.lock();
        state.failing.clear();
        state.rejecting.clear();
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// How many times `command` reached the server, including failed sends.
    pub fn sent(&self, command: &str) -> usize {
        self.shared
            .state
            .lock()
            .sent
            .iter()
            .filter(|name| name.as_str() == command)
            .count()
    }

    /// Raw string value of `key` in database `db`, ignoring any prefix logic.
    pub fn raw_get(&self, db: u32, key: &str) -> Option<Vec<u8>> {
        let mut state = self.shared.state.lock();
        match state.db(db).get(key.as_bytes()).map(|e| e.value.clone()) {
            Some(Value::Str(v)) => Some(v),
            _ => None,
        }
    }

    pub fn raw_keys(&self, db: u32) -> Vec<String> {
        let mut state = self.shared.state.lock();
        let mut keys: Vec<String> = state
            .db(db)
            .keys()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .collect();
        keys.sort();
        keys
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for FakeServer {
    fn connect(
        &self,
        _host: &str,
        _port: u16,
        _timeout: Option<Duration>,
    ) -> Option<Box<dyn Transport>> {
        if self.shared.refusing.load(Ordering::SeqCst) {
            return None;
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(FakeTransport {
            shared: Arc::clone(&self.shared),
            db: 0,
            authed: false,
            status: TransportStatus::ok(),
        }))
    }
}

struct FakeTransport {
    shared: Arc<Shared>,
    db: u32,
    authed: bool,
    status: TransportStatus,
}

impl Transport for FakeTransport {
    fn send(&mut self, parts: &[&[u8]]) -> Option<RespValue> {
        if !self.status.is_ok() {
            return None;
        }
        let name = String::from_utf8_lossy(parts[0]).to_ascii_uppercase();
        let args: Vec<Vec<u8>> = parts[1..].iter().map(|p| p.to_vec()).collect();

        let mut state = self.shared.state.lock();
        state.sent.push(name.clone());
        if state.should_fail(&name) {
            self.status = TransportStatus::new(TransportStatus::ERR_EOF, "connection reset by fake");
            return None;
        }
        if let Some(message) = state.rejecting.get(&name) {
            return Some(err(message));
        }

        if state.password.is_some() && !self.authed && name != "AUTH" {
            return Some(err("NOAUTH Authentication required."));
        }

        Some(match name.as_str() {
            "AUTH" => {
                if state.password.as_deref().map(str::as_bytes) == args.first().map(Vec::as_slice) {
                    self.authed = true;
                    ok()
                } else {
                    err("WRONGPASS invalid username-password pair")
                }
            }
            "SELECT" => match args.first().and_then(|a| parse::<u32>(a)) {
                Some(db) => {
                    self.db = db;
                    ok()
                }
                None => err("ERR invalid DB index"),
            },
            _ => state.execute(self.db, &name, &args),
        })
    }

    fn set_timeout(&mut self, _timeout: Option<Duration>) {}

    fn status(&self) -> TransportStatus {
        self.status.clone()
    }
}

fn ok() -> RespValue {
    RespValue::SimpleString(Bytes::from_static(b"OK"))
}

fn int(n: i64) -> RespValue {
    RespValue::Integer(n)
}

fn bulk(data: &[u8]) -> RespValue {
    RespValue::BulkString(Some(Bytes::copy_from_slice(data)))
}

fn nil() -> RespValue {
    RespValue::BulkString(None)
}

fn err(message: &str) -> RespValue {
    RespValue::Error(message.to_string())
}

fn array(items: Vec<RespValue>) -> RespValue {
    RespValue::Array(Some(items))
}

fn wrong_type() -> RespValue {
    err("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn parse<T: std::str::FromStr>(data: &[u8]) -> Option<T> {
    std::str::from_utf8(data).ok()?.parse().ok()
}

fn format_float(value: f64) -> Vec<u8> {
    value.to_string().into_bytes()
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_match(rest, &text[i..])),
        Some((b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

fn range(start: i64, stop: i64, len: usize) -> std::ops::Range<usize> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        0..0
    } else {
        start as usize..stop as usize + 1
    }
}

impl State {
    fn should_fail(&mut self, name: &str) -> bool {
        match self.failing.get_mut(name) {
            Some(Failure::Always) => true,
            Some(Failure::Times(0)) | None => false,
            Some(Failure::Times(n)) => {
                *n -= 1;
                true
            }
        }
    }

    fn db(&mut self, index: u32) -> &mut Db {
        let db = self.dbs.entry(index).or_default();
        db.retain(|_, entry| !entry.expired());
        db
    }

    fn info(&self) -> RespValue {
        let text = format!(
            "# Server\r\nredis_version:{}\r\nredis_mode:standalone\r\nos:FakeOS\r\n",
            self.version
        );
        bulk(text.as_bytes())
    }

    fn execute(&mut self, db_index: u32, name: &str, args: &[Vec<u8>]) -> RespValue {
        if name == "INFO" {
            return self.info();
        }
        let db = self.db(db_index);

        match (name, args) {
            ("PING", []) => RespValue::SimpleString(Bytes::from_static(b"PONG")),
            ("ECHO", [message]) => bulk(message),
            ("DBSIZE", []) => int(db.len() as i64),
            ("FLUSHDB", []) => {
                db.clear();
                ok()
            }

            ("GET", [key]) => match db.get(key).map(|e| &e.value) {
                None => nil(),
                Some(Value::Str(v)) => bulk(v),
                Some(_) => wrong_type(),
            },
            ("SET", [key, value, options @ ..]) => {
                let mut expires_at = None;
                let mut nx = false;
                let mut xx = false;
                let mut i = 0;
                while i < options.len() {
                    match options[i].to_ascii_uppercase().as_slice() {
                        b"NX" => nx = true,
                        b"XX" => xx = true,
                        b"EX" | b"PX" => {
                            let Some(n) = options.get(i + 1).and_then(|a| parse::<u64>(a)) else {
                                return err("ERR syntax error");
                            };
                            let ttl = if options[i].eq_ignore_ascii_case(b"EX") {
                                Duration::from_secs(n)
                            } else {
                                Duration::from_millis(n)
                            };
                            expires_at = Some(Instant::now() + ttl);
                            i += 1;
                        }
                        _ => return err("ERR syntax error"),
                    }
                    i += 1;
                }
                let exists = db.contains_key(key);
                if (nx && exists) || (xx && !exists) {
                    return nil();
                }
                db.insert(
                    key.clone(),
                    Entry {
                        value: Value::Str(value.clone()),
                        expires_at,
                    },
                );
                ok()
            }
            ("SETNX", [key, value]) => {
                if db.contains_key(key) {
                    int(0)
                } else {
                    db.insert(key.clone(), Entry::new(Value::Str(value.clone())));
                    int(1)
                }
            }
            ("SETEX", [key, secs, value]) | ("PSETEX", [key, secs, value]) => {
                let Some(n) = parse::<u64>(secs) else {
                    return err("ERR value is not an integer or out of range");
                };
                let ttl = if name == "SETEX" {
                    Duration::from_secs(n)
                } else {
                    Duration::from_millis(n)
                };
                db.insert(
                    key.clone(),
                    Entry {
                        value: Value::Str(value.clone()),
                        expires_at: Some(Instant::now() + ttl),
                    },
                );
                ok()
            }
            ("MSET", pairs) | ("MSETNX", pairs) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                if name == "MSETNX" && pairs.chunks(2).any(|p| db.contains_key(&p[0])) {
                    return int(0);
                }
                for pair in pairs.chunks(2) {
                    db.insert(pair[0].clone(), Entry::new(Value::Str(pair[1].clone())));
                }
                if name == "MSETNX" {
                    int(1)
                } else {
                    ok()
                }
            }
            ("MGET", keys) if !keys.is_empty() => array(
                keys.iter()
                    .map(|key| match db.get(key).map(|e| &e.value) {
                        Some(Value::Str(v)) => bulk(v),
                        _ => nil(),
                    })
                    .collect(),
            ),
            ("APPEND", [key, value]) => {
                let entry = db
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(Value::Str(Vec::new())));
                match &mut entry.value {
                    Value::Str(v) => {
                        v.extend_from_slice(value);
                        int(v.len() as i64)
                    }
                    _ => wrong_type(),
                }
            }
            ("STRLEN", [key]) => match db.get(key).map(|e| &e.value) {
                None => int(0),
                Some(Value::Str(v)) => int(v.len() as i64),
                Some(_) => wrong_type(),
            },
            ("INCR", [key]) => incr_by(db, key, 1),
            ("DECR", [key]) => incr_by(db, key, -1),
            ("INCRBY", [key, by]) => match parse::<i64>(by) {
                Some(by) => incr_by(db, key, by),
                None => err("ERR value is not an integer or out of range"),
            },
            ("DECRBY", [key, by]) => match parse::<i64>(by) {
                Some(by) => incr_by(db, key, -by),
                None => err("ERR value is not an integer or out of range"),
            },
            ("INCRBYFLOAT", [key, by]) => {
                let Some(by) = parse::<f64>(by) else {
                    return err("ERR value is not a valid float");
                };
                let current = match db.get(key).map(|e| &e.value) {
                    None => 0.0,
                    Some(Value::Str(v)) => match parse::<f64>(v) {
                        Some(f) => f,
                        None => return err("ERR value is not a valid float"),
                    },
                    Some(_) => return wrong_type(),
                };
                let next = format_float(current + by);
                db.insert(key.clone(), Entry::new(Value::Str(next.clone())));
                bulk(&next)
            }

            ("DEL", keys) if !keys.is_empty() => {
                int(keys.iter().filter(|key| db.remove(*key).is_some()).count() as i64)
            }
            ("EXISTS", keys) if !keys.is_empty() => {
                int(keys.iter().filter(|key| db.contains_key(*key)).count() as i64)
            }
            ("EXPIRE", [key, secs]) | ("PEXPIRE", [key, secs]) => {
                let Some(n) = parse::<u64>(secs) else {
                    return err("ERR value is not an integer or out of range");
                };
                let ttl = if name == "EXPIRE" {
                    Duration::from_secs(n)
                } else {
                    Duration::from_millis(n)
                };
                match db.get_mut(key) {
                    Some(entry) => {
                        entry.expires_at = Some(Instant::now() + ttl);
                        int(1)
                    }
                    None => int(0),
                }
            }
            ("PERSIST", [key]) => match db.get_mut(key) {
                Some(entry) if entry.expires_at.is_some() => {
                    entry.expires_at = None;
                    int(1)
                }
                _ => int(0),
            },
            ("PTTL", [key]) => match db.get(key) {
                None => int(-2),
                Some(Entry {
                    expires_at: None, ..
                }) => int(-1),
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => int(at.saturating_duration_since(Instant::now()).as_millis() as i64),
            },
            ("TYPE", [key]) => {
                let kind: &'static [u8] = match db.get(key).map(|e| &e.value) {
                    None => b"none",
                    Some(Value::Str(_)) => b"string",
                    Some(Value::Set(_)) => b"set",
                    Some(Value::Hash(_)) => b"hash",
                    Some(Value::ZSet(_)) => b"zset",
                };
                RespValue::SimpleString(Bytes::from_static(kind))
            }
            ("SCAN", [cursor, options @ ..]) => {
                if parse::<u64>(cursor).is_none() {
                    return err("ERR invalid cursor");
                }
                let mut pattern: &[u8] = b"*";
                let mut i = 0;
                while i + 1 < options.len() {
                    if options[i].eq_ignore_ascii_case(b"MATCH") {
                        pattern = &options[i + 1];
                    }
                    i += 2;
                }
                let mut keys: Vec<&Vec<u8>> =
                    db.keys().filter(|key| glob_match(pattern, key)).collect();
                keys.sort();
                array(vec![
                    bulk(b"0"),
                    array(keys.into_iter().map(|key| bulk(key)).collect()),
                ])
            }

            ("HSET", [key, field, value]) => {
                let entry = db
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(Value::Hash(BTreeMap::new())));
                match &mut entry.value {
                    Value::Hash(fields) => {
                        int(i64::from(fields.insert(field.clone(), value.clone()).is_none()))
                    }
                    _ => wrong_type(),
                }
            }
            ("HGET", [key, field]) => match db.get(key).map(|e| &e.value) {
                None => nil(),
                Some(Value::Hash(fields)) => fields.get(field).map_or_else(nil, |v| bulk(v)),
                Some(_) => wrong_type(),
            },
            ("HGETALL", [key]) => match db.get(key).map(|e| &e.value) {
                None => array(Vec::new()),
                Some(Value::Hash(fields)) => array(
                    fields
                        .iter()
                        .flat_map(|(f, v)| [bulk(f), bulk(v)])
                        .collect(),
                ),
                Some(_) => wrong_type(),
            },

            ("SADD", [key, members @ ..]) if !members.is_empty() => {
                let entry = db
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(Value::Set(BTreeSet::new())));
                match &mut entry.value {
                    Value::Set(set) => {
                        int(members.iter().filter(|m| set.insert((*m).clone())).count() as i64)
                    }
                    _ => wrong_type(),
                }
            }
            ("SMEMBERS", [key]) => match db.get(key).map(|e| &e.value) {
                None => array(Vec::new()),
                Some(Value::Set(set)) => array(set.iter().map(|m| bulk(m)).collect()),
                Some(_) => wrong_type(),
            },
            ("SCARD", [key]) => match db.get(key).map(|e| &e.value) {
                None => int(0),
                Some(Value::Set(set)) => int(set.len() as i64),
                Some(_) => wrong_type(),
            },

            ("ZADD", [key, pairs @ ..]) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                let entry = db
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(Value::ZSet(Vec::new())));
                let Value::ZSet(members) = &mut entry.value else {
                    return wrong_type();
                };
                let mut added = 0;
                for pair in pairs.chunks(2) {
                    let Some(score) = parse::<f64>(&pair[0]) else {
                        return err("ERR value is not a valid float");
                    };
                    match members.iter_mut().find(|(m, _)| *m == pair[1]) {
                        Some(existing) => existing.1 = score,
                        None => {
                            members.push((pair[1].clone(), score));
                            added += 1;
                        }
                    }
                }
                members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                int(added)
            }
            ("ZRANGE", [key, start, stop, rest @ ..]) | ("ZREVRANGE", [key, start, stop, rest @ ..]) => {
                let (Some(start), Some(stop)) = (parse::<i64>(start), parse::<i64>(stop)) else {
                    return err("ERR value is not an integer or out of range");
                };
                let with_scores = rest.iter().any(|o| o.eq_ignore_ascii_case(b"WITHSCORES"));
                let mut members = match db.get(key).map(|e| &e.value) {
                    None => Vec::new(),
                    Some(Value::ZSet(members)) => members.clone(),
                    Some(_) => return wrong_type(),
                };
                if name == "ZREVRANGE" {
                    members.reverse();
                }
                let mut out = Vec::new();
                for (member, score) in &members[range(start, stop, members.len())] {
                    out.push(bulk(member));
                    if with_scores {
                        out.push(bulk(&format_float(*score)));
                    }
                }
                array(out)
            }

            _ => err(&format!("ERR unknown command '{}'", name)),
        }
    }
}

fn incr_by(db: &mut Db, key: &[u8], by: i64) -> RespValue {
    let current = match db.get(key).map(|e| &e.value) {
        None => 0,
        Some(Value::Str(v)) => match parse::<i64>(v) {
            Some(n) => n,
            None => return err("ERR value is not an integer or out of range"),
        },
        Some(_) => return wrong_type(),
    };
    let next = current + by;
    db.insert(
        key.to_vec(),
        Entry::new(Value::Str(next.to_string().into_bytes())),
    );
    int(next)
}
