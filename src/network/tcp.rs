use crate::network::transport::{Connector, Transport, TransportStatus};
use crate::protocol::{write_command, RespParser, RespValue};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

const READ_CHUNK: usize = 16 * 1024;

/// Opens blocking TCP connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Option<Box<dyn Transport>> {
        let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                debug!("Could not resolve {}:{}: {}", host, port, e);
                return None;
            }
        };
        if addrs.is_empty() {
            debug!("{}:{} resolved to no addresses", host, port);
            return None;
        }
        Some(Box::new(TcpTransport::connect(&addrs, timeout)))
    }
}

/// A blocking RESP connection over TCP.
pub struct TcpTransport {
    id: u64,
    stream: Option<TcpStream>,
    parser: RespParser,
    write_buffer: Vec<u8>,
    status: TransportStatus,
}

impl TcpTransport {
    /// Try each address in turn; the transport carries the last failure if
    /// none of them accepted.
    pub fn connect(addrs: &[SocketAddr], timeout: Option<Duration>) -> Self {
        static TRANSPORT_ID: AtomicU64 = AtomicU64::new(0);
        let id = TRANSPORT_ID.fetch_add(1, Ordering::Relaxed);

        let mut last_err = io::Error::new(io::ErrorKind::AddrNotAvailable, "no address");
        for addr in addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Transport {}: could not set TCP_NODELAY: {}", id, e);
                    }
                    debug!("Transport {} connected to {}", id, addr);
                    return Self::from_stream(id, Some(stream), TransportStatus::ok());
                }
                Err(e) => {
                    debug!("Transport {} failed to connect to {}: {}", id, addr, e);
                    last_err = e;
                }
            }
        }

        Self::from_stream(id, None, io_status(&last_err))
    }

    fn from_stream(id: u64, stream: Option<TcpStream>, status: TransportStatus) -> Self {
        Self {
            id,
            stream,
            parser: RespParser::new(),
            write_buffer: Vec::with_capacity(1024),
            status,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn fail(&mut self, status: TransportStatus) -> Option<RespValue> {
        debug!("Transport {} failed: {}", self.id, status.message);
        self.status = status;
        self.stream = None;
        self.parser.clear();
        None
    }

    fn read_reply(&mut self) -> Option<RespValue> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.parser.parse_next() {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => {
                    return self.fail(TransportStatus::new(TransportStatus::ERR_PROTOCOL, e));
                }
            }

            let stream = self.stream.as_mut()?;
            match stream.read(&mut chunk) {
                Ok(0) => {
                    return self.fail(TransportStatus::new(
                        TransportStatus::ERR_EOF,
                        "Server closed the connection",
                    ));
                }
                Ok(n) => {
                    trace!("Transport {} read {} bytes", self.id, n);
                    self.parser.feed(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return self.fail(io_status(&e)),
            }
        }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, parts: &[&[u8]]) -> Option<RespValue> {
        if !self.status.is_ok() {
            return None;
        }

        self.write_buffer.clear();
        write_command(&mut self.write_buffer, parts);

        let stream = self.stream.as_mut()?;
        if let Err(e) = stream.write_all(&self.write_buffer) {
            return self.fail(io_status(&e));
        }

        self.read_reply()
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream
                .set_read_timeout(timeout)
                .and_then(|()| stream.set_write_timeout(timeout))
            {
                debug!("Transport {}: could not set timeout {:?}: {}", self.id, timeout, e);
            }
        }
    }

    fn status(&self) -> TransportStatus {
        self.status.clone()
    }
}

fn io_status(e: &io::Error) -> TransportStatus {
    let code = match e.kind() {
        io::ErrorKind::UnexpectedEof => TransportStatus::ERR_EOF,
        io::ErrorKind::OutOfMemory => TransportStatus::ERR_OOM,
        _ => TransportStatus::ERR_IO,
    };
    TransportStatus::new(code, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn rejected_timeout_leaves_transport_usable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut transport = TcpTransport::connect(&[addr], Some(Duration::from_secs(1)));
        assert!(transport.status().is_ok());

        // a zero timeout is refused by the socket
        transport.set_timeout(Some(Duration::ZERO));
        assert!(transport.status().is_ok());
        transport.set_timeout(Some(Duration::from_millis(50)));

        let (mut server, _) = listener.accept().unwrap();
        server.write_all(b"+PONG\r\n").unwrap();
        let reply = transport.send(&[b"PING"]).unwrap();
        assert_eq!(reply.as_str(), Some("PONG"));
    }

    #[test]
    fn refused_connection_carries_io_status() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut transport = TcpTransport::connect(&[addr], Some(Duration::from_secs(1)));
        assert_eq!(transport.status().code, TransportStatus::ERR_IO);
        assert_eq!(transport.send(&[b"PING"]), None);
    }
}
