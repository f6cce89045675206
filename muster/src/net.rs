//! Network-related code, i.e. opening a session to a directory-service pool
//! and performing query round trips over it.

use std::env;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use byteorder::{NetworkEndian, WriteBytesExt};
use muster_proto::error::{EncodeError, ParseError};
use muster_proto::{Query, RawAdStream, Response, ResultStatus};
use thiserror::Error;
use tracing::debug;

use crate::{ConnectionType, DEFAULT_PORT, POOL_ENV};

/// Responses larger than this are refused before allocation.
pub const MAX_RESPONSE_SIZE: u32 = 16 * 1024 * 1024;

/// The receive buffer size for UDP sessions. A pool whose answer does not fit
/// in one datagram must be queried via TCP.
pub const UDP_BUFSIZE: u16 = u16::MAX;

/// Errors that may arise below the query round trip.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("No directory-service pool is configured: pass a pool name or set MUSTER_POOL.")]
    NoPool,

    #[error("Could not resolve pool address {0}.")]
    Resolve(String),

    #[error("Could not encode query.")]
    Encode(#[from] EncodeError),

    #[error("Could not parse response.")]
    Parse(#[from] ParseError),

    #[error("Response answers message {got}, expected {sent}.")]
    IdMismatch { sent: u16, got: u16 },

    #[error("Response too large: {0} bytes.")]
    OversizedResponse(u32),

    #[error("IO error during the directory round trip.")]
    Io(#[from] std::io::Error),
}

/// A session with one directory-service pool.
///
/// A session owns at most one underlying socket for its whole lifetime: the
/// socket is opened on the first [`execute()`](Self::execute) call, reused by
/// every later call, and closed when the session is dropped. It is never
/// re-acquired per query, and a round trip that fails is not retried.
///
/// Calls on a session are serialized through that one socket; `execute` takes
/// `&mut self`, so sharing a session across threads requires external
/// synchronization.
#[derive(Debug)]
pub struct Session {
    pool: Option<String>,
    connection_type: ConnectionType,
    conn: Option<Conn>,
}

#[derive(Debug)]
enum Conn {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Session {
    /// Creates a session bound to the given pool, or to the locally
    /// configured default pool (the `MUSTER_POOL` environment variable) if
    /// `pool` is [`None`].
    ///
    /// No resolution or connection happens here; a misconfigured pool
    /// surfaces on the first `execute` call.
    pub fn new(pool: Option<&str>, connection_type: ConnectionType) -> Self {
        Self {
            pool: pool.map(str::to_string),
            connection_type,
            conn: None,
        }
    }

    /// The pool name this session was constructed with, if any.
    pub fn pool(&self) -> Option<&str> {
        self.pool.as_deref()
    }

    /// Performs one blocking query round trip over the session's socket and
    /// returns the service's status together with the raw ad stream.
    pub fn execute(&mut self, query: &Query) -> Result<(ResultStatus, RawAdStream), NetError> {
        self.connect()?;

        let msg_id: u16 = rand::random();
        let data = query.encode(msg_id)?;

        let raw = match self.conn.as_mut() {
            Some(Conn::Tcp(stream)) => exchange_tcp(stream, &data)?,
            Some(Conn::Udp(socket)) => exchange_udp(socket, &data)?,
            None => unreachable!("connect() establishes the session socket"),
        };

        let response = Response::parse(raw)?;
        if response.msg_id != msg_id {
            return Err(NetError::IdMismatch {
                sent: msg_id,
                got: response.msg_id,
            });
        }

        debug!(
            status = %response.status,
            ads = response.ads.remaining(),
            "query round trip complete"
        );
        Ok((response.status, response.ads))
    }

    fn connect(&mut self) -> Result<(), NetError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let addr = self.pool_addr()?;
        let conn = match self.connection_type {
            ConnectionType::Tcp => {
                let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
                stream.set_write_timeout(Some(Duration::new(2, 0)))?;
                stream.set_read_timeout(Some(Duration::new(10, 0)))?;
                debug!(%addr, "connected to pool via TCP");
                Conn::Tcp(stream)
            }
            ConnectionType::Udp => {
                // match the bind address family to the pool's, as binding to ::
                // and sending to an IPv4 address misbehaves on some platforms
                let bind_addr = if addr.is_ipv6() { "::" } else { "0.0.0.0" };
                let socket = UdpSocket::bind((bind_addr, 0))?;
                socket.set_write_timeout(Some(Duration::new(2, 0)))?;
                socket.set_read_timeout(Some(Duration::new(10, 0)))?;
                socket.connect(addr)?;
                debug!(%addr, "connected to pool via UDP");
                Conn::Udp(socket)
            }
        };
        self.conn = Some(conn);
        Ok(())
    }

    fn pool_addr(&self) -> Result<SocketAddr, NetError> {
        let spec = match &self.pool {
            Some(pool) => pool.clone(),
            None => env::var(POOL_ENV).map_err(|_| NetError::NoPool)?,
        };
        let spec = if spec.contains(':') {
            spec
        } else {
            format!("{}:{}", spec, DEFAULT_PORT)
        };
        spec.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(NetError::Resolve(spec))
    }
}

fn exchange_tcp(stream: &mut TcpStream, data: &[u8]) -> Result<Vec<u8>, NetError> {
    let mut msg = Vec::with_capacity(data.len() + 4);
    msg.write_u32::<NetworkEndian>(data.len() as u32)?;
    msg.extend_from_slice(data);
    stream.write_all(&msg)?;

    let mut lenbuf = [0u8; 4];
    stream.read_exact(&mut lenbuf)?;
    let len = u32::from_be_bytes(lenbuf);
    if len > MAX_RESPONSE_SIZE {
        return Err(NetError::OversizedResponse(len));
    }

    let mut res = vec![0; len as usize];
    stream.read_exact(&mut res)?;
    Ok(res)
}

fn exchange_udp(socket: &UdpSocket, data: &[u8]) -> Result<Vec<u8>, NetError> {
    socket.send(data)?;

    let mut res = vec![0; UDP_BUFSIZE as usize];
    let bytes_recvd = socket.recv(&mut res)?;
    res.truncate(bytes_recvd);
    Ok(res)
}
