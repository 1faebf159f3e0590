//! Client-facing connection wrapper.
//!
//! A [`TransportSocket`] owns one TCP stream in non-blocking mode. It never
//! waits for network I/O except for the bounded initial connect; everything
//! else happens in [`TransportSocket::poll`], which the owning reactor loop
//! calls once per tick. `poll` flushes buffered output, reads whatever is
//! available, and returns the events produced since the previous call in
//! the order they happened.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, DecodeError, EncodeError};
use crate::frame::{encode_frame, FrameBuffer, DEFAULT_MAX_FRAME_SIZE};
use crate::value::Value;

const READ_CHUNK: usize = 16 * 1024;

/// Host alias accepted by [`TransportSocket::connect`] for the loopback interface.
pub const LOCAL_HOST: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    Refused,
    Timeout,
    Unreachable,
    HostNotFound,
    Other,
}

impl ConnectErrorKind {
    fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectErrorKind::Refused,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectErrorKind::Timeout,
            io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable => ConnectErrorKind::Unreachable,
            _ => ConnectErrorKind::Other,
        }
    }
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectErrorKind::Refused => "connection refused",
            ConnectErrorKind::Timeout => "connection timed out",
            ConnectErrorKind::Unreachable => "host unreachable",
            ConnectErrorKind::HostNotFound => "host not found",
            ConnectErrorKind::Other => "connection failed",
        };
        f.write_str(label)
    }
}

/// Classification carried by [`SocketEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketErrorKind {
    Connect(ConnectErrorKind),
    /// The peer sent a frame whose payload could not be decoded. The frame
    /// is dropped; the connection stays usable.
    MalformedPayload,
    /// The peer announced a frame above the size limit. The receive buffer
    /// is discarded and the socket enters [`SocketState::Error`].
    FrameTooLarge,
    Io(io::ErrorKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connected,
    Disconnected,
    Received(Value),
    Error(SocketErrorKind),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("cannot connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: ConnectErrorKind,
    },
    #[error("socket is not connected")]
    NotConnected,
    #[error("socket is already connected")]
    AlreadyConnected,
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("socket setup failed: {0}")]
    Io(#[from] io::Error),
}

/// Tunables shared by client sockets and sockets handed out by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    pub connect_timeout: Duration,
    pub max_frame_size: u32,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(2000),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug)]
pub struct TransportSocket {
    stream: Option<TcpStream>,
    state: SocketState,
    peer: Option<SocketAddr>,
    inbound: FrameBuffer,
    outbound: Vec<u8>,
    events: VecDeque<SocketEvent>,
    bytes_written: u64,
    options: SocketOptions,
}

impl Default for TransportSocket {
    fn default() -> Self {
        Self::new(SocketOptions::default())
    }
}

impl TransportSocket {
    pub fn new(options: SocketOptions) -> Self {
        Self {
            stream: None,
            state: SocketState::Idle,
            peer: None,
            inbound: FrameBuffer::new(options.max_frame_size),
            outbound: Vec::new(),
            events: VecDeque::new(),
            bytes_written: 0,
            options,
        }
    }

    /// Wrap an already established stream (an accepted inbound connection).
    pub fn from_stream(stream: TcpStream, options: SocketOptions) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(target: "imperia::net", error = %err, "socket.nodelay_failed");
        }
        let peer = stream.peer_addr().ok();
        let mut socket = Self::new(options);
        socket.stream = Some(stream);
        socket.peer = peer;
        socket.state = SocketState::Connected;
        Ok(socket)
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SocketState::Connected
    }

    pub fn peer_address(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Total bytes handed to the operating system so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes queued locally because the OS buffer was full.
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    /// Connect to `host:port`, waiting at most the configured connect timeout.
    ///
    /// The outcome is also queued as a [`SocketEvent`] for the next `poll`.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if matches!(self.state, SocketState::Connecting | SocketState::Connected) {
            return Err(TransportError::AlreadyConnected);
        }
        self.reset_connection();
        self.state = SocketState::Connecting;
        let target = if host == LOCAL_HOST { "127.0.0.1" } else { host };
        info!(target: "imperia::net", host = target, port, "socket.connecting");

        let addrs: Vec<SocketAddr> = match (target, port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(err) => {
                debug!(
                    target: "imperia::net",
                    host = target,
                    error = %err,
                    "socket.resolve_failed"
                );
                Vec::new()
            }
        };
        if addrs.is_empty() {
            return self.fail_connect(host, port, ConnectErrorKind::HostNotFound);
        }

        let mut reason = ConnectErrorKind::Other;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.options.connect_timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(target: "imperia::net", error = %err, "socket.nodelay_failed");
                    }
                    self.stream = Some(stream);
                    self.peer = Some(addr);
                    self.state = SocketState::Connected;
                    self.events.push_back(SocketEvent::Connected);
                    info!(target: "imperia::net", %addr, "socket.connected");
                    return Ok(());
                }
                Err(err) => {
                    reason = ConnectErrorKind::classify(&err);
                    debug!(
                        target: "imperia::net",
                        %addr,
                        error = %err,
                        "socket.connect_attempt_failed"
                    );
                }
            }
        }
        self.fail_connect(host, port, reason)
    }

    /// Close the connection. Any partially received frame is discarded.
    /// Calling this on a socket that is not open does nothing.
    pub fn disconnect(&mut self) {
        if matches!(self.state, SocketState::Idle | SocketState::Disconnected) {
            return;
        }
        if self.state == SocketState::Connected {
            self.flush_outbound();
        }
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.inbound.clear();
        self.outbound.clear();
        self.state = SocketState::Disconnected;
        self.events.push_back(SocketEvent::Disconnected);
        info!(target: "imperia::net", peer = ?self.peer, "socket.disconnected");
    }

    /// Encode `value`, frame it and queue it for writing.
    ///
    /// There is no flow control: output the OS does not accept right away is
    /// held in memory until a later `send` or `poll` can write it.
    pub fn send(&mut self, value: &Value) -> Result<(), TransportError> {
        if self.state != SocketState::Connected {
            return Err(TransportError::NotConnected);
        }
        let payload = codec::encode(value)?;
        let frame = encode_frame(&payload, self.options.max_frame_size)?;
        trace!(target: "imperia::net", bytes = frame.len(), "frame.queued");
        self.outbound.extend_from_slice(&frame);
        self.flush_outbound();
        Ok(())
    }

    /// Run one reactor tick and return the events it produced.
    pub fn poll(&mut self) -> Vec<SocketEvent> {
        if self.state == SocketState::Connected {
            self.flush_outbound();
        }
        if self.state == SocketState::Connected {
            self.read_available();
        }
        self.events.drain(..).collect()
    }

    fn read_available(&mut self) {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return;
            };
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.remote_closed();
                    return;
                }
                Ok(read) => {
                    trace!(target: "imperia::net", bytes = read, "socket.read");
                    self.inbound.push(&chunk[..read]);
                    if !self.drain_frames() {
                        return;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.io_failure(err);
                    return;
                }
            }
        }
    }

    /// Decode every complete frame. Returns `false` once the stream is unusable.
    fn drain_frames(&mut self) -> bool {
        loop {
            match self.inbound.next_frame() {
                Ok(Some(payload)) => match codec::decode(&payload) {
                    Ok(value) => self.events.push_back(SocketEvent::Received(value)),
                    Err(err) => {
                        warn!(
                            target: "imperia::net",
                            peer = ?self.peer,
                            error = %err,
                            "frame.decode_failed"
                        );
                        self.events
                            .push_back(SocketEvent::Error(SocketErrorKind::MalformedPayload));
                    }
                },
                Ok(None) => return true,
                Err(err @ DecodeError::FrameTooLarge { .. }) => {
                    warn!(
                        target: "imperia::net",
                        peer = ?self.peer,
                        error = %err,
                        "frame.rejected"
                    );
                    self.inbound.clear();
                    self.state = SocketState::Error;
                    self.events
                        .push_back(SocketEvent::Error(SocketErrorKind::FrameTooLarge));
                    return false;
                }
                Err(err) => {
                    warn!(target: "imperia::net", peer = ?self.peer, error = %err, "frame.invalid");
                    self.events
                        .push_back(SocketEvent::Error(SocketErrorKind::MalformedPayload));
                    return true;
                }
            }
        }
    }

    fn flush_outbound(&mut self) {
        while !self.outbound.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                return;
            };
            match stream.write(&self.outbound) {
                Ok(0) => {
                    self.io_failure(io::Error::from(io::ErrorKind::WriteZero));
                    return;
                }
                Ok(written) => {
                    self.outbound.drain(..written);
                    self.bytes_written += written as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.io_failure(err);
                    return;
                }
            }
        }
    }

    fn remote_closed(&mut self) {
        if self.inbound.buffered() > 0 {
            debug!(
                target: "imperia::net",
                peer = ?self.peer,
                bytes = self.inbound.buffered(),
                "socket.partial_frame_discarded"
            );
        }
        self.stream = None;
        self.inbound.clear();
        self.outbound.clear();
        self.state = SocketState::Disconnected;
        self.events.push_back(SocketEvent::Disconnected);
        info!(target: "imperia::net", peer = ?self.peer, "socket.closed_by_peer");
    }

    fn io_failure(&mut self, err: io::Error) {
        warn!(target: "imperia::net", peer = ?self.peer, error = %err, "socket.error");
        self.state = SocketState::Error;
        self.events
            .push_back(SocketEvent::Error(SocketErrorKind::Io(err.kind())));
    }

    fn fail_connect(
        &mut self,
        host: &str,
        port: u16,
        reason: ConnectErrorKind,
    ) -> Result<(), TransportError> {
        warn!(target: "imperia::net", host, port, %reason, "socket.connect_failed");
        self.state = SocketState::Error;
        self.events
            .push_back(SocketEvent::Error(SocketErrorKind::Connect(reason)));
        Err(TransportError::Connect {
            host: host.to_string(),
            port,
            reason,
        })
    }

    fn reset_connection(&mut self) {
        self.stream = None;
        self.peer = None;
        self.inbound.clear();
        self.outbound.clear();
    }
}
