//! Server-side acceptor.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::socket::{SocketOptions, TransportError, TransportSocket};

/// Which interfaces a listener binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenScope {
    #[default]
    Local,
    Any,
}

impl ListenScope {
    pub fn address(self) -> IpAddr {
        match self {
            ListenScope::Local => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ListenScope::Any => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl fmt::Display for ListenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenScope::Local => f.write_str("local"),
            ListenScope::Any => f.write_str("any"),
        }
    }
}

impl FromStr for ListenScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ListenScope::Local),
            "any" => Ok(ListenScope::Any),
            other => Err(format!("unknown listen scope {other:?} (expected local or any)")),
        }
    }
}

#[derive(Debug)]
pub enum ListenerEvent {
    NewClient(TransportSocket),
    AcceptError(io::ErrorKind),
}

#[derive(Debug, Default)]
pub struct TransportListener {
    listener: Option<TcpListener>,
    scope: Option<ListenScope>,
    options: SocketOptions,
}

impl TransportListener {
    /// `options` are applied to every accepted client socket.
    pub fn new(options: SocketOptions) -> Self {
        Self {
            listener: None,
            scope: None,
            options,
        }
    }

    /// Bind and start listening. Port 0 lets the OS choose; the bound address
    /// is returned. A listener that is already running is closed first.
    pub fn start(&mut self, port: u16, scope: ListenScope) -> Result<SocketAddr, TransportError> {
        self.stop();
        let addr = SocketAddr::new(scope.address(), port);
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Listen { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Listen { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| TransportError::Listen { addr, source })?;
        info!(target: "imperia::net", addr = %local, %scope, "listener.started");
        self.listener = Some(listener);
        self.scope = Some(scope);
        Ok(local)
    }

    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            info!(target: "imperia::net", addr = ?listener.local_addr().ok(), "listener.stopped");
        }
        self.scope = None;
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn scope(&self) -> Option<ListenScope> {
        self.scope
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Accept every pending connection; one event per connection.
    pub fn poll(&mut self) -> Vec<ListenerEvent> {
        let mut events = Vec::new();
        let Some(listener) = self.listener.as_ref() else {
            return events;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => match TransportSocket::from_stream(stream, self.options) {
                    Ok(socket) => {
                        info!(target: "imperia::net", %addr, "listener.client_connected");
                        events.push(ListenerEvent::NewClient(socket));
                    }
                    Err(err) => {
                        warn!(
                            target: "imperia::net",
                            %addr,
                            error = %err,
                            "listener.client_setup_failed"
                        );
                        events.push(ListenerEvent::AcceptError(err.kind()));
                    }
                },
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!(target: "imperia::net", error = %err, "listener.accept_failed");
                    events.push(ListenerEvent::AcceptError(err.kind()));
                    break;
                }
            }
        }
        events
    }
}
