//! TCP listener ownership.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Classify accept errors (per-connection, resource exhaustion, fatal)
//! - Close the socket exactly once, no matter how many callers ask

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

/// How the accept loop should react to an accept error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorKind {
    /// The failed connection is gone; keep accepting.
    Connection,
    /// Out of descriptors or buffers; back off, then keep accepting.
    Resource,
    /// The listener itself is broken.
    Fatal,
}

/// Classify an error returned by `accept`.
pub fn classify_accept_error(err: &io::Error) -> AcceptErrorKind {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptErrorKind::Connection,
        _ => match err.raw_os_error() {
            // EMFILE, ENFILE, ENOBUFS, ENOMEM
            Some(24) | Some(23) | Some(105) | Some(12) => AcceptErrorKind::Resource,
            _ => AcceptErrorKind::Fatal,
        },
    }
}

/// The webhook listening socket.
#[derive(Debug)]
pub struct Listener {
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to `addr`.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        let local_addr = inner.local_addr()?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self {
            inner: Some(inner),
            local_addr,
        })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        match &self.inner {
            Some(listener) => listener.accept().await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener is closed",
            )),
        }
    }

    /// Address the socket is bound to (resolved if port 0 was requested).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the socket. Returns `true` only for the call that closed it.
    pub fn close(&mut self) -> bool {
        match self.inner.take() {
            Some(listener) => {
                drop(listener);
                tracing::debug!(address = %self.local_addr, "Listener closed");
                true
            }
            None => false,
        }
    }
}
