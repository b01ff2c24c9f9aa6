use std::error::Error as StdError;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::endpoint::Endpoint;

/// Marker trait for errors raised by a transport implementation.
pub trait TransportError: StdError + Send + Sync + 'static {}

/// Messaging pattern a socket is opened with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketPattern {
    /// Publishes to every connected subscriber.
    Pub,
    /// Subscribes to one publisher, filtered by payload prefix.
    Sub,
    /// Sends one request at a time and awaits its reply.
    Req,
    /// Serves one request at a time at a bound endpoint.
    Rep,
    /// Listens for many identified peers and routes replies back to them.
    Router,
    /// Connects to a router-style peer under a stable identity.
    Dealer,
}

/// Poll direction for [`Socket::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interest {
    /// A message is ready to be received.
    Readable,
    /// The socket is ready to accept a send.
    Writable,
}

/// A single connection or listener of some [`SocketPattern`].
///
/// Implementations use interior mutability: every method takes `&self` so a
/// handle can be shared between the cooperative tasks that poll and send on
/// it. All I/O methods are suspension points and may fail with the
/// implementation's error type.
#[async_trait]
pub trait Socket
where
    Self: Debug + Send + Sync + 'static,
{
    /// The transport failure type.
    type Error: TransportError;

    /// Connects to a peer endpoint.
    ///
    /// # Errors
    /// Fails if the socket is closed or the pattern cannot connect.
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), Self::Error>;

    /// Binds as a listener at `endpoint`.
    ///
    /// # Errors
    /// Fails if the address already has a live listener, the socket is
    /// closed, or the pattern cannot bind.
    async fn bind(&self, endpoint: &Endpoint) -> Result<(), Self::Error>;

    /// Sets how long pending sends linger after close.
    fn set_linger(&self, linger: Duration);

    /// Adds a payload prefix filter (Sub pattern only); an empty filter
    /// matches every message.
    fn subscribe(&self, filter: Bytes);

    /// Waits up to `timeout` for readiness; `false` means no event.
    ///
    /// # Errors
    /// Fails if the socket is closed or detached from its peer.
    async fn poll(&self, timeout: Duration, interest: Interest) -> Result<bool, Self::Error>;

    /// Sends a single-frame message.
    ///
    /// # Errors
    /// Fails if the socket is closed or has no route for the message.
    async fn send(&self, payload: Bytes) -> Result<(), Self::Error>;

    /// Sends a multi-frame message.
    ///
    /// # Errors
    /// Fails if the socket is closed or has no route for the message.
    async fn send_multipart(&self, frames: Vec<Bytes>) -> Result<(), Self::Error>;

    /// Receives a single-frame message, waiting for one to arrive.
    ///
    /// # Errors
    /// Fails if the socket is closed or detached from its peer.
    async fn recv(&self) -> Result<Bytes, Self::Error>;

    /// Receives every frame of a multi-frame message.
    ///
    /// # Errors
    /// Fails if the socket is closed or detached from its peer.
    async fn recv_multipart(&self) -> Result<Vec<Bytes>, Self::Error>;

    /// Closes the socket. Idempotent; all subsequent I/O fails.
    async fn close(&self);
}

/// Shared connection factory handed to every service.
///
/// The transport is a read-only context: services clone it freely and use it
/// only to open fresh sockets, each of which they own exclusively.
#[async_trait]
pub trait Transport
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The transport failure type.
    type Error: TransportError;

    /// Concrete socket type produced by [`Transport::open`].
    type Socket: Socket<Error = Self::Error>;

    /// Opens a fresh socket of the given pattern, not yet connected or
    /// bound.
    ///
    /// # Errors
    /// Fails if the transport cannot allocate a socket.
    async fn open(&self, pattern: SocketPattern) -> Result<Self::Socket, Self::Error>;
}
