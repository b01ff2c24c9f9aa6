use courier_transport::socket::{SocketPattern, TransportError};
use thiserror::Error;

/// Errors that can occur in the in-memory transport.
#[derive(Debug, Error)]
pub enum Error {
    /// The address already has a live listener.
    #[error("address already in use: {0}")]
    AddrInUse(String),

    /// The socket was closed.
    #[error("socket closed")]
    Closed,

    /// The operation needs a prior connect or bind.
    #[error("socket not connected")]
    NotConnected,

    /// A reply was attempted with no peer awaiting one.
    #[error("no peer awaiting a reply")]
    NoPeer,

    /// The socket's broker channel went away underneath it.
    #[error("detached from broker")]
    Detached,

    /// A multi-part send needs exactly an identity and a payload frame.
    #[error("expected identity and payload frames")]
    MalformedFrames,

    /// The operation is not defined for this socket pattern.
    #[error("operation not supported for {0:?} sockets")]
    Unsupported(SocketPattern),
}

impl TransportError for Error {}
