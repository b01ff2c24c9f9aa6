use courier_transport::socket::TransportError;
use thiserror::Error;

/// Errors that can occur in the request-reply server.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: TransportError,
{
    /// A bind or rebind of the reply endpoint failed.
    #[error("transport failure: {0}")]
    Transport(#[from] E),
}
