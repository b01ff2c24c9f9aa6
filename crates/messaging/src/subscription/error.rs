use courier_transport::socket::TransportError;
use thiserror::Error;

/// Errors that can occur in the subscription multiplexer.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: TransportError,
{
    /// A transport failure that could not be recovered in place.
    #[error("transport failure: {0}")]
    Transport(#[from] E),
}
