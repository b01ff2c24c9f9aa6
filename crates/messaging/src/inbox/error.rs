use courier_transport::socket::TransportError;
use thiserror::Error;

/// Errors that can occur in the multi-peer inbox.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: TransportError,
{
    /// A bind or rebind of the listening endpoint failed.
    #[error("transport failure: {0}")]
    Transport(#[from] E),
}
