use std::time::Duration;

use bytes::Bytes;
use courier_transport::endpoint::Endpoint;
use courier_transport::socket::{Interest, Socket, SocketPattern, Transport};
use tracing::debug;

/// Options for [`request`].
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// Poll window for each attempt's reply.
    pub timeout: Duration,
    /// Linger applied to each transient connection.
    pub linger: Duration,
    /// Additional attempts after the first.
    pub retries: usize,
    /// Use a dealer socket instead of a request socket, for talking to
    /// router-style peers.
    pub dealer: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            linger: Duration::from_secs(2),
            retries: 10,
            dealer: false,
        }
    }
}

/// Sends `payload` to `endpoint` over a transient connection and waits for
/// a reply.
///
/// Every timeout or transport error closes the connection and starts the
/// next attempt on a fresh one; nothing is reused across attempts. Once the
/// retry budget is exhausted the outcome is `None`, never an error — the
/// caller decides what exhaustion means.
pub async fn request<T>(
    transport: &T,
    endpoint: &Endpoint,
    payload: Bytes,
    options: &RequestOptions,
) -> Option<Bytes>
where
    T: Transport,
{
    let pattern = if options.dealer {
        SocketPattern::Dealer
    } else {
        SocketPattern::Req
    };

    for attempt in 0..=options.retries {
        match attempt_once(transport, pattern, endpoint, payload.clone(), options).await {
            Ok(Some(reply)) => return Some(reply),
            Ok(None) => debug!(attempt, %endpoint, "request timed out"),
            Err(error) => debug!(attempt, %endpoint, %error, "request attempt failed"),
        }
    }
    None
}

async fn attempt_once<T>(
    transport: &T,
    pattern: SocketPattern,
    endpoint: &Endpoint,
    payload: Bytes,
    options: &RequestOptions,
) -> Result<Option<Bytes>, T::Error>
where
    T: Transport,
{
    let socket = transport.open(pattern).await?;
    socket.set_linger(options.linger);

    let outcome = async {
        socket.connect(endpoint).await?;
        socket.send(payload).await?;
        if socket.poll(options.timeout, Interest::Readable).await? {
            Ok(Some(socket.recv().await?))
        } else {
            Ok(None)
        }
    }
    .await;

    socket.close().await;
    outcome
}
