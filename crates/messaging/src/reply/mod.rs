mod error;

pub use error::Error;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use courier_transport::endpoint::Endpoint;
use courier_transport::socket::{Interest, Socket, SocketPattern, Transport};
use tracing::{debug, warn};

/// Options for the request-reply server.
#[derive(Clone, Debug)]
pub struct ReplyOptions {
    /// Poll window per iteration.
    pub poll_timeout: Duration,
    /// Linger applied to the reply socket.
    pub linger: Duration,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(2),
            linger: Duration::from_secs(2),
        }
    }
}

/// Pure request-to-response transformation applied by the server.
///
/// Handlers must be synchronous and must not perform I/O of their own; they
/// only turn request bytes into response bytes. `None` is substituted with
/// an empty response.
pub trait ReplyHandler
where
    Self: Send + Sync + 'static,
{
    /// Transforms one request payload.
    fn handle_msg(&self, msg: Bytes) -> Option<Bytes>;
}

/// Default handler: echoes the request payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

impl ReplyHandler for EchoHandler {
    fn handle_msg(&self, msg: Bytes) -> Option<Bytes> {
        Some(msg)
    }
}

impl<F> ReplyHandler for F
where
    F: Fn(Bytes) -> Option<Bytes> + Send + Sync + 'static,
{
    fn handle_msg(&self, msg: Bytes) -> Option<Bytes> {
        self(msg)
    }
}

/// Serves one request at a time at a bound reply endpoint.
///
/// Any transport error inside the loop is recovered by closing the socket
/// and rebinding a fresh one at the same address; the in-flight request, if
/// any, is dropped rather than retried.
#[derive(Debug)]
pub struct RequestReplyService<T, H = EchoHandler>
where
    T: Transport,
    H: ReplyHandler,
{
    transport: T,
    address: Endpoint,
    handler: Arc<H>,
    options: ReplyOptions,
    running: Arc<AtomicBool>,
}

impl<T, H> Clone for RequestReplyService<T, H>
where
    T: Transport,
    H: ReplyHandler,
{
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            address: self.address.clone(),
            handler: Arc::clone(&self.handler),
            options: self.options.clone(),
            running: Arc::clone(&self.running),
        }
    }
}

impl<T> RequestReplyService<T>
where
    T: Transport,
{
    /// Creates a server with the default echo handler.
    pub fn new(transport: T, endpoint: &Endpoint, options: ReplyOptions) -> Self {
        Self::with_handler(transport, endpoint, options, EchoHandler)
    }
}

impl<T, H> RequestReplyService<T, H>
where
    T: Transport,
    H: ReplyHandler,
{
    /// Creates a server with a custom handler.
    pub fn with_handler(transport: T, endpoint: &Endpoint, options: ReplyOptions, handler: H) -> Self {
        Self {
            transport,
            address: endpoint.clone(),
            handler: Arc::new(handler),
            options,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The served reply address.
    #[must_use]
    pub const fn address(&self) -> &Endpoint {
        &self.address
    }

    /// Binds the reply endpoint and serves until [`stop`](Self::stop) is
    /// observed at an iteration boundary.
    ///
    /// # Errors
    /// Fails when the initial bind or a rebind after a transport error
    /// cannot be completed.
    pub async fn serve(&self) -> Result<(), Error<T::Error>> {
        let mut socket = self.bind_socket().await?;
        self.running.store(true, Ordering::SeqCst);
        debug!(address = %self.address, "reply server running");

        while self.running.load(Ordering::SeqCst) {
            if let Err(error) = self.serve_once(&socket).await {
                warn!(address = %self.address, %error, "reply socket failed, rebinding");
                socket.close().await;
                socket = self.bind_socket().await?;
            }
        }

        socket.close().await;
        debug!(address = %self.address, "reply server stopped");
        Ok(())
    }

    /// Requests a stop, observed at the next iteration boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn bind_socket(&self) -> Result<T::Socket, T::Error> {
        let socket = self.transport.open(SocketPattern::Rep).await?;
        socket.set_linger(self.options.linger);
        socket.bind(&self.address).await?;
        Ok(socket)
    }

    async fn serve_once(&self, socket: &T::Socket) -> Result<(), T::Error> {
        if socket.poll(self.options.poll_timeout, Interest::Readable).await? {
            let msg = socket.recv().await?;
            let response = self.handler.handle_msg(msg).unwrap_or_default();
            socket.poll(self.options.poll_timeout, Interest::Writable).await?;
            socket.send(response).await?;
        }
        Ok(())
    }
}
