mod error;

pub use error::Error;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_transport::endpoint::Endpoint;
use courier_transport::socket::{Interest, Socket, SocketPattern, Transport};
use tokio::sync::Mutex;
use tokio::task::yield_now;
use tracing::{debug, warn};

/// Options for the multi-peer inbox.
#[derive(Clone, Debug)]
pub struct InboxOptions {
    /// Poll window per iteration.
    pub poll_timeout: Duration,
    /// Linger applied to the listening socket.
    pub linger: Duration,
}

impl Default for InboxOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(2),
            linger: Duration::from_secs(2),
        }
    }
}

/// Handles one demultiplexed inbox message.
///
/// Handlers are dispatched as independent tasks, unordered relative to
/// subsequent receives. A `Some` return is sent back to the peer via
/// [`AsyncInbox::return_msg`].
#[async_trait]
pub trait InboxHandler
where
    Self: Send + Sync + 'static,
{
    /// Produces an optional reply to a message from `identity`.
    async fn handle(&self, identity: Bytes, payload: Bytes) -> Option<Bytes>;
}

/// Default handler: echoes the payload back to its sender.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoInboxHandler;

#[async_trait]
impl InboxHandler for EchoInboxHandler {
    async fn handle(&self, _identity: Bytes, payload: Bytes) -> Option<Bytes> {
        Some(payload)
    }
}

/// Router-style inbox that demultiplexes inbound peer identities and
/// dispatches each message to a concurrent handler task.
///
/// The listening endpoint is the construction address with its id replaced
/// by the wildcard bind marker; the caller's endpoint is left untouched.
#[derive(Debug)]
pub struct AsyncInbox<T, H = EchoInboxHandler>
where
    T: Transport,
    H: InboxHandler,
{
    transport: T,
    address: Endpoint,
    handler: Arc<H>,
    options: InboxOptions,
    socket: Arc<Mutex<Option<Arc<T::Socket>>>>,
    running: Arc<AtomicBool>,
}

impl<T, H> Clone for AsyncInbox<T, H>
where
    T: Transport,
    H: InboxHandler,
{
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            address: self.address.clone(),
            handler: Arc::clone(&self.handler),
            options: self.options.clone(),
            socket: Arc::clone(&self.socket),
            running: Arc::clone(&self.running),
        }
    }
}

impl<T> AsyncInbox<T>
where
    T: Transport,
{
    /// Creates an inbox with the default echo handler.
    pub fn new(transport: T, endpoint: &Endpoint, options: InboxOptions) -> Self {
        Self::with_handler(transport, endpoint, options, EchoInboxHandler)
    }
}

impl<T, H> AsyncInbox<T, H>
where
    T: Transport,
    H: InboxHandler,
{
    /// Creates an inbox with a custom handler.
    pub fn with_handler(transport: T, endpoint: &Endpoint, options: InboxOptions, handler: H) -> Self {
        Self {
            transport,
            address: endpoint.wildcard(),
            handler: Arc::new(handler),
            options,
            socket: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The wildcard-bound listening address.
    #[must_use]
    pub const fn address(&self) -> &Endpoint {
        &self.address
    }

    /// Binds the listening endpoint and serves until [`stop`](Self::stop)
    /// is observed at an iteration boundary.
    ///
    /// Handler tasks dispatched before the stop are neither cancelled nor
    /// awaited and may outlive this call.
    ///
    /// # Errors
    /// Fails when the initial bind or a rebind after a transport error
    /// cannot be completed.
    pub async fn serve(&self) -> Result<(), Error<T::Error>> {
        self.ensure_socket().await?;
        self.running.store(true, Ordering::SeqCst);
        debug!(address = %self.address, "inbox running");

        while self.running.load(Ordering::SeqCst) {
            let socket = self.ensure_socket().await?;
            match self.poll_next(&socket).await {
                Ok(Some((identity, payload))) => self.dispatch(identity, payload),
                Ok(None) => {}
                Err(error) => {
                    warn!(address = %self.address, %error, "inbox socket failed, recreating");
                    self.teardown(&socket).await;
                }
            }
        }

        let socket = self.socket.lock().await.take();
        if let Some(socket) = socket {
            socket.close().await;
        }
        debug!(address = %self.address, "inbox stopped");
        Ok(())
    }

    /// Requests a stop, observed at the next iteration boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Sends a two-frame reply to `identity`, recreating the socket and
    /// retrying the same send until it succeeds.
    pub async fn return_msg(&self, identity: Bytes, payload: Bytes) {
        loop {
            let socket = match self.ensure_socket().await {
                Ok(socket) => socket,
                Err(error) => {
                    warn!(address = %self.address, %error, "inbox socket recreate failed, retrying");
                    yield_now().await;
                    continue;
                }
            };
            match socket
                .send_multipart(vec![identity.clone(), payload.clone()])
                .await
            {
                Ok(()) => return,
                Err(error) => {
                    warn!(address = %self.address, %error, "reply send failed, recreating socket");
                    self.teardown(&socket).await;
                }
            }
        }
    }

    fn dispatch(&self, identity: Bytes, payload: Bytes) {
        let inbox = self.clone();
        tokio::spawn(async move {
            if let Some(reply) = inbox.handler.handle(identity.clone(), payload).await {
                inbox.return_msg(identity, reply).await;
            }
        });
    }

    async fn poll_next(&self, socket: &T::Socket) -> Result<Option<(Bytes, Bytes)>, T::Error> {
        if !socket.poll(self.options.poll_timeout, Interest::Readable).await? {
            return Ok(None);
        }
        let mut frames = socket.recv_multipart().await?;
        match (frames.pop(), frames.pop(), frames.is_empty()) {
            (Some(payload), Some(identity), true) => Ok(Some((identity, payload))),
            _ => {
                warn!(address = %self.address, "dropping message without identity and payload frames");
                Ok(None)
            }
        }
    }

    /// Returns the live listening socket, creating and binding one if none
    /// exists. Creation is serialized through the socket slot so concurrent
    /// recoveries converge on a single replacement.
    async fn ensure_socket(&self) -> Result<Arc<T::Socket>, Error<T::Error>> {
        let mut slot = self.socket.lock().await;
        if let Some(socket) = slot.as_ref() {
            return Ok(Arc::clone(socket));
        }
        let socket = self.transport.open(SocketPattern::Router).await?;
        socket.set_linger(self.options.linger);
        socket.bind(&self.address).await?;
        let socket = Arc::new(socket);
        *slot = Some(Arc::clone(&socket));
        Ok(socket)
    }

    /// Discards `socket`, then clears the shared slot if it still holds
    /// this exact socket. Closing before clearing keeps the bound address
    /// occupied until it is actually free, so a concurrent
    /// [`ensure_socket`](Self::ensure_socket) never races the rebind.
    async fn teardown(&self, socket: &Arc<T::Socket>) {
        socket.close().await;
        let mut slot = self.socket.lock().await;
        if slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, socket))
        {
            *slot = None;
        }
    }
}
