use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_transport::endpoint::Endpoint;
use courier_transport::socket::{Interest, Socket, SocketPattern};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;
use crate::registry::{Envelope, Listener, REGISTRY, TOPIC_CAPACITY, route_key};

/// Receive-side state; held only while polling or receiving so sends on the
/// same socket are never blocked behind a poll window.
#[derive(Debug, Default)]
struct RecvState {
    sub_rx: Option<broadcast::Receiver<Bytes>>,
    inbound_rx: Option<mpsc::UnboundedReceiver<Envelope>>,
    reply_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    pending_sub: Option<Bytes>,
    pending_envelope: Option<Envelope>,
    pending_reply: Option<Bytes>,
}

/// Send-side state.
#[derive(Debug, Default)]
struct SendState {
    topic_tx: Option<broadcast::Sender<Bytes>>,
    target: Option<String>,
    reply_tx: Option<mpsc::UnboundedSender<Bytes>>,
    current_peer: Option<mpsc::UnboundedSender<Bytes>>,
    bound: Option<String>,
}

/// A socket backed by the process-global broker registry.
#[derive(Debug)]
pub struct MemorySocket {
    pattern: SocketPattern,
    handle: Uuid,
    identity: Bytes,
    closed: AtomicBool,
    linger: StdMutex<Duration>,
    filters: StdMutex<Vec<Bytes>>,
    recv_state: Mutex<RecvState>,
    send_state: Mutex<SendState>,
}

impl MemorySocket {
    pub(crate) fn new(pattern: SocketPattern) -> Self {
        let handle = Uuid::new_v4();
        Self {
            pattern,
            handle,
            identity: Bytes::copy_from_slice(handle.as_bytes()),
            closed: AtomicBool::new(false),
            linger: StdMutex::new(Duration::ZERO),
            filters: StdMutex::new(Vec::new()),
            recv_state: Mutex::new(RecvState::default()),
            send_state: Mutex::new(SendState::default()),
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn matches_filter(&self, payload: &[u8]) -> bool {
        self.filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|filter| payload.starts_with(filter))
    }

    async fn poll_readable(&self, window: Duration) -> Result<bool, Error> {
        let mut recv = self.recv_state.lock().await;
        match self.pattern {
            SocketPattern::Sub => {
                if recv.pending_sub.is_some() {
                    return Ok(true);
                }
                let deadline = Instant::now() + window;
                loop {
                    let rx = recv.sub_rx.as_mut().ok_or(Error::NotConnected)?;
                    match timeout_at(deadline, rx.recv()).await {
                        Err(_) => return Ok(false),
                        Ok(Ok(payload)) => {
                            if self.matches_filter(&payload) {
                                recv.pending_sub = Some(payload);
                                return Ok(true);
                            }
                        }
                        Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                        Ok(Err(broadcast::error::RecvError::Closed)) => {
                            return Err(Error::Detached);
                        }
                    }
                }
            }
            SocketPattern::Rep | SocketPattern::Router => {
                if recv.pending_envelope.is_some() {
                    return Ok(true);
                }
                let rx = recv.inbound_rx.as_mut().ok_or(Error::NotConnected)?;
                match timeout(window, rx.recv()).await {
                    Err(_) => Ok(false),
                    Ok(Some(envelope)) => {
                        recv.pending_envelope = Some(envelope);
                        Ok(true)
                    }
                    Ok(None) => Err(Error::Detached),
                }
            }
            SocketPattern::Req | SocketPattern::Dealer => {
                if recv.pending_reply.is_some() {
                    return Ok(true);
                }
                let rx = recv.reply_rx.as_mut().ok_or(Error::NotConnected)?;
                match timeout(window, rx.recv()).await {
                    Err(_) => Ok(false),
                    Ok(Some(payload)) => {
                        recv.pending_reply = Some(payload);
                        Ok(true)
                    }
                    Ok(None) => Err(Error::Detached),
                }
            }
            SocketPattern::Pub => Ok(false),
        }
    }

    async fn next_envelope(&self) -> Result<Envelope, Error> {
        let mut recv = self.recv_state.lock().await;
        if let Some(envelope) = recv.pending_envelope.take() {
            return Ok(envelope);
        }
        let rx = recv.inbound_rx.as_mut().ok_or(Error::NotConnected)?;
        rx.recv().await.ok_or(Error::Detached)
    }
}

#[async_trait]
impl Socket for MemorySocket {
    type Error = Error;

    async fn connect(&self, endpoint: &Endpoint) -> Result<(), Error> {
        self.ensure_open()?;
        let key = route_key(endpoint);
        match self.pattern {
            SocketPattern::Sub => {
                let rx = {
                    let mut registry = REGISTRY.lock().await;
                    registry
                        .topics
                        .entry(key)
                        .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
                        .subscribe()
                };
                self.recv_state.lock().await.sub_rx = Some(rx);
            }
            SocketPattern::Req | SocketPattern::Dealer => {
                let (reply_tx, reply_rx) = mpsc::unbounded_channel();
                self.recv_state.lock().await.reply_rx = Some(reply_rx);
                let mut send = self.send_state.lock().await;
                send.target = Some(key);
                send.reply_tx = Some(reply_tx);
            }
            pattern => return Err(Error::Unsupported(pattern)),
        }
        debug!(socket = %self.handle, %endpoint, "memory socket connected");
        Ok(())
    }

    async fn bind(&self, endpoint: &Endpoint) -> Result<(), Error> {
        self.ensure_open()?;
        let key = route_key(endpoint);
        match self.pattern {
            SocketPattern::Pub => {
                let tx = {
                    let mut registry = REGISTRY.lock().await;
                    registry
                        .topics
                        .entry(key)
                        .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
                        .clone()
                };
                self.send_state.lock().await.topic_tx = Some(tx);
            }
            SocketPattern::Rep | SocketPattern::Router => {
                let (tx, rx) = mpsc::unbounded_channel();
                {
                    let mut registry = REGISTRY.lock().await;
                    if registry.listeners.contains_key(&key) {
                        return Err(Error::AddrInUse(key));
                    }
                    registry.listeners.insert(
                        key.clone(),
                        Listener {
                            owner: self.handle,
                            tx,
                        },
                    );
                }
                self.recv_state.lock().await.inbound_rx = Some(rx);
                self.send_state.lock().await.bound = Some(key);
            }
            pattern => return Err(Error::Unsupported(pattern)),
        }
        debug!(socket = %self.handle, %endpoint, "memory socket bound");
        Ok(())
    }

    fn set_linger(&self, linger: Duration) {
        *self.linger.lock().unwrap_or_else(PoisonError::into_inner) = linger;
    }

    fn subscribe(&self, filter: Bytes) {
        self.filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(filter);
    }

    async fn poll(&self, timeout: Duration, interest: Interest) -> Result<bool, Error> {
        self.ensure_open()?;
        match interest {
            Interest::Writable => Ok(true),
            Interest::Readable => self.poll_readable(timeout).await,
        }
    }

    async fn send(&self, payload: Bytes) -> Result<(), Error> {
        self.ensure_open()?;
        match self.pattern {
            SocketPattern::Pub => {
                let send = self.send_state.lock().await;
                let tx = send.topic_tx.as_ref().ok_or(Error::NotConnected)?;
                // No receivers is fine; pub drops on the floor.
                let _ = tx.send(payload);
                Ok(())
            }
            SocketPattern::Req | SocketPattern::Dealer => {
                let send = self.send_state.lock().await;
                let key = send.target.clone().ok_or(Error::NotConnected)?;
                let reply_tx = send.reply_tx.clone().ok_or(Error::NotConnected)?;
                drop(send);

                let mut registry = REGISTRY.lock().await;
                registry
                    .peer_routes
                    .entry(key.clone())
                    .or_default()
                    .insert(self.identity.clone(), reply_tx.clone());
                if let Some(listener) = registry.listeners.get(&key) {
                    let _ = listener.tx.send(Envelope {
                        identity: self.identity.clone(),
                        payload,
                        reply_tx,
                    });
                } else {
                    // Mimics a transport that buffers toward a peer that
                    // never answers; the caller's poll will time out.
                    debug!(%key, "send with no live listener dropped");
                }
                Ok(())
            }
            SocketPattern::Rep => {
                let mut send = self.send_state.lock().await;
                let peer = send.current_peer.take().ok_or(Error::NoPeer)?;
                let _ = peer.send(payload);
                Ok(())
            }
            pattern => Err(Error::Unsupported(pattern)),
        }
    }

    async fn send_multipart(&self, mut frames: Vec<Bytes>) -> Result<(), Error> {
        self.ensure_open()?;
        if self.pattern != SocketPattern::Router {
            return Err(Error::Unsupported(self.pattern));
        }
        let (Some(payload), Some(identity), true) =
            (frames.pop(), frames.pop(), frames.is_empty())
        else {
            return Err(Error::MalformedFrames);
        };

        let key = {
            let send = self.send_state.lock().await;
            send.bound.clone().ok_or(Error::NotConnected)?
        };
        let registry = REGISTRY.lock().await;
        match registry
            .peer_routes
            .get(&key)
            .and_then(|routes| routes.get(&identity))
        {
            Some(tx) => {
                let _ = tx.send(payload);
            }
            // Router drops messages for peers it cannot route to.
            None => debug!(%key, "reply to unknown peer dropped"),
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, Error> {
        self.ensure_open()?;
        match self.pattern {
            SocketPattern::Sub => {
                let mut recv = self.recv_state.lock().await;
                if let Some(payload) = recv.pending_sub.take() {
                    return Ok(payload);
                }
                let rx = recv.sub_rx.as_mut().ok_or(Error::NotConnected)?;
                loop {
                    match rx.recv().await {
                        Ok(payload) if self.matches_filter(&payload) => return Ok(payload),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return Err(Error::Detached),
                    }
                }
            }
            SocketPattern::Rep => {
                let envelope = self.next_envelope().await?;
                self.send_state.lock().await.current_peer = Some(envelope.reply_tx);
                Ok(envelope.payload)
            }
            SocketPattern::Req | SocketPattern::Dealer => {
                let mut recv = self.recv_state.lock().await;
                if let Some(payload) = recv.pending_reply.take() {
                    return Ok(payload);
                }
                let rx = recv.reply_rx.as_mut().ok_or(Error::NotConnected)?;
                rx.recv().await.ok_or(Error::Detached)
            }
            pattern => Err(Error::Unsupported(pattern)),
        }
    }

    async fn recv_multipart(&self) -> Result<Vec<Bytes>, Error> {
        self.ensure_open()?;
        if self.pattern != SocketPattern::Router {
            return Err(Error::Unsupported(self.pattern));
        }
        let envelope = self.next_envelope().await?;
        Ok(vec![envelope.identity, envelope.payload])
    }

    async fn close(&self) {
        // The receive lock is held for the whole cleanup: once any close()
        // call returns, the socket's registry entries are guaranteed gone
        // and its address can be rebound.
        let mut recv = self.recv_state.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *recv = RecvState::default();

        let (bound, target) = {
            let mut send = self.send_state.lock().await;
            let bound = send.bound.take();
            let target = send.target.take();
            *send = SendState::default();
            (bound, target)
        };

        {
            let mut registry = REGISTRY.lock().await;
            if let Some(key) = bound {
                if registry
                    .listeners
                    .get(&key)
                    .is_some_and(|listener| listener.owner == self.handle)
                {
                    registry.listeners.remove(&key);
                }
            }
            if let Some(key) = target {
                if let Some(routes) = registry.peer_routes.get_mut(&key) {
                    routes.remove(&self.identity);
                    if routes.is_empty() {
                        registry.peer_routes.remove(&key);
                    }
                }
            }
        }
        debug!(socket = %self.handle, "memory socket closed");
    }
}
