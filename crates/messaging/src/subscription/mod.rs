mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use courier_transport::endpoint::Endpoint;
use courier_transport::socket::{Interest, Socket, SocketPattern, Transport};
use tokio::sync::Mutex;
use tokio::task::yield_now;
use tracing::{debug, warn};

/// Options for the subscription multiplexer.
#[derive(Clone, Debug)]
pub struct SubscriptionOptions {
    /// Poll window given to each connection per pass.
    pub poll_timeout: Duration,
    /// Linger applied to every subscriber socket.
    pub linger: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            linger: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
struct Entry<S> {
    endpoint: Endpoint,
    socket: Arc<S>,
}

/// Fan-in multiplexer over a dynamic set of subscriber connections.
///
/// One cooperative loop polls every tracked connection briefly per pass and
/// appends whatever arrived to the received sequence, keyed by the source
/// address. The subscription set may be mutated while the loop runs:
/// additions join the next pass and removals are deferred to the end of the
/// current one.
#[derive(Debug)]
pub struct SubscriptionService<T>
where
    T: Transport,
{
    transport: T,
    options: SubscriptionOptions,
    subscriptions: Arc<Mutex<HashMap<String, Entry<T::Socket>>>>,
    pending_removals: Arc<Mutex<Vec<Endpoint>>>,
    received: Arc<Mutex<Vec<(Bytes, String)>>>,
    running: Arc<AtomicBool>,
}

impl<T> Clone for SubscriptionService<T>
where
    T: Transport,
{
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            options: self.options.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            pending_removals: Arc::clone(&self.pending_removals),
            received: Arc::clone(&self.received),
            running: Arc::clone(&self.running),
        }
    }
}

impl<T> SubscriptionService<T>
where
    T: Transport,
{
    /// Creates an idle multiplexer over `transport`.
    pub fn new(transport: T, options: SubscriptionOptions) -> Self {
        Self {
            transport,
            options,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            pending_removals: Arc::new(Mutex::new(Vec::new())),
            received: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens a subscriber connection to `endpoint` with the given payload
    /// filter and starts tracking it. An existing entry for the same
    /// address is closed and replaced.
    ///
    /// # Errors
    /// Fails if the connection cannot be opened.
    pub async fn add_subscription(
        &self,
        endpoint: &Endpoint,
        filter: Bytes,
    ) -> Result<(), Error<T::Error>> {
        let socket = self.open_subscriber(endpoint, filter).await?;
        let entry = Entry {
            endpoint: endpoint.clone(),
            socket: Arc::new(socket),
        };
        let previous = self
            .subscriptions
            .lock()
            .await
            .insert(endpoint.to_string(), entry);
        if let Some(previous) = previous {
            previous.socket.close().await;
        }
        Ok(())
    }

    /// Stops tracking `endpoint`. While the serve loop is running the
    /// removal is deferred to the end of the current pass; otherwise the
    /// connection is closed immediately. Removing an untracked address is a
    /// no-op.
    pub async fn remove_subscription(&self, endpoint: &Endpoint) {
        if self.running.load(Ordering::SeqCst) {
            self.pending_removals.lock().await.push(endpoint.clone());
        } else {
            self.destroy_socket(endpoint).await;
        }
    }

    /// Whether `endpoint` is currently tracked.
    pub async fn is_subscribed(&self, endpoint: &Endpoint) -> bool {
        self.subscriptions
            .lock()
            .await
            .contains_key(&endpoint.to_string())
    }

    /// Takes every `(payload, source address)` pair received so far, in
    /// per-pass scan order.
    pub async fn drain_received(&self) -> Vec<(Bytes, String)> {
        self.received.lock().await.drain(..).collect()
    }

    /// Runs the poll loop until [`stop`](Self::stop) is observed at an
    /// iteration boundary.
    ///
    /// # Errors
    /// Fails only when a replacement connection cannot be opened after a
    /// transport error; the error itself is recovered by reconnecting.
    pub async fn serve(&self) -> Result<(), Error<T::Error>> {
        self.running.store(true, Ordering::SeqCst);
        debug!("subscription multiplexer running");

        while self.running.load(Ordering::SeqCst) {
            yield_now().await;

            let entries: Vec<(String, Arc<T::Socket>)> = self
                .subscriptions
                .lock()
                .await
                .iter()
                .map(|(address, entry)| (address.clone(), Arc::clone(&entry.socket)))
                .collect();

            for (address, socket) in entries {
                match Self::poll_once(&socket, self.options.poll_timeout).await {
                    Ok(Some(payload)) => {
                        self.received.lock().await.push((payload, address));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(%address, %error, "subscriber failed, reconnecting");
                        socket.close().await;
                        self.reconnect(&address).await?;
                    }
                }
            }

            let pending: Vec<Endpoint> = self.pending_removals.lock().await.drain(..).collect();
            for endpoint in pending {
                self.destroy_socket(&endpoint).await;
            }
        }

        debug!("subscription multiplexer stopped");
        Ok(())
    }

    /// Requests a stop, observed at the next iteration boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn open_subscriber(
        &self,
        endpoint: &Endpoint,
        filter: Bytes,
    ) -> Result<T::Socket, T::Error> {
        let socket = self.transport.open(SocketPattern::Sub).await?;
        socket.subscribe(filter);
        socket.set_linger(self.options.linger);
        socket.connect(endpoint).await?;
        Ok(socket)
    }

    async fn destroy_socket(&self, endpoint: &Endpoint) {
        let entry = self.subscriptions.lock().await.remove(&endpoint.to_string());
        if let Some(entry) = entry {
            entry.socket.close().await;
        }
    }

    async fn poll_once(socket: &T::Socket, window: Duration) -> Result<Option<Bytes>, T::Error> {
        if socket.poll(window, Interest::Readable).await? {
            Ok(Some(socket.recv().await?))
        } else {
            Ok(None)
        }
    }

    async fn reconnect(&self, address: &str) -> Result<(), Error<T::Error>> {
        let mut subscriptions = self.subscriptions.lock().await;
        let Some(entry) = subscriptions.get_mut(address) else {
            return Ok(());
        };
        let endpoint = entry.endpoint.clone();
        let socket = self.open_subscriber(&endpoint, Bytes::new()).await?;
        entry.socket = Arc::new(socket);
        Ok(())
    }
}
