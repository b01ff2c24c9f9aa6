use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;
use courier_transport::endpoint::{Endpoint, Protocol};
use tokio::sync::{Mutex, broadcast, mpsc};
use uuid::Uuid;

/// Fan-out capacity of one pub-sub topic.
pub(crate) const TOPIC_CAPACITY: usize = 100;

/// One routed request: who sent it, what they sent, where replies go.
#[derive(Clone, Debug)]
pub(crate) struct Envelope {
    pub identity: Bytes,
    pub payload: Bytes,
    pub reply_tx: mpsc::UnboundedSender<Bytes>,
}

/// A live reply/router binding.
#[derive(Clone, Debug)]
pub(crate) struct Listener {
    pub owner: Uuid,
    pub tx: mpsc::UnboundedSender<Envelope>,
}

/// Global broker state shared by every socket in the process.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    /// Pub-sub fan-out channels, created lazily by whichever side arrives
    /// first.
    pub topics: HashMap<String, broadcast::Sender<Bytes>>,
    /// Inbound envelope queues of live Rep/Router bindings.
    pub listeners: HashMap<String, Listener>,
    /// Reply routes back to connected Req/Dealer peers, per listener
    /// address. Kept outside `listeners` so they survive a listener rebind.
    pub peer_routes: HashMap<String, HashMap<Bytes, mpsc::UnboundedSender<Bytes>>>,
}

pub(crate) static REGISTRY: LazyLock<Mutex<Registry>> =
    LazyLock::new(|| Mutex::new(Registry::default()));

/// Route key of an endpoint. Inproc routes by id; TCP-like and IPC-like
/// endpoints route by protocol and port alone so a wildcard-bound listener
/// is reachable from any host form of the same address.
pub(crate) fn route_key(endpoint: &Endpoint) -> String {
    match endpoint.protocol() {
        Protocol::Inproc => endpoint.to_string(),
        protocol => format!("{}:{}", protocol.prefix(), endpoint.port()),
    }
}
