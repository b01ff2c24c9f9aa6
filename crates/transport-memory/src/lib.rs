//! In-memory implementation of the transport provider contract.
//!
//! This transport routes messages between sockets within the same process
//! through a global broker registry, perfect for testing and development
//! scenarios. TCP-like and IPC-like endpoints are routed by port alone, so
//! a wildcard-bound listener is reachable from any host form of the same
//! address.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod registry;
mod socket;

pub use error::Error;
pub use socket::MemorySocket;

use async_trait::async_trait;
use courier_transport::socket::{SocketPattern, Transport};

/// Connection factory for the in-memory broker.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryTransport;

impl MemoryTransport {
    /// Creates a new in-memory transport handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Clears all global broker state (useful for tests).
    pub async fn clear_global_state() {
        let mut registry = registry::REGISTRY.lock().await;
        registry.topics.clear();
        registry.listeners.clear();
        registry.peer_routes.clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Error = Error;
    type Socket = MemorySocket;

    async fn open(&self, pattern: SocketPattern) -> Result<MemorySocket, Error> {
        Ok(MemorySocket::new(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use bytes::Bytes;
    use courier_transport::endpoint::Endpoint;
    use courier_transport::socket::{Interest, Socket};

    fn endpoint(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn pub_sub_delivery() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let publisher = transport.open(SocketPattern::Pub).await.unwrap();
        publisher.bind(&endpoint("inproc://mem-pubsub")).await.unwrap();

        let subscriber = transport.open(SocketPattern::Sub).await.unwrap();
        subscriber.subscribe(Bytes::new());
        subscriber.connect(&endpoint("inproc://mem-pubsub")).await.unwrap();

        publisher.send(Bytes::from_static(b"howdy")).await.unwrap();

        assert!(
            subscriber
                .poll(Duration::from_millis(500), Interest::Readable)
                .await
                .unwrap()
        );
        assert_eq!(subscriber.recv().await.unwrap(), Bytes::from_static(b"howdy"));
    }

    #[tokio::test]
    async fn sub_filters_by_payload_prefix() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let publisher = transport.open(SocketPattern::Pub).await.unwrap();
        publisher.bind(&endpoint("inproc://mem-filter")).await.unwrap();

        let subscriber = transport.open(SocketPattern::Sub).await.unwrap();
        subscriber.subscribe(Bytes::from_static(b"topic"));
        subscriber.connect(&endpoint("inproc://mem-filter")).await.unwrap();

        publisher.send(Bytes::from_static(b"other:dropped")).await.unwrap();
        publisher.send(Bytes::from_static(b"topic:kept")).await.unwrap();

        assert!(
            subscriber
                .poll(Duration::from_millis(500), Interest::Readable)
                .await
                .unwrap()
        );
        assert_eq!(
            subscriber.recv().await.unwrap(),
            Bytes::from_static(b"topic:kept")
        );
    }

    #[tokio::test]
    async fn req_rep_round_trip() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let replier = transport.open(SocketPattern::Rep).await.unwrap();
        replier.bind(&endpoint("inproc://mem-reqrep")).await.unwrap();

        let requester = transport.open(SocketPattern::Req).await.unwrap();
        requester.connect(&endpoint("inproc://mem-reqrep")).await.unwrap();
        requester.send(Bytes::from_static(b"ping")).await.unwrap();

        assert!(
            replier
                .poll(Duration::from_millis(500), Interest::Readable)
                .await
                .unwrap()
        );
        assert_eq!(replier.recv().await.unwrap(), Bytes::from_static(b"ping"));
        replier.send(Bytes::from_static(b"pong")).await.unwrap();

        assert!(
            requester
                .poll(Duration::from_millis(500), Interest::Readable)
                .await
                .unwrap()
        );
        assert_eq!(requester.recv().await.unwrap(), Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn router_routes_replies_by_identity() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let router = transport.open(SocketPattern::Router).await.unwrap();
        router.bind(&endpoint("tcp://*:7100")).await.unwrap();

        let dealer = transport.open(SocketPattern::Dealer).await.unwrap();
        dealer.connect(&endpoint("tcp://127.0.0.1:7100")).await.unwrap();
        dealer.send(Bytes::from_static(b"howdy")).await.unwrap();

        assert!(
            router
                .poll(Duration::from_millis(500), Interest::Readable)
                .await
                .unwrap()
        );
        let frames = router.recv_multipart().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], Bytes::from_static(b"howdy"));

        router
            .send_multipart(vec![frames[0].clone(), Bytes::from_static(b"roger")])
            .await
            .unwrap();

        assert!(
            dealer
                .poll(Duration::from_millis(500), Interest::Readable)
                .await
                .unwrap()
        );
        assert_eq!(dealer.recv().await.unwrap(), Bytes::from_static(b"roger"));
    }

    #[tokio::test]
    async fn bind_conflict_until_closed() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let first = transport.open(SocketPattern::Rep).await.unwrap();
        first.bind(&endpoint("inproc://mem-conflict")).await.unwrap();

        let second = transport.open(SocketPattern::Rep).await.unwrap();
        assert!(matches!(
            second.bind(&endpoint("inproc://mem-conflict")).await,
            Err(Error::AddrInUse(_))
        ));

        first.close().await;

        let third = transport.open(SocketPattern::Rep).await.unwrap();
        third.bind(&endpoint("inproc://mem-conflict")).await.unwrap();
    }

    #[tokio::test]
    async fn closed_socket_fails_io() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let socket = transport.open(SocketPattern::Req).await.unwrap();
        socket.connect(&endpoint("inproc://mem-closed")).await.unwrap();
        socket.close().await;
        socket.close().await; // idempotent

        assert!(matches!(
            socket.send(Bytes::from_static(b"howdy")).await,
            Err(Error::Closed)
        ));
        assert!(matches!(
            socket.poll(Duration::from_millis(10), Interest::Readable).await,
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn send_without_listener_is_dropped() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let requester = transport.open(SocketPattern::Req).await.unwrap();
        requester.connect(&endpoint("inproc://mem-nobody")).await.unwrap();
        requester.send(Bytes::from_static(b"anyone?")).await.unwrap();

        assert!(
            !requester
                .poll(Duration::from_millis(50), Interest::Readable)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn pub_without_subscribers_is_noop() {
        let _ = tracing_subscriber::fmt::try_init();
        let transport = MemoryTransport::new();

        let publisher = transport.open(SocketPattern::Pub).await.unwrap();
        publisher.bind(&endpoint("inproc://mem-lonely")).await.unwrap();
        publisher.send(Bytes::from_static(b"nobody home")).await.unwrap();
    }
}
