//! Cooperative messaging services multiplexed over a shared transport.
//!
//! Every service runs as an independently scheduled task on one cooperative
//! loop until told to stop, and recovers from transport failures by closing
//! and recreating its own sockets at the same address.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Inboxes demultiplex identified peers and dispatch concurrent replies.
pub mod inbox;

/// Reply servers serve one request at a time at a bound endpoint.
pub mod reply;

/// Requests are transient connections with a bounded retry budget.
pub mod request;

/// Subscriptions fan many inbound feeds into one received sequence.
pub mod subscription;
