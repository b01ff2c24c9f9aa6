//! Canonical endpoint addressing and the transport provider contract.
//!
//! This crate provides a transport-agnostic interface for pattern-typed
//! messaging sockets. Specific implementations (in-memory, real network
//! stacks) are provided in separate crates.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Endpoints are canonical addresses of transport peers and listeners.
pub mod endpoint;

/// Sockets are pattern-typed connections opened from a shared transport.
pub mod socket;
