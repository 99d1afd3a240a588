//! NETCONF-over-SSH to gNMI protocol bridge.
//!
//! Accepts NETCONF RPCs from operator clients over the SSH `netconf`
//! subsystem, converts them into gNMI Get/Set requests against a southbound
//! configuration service, and returns NETCONF replies. Session operation
//! histories are kept in an in-memory store and exposed over an
//! administrative gRPC service with a streaming watch.
//!
//! Module map:
//!
//! - [`framing`] - RFC 6242 chunked framing codec
//! - [`server`] - SSH server and subsystem negotiation
//! - [`subsystem`] - per-connection NETCONF loop
//! - [`message`] - NETCONF wire messages
//! - [`parser`] - NETCONF to gNMI projection
//! - [`translator`] - request dispatcher
//! - [`store`] - session store and watch bus
//! - [`topo`] - capability oracle
//! - [`southbound`] - gNMI client facade
//! - [`admin`] - administrative gRPC service
//! - [`manager`] - lifecycle wiring

pub mod admin;
pub mod config;
pub mod framing;
pub mod manager;
pub mod message;
pub mod parser;
pub mod server;
pub mod southbound;
pub mod store;
pub mod subsystem;
pub mod topo;
pub mod translator;

pub use config::{BridgeArgs, BridgeConfig};
pub use manager::Manager;
