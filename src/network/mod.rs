//! Network plumbing for DMX transport

pub mod udp;

pub use udp::{create_socket, resolve_endpoint};
