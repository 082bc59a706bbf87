//! UDP socket setup and endpoint resolution

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::TransportError;

/// Create a non-blocking UDP socket suitable for sending to `target`.
///
/// Broadcast is enabled so `255.255.255.255` / subnet broadcast targets work.
pub fn create_socket(target: SocketAddr) -> Result<UdpSocket, TransportError> {
    let domain = Domain::for_address(target);
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| TransportError::BindFailed(e.to_string()))?;

    if target.is_ipv4() {
        socket
            .set_broadcast(true)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
    }
    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::BindFailed(e.to_string()))?;

    let bind_addr: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    socket
        .bind(&bind_addr.into())
        .map_err(|e| TransportError::BindFailed(format!("{}: {}", bind_addr, e)))?;

    Ok(socket.into())
}

/// Resolve `host` to a socket address.
///
/// `host` may carry its own port (`10.0.0.5:6454`); otherwise
/// `default_port` is used.
pub fn resolve_endpoint(host: &str, default_port: u16) -> Result<SocketAddr, TransportError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(TransportError::Resolve("empty host".to_string()));
    }

    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let has_port = !host.starts_with('[') && host.matches(':').count() == 1;
    let with_port = if has_port {
        host.to_string()
    } else {
        format!("{}:{}", host, default_port)
    };

    with_port
        .to_socket_addrs()
        .map_err(|e| TransportError::Resolve(format!("{}: {}", host, e)))?
        .next()
        .ok_or_else(|| TransportError::Resolve(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_and_without_port() {
        let addr = resolve_endpoint("127.0.0.1", 6454).unwrap();
        assert_eq!(addr, "127.0.0.1:6454".parse().unwrap());

        let addr = resolve_endpoint("127.0.0.1:7000", 6454).unwrap();
        assert_eq!(addr.port(), 7000);

        assert!(resolve_endpoint("  ", 6454).is_err());
    }

    #[test]
    fn test_create_socket_loopback() {
        let target: SocketAddr = "127.0.0.1:6454".parse().unwrap();
        let socket = create_socket(target).unwrap();
        assert!(socket.local_addr().unwrap().port() != 0);
    }
}
