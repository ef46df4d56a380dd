//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve the configured address and port
//! - Bind exactly once; the socket is reused across route table generations
//!
//! # Design Decisions
//! - Returns a std listener so each server generation can take a clone of it
//! - Bind failure is fatal to the caller

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The configured address did not resolve.
    Resolve(String, std::io::Error),
    /// Failed to bind to address.
    Bind(SocketAddr, std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Resolve(address, e) => write!(f, "Failed to resolve {}: {}", address, e),
            ListenerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bind `address:port` from the listener configuration.
///
/// Every resolved address is tried in order; the first successful bind wins.
pub fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let target = format!("{}:{}", config.address, config.port);
    let addrs: Vec<SocketAddr> = target
        .to_socket_addrs()
        .map_err(|e| ListenerError::Resolve(target.clone(), e))?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                listener
                    .set_nonblocking(true)
                    .map_err(|e| ListenerError::Bind(addr, e))?;
                let local_addr = listener
                    .local_addr()
                    .map_err(|e| ListenerError::Bind(addr, e))?;
                tracing::info!(address = %local_addr, "Listener bound");
                return Ok(listener);
            }
            Err(e) => {
                tracing::debug!(address = %addr, error = %e, "Bind attempt failed");
                last_error = Some(ListenerError::Bind(addr, e));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ListenerError::Resolve(
            target,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str, port: u16) -> ListenerConfig {
        ListenerConfig {
            address: address.into(),
            port,
            ..Default::default()
        }
    }

    #[test]
    fn binds_an_ephemeral_port() {
        let listener = bind(&config("127.0.0.1", 0)).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn port_in_use_is_a_bind_error() {
        let first = bind(&config("127.0.0.1", 0)).unwrap();
        let port = first.local_addr().unwrap().port();

        let err = bind(&config("127.0.0.1", port)).unwrap_err();
        assert!(matches!(err, ListenerError::Bind(..)));
    }

    #[test]
    fn unresolvable_host_is_reported() {
        let err = bind(&config("no such host", 8080)).unwrap_err();
        assert!(matches!(err, ListenerError::Resolve(..)));
    }
}
