use crate::id::Identifier;
use std::{io, net::SocketAddr, time::Duration};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RingError>;

#[derive(Debug, Error)]
pub enum RingError {
    /// The listen address could not be bound, usually because it is in use.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A peer was unreachable or dropped the connection mid round trip.
    #[error("connection to {addr} failed: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("request to {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },

    /// A frame did not decode, or a peer answered with the wrong response.
    #[error("protocol error with {addr}: {reason}")]
    Protocol { addr: SocketAddr, reason: String },

    #[error("lookup of {id} did not converge after {hops} hops")]
    LookupDiverged { id: Identifier, hops: usize },

    #[error("node is already joining or part of a ring")]
    AlreadyJoined,

    #[error("ring state task has stopped")]
    StateClosed,
}

impl RingError {
    /// True when the error means the remote peer should be presumed dead.
    pub fn is_peer_failure(&self) -> bool {
        matches!(self, RingError::Connection { .. } | RingError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_failures_are_classified() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let refused = RingError::Connection {
            addr,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let slow = RingError::Timeout {
            addr,
            timeout: Duration::from_millis(10),
        };
        let garbled = RingError::Protocol {
            addr,
            reason: "bad frame".to_string(),
        };

        assert!(refused.is_peer_failure());
        assert!(slow.is_peer_failure());
        assert!(!garbled.is_peer_failure());
        assert!(!RingError::LookupDiverged { id: 5, hops: 3 }.is_peer_failure());
    }

    #[test]
    fn messages_name_the_peer() {
        let addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let err = RingError::Timeout {
            addr,
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "request to 127.0.0.1:5001 timed out after 3s");
    }
}
