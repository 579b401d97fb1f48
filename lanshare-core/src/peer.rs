//! Peer addresses and the set of known peers.

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

/// A peer's listening address. Canonical key is `ip:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same as SocketAddr, which brackets IPv6 hosts.
        self.socket_addr().fmt(f)
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl FromStr for PeerAddress {
    type Err = PeerAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(PeerAddress::from)
            .map_err(|_| PeerAddressError(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid peer address {0:?}, expected IP:PORT")]
pub struct PeerAddressError(pub String);

/// Known peers, deduplicated by `ip:port`.
/// One writer (the discovery listener) and any number of readers.
#[derive(Debug, Default)]
pub struct AddressBook {
    peers: RwLock<BTreeSet<PeerAddress>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer. Returns true if it was not known before.
    pub fn record(&self, peer: PeerAddress) -> bool {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer)
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all peers as `ip:port` strings.
    pub fn list(&self) -> Vec<String> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    #[test]
    fn record_same_peer_twice_keeps_one_entry() {
        let book = AddressBook::new();
        assert!(book.record(addr("192.168.1.10:5003")));
        assert!(!book.record(addr("192.168.1.10:5003")));
        assert_eq!(book.len(), 1);
        assert_eq!(book.list(), vec!["192.168.1.10:5003".to_string()]);
    }

    #[test]
    fn same_ip_different_port_is_a_different_peer() {
        let book = AddressBook::new();
        book.record(addr("10.0.0.1:5003"));
        book.record(addr("10.0.0.1:5004"));
        assert_eq!(book.len(), 2);
        assert!(book.contains(&addr("10.0.0.1:5004")));
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!("10.0.0.1".parse::<PeerAddress>().is_err());
        assert!("host:5003".parse::<PeerAddress>().is_err());
        assert_eq!(addr(" 10.0.0.1:80 ").port, 80);
    }

    #[test]
    fn concurrent_readers_see_writes() {
        let book = Arc::new(AddressBook::new());
        let writer = {
            let book = book.clone();
            std::thread::spawn(move || {
                for port in 1..=50u16 {
                    book.record(PeerAddress::new("127.0.0.1".parse().unwrap(), port));
                }
            })
        };
        let reader = {
            let book = book.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    assert!(book.list().len() <= 50);
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(book.len(), 50);
    }
}
