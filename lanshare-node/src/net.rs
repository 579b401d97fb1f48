//! Socket setup and interface helpers shared by discovery, lookup and transfer.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::Deref;

use lanshare_core::{wire, Message};
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use tokio::net::UdpSocket;
use tracing::{debug, error, warn};

/// Bind the long-lived discovery socket. If the conventional port is taken,
/// fall back to an OS-assigned port; peers keep targeting the conventional one.
pub fn bind_discovery_socket(port: u16) -> std::io::Result<UdpSocket> {
    let std_sock = match std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)) {
        Ok(s) => s,
        Err(e) if port != 0 => {
            warn!(port, "cannot bind discovery port ({e}); using an OS-assigned port");
            std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
        }
        Err(e) => return Err(e),
    };
    std_sock.set_broadcast(true)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

/// Encode and send one message. Payloads above the safe datagram size are
/// sent anyway with a warning; payloads above the hard UDP limit are refused.
pub async fn send_message(socket: &UdpSocket, msg: &Message, to: SocketAddr) -> std::io::Result<()> {
    let datagram = wire::encode_datagram(msg).map_err(|e| {
        error!(kind = msg.kind(), %to, "not sending: {e}");
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })?;
    if wire::exceeds_safe_size(&datagram) {
        warn!(
            kind = msg.kind(),
            size = datagram.len(),
            %to,
            "payload exceeds safe single-datagram size and may be lost"
        );
    }
    socket.send_to(&datagram, to).await?;
    debug!(kind = msg.kind(), size = datagram.len(), %to, "sent");
    Ok(())
}

/// A UDP socket bound for one outbound call. Closed when dropped, so every
/// exit path (match, deadline, error) releases it.
#[derive(Debug)]
pub struct EphemeralSocket {
    socket: UdpSocket,
    port: u16,
}

impl EphemeralSocket {
    pub async fn bind() -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let port = socket.local_addr()?.port();
        debug!(port, "ephemeral socket bound");
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Deref for EphemeralSocket {
    type Target = UdpSocket;

    fn deref(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Drop for EphemeralSocket {
    fn drop(&mut self) {
        debug!(port = self.port, "ephemeral socket released");
    }
}

/// IPv4 broadcast addresses of all local interfaces that have one.
pub fn interface_broadcasts() -> Vec<Ipv4Addr> {
    let interfaces = match NetworkInterface::show() {
        Ok(i) => i,
        Err(e) => {
            warn!("cannot enumerate network interfaces: {e}");
            return Vec::new();
        }
    };
    let set: BTreeSet<Ipv4Addr> = interfaces
        .iter()
        .flat_map(|i| i.addr.iter())
        .filter_map(|a| match a {
            Addr::V4(v4) => v4.broadcast,
            Addr::V6(_) => None,
        })
        .collect();
    set.into_iter().collect()
}

/// Broadcast addresses to announce on: configured list, else interface enumeration.
pub fn announce_targets(configured: Option<&[Ipv4Addr]>) -> Vec<Ipv4Addr> {
    match configured {
        Some(list) => list.to_vec(),
        None => interface_broadcasts(),
    }
}

/// Broadcast addresses for a file query; never empty.
pub fn query_targets(configured: Option<&[Ipv4Addr]>) -> Vec<Ipv4Addr> {
    let targets = announce_targets(configured);
    if targets.is_empty() {
        warn!("no broadcast addresses found, using {}", Ipv4Addr::BROADCAST);
        return vec![Ipv4Addr::BROADCAST];
    }
    targets
}

/// Best-effort address other hosts can reach us on: the source address the
/// kernel would pick for an off-host route. Loopback when there is no route.
pub fn local_outbound_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let s = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        // connect() on UDP only selects a route; nothing is sent.
        s.connect(SocketAddr::from(([10, 255, 255, 255], 1)))?;
        Ok(s.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
