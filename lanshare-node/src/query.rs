//! One-shot file lookups. Each call binds its own reply socket, sends
//! `query_file` from the main socket and waits for the first valid answer
//! until a single deadline.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use lanshare_core::wire::RECV_BUFFER_LEN;
use lanshare_core::{decode_datagram, Message, PeerAddress};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::net::{self, EphemeralSocket};

/// Where a file can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub peer: SocketAddr,
    pub file_hash: String,
}

/// Broadcast `query_file` to every target on `target_port`; first valid answer wins.
pub async fn find_file_source(
    main: &UdpSocket,
    targets: &[Ipv4Addr],
    target_port: u16,
    filename: &str,
    timeout: Duration,
) -> std::io::Result<Option<FileLocation>> {
    let deadline = Instant::now() + timeout;
    let reply = EphemeralSocket::bind().await?;
    let query = Message::QueryFile {
        filename: filename.to_string(),
        reply_port: Some(reply.port()),
    };
    info!(filename, reply_port = reply.port(), ?targets, "broadcasting file query");
    for addr in targets {
        let to = SocketAddr::from((*addr, target_port));
        if let Err(e) = net::send_message(main, &query, to).await {
            warn!(%to, "file query send failed: {e}");
        }
    }
    let found = await_response(&reply, filename, deadline, None).await;
    if found.is_none() {
        warn!(filename, ?timeout, "file not found on the network");
    }
    Ok(found)
}

/// Ask one peer whether it has `filename`. Answers from other hosts are ignored.
pub async fn query_peer_for_file(
    main: &UdpSocket,
    peer: PeerAddress,
    filename: &str,
    timeout: Duration,
) -> std::io::Result<Option<FileLocation>> {
    let deadline = Instant::now() + timeout;
    let reply = EphemeralSocket::bind().await?;
    let query = Message::QueryFile {
        filename: filename.to_string(),
        reply_port: Some(reply.port()),
    };
    info!(filename, %peer, reply_port = reply.port(), "querying peer for file");
    net::send_message(main, &query, peer.socket_addr()).await?;
    let found = await_response(&reply, filename, deadline, Some(peer.ip)).await;
    if found.is_none() {
        info!(filename, %peer, "peer does not have file or did not answer");
    }
    Ok(found)
}

async fn await_response(
    socket: &UdpSocket,
    filename: &str,
    deadline: Instant,
    only_from: Option<IpAddr>,
) -> Option<FileLocation> {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    loop {
        let (n, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => return None,
            Ok(Err(e)) => {
                debug!("recv error while waiting for file_found_response: {e}");
                continue;
            }
            Ok(Ok(v)) => v,
        };
        if only_from.is_some_and(|ip| ip != from.ip()) {
            debug!(%from, "ignoring response from another host");
            continue;
        }
        match decode_datagram(&buf[..n]) {
            Ok(Message::FileFoundResponse {
                filename: name,
                file_hash,
                peer_ip,
                port,
            }) if name == filename => {
                let Some(port) = port else {
                    warn!(%from, filename, "file_found_response without port, ignoring");
                    continue;
                };
                let ip = peer_ip.parse().unwrap_or_else(|_| from.ip());
                let peer = SocketAddr::new(ip, port);
                info!(filename, %peer, %file_hash, "file source found");
                return Some(FileLocation { peer, file_hash });
            }
            Ok(other) => debug!(%from, kind = other.kind(), "ignoring unrelated message"),
            Err(e) => warn!(%from, "discarding malformed response: {e}"),
        }
    }
}
