//! LAN discovery: periodic broadcast announcements and the listener that owns
//! the long-lived UDP socket (discovery, file queries and file serving).

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use lanshare_core::wire::RECV_BUFFER_LEN;
use lanshare_core::{Action, AddressBook, DropReason, FileIndex, Message, Responder};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::net;

/// Announce `discover{port: self_port}` to every broadcast address on
/// `target_port` until shutdown. A failed send to one address does not stop the cycle.
pub async fn run_broadcaster(
    socket: Arc<UdpSocket>,
    self_port: u16,
    target_port: u16,
    configured: Option<Vec<Ipv4Addr>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let announce = Message::Discover { port: self_port };
    info!(self_port, target_port, "starting discovery broadcasts");
    loop {
        for addr in net::announce_targets(configured.as_deref()) {
            let to = SocketAddr::from((addr, target_port));
            if let Err(e) = net::send_message(&socket, &announce, to).await {
                warn!(%to, "discovery broadcast failed: {e}");
            }
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("discovery broadcaster stopped");
}

/// Receive loop: one datagram at a time, handled by the `Responder`.
/// Nothing a peer sends can end the loop; only shutdown does.
pub async fn run_listener(
    socket: Arc<UdpSocket>,
    responder: Responder,
    files: FileIndex,
    peers: Arc<AddressBook>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    info!(addr = ?socket.local_addr().ok(), "listening for peers");
    loop {
        let (n, from) = tokio::select! {
            _ = shutdown.changed() => break,
            r = socket.recv_from(&mut buf) => match r {
                Ok(v) => v,
                Err(e) => {
                    // e.g. ICMP port unreachable from an earlier send.
                    debug!("recv error: {e}");
                    continue;
                }
            },
        };
        let datagram = buf[..n].to_vec();
        let responder = responder.clone();
        let files = files.clone();
        // Index scans hash files from disk.
        let outcome =
            tokio::task::spawn_blocking(move || responder.on_datagram(&datagram, from, &files))
                .await;
        match outcome {
            Ok(Ok(actions)) => apply(&socket, &peers, actions).await,
            Ok(Err(reason)) => log_drop(&reason, from),
            Err(e) => warn!(%from, "datagram handler panicked: {e}"),
        }
    }
    debug!("discovery listener stopped");
}

async fn apply(socket: &UdpSocket, peers: &AddressBook, actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::PeerSeen(peer) => {
                if peers.record(peer) {
                    info!(%peer, "peer added");
                }
            }
            Action::Send { to, message } => {
                if let Err(e) = net::send_message(socket, &message, to).await {
                    warn!(%to, kind = message.kind(), "reply failed: {e}");
                }
            }
        }
    }
}

fn log_drop(reason: &DropReason, from: SocketAddr) {
    match reason {
        DropReason::Malformed(e) => warn!(%from, "discarding malformed datagram: {e}"),
        DropReason::MissingReplyPort { .. } => warn!(%from, "{reason}; not sending"),
        DropReason::Unexpected(_) => debug!(%from, "{reason}"),
        DropReason::Io(e) => warn!(%from, "cannot serve request: {e}"),
    }
}
