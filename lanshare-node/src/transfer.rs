//! Receiving side of a whole-file transfer: request by hash, wait for
//! `file_data` from that peer, verify and save.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanshare_core::transfer::{self, TransferError};
use lanshare_core::wire::RECV_BUFFER_LEN;
use lanshare_core::{decode_datagram, Message};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::net::{self, EphemeralSocket};

/// Fetch the file with `file_hash` from `peer` into `dest`. Returns true once
/// the verified bytes are on disk. No internal retry.
pub async fn receive_file(
    main: &UdpSocket,
    peer: SocketAddr,
    file_hash: &str,
    dest: &Path,
    timeout: Duration,
) -> bool {
    match fetch(main, peer, file_hash, dest, timeout).await {
        Ok(true) => {
            info!(%peer, file_hash, dest = %dest.display(), "file received and saved");
            true
        }
        Ok(false) => {
            warn!(%peer, file_hash, ?timeout, "no file data before deadline");
            false
        }
        Err(e) => {
            error!(%peer, file_hash, dest = %dest.display(), "file transfer failed: {e}");
            false
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

async fn fetch(
    main: &UdpSocket,
    peer: SocketAddr,
    file_hash: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<bool, FetchError> {
    let deadline = Instant::now() + timeout;
    let reply = EphemeralSocket::bind().await?;
    let request = Message::ReceiveFile {
        file_hash: file_hash.to_string(),
        port: Some(reply.port()),
    };
    net::send_message(main, &request, peer).await?;
    debug!(%peer, file_hash, reply_port = reply.port(), "requested file");

    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    loop {
        let (n, from) = match tokio::time::timeout_at(deadline, reply.recv_from(&mut buf)).await {
            Err(_) => return Ok(false),
            Ok(r) => r?,
        };
        if from.ip() != peer.ip() {
            warn!(%from, expected = %peer.ip(), "ignoring data from unexpected host");
            continue;
        }
        match decode_datagram(&buf[..n]) {
            Ok(Message::FileData {
                file_hash: got, data, ..
            }) if got.eq_ignore_ascii_case(file_hash) => {
                let bytes = transfer::decode_payload(&data, file_hash)?;
                save(dest.to_path_buf(), bytes).await?;
                return Ok(true);
            }
            Ok(other) => debug!(%from, kind = other.kind(), "ignoring unrelated message"),
            Err(e) => warn!(%from, "discarding malformed datagram: {e}"),
        }
    }
}

async fn save(dest: PathBuf, bytes: Vec<u8>) -> Result<(), TransferError> {
    tokio::task::spawn_blocking(move || transfer::save(&dest, &bytes))
        .await
        .map_err(|e| TransferError::Write(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
