//! Local command bridge for UI clients: one `command:payload` line in, one
//! JSON line out. Only calls into the `Node`.

use std::net::{Ipv4Addr, SocketAddr};

use lanshare_core::BridgeCommand;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::node::Node;

/// Loopback only.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await
}

pub async fn run_bridge(listener: TcpListener, node: Node, mut shutdown: watch::Receiver<bool>) {
    info!(addr = ?listener.local_addr().ok(), "command bridge listening");
    loop {
        let (stream, client) = tokio::select! {
            _ = shutdown.changed() => break,
            r = listener.accept() => match r {
                Ok(v) => v,
                Err(e) => {
                    warn!("bridge accept failed: {e}");
                    continue;
                }
            },
        };
        let node = node.clone();
        tokio::spawn(async move {
            info!(%client, "bridge client connected");
            match serve_client(stream, &node).await {
                Ok(()) => info!(%client, "bridge client disconnected"),
                Err(e) => warn!(%client, "bridge client connection error: {e}"),
            }
        });
    }
    debug!("command bridge stopped");
}

async fn serve_client(stream: TcpStream, node: &Node) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!(line = %line, "bridge command");
        let reply = handle_line(node, &line).await;
        write.write_all(reply.to_string().as_bytes()).await?;
        write.write_all(b"\n").await?;
    }
    Ok(())
}

pub async fn handle_line(node: &Node, line: &str) -> Value {
    match BridgeCommand::parse(line) {
        Ok(cmd) => execute(node, cmd).await,
        Err(e) => {
            warn!(line, "rejected bridge command: {e}");
            e.to_json()
        }
    }
}

async fn execute(node: &Node, cmd: BridgeCommand) -> Value {
    match cmd {
        BridgeCommand::ReceiveFile { filename } => {
            let n = node.clone();
            let name = filename.clone();
            tokio::spawn(async move {
                n.download(&name).await;
            });
            json!({ "status": "download_initiated", "filename": filename })
        }
        BridgeCommand::GetLocalFilesInfo => match node.list_local_files().await {
            Ok(files) => json!({ "type": "local_files_list", "files": files }),
            Err(e) => {
                warn!("cannot list local files: {e}");
                json!({ "error": "Could not retrieve local files information." })
            }
        },
        BridgeCommand::ServeFile { filename } => match node.local_file_data(&filename).await {
            Ok(Some(message)) => serde_json::to_value(&message)
                .unwrap_or_else(|e| json!({ "error": format!("Error processing file '{filename}': {e}") })),
            Ok(None) => json!({ "status": "file_not_found_locally", "filename": filename }),
            Err(e) => {
                warn!(filename = %filename, "cannot serve local file: {e}");
                json!({ "error": format!("Error processing file '{filename}'.") })
            }
        },
        BridgeCommand::DiscoverPeers => json!({
            "type": "peer_list",
            "self": SocketAddr::new(node.advertised_ip(), node.local_port()).to_string(),
            "peers": node.list_known_peers(),
        }),
        BridgeCommand::QueryPeer { peer, filename } => {
            match node.query_peer_for_file(peer, &filename).await {
                Ok(Some(loc)) => json!({
                    "type": "query_result",
                    "filename": filename,
                    "found": true,
                    "peer": loc.peer.to_string(),
                    "file_hash": loc.file_hash,
                }),
                Ok(None) => json!({ "type": "query_result", "filename": filename, "found": false }),
                Err(e) => json!({ "error": format!("Query to {peer} failed: {e}") }),
            }
        }
        BridgeCommand::GetManifest => match node.manifest().await {
            Ok(files) => json!({ "type": "manifest", "files": files }),
            Err(e) => json!({ "error": format!("Could not build manifest: {e}") }),
        },
        BridgeCommand::TcpFetch { server, filename } => {
            match node.tcp_fetch(server.socket_addr(), &filename).await {
                Ok(bytes) => json!({
                    "type": "tcp_fetch_result",
                    "filename": filename,
                    "success": true,
                    "bytes": bytes,
                }),
                Err(e) => json!({
                    "type": "tcp_fetch_result",
                    "filename": filename,
                    "success": false,
                    "error": e.to_string(),
                }),
            }
        }
    }
}
