//! Command grammar for the local UI bridge: `command:payload` in, JSON out.

use serde_json::{json, Value};

use crate::peer::PeerAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Start a network download of a file by name.
    ReceiveFile { filename: String },
    GetLocalFilesInfo,
    /// Return a local file's bytes directly to the bridge client.
    ServeFile { filename: String },
    DiscoverPeers,
    /// Point-to-point lookup against one peer.
    QueryPeer { peer: PeerAddress, filename: String },
    GetManifest,
    /// Download through the TCP file server of a peer.
    TcpFetch { server: PeerAddress, filename: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Invalid message format. Expected 'command:payload'.")]
    Format,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Missing payload for command: {0}")]
    MissingPayload(&'static str),
    #[error("Invalid payload for {command}: expected '<ip:port> <filename>'")]
    PeerPayload { command: &'static str },
}

impl BridgeError {
    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

impl BridgeCommand {
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        let (command, payload) = line.split_once(':').ok_or(BridgeError::Format)?;
        let payload = payload.trim();
        match command.trim() {
            "receive_file" => Ok(BridgeCommand::ReceiveFile {
                filename: required(payload, "receive_file")?,
            }),
            "get_local_files_info" => Ok(BridgeCommand::GetLocalFilesInfo),
            "serve_file" => Ok(BridgeCommand::ServeFile {
                filename: required(payload, "serve_file")?,
            }),
            "discover_peers" => Ok(BridgeCommand::DiscoverPeers),
            "query_peer" => {
                let (peer, filename) = peer_and_name(payload, "query_peer")?;
                Ok(BridgeCommand::QueryPeer { peer, filename })
            }
            "get_manifest" => Ok(BridgeCommand::GetManifest),
            "tcp_fetch" => {
                let (server, filename) = peer_and_name(payload, "tcp_fetch")?;
                Ok(BridgeCommand::TcpFetch { server, filename })
            }
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }
}

fn required(payload: &str, command: &'static str) -> Result<String, BridgeError> {
    if payload.is_empty() {
        return Err(BridgeError::MissingPayload(command));
    }
    Ok(payload.to_string())
}

fn peer_and_name(
    payload: &str,
    command: &'static str,
) -> Result<(PeerAddress, String), BridgeError> {
    let (addr, name) = payload
        .split_once(char::is_whitespace)
        .ok_or(BridgeError::PeerPayload { command })?;
    let peer = addr
        .parse::<PeerAddress>()
        .map_err(|_| BridgeError::PeerPayload { command })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(BridgeError::PeerPayload { command });
    }
    Ok((peer, name.to_string()))
}
