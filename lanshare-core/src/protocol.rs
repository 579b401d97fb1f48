//! LANShare wire protocol: message types carried one per UDP datagram.

use serde::{Deserialize, Serialize};

/// Conventional discovery port. Peers agree on it out of band; broadcasts always target it.
pub const DEFAULT_DISCOVERY_PORT: u16 = 5003;

/// All wire message types. Encoding is a JSON object with a `type` tag (see wire module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Discovery: advertise presence. `port` is the sender's listening port.
    Discover { port: u16 },
    /// Response to discover: advertise self.
    PeerInfo { port: u16 },
    /// Who has a file with this name? Answer goes to `reply_port` on the sender's IP.
    QueryFile {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_port: Option<u16>,
    },
    /// Answer to `QueryFile`: the holder's address and the file's content hash.
    FileFoundResponse {
        filename: String,
        file_hash: String,
        peer_ip: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    /// Request file bytes by content hash; data goes to `port` on the sender's IP.
    ReceiveFile {
        file_hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    /// Whole file payload, standard base64.
    FileData {
        file_hash: String,
        file_name: String,
        file_format: String,
        data: String,
    },
}

impl Message {
    /// Tag as it appears on the wire, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Discover { .. } => "discover",
            Message::PeerInfo { .. } => "peer_info",
            Message::QueryFile { .. } => "query_file",
            Message::FileFoundResponse { .. } => "file_found_response",
            Message::ReceiveFile { .. } => "receive_file",
            Message::FileData { .. } => "file_data",
        }
    }
}

/// Extension of a file name without the dot, or empty when there is none.
pub fn file_format(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_snake_case_type_field() {
        let json = serde_json::to_value(Message::PeerInfo { port: 7 }).unwrap();
        assert_eq!(json["type"], "peer_info");
        assert_eq!(json["port"], 7);
    }

    #[test]
    fn optional_ports_are_omitted_and_tolerated() {
        let msg = Message::QueryFile {
            filename: "a.txt".into(),
            reply_port: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("reply_port"));
        let back: Message = serde_json::from_str(r#"{"type":"receive_file","file_hash":"ab"}"#).unwrap();
        assert_eq!(
            back,
            Message::ReceiveFile {
                file_hash: "ab".into(),
                port: None
            }
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        assert!(serde_json::from_str::<Message>(r#"{"type":"discover"}"#).is_err());
        assert!(serde_json::from_str::<Message>(r#"{"type":"query_file"}"#).is_err());
    }

    #[test]
    fn file_format_takes_last_extension() {
        assert_eq!(file_format("report.pdf"), "pdf");
        assert_eq!(file_format("archive.tar.gz"), "gz");
        assert_eq!(file_format("README"), "");
    }
}
