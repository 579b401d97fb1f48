//! Framing: one UTF-8 JSON object per UDP datagram, no length prefix.

use crate::protocol::Message;

/// Encoded datagrams above this size risk IP fragmentation and silent loss.
pub const SAFE_DATAGRAM_LEN: usize = 60_000;
/// Largest UDP payload over IPv4 (65535 - 8 byte UDP header - 20 byte IP header).
pub const MAX_DATAGRAM_LEN: usize = 65_507;
/// Receive buffer size; large enough for any IPv4 UDP payload.
pub const RECV_BUFFER_LEN: usize = 65_536;

/// Encode a message into a single datagram.
pub fn encode_datagram(msg: &Message) -> Result<Vec<u8>, WireError> {
    let bytes = serde_json::to_vec(msg).map_err(WireError::Encode)?;
    if bytes.len() > MAX_DATAGRAM_LEN {
        return Err(WireError::TooLarge { len: bytes.len() });
    }
    Ok(bytes)
}

/// Decode one datagram. Unknown `type` tags and missing required fields are errors.
pub fn decode_datagram(bytes: &[u8]) -> Result<Message, WireError> {
    serde_json::from_slice(bytes).map_err(WireError::Decode)
}

/// True when an encoded datagram is above the size that reliably survives the LAN.
pub fn exceeds_safe_size(datagram: &[u8]) -> bool {
    datagram.len() > SAFE_DATAGRAM_LEN
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("datagram too large: {len} bytes")]
    TooLarge { len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_data(data_len: usize) -> Message {
        Message::FileData {
            file_hash: "00".repeat(32),
            file_name: "blob.bin".into(),
            file_format: "bin".into(),
            data: "A".repeat(data_len),
        }
    }

    #[test]
    fn roundtrip_query_file() {
        let msg = Message::QueryFile {
            filename: "report.pdf".into(),
            reply_port: Some(40000),
        };
        let datagram = encode_datagram(&msg).unwrap();
        assert!(!datagram.contains(&b'\n'));
        assert_eq!(decode_datagram(&datagram).unwrap(), msg);
    }

    #[test]
    fn garbage_and_unknown_types_are_decode_errors() {
        assert!(matches!(
            decode_datagram(b"not json at all"),
            Err(WireError::Decode(_))
        ));
        assert!(matches!(
            decode_datagram(br#"{"type":"hello","port":1}"#),
            Err(WireError::Decode(_))
        ));
        assert!(matches!(
            decode_datagram(br#"[1,2,3]"#),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn oversized_message_is_refused() {
        let err = encode_datagram(&file_data(MAX_DATAGRAM_LEN)).unwrap_err();
        assert!(matches!(err, WireError::TooLarge { len } if len > MAX_DATAGRAM_LEN));
    }

    #[test]
    fn between_safe_and_hard_limit_encodes_but_is_flagged() {
        let datagram = encode_datagram(&file_data(SAFE_DATAGRAM_LEN + 10)).unwrap();
        assert!(exceeds_safe_size(&datagram));
        let small = encode_datagram(&file_data(100)).unwrap();
        assert!(!exceeds_safe_size(&small));
    }
}
