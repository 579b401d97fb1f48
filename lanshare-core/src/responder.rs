//! Host-driven API: the listener hands each inbound datagram to the `Responder`
//! and performs the actions it returns. No sockets here.

use std::net::{IpAddr, SocketAddr};

use crate::index::FileSource;
use crate::peer::PeerAddress;
use crate::protocol::Message;
use crate::transfer;
use crate::wire::{self, WireError};

/// What the host should do after a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send `message` to `to`.
    Send { to: SocketAddr, message: Message },
    /// Remember a peer listening at this address.
    PeerSeen(PeerAddress),
}

/// Why a datagram produced no reply. Every variant is absorbed by the listener.
#[derive(Debug, thiserror::Error)]
pub enum DropReason {
    #[error("{0}")]
    Malformed(#[from] WireError),
    #[error("receive_file for {file_hash} has no reply port")]
    MissingReplyPort { file_hash: String },
    #[error("unexpected {0} on the listening socket")]
    Unexpected(&'static str),
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Answers discovery, file queries and file requests on behalf of this node.
#[derive(Debug, Clone)]
pub struct Responder {
    /// Port this node listens on (advertised in replies).
    self_port: u16,
    /// Address this node reports in `file_found_response`.
    self_ip: IpAddr,
}

impl Responder {
    pub fn new(self_port: u16, self_ip: IpAddr) -> Self {
        Self { self_port, self_ip }
    }

    pub fn self_address(&self) -> PeerAddress {
        PeerAddress::new(self.self_ip, self.self_port)
    }

    /// Decode one datagram and handle it.
    pub fn on_datagram(
        &self,
        bytes: &[u8],
        from: SocketAddr,
        files: &dyn FileSource,
    ) -> Result<Vec<Action>, DropReason> {
        let msg = wire::decode_datagram(bytes)?;
        self.on_message(msg, from, files)
    }

    pub fn on_message(
        &self,
        msg: Message,
        from: SocketAddr,
        files: &dyn FileSource,
    ) -> Result<Vec<Action>, DropReason> {
        match msg {
            Message::Discover { port } => Ok(self.on_discover(from, port)),
            Message::PeerInfo { port } => {
                let peer = PeerAddress::new(from.ip(), port);
                if peer == self.self_address() {
                    return Ok(Vec::new());
                }
                Ok(vec![Action::PeerSeen(peer)])
            }
            Message::QueryFile {
                filename,
                reply_port,
            } => self.on_query_file(from, filename, reply_port, files),
            Message::ReceiveFile { file_hash, port } => {
                self.on_receive_file(from, file_hash, port, files)
            }
            other @ (Message::FileFoundResponse { .. } | Message::FileData { .. }) => {
                Err(DropReason::Unexpected(other.kind()))
            }
        }
    }

    /// Reply with our port, and record the sender at its declared port (not the
    /// UDP source port, which may belong to a separate sending socket).
    fn on_discover(&self, from: SocketAddr, declared_port: u16) -> Vec<Action> {
        // Our own broadcast looping back.
        if PeerAddress::new(from.ip(), declared_port) == self.self_address() {
            return Vec::new();
        }
        vec![
            Action::Send {
                to: SocketAddr::new(from.ip(), declared_port),
                message: Message::PeerInfo {
                    port: self.self_port,
                },
            },
            Action::PeerSeen(PeerAddress::new(from.ip(), declared_port)),
        ]
    }

    fn on_query_file(
        &self,
        from: SocketAddr,
        filename: String,
        reply_port: Option<u16>,
        files: &dyn FileSource,
    ) -> Result<Vec<Action>, DropReason> {
        let Some(entry) = files.find_by_name(&filename)? else {
            return Ok(Vec::new());
        };
        // Without reply_port, fall back to the UDP source address.
        let to = match reply_port {
            Some(port) => SocketAddr::new(from.ip(), port),
            None => from,
        };
        Ok(vec![Action::Send {
            to,
            message: Message::FileFoundResponse {
                filename,
                file_hash: entry.hash,
                peer_ip: self.self_ip.to_string(),
                port: Some(self.self_port),
            },
        }])
    }

    fn on_receive_file(
        &self,
        from: SocketAddr,
        file_hash: String,
        port: Option<u16>,
        files: &dyn FileSource,
    ) -> Result<Vec<Action>, DropReason> {
        let Some(port) = port else {
            return Err(DropReason::MissingReplyPort { file_hash });
        };
        let Some(entry) = files.find_by_hash(&file_hash)? else {
            return Ok(Vec::new());
        };
        let bytes = files.read(&entry)?;
        Ok(vec![Action::Send {
            to: SocketAddr::new(from.ip(), port),
            message: transfer::file_data_message(&entry.hash, &entry.name, &bytes),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FileEntry;
    use crate::integrity;
    use std::collections::HashMap;
    use std::io;
    use std::path::PathBuf;

    /// In-memory file source keyed by name.
    #[derive(Default)]
    struct MemFiles(HashMap<String, Vec<u8>>);

    impl MemFiles {
        fn with(name: &str, data: &[u8]) -> Self {
            let mut m = Self::default();
            m.0.insert(name.to_string(), data.to_vec());
            m
        }

        fn entry(name: &str, data: &[u8]) -> FileEntry {
            FileEntry {
                hash: integrity::hash_bytes(data),
                path: PathBuf::from(name),
                name: name.to_string(),
            }
        }
    }

    impl FileSource for MemFiles {
        fn find_by_name(&self, name: &str) -> io::Result<Option<FileEntry>> {
            Ok(self.0.get(name).map(|d| Self::entry(name, d)))
        }

        fn find_by_hash(&self, hash: &str) -> io::Result<Option<FileEntry>> {
            Ok(self
                .0
                .iter()
                .map(|(n, d)| Self::entry(n, d))
                .find(|e| e.hash == hash))
        }

        fn read(&self, entry: &FileEntry) -> io::Result<Vec<u8>> {
            self.0
                .get(&entry.name)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    fn responder() -> Responder {
        Responder::new(5003, "192.168.1.20".parse().unwrap())
    }

    fn sender() -> SocketAddr {
        "192.168.1.30:41000".parse().unwrap()
    }

    #[test]
    fn discover_replies_to_declared_port_and_records_peer() {
        let actions = responder()
            .on_datagram(br#"{"type":"discover","port":5003}"#, sender(), &MemFiles::default())
            .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Send {
                    to: "192.168.1.30:5003".parse().unwrap(),
                    message: Message::PeerInfo { port: 5003 },
                },
                Action::PeerSeen("192.168.1.30:5003".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn own_announcements_are_ignored() {
        let r = responder();
        let me: SocketAddr = "192.168.1.20:5003".parse().unwrap();
        let files = MemFiles::default();
        assert!(r.on_message(Message::Discover { port: 5003 }, me, &files).unwrap().is_empty());
        assert!(r.on_message(Message::PeerInfo { port: 5003 }, me, &files).unwrap().is_empty());
    }

    #[test]
    fn peer_info_records_declared_port() {
        let actions = responder()
            .on_message(Message::PeerInfo { port: 6000 }, sender(), &MemFiles::default())
            .unwrap();
        assert_eq!(
            actions,
            vec![Action::PeerSeen("192.168.1.30:6000".parse().unwrap())]
        );
    }

    #[test]
    fn query_file_answers_to_reply_port() {
        let files = MemFiles::with("report.pdf", b"pdf");
        let actions = responder()
            .on_message(
                Message::QueryFile {
                    filename: "report.pdf".into(),
                    reply_port: Some(45000),
                },
                sender(),
                &files,
            )
            .unwrap();
        assert_eq!(
            actions,
            vec![Action::Send {
                to: "192.168.1.30:45000".parse().unwrap(),
                message: Message::FileFoundResponse {
                    filename: "report.pdf".into(),
                    file_hash: integrity::hash_bytes(b"pdf"),
                    peer_ip: "192.168.1.20".into(),
                    port: Some(5003),
                },
            }]
        );
    }

    #[test]
    fn query_file_without_reply_port_falls_back_to_source() {
        let files = MemFiles::with("report.pdf", b"pdf");
        let actions = responder()
            .on_datagram(
                br#"{"type":"query_file","filename":"report.pdf"}"#,
                sender(),
                &files,
            )
            .unwrap();
        assert!(matches!(&actions[..], [Action::Send { to, .. }] if *to == sender()));
    }

    #[test]
    fn query_file_for_unknown_name_is_silent() {
        let actions = responder()
            .on_message(
                Message::QueryFile {
                    filename: "missing.dat".into(),
                    reply_port: Some(1),
                },
                sender(),
                &MemFiles::with("report.pdf", b"pdf"),
            )
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn receive_file_sends_file_data() {
        let files = MemFiles::with("report.pdf", b"pdf bytes");
        let hash = integrity::hash_bytes(b"pdf bytes");
        let actions = responder()
            .on_message(
                Message::ReceiveFile {
                    file_hash: hash.clone(),
                    port: Some(46000),
                },
                sender(),
                &files,
            )
            .unwrap();
        let [Action::Send { to, message }] = &actions[..] else {
            panic!("expected one send, got {actions:?}");
        };
        assert_eq!(*to, "192.168.1.30:46000".parse().unwrap());
        assert_eq!(*message, transfer::file_data_message(&hash, "report.pdf", b"pdf bytes"));
    }

    #[test]
    fn receive_file_without_port_is_dropped() {
        let files = MemFiles::with("report.pdf", b"pdf");
        let err = responder()
            .on_message(
                Message::ReceiveFile {
                    file_hash: integrity::hash_bytes(b"pdf"),
                    port: None,
                },
                sender(),
                &files,
            )
            .unwrap_err();
        assert!(matches!(err, DropReason::MissingReplyPort { .. }));
    }

    #[test]
    fn unknown_hash_is_silent() {
        let actions = responder()
            .on_message(
                Message::ReceiveFile {
                    file_hash: "00".repeat(32),
                    port: Some(1),
                },
                sender(),
                &MemFiles::with("a", b"a"),
            )
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn malformed_and_unexpected_are_drop_reasons() {
        let files = MemFiles::default();
        let r = responder();
        assert!(matches!(
            r.on_datagram(b"\xff\x00garbage", sender(), &files),
            Err(DropReason::Malformed(_))
        ));
        assert!(matches!(
            r.on_datagram(br#"{"type":"ping"}"#, sender(), &files),
            Err(DropReason::Malformed(_))
        ));
        let data = transfer::file_data_message("ab", "a", b"");
        assert!(matches!(
            r.on_message(data, sender(), &files),
            Err(DropReason::Unexpected("file_data"))
        ));
    }
}
