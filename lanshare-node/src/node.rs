//! Node: owns the sockets, the peer list and the background loops, and is the
//! entry point the bridge calls into.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use lanshare_core::manifest::{self, FileManifest};
use lanshare_core::transfer::{self as file_transfer, sanitize_file_name};
use lanshare_core::{AddressBook, FileIndex, FileSource, Message, PeerAddress, Responder};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::query::{self, FileLocation};
use crate::{discovery, file_server, net, transfer};

/// A shared file as reported to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalFile {
    pub filename: String,
    pub hash: String,
    pub path: PathBuf,
}

/// Cheap to clone; all clones drive the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    socket: Arc<UdpSocket>,
    local_port: u16,
    peers: Arc<AddressBook>,
    files: FileIndex,
    file_server_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Bind sockets and start the broadcaster, listener and TCP file server.
    pub async fn start(config: Config) -> std::io::Result<Node> {
        let socket = Arc::new(net::bind_discovery_socket(config.discovery_port)?);
        let local_port = socket.local_addr()?.port();
        let self_ip = config.advertise_ip.unwrap_or_else(net::local_outbound_ip);
        let tcp = file_server::bind(config.file_server_port).await?;
        let file_server_addr = tcp.local_addr()?;
        let peers = Arc::new(AddressBook::new());
        let files = FileIndex::new(&config.shared_dir);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(discovery::run_listener(
                socket.clone(),
                Responder::new(local_port, self_ip),
                files.clone(),
                peers.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(discovery::run_broadcaster(
                socket.clone(),
                local_port,
                config.discovery_port,
                config.broadcast_addrs.clone(),
                config.announce_interval(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(file_server::run_file_server(
                tcp,
                config.shared_dir.clone(),
                shutdown_rx,
            )),
        ];
        info!(
            udp_port = local_port,
            %self_ip,
            tcp = %file_server_addr,
            shared = %config.shared_dir.display(),
            "node started"
        );
        Ok(Node {
            inner: Arc::new(Inner {
                config,
                socket,
                local_port,
                peers,
                files,
                file_server_addr,
                shutdown,
                tasks: Mutex::new(tasks),
            }),
        })
    }

    /// Port the discovery socket is bound to (may differ from the configured one).
    pub fn local_port(&self) -> u16 {
        self.inner.local_port
    }

    pub fn file_server_addr(&self) -> SocketAddr {
        self.inner.file_server_addr
    }

    /// Fires when the node is stopping.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// Signal every loop to exit and wait for them. In-flight lookups and
    /// downloads finish or time out on their own sockets.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown.send(true);
        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await {
                warn!("background task ended abnormally: {e}");
            }
        }
        info!("node stopped");
    }

    /// Find `filename` on the network and save it into the download directory.
    pub async fn download(&self, filename: &str) -> bool {
        let Some(name) = sanitize_file_name(filename) else {
            warn!(filename, "refusing download of unusable file name");
            return false;
        };
        info!(filename = %name, "starting download");
        let location = match self.find_file_source(&name).await {
            Ok(Some(loc)) => loc,
            Ok(None) => return false,
            Err(e) => {
                error!(filename = %name, "file lookup failed: {e}");
                return false;
            }
        };
        let dir = &self.inner.config.download_dir;
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), "cannot create download directory: {e}");
            return false;
        }
        let dest = dir.join(&name);
        transfer::receive_file(
            &self.inner.socket,
            location.peer,
            &location.file_hash,
            &dest,
            self.inner.config.transfer_timeout(),
        )
        .await
    }

    /// Broadcast lookup.
    pub async fn find_file_source(&self, filename: &str) -> std::io::Result<Option<FileLocation>> {
        let targets = net::query_targets(self.inner.config.broadcast_addrs.as_deref());
        query::find_file_source(
            &self.inner.socket,
            &targets,
            self.inner.config.discovery_port,
            filename,
            self.inner.config.broadcast_lookup_timeout(),
        )
        .await
    }

    /// Point-to-point lookup.
    pub async fn query_peer_for_file(
        &self,
        peer: PeerAddress,
        filename: &str,
    ) -> std::io::Result<Option<FileLocation>> {
        query::query_peer_for_file(
            &self.inner.socket,
            peer,
            filename,
            self.inner.config.peer_lookup_timeout(),
        )
        .await
    }

    /// Fetch over a peer's TCP file server into the download directory.
    pub async fn tcp_fetch(&self, server: SocketAddr, filename: &str) -> std::io::Result<u64> {
        let name = sanitize_file_name(filename).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unusable file name")
        })?;
        let dest = self.inner.config.download_dir.join(&name);
        file_server::fetch(server, &name, &dest).await
    }

    pub fn list_known_peers(&self) -> Vec<String> {
        self.inner.peers.list()
    }

    pub async fn list_local_files(&self) -> std::io::Result<Vec<LocalFile>> {
        let files = self.inner.files.clone();
        blocking(move || {
            Ok(files
                .entries()?
                .into_iter()
                .map(|e| LocalFile {
                    filename: e.name,
                    hash: e.hash,
                    path: e.path,
                })
                .collect())
        })
        .await
    }

    /// `file_data` for a local file, as handed to a bridge client.
    pub async fn local_file_data(&self, filename: &str) -> std::io::Result<Option<Message>> {
        let files = self.inner.files.clone();
        let filename = filename.to_string();
        blocking(move || {
            let Some(entry) = files.find_by_name(&filename)? else {
                return Ok(None);
            };
            let bytes = files.read(&entry)?;
            Ok(Some(file_transfer::file_data_message(
                &entry.hash,
                &entry.name,
                &bytes,
            )))
        })
        .await
    }

    pub async fn manifest(&self) -> std::io::Result<Vec<FileManifest>> {
        let root = self.inner.config.shared_dir.clone();
        blocking(move || manifest::manifest_for_directory(&root)).await
    }

    pub fn advertised_ip(&self) -> IpAddr {
        self.inner
            .config
            .advertise_ip
            .unwrap_or_else(net::local_outbound_ip)
    }
}

async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}
