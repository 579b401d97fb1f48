//! Alternative transport: plain TCP file server and client. The client sends a
//! file name; the server streams the file or answers one `ERROR: ...` line.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Request and streaming unit.
const BLOCK_SIZE: usize = 1024;
const ERROR_PREFIX: &[u8] = b"ERROR:";

pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await
}

/// Accept loop; one task per connection.
pub async fn run_file_server(
    listener: TcpListener,
    root: PathBuf,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(addr = ?listener.local_addr().ok(), root = %root.display(), "file server started");
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            r = listener.accept() => match r {
                Ok(v) => v,
                Err(e) => {
                    warn!("file server accept failed: {e}");
                    continue;
                }
            },
        };
        let root = root.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &root).await {
                warn!(%peer, "file server connection error: {e}");
            }
        });
    }
    debug!("file server stopped");
}

async fn handle_connection(mut stream: TcpStream, root: &Path) -> std::io::Result<()> {
    let mut buf = [0u8; BLOCK_SIZE];
    let n = stream.read(&mut buf).await?;
    let requested = String::from_utf8_lossy(&buf[..n]).trim().to_string();
    debug!(requested = %requested, "file server request");
    let resolved = {
        let root = root.to_path_buf();
        let requested = requested.clone();
        tokio::task::spawn_blocking(move || resolve(&root, &requested))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    };
    let path = match resolved {
        Ok(p) => p,
        Err(reason) => {
            warn!(requested = %requested, reason, "file server refused request");
            stream.write_all(format!("ERROR: {reason}\n").as_bytes()).await?;
            return Ok(());
        }
    };
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), "cannot open shared file: {e}");
            stream.write_all(b"ERROR: Could not read or send file.\n").await?;
            return Ok(());
        }
    };
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut block).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&block[..n]).await?;
    }
    stream.shutdown().await?;
    info!(path = %path.display(), "file sent over tcp");
    Ok(())
}

/// Map a requested name onto a file inside `root`.
fn resolve(root: &Path, requested: &str) -> Result<PathBuf, &'static str> {
    if requested.is_empty()
        || requested.contains("..")
        || requested.starts_with('/')
        || requested.starts_with('\\')
    {
        return Err("Invalid filename.");
    }
    if !root.is_dir() && std::fs::create_dir_all(root).is_err() {
        return Err("Server configuration issue (public directory could not be accessed or created).");
    }
    let root = root
        .canonicalize()
        .map_err(|_| "Server configuration issue (public directory not found).")?;
    let path = root.join(requested);
    let Ok(path) = path.canonicalize() else {
        return Err("File not found.");
    };
    if !path.starts_with(&root) {
        return Err("Access denied.");
    }
    if !path.is_file() {
        return Err("File not found.");
    }
    Ok(path)
}

/// Download `filename` from a peer's file server into `dest`. Returns the byte count.
///
/// The stream has no status header, so a reply is read as a refusal when it
/// is exactly one short `ERROR: ...` line. A shared file whose whole content
/// is such a line cannot be told apart and is reported as an error.
pub async fn fetch(server: SocketAddr, filename: &str, dest: &Path) -> std::io::Result<u64> {
    let mut stream = TcpStream::connect(server).await?;
    stream.write_all(filename.as_bytes()).await?;
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await?;
    if is_error_reply(&data) {
        let msg = String::from_utf8_lossy(&data).trim().to_string();
        return Err(std::io::Error::new(std::io::ErrorKind::NotFound, msg));
    }
    let len = data.len() as u64;
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || lanshare_core::transfer::save(&dest, &data))
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(len)
}

/// One `ERROR:` line, newline-terminated, shorter than a block.
fn is_error_reply(data: &[u8]) -> bool {
    data.len() < BLOCK_SIZE
        && data.starts_with(ERROR_PREFIX)
        && data.iter().position(|&b| b == b'\n') == Some(data.len() - 1)
}
