use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::TransportStream;

/// `sun_path` capacity: 108 bytes on Linux, 104 on the BSDs and macOS.
#[cfg(target_os = "linux")]
const SUN_PATH_CAPACITY: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_CAPACITY: usize = 104;

/// A socket file on disk, remembered by device and inode.
///
/// Removal only happens while the path still names the same socket, so a
/// listener never deletes a file someone else put there after it bound.
#[derive(Debug)]
struct SocketFile {
    path: PathBuf,
    identity: (u64, u64),
}

impl SocketFile {
    fn capture(path: PathBuf) -> io::Result<Self> {
        let meta = fs::symlink_metadata(&path)?;
        Ok(Self {
            path,
            identity: (meta.dev(), meta.ino()),
        })
    }

    fn still_ours(&self) -> bool {
        fs::symlink_metadata(&self.path)
            .map(|meta| meta.file_type().is_socket() && (meta.dev(), meta.ino()) == self.identity)
            .unwrap_or(false)
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        if self.still_ours() {
            debug!(path = ?self.path, "removing socket file");
            let _ = fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket file replaced or gone; leaving it");
        }
    }
}

/// Clear a leftover socket from a previous run. Regular files are refused.
fn clear_stale(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(?path, "removing stale socket");
            fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a unix socket",
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Listening Unix domain socket.
///
/// Accepted connections come back as [`TransportStream`]s. The socket file is
/// removed when the listener is dropped.
pub struct UnixDomainSocket {
    listener: UnixListener,
    file: SocketFile,
}

impl UnixDomainSocket {
    /// Permission bits applied to new socket files (owner read/write).
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind with [`DEFAULT_SOCKET_MODE`](Self::DEFAULT_SOCKET_MODE).
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref();
        let len = path.as_os_str().len();
        if len >= SUN_PATH_CAPACITY {
            return Err(TransportError::PathTooLong {
                path: path.to_path_buf(),
                len,
                max: SUN_PATH_CAPACITY,
            });
        }

        let bind_err = |source: io::Error| TransportError::Bind {
            addr: path.display().to_string(),
            source,
        };
        clear_stale(path).map_err(bind_err)?;
        let listener = UnixListener::bind(path).map_err(bind_err)?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(bind_err)?;
        let file = SocketFile::capture(path.to_path_buf()).map_err(bind_err)?;

        info!(?path, mode = %format!("{mode:o}"), "listening on unix domain socket");
        Ok(Self { listener, file })
    }

    pub async fn accept(&self) -> Result<TransportStream> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        debug!(path = ?self.file.path, "accepted unix connection");
        Ok(TransportStream::from(stream))
    }

    pub async fn connect(path: impl AsRef<Path>) -> Result<TransportStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| TransportError::Connect {
                addr: path.display().to_string(),
                source,
            })?;
        debug!(?path, "connected over unix domain socket");
        Ok(TransportStream::from(stream))
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }
}
