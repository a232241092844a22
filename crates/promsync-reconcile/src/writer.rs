//! Live file replacement with rollback on write or reload failure.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use promsync_core::error::ReconcileError;

use crate::reload::Reload;

const DEFAULT_MODE: u32 = 0o644;

/// Contents and permissions of the live file before a pass touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Previous {
    /// `None` when there was no live file.
    pub bytes: Option<Vec<u8>>,
    pub mode: u32,
}

/// Read the current live file. A missing file has no bytes and mode 0644.
pub async fn read_previous(path: &Path) -> std::io::Result<Previous> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let mode = tokio::fs::metadata(path).await?.permissions().mode() & 0o7777;
            Ok(Previous {
                bytes: Some(bytes),
                mode,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Previous {
            bytes: None,
            mode: DEFAULT_MODE,
        }),
        Err(e) => Err(e),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.promsync.tmp"))
}

/// Replace `path` with `bytes`: temp file in the same directory, mode
/// applied, then rename over the target.
pub async fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> std::io::Result<()> {
    let tmp = temp_path(path);
    let result = async {
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(mode)).await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

/// Write validated bytes and reload. On failure restore the previous file,
/// reload again, and return the original error.
pub async fn commit(
    path: &Path,
    candidate: &[u8],
    reloader: &dyn Reload,
) -> Result<(), ReconcileError> {
    let previous = read_previous(path).await.map_err(ReconcileError::Write)?;

    let result = match write_atomic(path, candidate, previous.mode).await {
        Ok(()) => reloader.reload().await.map_err(ReconcileError::from),
        Err(e) => Err(ReconcileError::Write(e)),
    };

    match result {
        Ok(()) => {
            info!(path = %path.display(), bytes = candidate.len(), "Configuration reloaded");
            Ok(())
        }
        Err(e) => {
            warn!(path = %path.display(), %e, "Restoring previous configuration");
            restore(path, &previous, reloader).await;
            Err(e)
        }
    }
}

async fn restore(path: &Path, previous: &Previous, reloader: &dyn Reload) {
    let restored = match &previous.bytes {
        Some(bytes) => write_atomic(path, bytes, previous.mode).await,
        None => match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
    };
    if let Err(e) = restored {
        error!(path = %path.display(), %e, "Failed to restore previous configuration");
        return;
    }
    if let Err(e) = reloader.reload().await {
        error!(%e, "Failed to reload restored configuration");
    }
}
