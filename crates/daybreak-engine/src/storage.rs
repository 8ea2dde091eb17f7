use anyhow::Result;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// On-disk store for submitted selfie images.
///
/// Each attempt is a single flat file at `{dir}/{attempt_id}.img`; the
/// returned path doubles as the attempt's opaque `image_ref`. Files are
/// never deleted by normal operation — like the attempt rows, they are
/// part of the audit trail.
pub struct SelfieVault {
    dir: PathBuf,
}

impl SelfieVault {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Selfie storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub async fn store(&self, attempt_id: &str, bytes: &[u8]) -> Result<String> {
        let path = self.dir.join(format!("{attempt_id}.img"));
        fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Best-effort removal, used only when a submission loses the dismissal
    /// race after its bytes were already written.
    pub async fn remove(&self, image_ref: &str) {
        if let Err(e) = fs::remove_file(image_ref).await {
            warn!("Failed to remove selfie file {}: {}", image_ref, e);
        }
    }
}
