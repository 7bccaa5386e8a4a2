use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::supervisor::StreamLiveness;

/// Gate for the first base manifest written by the transcoder.
#[derive(Debug, Clone)]
pub struct BaseManifestWatcher {
    path: PathBuf,
}

impl BaseManifestWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the base manifest exists and is not empty.
    pub async fn ready(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or_default()
    }

    /// Poll until the base manifest is ready.
    ///
    /// Returns `false` if `liveness` reports the stream as gone before that.
    pub async fn wait_ready<L>(&self, interval: Duration, liveness: &L) -> bool
    where
        L: StreamLiveness + ?Sized,
    {
        loop {
            if self.ready().await {
                return true;
            }
            if !liveness.is_alive() {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}
