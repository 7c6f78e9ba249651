//! Artifact download endpoint

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::RegistryClient;
use crate::error::{ClientError, Result};

impl RegistryClient {
    // =============================================================================
    // Artifacts
    // =============================================================================

    /// Download a build's artifact archive into `dest_dir`
    ///
    /// The body is streamed to `dest_dir/filename` chunk by chunk. Waiting for
    /// the headers and for each chunk is bounded by the read deadline, not the
    /// whole transfer. A non-success status fails before the file is created. If the stream breaks or stalls
    /// part way through, the partial file is removed before the error is returned.
    ///
    /// # Returns
    /// Path of the downloaded archive
    pub async fn download_artifact(
        &self,
        project_id: u64,
        build_id: u64,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        validate_filename(filename)?;

        let url = format!(
            "{}/projects/{}/builds/{}/artifacts",
            self.base_url, project_id, build_id
        );
        // The read deadline also bounds the wait for response headers
        let read_timeout = self.timeouts.read;
        let response = tokio::time::timeout(read_timeout, self.get(&url).send())
            .await
            .map_err(|_| ClientError::StreamStalled {
                after: read_timeout,
            })??;
        let response = Self::check_status(response).await?;

        let path = dest_dir.join(filename);
        let mut file = File::create(&path)
            .await
            .map_err(|e| ClientError::io(&path, e))?;

        match self.stream_to_file(response, &mut file, &path).await {
            Ok(bytes) => {
                info!("Downloaded {} ({} bytes) from build {}", filename, bytes, build_id);
                Ok(path)
            }
            Err(e) => {
                drop(file);
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove partial download {}: {}", path.display(), rm);
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        mut response: reqwest::Response,
        file: &mut File,
        path: &Path,
    ) -> Result<u64> {
        let read_timeout = self.timeouts.read;
        let mut written = 0u64;

        loop {
            let chunk = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| ClientError::StreamStalled {
                    after: read_timeout,
                })??;

            let Some(chunk) = chunk else { break };

            file.write_all(&chunk)
                .await
                .map_err(|e| ClientError::io(path, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| ClientError::io(path, e))?;
        file.sync_all().await.map_err(|e| ClientError::io(path, e))?;

        Ok(written)
    }
}

/// Artifact file names come from the registry and must stay inside the destination
fn validate_filename(filename: &str) -> Result<()> {
    let mut components = Path::new(filename).components();
    let is_plain = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );

    if !is_plain || filename.contains(['/', '\\']) {
        return Err(ClientError::InvalidRequest(format!(
            "Artifact file name must be a plain file name: '{}'",
            filename
        )));
    }
    Ok(())
}
