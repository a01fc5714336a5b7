//! Local file uploads into temporary blob references.
//!
//! The workspace hands out a SAS-signed container URI per pending upload; files
//! are written into it as block blobs and the resulting blob URI is what gets
//! registered on the asset.

use amlinfra_abstraction::{ApiError, ApiResult};
use reqwest::Client;
use std::path::Path;
use tracing::{debug, error};
use walkdir::WalkDir;

/// URI schemes the service resolves on its own; anything else is a local path.
const REMOTE_SCHEMES: &[&str] = &["https://", "http://", "azureml://", "wasbs://", "abfss://"];

/// True when `path` already points at remote storage.
#[must_use]
pub fn is_remote_uri(path: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| path.starts_with(scheme))
}

/// Splits a SAS URI into its base and query parts and inserts `blob_name`.
fn blob_url(sas_uri: &str, blob_name: &str) -> String {
    let (base, query) = sas_uri.split_once('?').unwrap_or((sas_uri, ""));
    let encoded: Vec<String> =
        blob_name.split('/').map(|segment| urlencoding::encode(segment).into_owned()).collect();
    let mut url = format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"));
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Writes local files into a SAS-authorized container.
pub(crate) struct BlobUploader<'a> {
    client: &'a Client,
    sas_uri: &'a str,
}

impl<'a> BlobUploader<'a> {
    pub fn new(client: &'a Client, sas_uri: &'a str) -> Self {
        Self { client, sas_uri }
    }

    async fn put_blob(&self, blob_name: &str, local: &Path) -> ApiResult<()> {
        let bytes = tokio::fs::read(local).await.map_err(|e| {
            ApiError::UploadError(format!("failed to read {}: {e}", local.display()))
        })?;

        debug!(blob = %blob_name, bytes = bytes.len(), "Uploading blob");

        let response = self
            .client
            .put(blob_url(self.sas_uri, blob_name))
            .header("x-ms-blob-type", "BlockBlob")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ApiError::UploadError(format!("blob upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, blob = %blob_name, "Blob upload rejected");
            return Err(ApiError::UploadError(format!("blob {blob_name} rejected ({status}): {body}")));
        }
        Ok(())
    }

    /// Uploads a file or a directory tree.
    ///
    /// Returns the blob-relative path to register: the file name for a file,
    /// `<dir>/` for a directory.
    pub async fn upload_path(&self, local: &Path) -> ApiResult<String> {
        // `.` and `..` have no file name of their own; resolve to the real directory.
        let local = tokio::fs::canonicalize(local)
            .await
            .map_err(|e| ApiError::UploadError(format!("path does not exist: {}: {e}", local.display())))?;
        let local = local.as_path();
        let root_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ApiError::UploadError(format!("cannot upload {}", local.display())))?;

        if local.is_file() {
            self.put_blob(&root_name, local).await?;
            return Ok(root_name);
        }

        if !local.is_dir() {
            return Err(ApiError::UploadError(format!("path does not exist: {}", local.display())));
        }

        let mut uploaded = 0usize;
        for entry in WalkDir::new(local).sort_by_file_name() {
            let entry = entry.map_err(|e| ApiError::UploadError(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(local)
                .map_err(|e| ApiError::UploadError(e.to_string()))?;
            let relative: Vec<String> =
                relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
            let blob_name = format!("{root_name}/{}", relative.join("/"));
            self.put_blob(&blob_name, entry.path()).await?;
            uploaded += 1;
        }

        debug!(dir = %local.display(), files = uploaded, "Uploaded directory");
        Ok(format!("{root_name}/"))
    }
}
