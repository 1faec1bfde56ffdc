//! The host-side resource client (C3): a thin typed wrapper over the resource service's HTTP
//! surface. Idempotent operations (download, delete, module source, stub fetch) are retried with
//! bounded exponential backoff on transport failure; non-idempotent operations (upload, copy,
//! generate) fail fast.

use std::path::Path;

use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use url::Url;

use super::{
    error::ResourceError,
    protocol::{CopyRequest, GenerateStubsRequest, GenerateStubsResponse, ModuleSourceResponse},
};
use crate::{core::copy::extract_tar_safely, tools::ToolServerConfig};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: std::time::Duration = std::time::Duration::from_millis(100);
const MAX_BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);

/// A typed wrapper over one container's resource service.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ResourceClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Uploads a single file, overwriting any existing file and creating parent directories.
    /// Non-idempotent: fails fast on the first transport error.
    pub async fn upload_file(&self, local: &Path, container_path: &str) -> Result<(), ResourceError> {
        let bytes = tokio::fs::read(local).await?;
        let url = self.files_url(container_path)?;
        let response = self.http.put(url).body(bytes).send().await?;
        ensure_success(response).await
    }

    /// Streams a file's body to `local`. Idempotent: retried on transport failure.
    pub async fn download_file(&self, container_path: &str, local: &Path) -> Result<(), ResourceError> {
        let url = self.files_url(container_path)?;
        retry_idempotent(|| async {
            let response = self.http.get(url.clone()).send().await?;
            let response = ensure_success_response(response).await?;
            let stream = response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
            let mut reader = StreamReader::new(stream);
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::File::create(local).await?;
            tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok(())
        })
        .await
    }

    /// Uploads a directory as a tar archive, extracted atomically server-side. Non-idempotent.
    pub async fn upload_directory(
        &self,
        local_dir: &Path,
        container_path: &str,
    ) -> Result<(), ResourceError> {
        let tar_bytes = build_tar(local_dir).await?;
        let url = self.dirs_url(container_path)?;
        let response = self.http.put(url).body(tar_bytes).send().await?;
        ensure_success(response).await
    }

    /// Downloads a subtree as a tar archive and extracts it into `local_dir`. Idempotent.
    pub async fn download_directory(
        &self,
        container_path: &str,
        local_dir: &Path,
    ) -> Result<(), ResourceError> {
        let url = self.dirs_url(container_path)?;
        let tar_bytes = retry_idempotent(|| async {
            let response = self.http.get(url.clone()).send().await?;
            let response = ensure_success_response(response).await?;
            Ok(response.bytes().await?.to_vec())
        })
        .await?;

        tokio::fs::create_dir_all(local_dir).await?;
        extract_tar_safely(&tar_bytes, local_dir)
            .await
            .map_err(|e| ResourceError::UnsafeArchive(e.to_string()))
    }

    /// Server-side copy of `src` to `dst` inside the container. Non-idempotent: `dst` is
    /// overwritten.
    pub async fn copy(&self, src: &str, dst: &str) -> Result<(), ResourceError> {
        let url = self.join("copy")?;
        let response = self
            .http
            .post(url)
            .json(&CopyRequest {
                src: src.to_string(),
                dst: dst.to_string(),
            })
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Deletes a file or directory. Idempotent: a missing path is not an error, and the request
    /// is retried on transport failure.
    pub async fn delete(&self, container_path: &str) -> Result<(), ResourceError> {
        let url = self.fs_url(container_path)?;
        retry_idempotent(|| async {
            let response = self.http.delete(url.clone()).send().await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(());
            }
            ensure_success(response).await
        })
        .await
    }

    /// Returns an importable module's source text. Idempotent.
    pub async fn module_source(&self, module: &str) -> Result<String, ResourceError> {
        let url = self.join(&format!("modules/{module}"))?;
        retry_idempotent(|| async {
            let response = self.http.get(url.clone()).send().await?;
            let response = ensure_success_response(response).await?;
            let body: ModuleSourceResponse = response.json().await?;
            Ok(body.source)
        })
        .await
    }

    /// Generates tool stubs for a configured tool server; returns the tool names generated.
    /// Non-idempotent (generation is write-once-overwrite; a retry after a partial failure could
    /// observe a half-regenerated namespace), so this fails fast.
    pub async fn generate_tool_stubs(
        &self,
        server_name: &str,
        config: &ToolServerConfig,
    ) -> Result<Vec<String>, ResourceError> {
        let url = self.join(&format!("tools/{server_name}"))?;
        let response = self
            .http
            .post(url)
            .json(&GenerateStubsRequest {
                config: config.clone(),
            })
            .send()
            .await?;
        let response = ensure_success_response(response).await?;
        let body: GenerateStubsResponse = response.json().await?;
        Ok(body.tool_names)
    }

    /// Downloads the previously generated stubs for `server_name` as a tar archive, extracted
    /// into `dest_dir`. Idempotent.
    pub async fn fetch_tool_stubs(&self, server_name: &str, dest_dir: &Path) -> Result<(), ResourceError> {
        let url = self.join(&format!("tools/{server_name}"))?;
        let tar_bytes = retry_idempotent(|| async {
            let response = self.http.get(url.clone()).send().await?;
            let response = ensure_success_response(response).await?;
            Ok(response.bytes().await?.to_vec())
        })
        .await?;

        tokio::fs::create_dir_all(dest_dir).await?;
        extract_tar_safely(&tar_bytes, dest_dir)
            .await
            .map_err(|e| ResourceError::UnsafeArchive(e.to_string()))
    }

    fn files_url(&self, container_path: &str) -> Result<Url, ResourceError> {
        self.join(&format!("files/{}", trim_leading_slash(container_path)))
    }

    fn dirs_url(&self, container_path: &str) -> Result<Url, ResourceError> {
        self.join(&format!("dirs/{}", trim_leading_slash(container_path)))
    }

    fn fs_url(&self, container_path: &str) -> Result<Url, ResourceError> {
        self.join(&format!("fs/{}", trim_leading_slash(container_path)))
    }

    fn join(&self, segment: &str) -> Result<Url, ResourceError> {
        self.base_url
            .join(segment)
            .map_err(|e| ResourceError::InvalidPath(e.to_string()))
    }
}

fn trim_leading_slash(path: &str) -> &str {
    path.trim_start_matches('/')
}

async fn ensure_success(response: reqwest::Response) -> Result<(), ResourceError> {
    ensure_success_response(response).await.map(|_| ())
}

async fn ensure_success_response(response: reqwest::Response) -> Result<reqwest::Response, ResourceError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ResourceError::NotFound {
            path: response.url().path().to_string(),
        });
    }
    if !status.is_success() {
        let status_code = status.as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(ResourceError::Server {
            status: status_code,
            message,
        });
    }
    Ok(response)
}

async fn retry_idempotent<F, Fut, T>(mut op: F) -> Result<T, ResourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ResourceError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                log::debug!("C3 resource op: retrying after transient failure: {err}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn build_tar(local_dir: &Path) -> Result<Vec<u8>, ResourceError> {
    let mut archive = tokio_tar::Builder::new(Vec::new());
    archive.append_dir_all(".", local_dir).await?;
    archive.into_inner().await.map_err(ResourceError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_leading_slash() {
        assert_eq!(trim_leading_slash("/a/b"), "a/b");
        assert_eq!(trim_leading_slash("a/b"), "a/b");
    }

    #[tokio::test]
    async fn build_tar_archives_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"hi").await.unwrap();
        let tar_bytes = build_tar(dir.path()).await.unwrap();
        assert!(!tar_bytes.is_empty());
    }
}
