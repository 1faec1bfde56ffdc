//! Reference implementation of the resource service (C4) that a container image is expected to
//! run: the HTTP peer [`ResourceClient`](super::ResourceClient) talks to.

use std::{path::PathBuf, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};

use super::{
    error::ResourceError,
    modules::resolve_source,
    protocol::{CopyRequest, GenerateStubsRequest, GenerateStubsResponse, ModuleSourceResponse},
};
use crate::{core::copy::resolves_within, tools};

/// Shared state for one resource service instance.
#[derive(Debug, Clone)]
pub struct ResourceServerState {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// The fixed working directory bind-mount targets and generated stubs are rooted under.
    root: PathBuf,
    /// Extra directories searched for module source, in order, before `root` is tried.
    module_search_roots: Vec<PathBuf>,
    /// Subdirectory of `root` that generated tool stub namespaces are created under.
    tools_namespace: String,
}

impl ResourceServerState {
    pub fn new(root: PathBuf, module_search_roots: Vec<PathBuf>, tools_namespace: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root,
                module_search_roots,
                tools_namespace: tools_namespace.into(),
            }),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, ResourceError> {
        let relative = relative.trim_start_matches('/');
        if !resolves_within(&self.inner.root, std::path::Path::new(relative)) {
            return Err(ResourceError::InvalidPath(relative.to_string()));
        }
        Ok(self.inner.root.join(relative))
    }

    fn tools_dir(&self, server_name: &str) -> PathBuf {
        self.inner
            .root
            .join(&self.inner.tools_namespace)
            .join(sanitize(server_name))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Builds the axum router exposing the resource service's file, module, and tool-stub endpoints.
pub fn router(state: ResourceServerState) -> Router {
    Router::new()
        .route("/files/{*path}", put(put_file).get(get_file))
        .route("/dirs/{*path}", put(put_dir).get(get_dir))
        .route("/copy", post(post_copy))
        .route("/fs/{*path}", delete(delete_fs))
        .route("/modules/{*name}", get(get_module))
        .route("/tools/{server_name}", post(post_tools).get(get_tools))
        .with_state(state)
}

async fn put_file(
    State(state): State<ResourceServerState>,
    AxumPath(path): AxumPath<String>,
    body: Bytes,
) -> Result<StatusCode, ResourceError> {
    let target = state.resolve(&path)?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_file(
    State(state): State<ResourceServerState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Response, ResourceError> {
    let target = state.resolve(&path)?;
    let meta = tokio::fs::metadata(&target)
        .await
        .map_err(|_| ResourceError::NotFound { path: path.clone() })?;
    if !meta.is_file() {
        return Err(ResourceError::NotFound { path });
    }
    let bytes = tokio::fs::read(&target).await?;
    Ok(bytes.into_response())
}

async fn put_dir(
    State(state): State<ResourceServerState>,
    AxumPath(path): AxumPath<String>,
    body: Bytes,
) -> Result<StatusCode, ResourceError> {
    let target = state.resolve(&path)?;
    tokio::fs::create_dir_all(&target).await?;
    crate::core::copy::extract_tar_safely(&body, &target)
        .await
        .map_err(|e| ResourceError::UnsafeArchive(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_dir(
    State(state): State<ResourceServerState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Response, ResourceError> {
    let target = state.resolve(&path)?;
    if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return Err(ResourceError::NotFound { path });
    }

    let mut archive = tokio_tar::Builder::new(Vec::new());
    archive.append_dir_all(".", &target).await?;
    let tar_bytes = archive.into_inner().await?;
    Ok(tar_bytes.into_response())
}

async fn post_copy(
    State(state): State<ResourceServerState>,
    Json(request): Json<CopyRequest>,
) -> Result<StatusCode, ResourceError> {
    let src = state.resolve(&request.src)?;
    let dst = state.resolve(&request.dst)?;

    let meta = tokio::fs::metadata(&src)
        .await
        .map_err(|_| ResourceError::NotFound { path: request.src.clone() })?;
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if meta.is_dir() {
        copy_dir_recursive(&src, &dst).await?;
    } else {
        tokio::fs::copy(&src, &dst).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) -> Result<(), ResourceError> {
    tokio::fs::create_dir_all(dst).await?;
    let mut entries = tokio::fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            Box::pin(copy_dir_recursive(&entry.path(), &dst_path)).await?;
        } else {
            tokio::fs::copy(entry.path(), dst_path).await?;
        }
    }
    Ok(())
}

async fn delete_fs(
    State(state): State<ResourceServerState>,
    AxumPath(path): AxumPath<String>,
) -> Result<StatusCode, ResourceError> {
    let target = state.resolve(&path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await?,
        Ok(_) => tokio::fs::remove_file(&target).await?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ResourceError::Io(e)),
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_module(
    State(state): State<ResourceServerState>,
    AxumPath(name): AxumPath<String>,
) -> Result<Json<ModuleSourceResponse>, ResourceError> {
    let mut roots = state.inner.module_search_roots.clone();
    roots.push(state.inner.root.clone());
    let source = resolve_source(&roots, &name).await?;
    Ok(Json(ModuleSourceResponse { source }))
}

async fn post_tools(
    State(state): State<ResourceServerState>,
    AxumPath(server_name): AxumPath<String>,
    Json(request): Json<GenerateStubsRequest>,
) -> Result<Json<GenerateStubsResponse>, ResourceError> {
    let generated = tools::generate(
        &state.inner.root,
        &state.inner.tools_namespace,
        &server_name,
        &request.config,
    )
    .await?;
    Ok(Json(GenerateStubsResponse {
        tool_names: generated.tool_names,
    }))
}

async fn get_tools(
    State(state): State<ResourceServerState>,
    AxumPath(server_name): AxumPath<String>,
) -> Result<Response, ResourceError> {
    let dir = state.tools_dir(&server_name);
    if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
        return Err(ResourceError::NotFound { path: server_name });
    }

    let mut archive = tokio_tar::Builder::new(Vec::new());
    archive.append_dir_all(".", &dir).await?;
    let tar_bytes = archive.into_inner().await?;
    Ok(tar_bytes.into_response())
}

impl IntoResponse for ResourceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResourceError::NotPurePython { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ResourceError::InvalidPath(_) | ResourceError::UnsafeArchive(_) => StatusCode::BAD_REQUEST,
            ResourceError::Generator(tools::GeneratorError::InvalidSchema { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_parent_dir_escape() {
        let state = ResourceServerState::new(PathBuf::from("/app"), vec![], "generated_tools");
        assert!(matches!(
            state.resolve("../etc/passwd"),
            Err(ResourceError::InvalidPath(_))
        ));
    }

    #[test]
    fn resolve_accepts_nested_relative_path() {
        let state = ResourceServerState::new(PathBuf::from("/app"), vec![], "generated_tools");
        let resolved = state.resolve("data/file.txt").unwrap();
        assert_eq!(resolved, PathBuf::from("/app/data/file.txt"));
    }

    #[test]
    fn tools_dir_sanitizes_server_name() {
        let state = ResourceServerState::new(PathBuf::from("/app"), vec![], "generated_tools");
        let dir = state.tools_dir("my server!");
        assert_eq!(dir, PathBuf::from("/app/generated_tools/my_server_"));
    }
}
