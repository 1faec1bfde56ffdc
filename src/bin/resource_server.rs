//! Thin binary wrapping [`ipybox_host::resource::server`]'s reference resource service (C4). Not
//! the production image's resource service — a conformance fixture a real image may embed or
//! replace.

use std::path::PathBuf;

use ipybox_host::resource::server::{router, ResourceServerState};

const DEFAULT_PORT: u16 = 8900;
const DEFAULT_ROOT: &str = "/app";
const DEFAULT_TOOLS_NAMESPACE: &str = "generated_tools";

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let root = std::env::var("RESOURCE_SERVER_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROOT));
    let port: u16 = std::env::var("RESOURCE_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let module_search_roots = std::env::var("PYTHONPATH")
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default();

    let state = ResourceServerState::new(root.clone(), module_search_roots, DEFAULT_TOOLS_NAMESPACE);
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    log::info!("C4 resource-server: listening on {addr}, rooted at {}", root.display());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {addr}: {err}"));
    axum::serve(listener, app)
        .await
        .unwrap_or_else(|err| panic!("resource server failed: {err}"));
}
