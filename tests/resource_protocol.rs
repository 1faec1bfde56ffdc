//! Fast, non-daemon coverage of the C3 (resource client) <-> C4 (resource server) protocol: the
//! two talk real HTTP to each other over a loopback listener, with no container or Docker daemon
//! involved, testing the HTTP transport against a real bound port rather than a mock.

use ipybox_host::{resource::server::ResourceServerState, ResourceClient};
use url::Url;

async fn spawn_server(root: std::path::PathBuf) -> Url {
    let state = ResourceServerState::new(root, vec![], "generated_tools");
    let router = ipybox_host::resource::server::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

#[tokio::test]
async fn uploads_and_downloads_a_single_file() {
    let root = tempfile::tempdir().unwrap();
    let base_url = spawn_server(root.path().to_path_buf()).await;
    let client = ResourceClient::new(base_url);

    let local_src = tempfile::NamedTempFile::new().unwrap();
    tokio::fs::write(local_src.path(), b"hello from the host").await.unwrap();

    client
        .upload_file(local_src.path(), "data/greeting.txt")
        .await
        .unwrap();
    assert_eq!(
        tokio::fs::read(root.path().join("data/greeting.txt")).await.unwrap(),
        b"hello from the host"
    );

    let local_dst = tempfile::NamedTempFile::new().unwrap();
    client
        .download_file("data/greeting.txt", local_dst.path())
        .await
        .unwrap();
    assert_eq!(
        tokio::fs::read(local_dst.path()).await.unwrap(),
        b"hello from the host"
    );
}

#[tokio::test]
async fn uploads_and_downloads_a_directory() {
    let root = tempfile::tempdir().unwrap();
    let base_url = spawn_server(root.path().to_path_buf()).await;
    let client = ResourceClient::new(base_url);

    let local_dir = tempfile::tempdir().unwrap();
    tokio::fs::write(local_dir.path().join("a.txt"), b"a").await.unwrap();
    tokio::fs::create_dir(local_dir.path().join("sub")).await.unwrap();
    tokio::fs::write(local_dir.path().join("sub/b.txt"), b"b").await.unwrap();

    client
        .upload_directory(local_dir.path(), "workspace")
        .await
        .unwrap();
    assert_eq!(
        tokio::fs::read(root.path().join("workspace/a.txt")).await.unwrap(),
        b"a"
    );
    assert_eq!(
        tokio::fs::read(root.path().join("workspace/sub/b.txt")).await.unwrap(),
        b"b"
    );

    let download_dir = tempfile::tempdir().unwrap();
    client
        .download_directory("workspace", download_dir.path())
        .await
        .unwrap();
    assert_eq!(
        tokio::fs::read(download_dir.path().join("a.txt")).await.unwrap(),
        b"a"
    );
    assert_eq!(
        tokio::fs::read(download_dir.path().join("sub/b.txt")).await.unwrap(),
        b"b"
    );
}

#[tokio::test]
async fn copy_and_delete_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let base_url = spawn_server(root.path().to_path_buf()).await;
    let client = ResourceClient::new(base_url);

    let local_src = tempfile::NamedTempFile::new().unwrap();
    tokio::fs::write(local_src.path(), b"copy me").await.unwrap();
    client.upload_file(local_src.path(), "orig.txt").await.unwrap();

    client.copy("orig.txt", "copy.txt").await.unwrap();
    assert_eq!(tokio::fs::read(root.path().join("copy.txt")).await.unwrap(), b"copy me");

    client.delete("copy.txt").await.unwrap();
    assert!(!root.path().join("copy.txt").exists());

    // Deleting an already-missing path is not an error.
    client.delete("copy.txt").await.unwrap();
}

#[tokio::test]
async fn resolves_module_source_across_search_roots() {
    let root = tempfile::tempdir().unwrap();
    tokio::fs::write(root.path().join("mymodule.py"), "VALUE = 42\n").await.unwrap();
    let base_url = spawn_server(root.path().to_path_buf()).await;
    let client = ResourceClient::new(base_url);

    let source = client.module_source("mymodule").await.unwrap();
    assert!(source.contains("VALUE = 42"));

    let missing = client.module_source("does_not_exist").await;
    assert!(missing.is_err());
}
