//! Daemon-gated end-to-end scenarios. These assume a reachable container engine and a notebook
//! gateway image exposing the kernel gateway and resource service on the ports
//! `ContainerController::start` waits on, gating tests that need a live Docker daemon behind
//! `#[ignore]`.

use std::time::Duration;

use ipybox_host::{container::ContainerDescriptor, tools::ToolServerConfig, ContainerController, ResourceClient};
use url::Url;

/// Substitute with a locally built image exposing the kernel gateway on
/// [`ipybox_host::container::EXECUTOR_INTERNAL_PORT`] and the resource service on
/// [`ipybox_host::container::RESOURCE_INTERNAL_PORT`].
const GATEWAY_IMAGE: &str = "sandbox-executor:test";

async fn gateway_url(handle: &ipybox_host::ContainerHandle) -> Url {
    let host = handle.host().await.expect("daemon host resolves");
    Url::parse(&format!("http://{host}:{}/", handle.executor_port())).expect("valid gateway url")
}

async fn resource_url(handle: &ipybox_host::ContainerHandle) -> Url {
    let host = handle.host().await.expect("daemon host resolves");
    Url::parse(&format!("http://{host}:{}/", handle.resource_port())).expect("valid resource url")
}

#[tokio::test]
#[ignore]
async fn scenario_1_hello_world() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();

    let controller = ContainerController::new().await?;
    let handle = controller.start(ContainerDescriptor::new(GATEWAY_IMAGE)).await?;

    let session = ipybox_host::Session::open(gateway_url(&handle).await).await?;
    let result = session.execute("print('Hello, world!')", Duration::from_secs(10)).await?;

    assert_eq!(result.text, "Hello, world!\n");
    assert!(result.images.is_empty());
    assert!(result.error.is_none());

    session.close().await?;
    handle.stop().await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn scenario_2_sessions_share_filesystem_not_memory() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();

    let controller = ContainerController::new().await?;
    let handle = controller.start(ContainerDescriptor::new(GATEWAY_IMAGE)).await?;

    let session_a = ipybox_host::Session::open(gateway_url(&handle).await).await?;
    session_a.execute("x = 1", Duration::from_secs(10)).await?;
    let result_a = session_a.execute("print(x)", Duration::from_secs(10)).await?;
    assert_eq!(result_a.text, "1\n");

    let session_b = ipybox_host::Session::open(gateway_url(&handle).await).await?;
    let result_b = session_b.execute("print(x)", Duration::from_secs(10)).await?;
    let error = result_b.error.expect("x is undefined in a fresh kernel");
    assert!(error.value.contains("name 'x' is not defined"));

    session_a.close().await?;
    session_b.close().await?;
    handle.stop().await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn scenario_3_streaming_loop_yields_chunks_in_order() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();

    let controller = ContainerController::new().await?;
    let handle = controller.start(ContainerDescriptor::new(GATEWAY_IMAGE)).await?;
    let session = ipybox_host::Session::open(gateway_url(&handle).await).await?;

    let code = "import time\nfor i in range(5):\n    print(f'Processing step {i}')\n    time.sleep(1)\n";
    let mut execution = session.submit(code).await?;
    let mut chunks = Vec::new();
    loop {
        let next = execution.stream(Duration::from_secs(10)).await?;
        if next.is_empty() && *execution.state() == ipybox_host::ExecutionState::Completed {
            break;
        }
        chunks.extend(next);
    }

    assert!(chunks.len() >= 5);
    let aggregate: String = chunks.concat();
    for i in 0..5 {
        assert!(aggregate.contains(&format!("Processing step {i}\n")));
    }

    session.close().await?;
    handle.stop().await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn scenario_4_timeout_interrupts_and_session_stays_usable() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();

    let controller = ContainerController::new().await?;
    let handle = controller.start(ContainerDescriptor::new(GATEWAY_IMAGE)).await?;
    let session = ipybox_host::Session::open(gateway_url(&handle).await).await?;

    let timed_out = session
        .execute("import time; time.sleep(30)", Duration::from_secs(1))
        .await;
    assert!(matches!(
        timed_out,
        Err(ipybox_host::ExecutionError::Timeout { .. })
    ));

    let result = session.execute("print(1)", Duration::from_secs(10)).await?;
    assert_eq!(result.text, "1\n");

    session.close().await?;
    handle.stop().await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn scenario_5_firewall_allow_list_restricts_egress() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();

    let controller = ContainerController::new().await?;
    let handle = controller.start(ContainerDescriptor::new(GATEWAY_IMAGE)).await?;
    handle.install_firewall(&["gradion.ai".to_string()]).await?;

    let session = ipybox_host::Session::open(gateway_url(&handle).await).await?;
    let allowed = session
        .execute(
            "import requests; requests.get('https://gradion.ai', timeout=5)",
            Duration::from_secs(10),
        )
        .await?;
    assert!(allowed.error.is_none());

    let blocked = session
        .execute(
            "import requests; requests.get('https://example.com', timeout=5)",
            Duration::from_secs(10),
        )
        .await?;
    assert!(blocked.error.is_some());

    session.close().await?;
    handle.stop().await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn scenario_6_generated_stub_round_trips_through_a_real_tool_call() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();

    let controller = ContainerController::new().await?;
    let handle = controller.start(ContainerDescriptor::new(GATEWAY_IMAGE)).await?;

    let resource_client = ResourceClient::new(resource_url(&handle).await);
    // Substitute with a real MCP-compatible tool server command advertising `tool_1(message: str)`.
    let config = ToolServerConfig::stdio("tool-server-example", vec!["--stdio".into()]);
    let tool_names = resource_client.generate_tool_stubs("demo_server", &config).await?;
    assert!(tool_names.contains(&"tool_1".to_string()));

    let session = ipybox_host::Session::open(gateway_url(&handle).await).await?;
    let result = session
        .execute(
            "from generated_tools.demo_server import tool_1\n\
             print(await tool_1(message='Hello from ipybox!'))\n",
            Duration::from_secs(10),
        )
        .await?;
    assert_eq!(result.text, "You passed to tool 1: Hello from ipybox!\n");

    session.close().await?;
    handle.stop().await?;
    Ok(())
}
