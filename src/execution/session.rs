//! A binding of a container to exactly one kernel: `open`, `execute`/`submit`/`stream`/`result`,
//! `interrupt`, `close`, and `reset`.

use std::{sync::Arc, time::Duration};

use ferroid::{base32::Base32UlidExt, id::ULID};
use tokio::{sync::watch, time::Instant};
use url::Url;

use super::{
    channel::Channel,
    error::ExecutionError,
    protocol::{classify, GatewayMessage, MessagePayload},
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const INTERRUPT_GRACE_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Idempotent snapshot of a completed (or in-flight) execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub text: String,
    pub images: Vec<Vec<u8>>,
    pub error: Option<ErrorRecordSnapshot>,
}

#[derive(Debug, Clone)]
pub struct ErrorRecordSnapshot {
    pub name: String,
    pub value: String,
    pub traceback: Vec<String>,
}

/// A single submitted code unit, whose output can be iterated as it streams in.
pub struct Execution {
    id: String,
    session_http: reqwest::Client,
    gateway_base: Url,
    channel: Arc<Channel>,
    rx: tokio::sync::mpsc::UnboundedReceiver<GatewayMessage>,
    disconnected: watch::Receiver<bool>,
    state: ExecutionState,
    text: String,
    images: Vec<Vec<u8>>,
    error: Option<ErrorRecordSnapshot>,
}

impl Execution {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Yields text chunks as they arrive. On timeout, issues an interrupt and reports
    /// [`ExecutionError::Timeout`]; no partial output already buffered is discarded.
    pub async fn stream(&mut self, timeout: Duration) -> Result<Vec<String>, ExecutionError> {
        if self.state != ExecutionState::Pending && self.state != ExecutionState::Running {
            return Ok(Vec::new());
        }
        self.state = ExecutionState::Running;

        if *self.disconnected.borrow() {
            self.state = ExecutionState::Failed;
            return Err(ExecutionError::ConnectionLost);
        }

        let deadline = Instant::now() + timeout;
        let mut chunks = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.on_timeout(timeout).await?;
                return Err(ExecutionError::Timeout {
                    execution_id: self.id.clone(),
                    elapsed_ms: timeout.as_millis() as u64,
                });
            }

            tokio::select! {
                // A heartbeat failure on the session must fail pending executions fast rather
                // than leaving them to hang until their own timeout; see `spawn_heartbeat`.
                changed = self.disconnected.changed() => {
                    if changed.is_err() || *self.disconnected.borrow() {
                        self.state = ExecutionState::Failed;
                        self.channel.unregister(&self.id).await;
                        return Err(ExecutionError::ConnectionLost);
                    }
                }
                recv = tokio::time::timeout(remaining, self.rx.recv()) => match recv {
                    Ok(Some(msg)) => match classify(&msg, &self.id) {
                        MessagePayload::Idle => {
                            self.state = ExecutionState::Completed;
                            self.channel.unregister(&self.id).await;
                            return Ok(chunks);
                        }
                        MessagePayload::Stream(text) => {
                            self.text.push_str(&text);
                            chunks.push(text);
                        }
                        MessagePayload::Image(bytes) => self.images.push(bytes),
                        MessagePayload::Error(record) => {
                            self.error = Some(ErrorRecordSnapshot {
                                name: record.name,
                                value: record.value,
                                traceback: record.traceback,
                            });
                        }
                        MessagePayload::Other => {}
                    },
                    Ok(None) => {
                        self.state = ExecutionState::Failed;
                        return Err(ExecutionError::ConnectionLost);
                    }
                    Err(_elapsed) => {
                        self.on_timeout(timeout).await?;
                        return Err(ExecutionError::Timeout {
                            execution_id: self.id.clone(),
                            elapsed_ms: timeout.as_millis() as u64,
                        });
                    }
                },
            }
        }
    }

    async fn on_timeout(&mut self, _original_timeout: Duration) -> Result<(), ExecutionError> {
        self.state = ExecutionState::TimedOut;
        let _ = interrupt(&self.session_http, &self.gateway_base).await;

        // Drain for a short grace period so any in-flight output that was already on the wire is
        // not discarded, per the "no partial results are discarded" guarantee.
        let grace_deadline = Instant::now() + INTERRUPT_GRACE_PERIOD;
        while Instant::now() < grace_deadline {
            let remaining = grace_deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Ok(Some(msg)) => match classify(&msg, &self.id) {
                    MessagePayload::Stream(text) => self.text.push_str(&text),
                    MessagePayload::Image(bytes) => self.images.push(bytes),
                    MessagePayload::Idle => break,
                    _ => {}
                },
                _ => break,
            }
        }
        self.channel.unregister(&self.id).await;
        Ok(())
    }

    /// Returns the final aggregated snapshot, blocking until completion if not yet complete.
    pub async fn result(mut self, timeout: Duration) -> ExecutionResult {
        if self.state == ExecutionState::Pending || self.state == ExecutionState::Running {
            let _ = self.stream(timeout).await;
        }
        ExecutionResult {
            text: self.text,
            images: self.images,
            error: self.error,
        }
    }
}

async fn interrupt(http: &reqwest::Client, gateway_base: &Url) -> Result<(), ExecutionError> {
    // kernel id is embedded in gateway_base by `Session::interrupt`; this free function exists
    // only to share the POST call between `Session::interrupt` and execution-timeout handling.
    http.post(gateway_base.clone())
        .send()
        .await
        .map_err(ExecutionError::Gateway)?;
    Ok(())
}

/// A binding of a container to exactly one kernel.
pub struct Session {
    http: reqwest::Client,
    gateway_base: Url,
    kernel_id: String,
    channel: Arc<Channel>,
    heartbeat: tokio::task::JoinHandle<()>,
    disconnected: watch::Sender<bool>,
}

impl Session {
    /// Creates a kernel (HTTP), opens the kernel's bidirectional message channel, and starts a
    /// background heartbeat producer.
    pub async fn open(gateway_base: Url) -> Result<Self, ExecutionError> {
        let http = reqwest::Client::new();
        let kernel_id = create_kernel(&http, &gateway_base).await?;
        let channel = Arc::new(open_channel(&gateway_base, &kernel_id).await?);

        let (disconnected, _) = watch::channel(false);
        let heartbeat = spawn_heartbeat(
            http.clone(),
            gateway_base.clone(),
            kernel_id.clone(),
            disconnected.clone(),
        );

        Ok(Self {
            http,
            gateway_base,
            kernel_id,
            channel,
            heartbeat,
            disconnected,
        })
    }

    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    pub fn is_connected(&self) -> bool {
        !*self.disconnected.borrow()
    }

    /// Submits code and returns a handle whose output can be iterated.
    pub async fn submit(&self, code: &str) -> Result<Execution, ExecutionError> {
        if !self.is_connected() {
            return Err(ExecutionError::Disconnected);
        }

        // A fresh opaque token, per the "execution identifier" data model entry. ULID rather
        // than UUIDv4 so execution ids are lexically sortable by submission time, matching the
        // teacher's own choice of token shape for ephemeral, caller-visible identifiers.
        let execution_id = ULID::from_datetime(std::time::SystemTime::now()).encode();
        let rx = self.channel.register(execution_id.clone()).await;
        let request = GatewayMessage::execute_request(execution_id.clone(), code);
        self.channel.send(&request)?;

        Ok(Execution {
            id: execution_id,
            session_http: self.http.clone(),
            gateway_base: self.interrupt_url(),
            channel: self.channel.clone(),
            rx,
            disconnected: self.disconnected.subscribe(),
            state: ExecutionState::Pending,
            text: String::new(),
            images: Vec::new(),
            error: None,
        })
    }

    /// Submits code and blocks until complete.
    pub async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        let execution = self.submit(code).await?;
        Ok(execution.result(timeout).await)
    }

    /// Sends an out-of-band interrupt to the kernel.
    pub async fn interrupt(&self) -> Result<(), ExecutionError> {
        self.http
            .post(self.interrupt_url())
            .send()
            .await
            .map_err(ExecutionError::Gateway)?;
        Ok(())
    }

    /// Closes the current kernel and opens a fresh one against the same gateway, reusing the
    /// existing base URL; the container itself is untouched.
    pub async fn reset(&mut self) -> Result<(), ExecutionError> {
        delete_kernel(&self.http, &self.gateway_base, &self.kernel_id).await?;
        self.heartbeat.abort();

        let kernel_id = create_kernel(&self.http, &self.gateway_base).await?;
        let channel = Arc::new(open_channel(&self.gateway_base, &kernel_id).await?);
        self.disconnected.send_replace(false);
        self.heartbeat = spawn_heartbeat(
            self.http.clone(),
            self.gateway_base.clone(),
            kernel_id.clone(),
            self.disconnected.clone(),
        );
        self.kernel_id = kernel_id;
        self.channel = channel;
        Ok(())
    }

    /// Deletes the kernel and closes the channel.
    pub async fn close(self) -> Result<(), ExecutionError> {
        self.heartbeat.abort();
        delete_kernel(&self.http, &self.gateway_base, &self.kernel_id).await
    }

    fn interrupt_url(&self) -> Url {
        self.gateway_base
            .join(&format!("api/kernels/{}/interrupt", self.kernel_id))
            .expect("kernel id is URL-safe")
    }
}

async fn create_kernel(http: &reqwest::Client, gateway_base: &Url) -> Result<String, ExecutionError> {
    #[derive(serde::Deserialize)]
    struct KernelCreated {
        id: String,
    }

    let url = gateway_base
        .join("api/kernels")
        .map_err(|e| ExecutionError::InvalidUrl(e.to_string()))?;
    let created: KernelCreated = http
        .post(url)
        .send()
        .await
        .map_err(ExecutionError::Gateway)?
        .json()
        .await
        .map_err(ExecutionError::Gateway)?;
    Ok(created.id)
}

async fn delete_kernel(
    http: &reqwest::Client,
    gateway_base: &Url,
    kernel_id: &str,
) -> Result<(), ExecutionError> {
    let url = gateway_base
        .join(&format!("api/kernels/{kernel_id}"))
        .map_err(|e| ExecutionError::InvalidUrl(e.to_string()))?;
    http.delete(url).send().await.map_err(ExecutionError::Gateway)?;
    Ok(())
}

async fn open_channel(gateway_base: &Url, kernel_id: &str) -> Result<Channel, ExecutionError> {
    let mut channel_url = gateway_base
        .join(&format!("api/kernels/{kernel_id}/channels"))
        .map_err(|e| ExecutionError::InvalidUrl(e.to_string()))?;
    let scheme = match channel_url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    channel_url
        .set_scheme(scheme)
        .map_err(|_| ExecutionError::InvalidUrl(channel_url.to_string()))?;

    Channel::connect(channel_url).await
}

fn spawn_heartbeat(
    http: reqwest::Client,
    gateway_base: Url,
    kernel_id: String,
    disconnected: watch::Sender<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let probe_url = match gateway_base.join(&format!("api/kernels/{kernel_id}")) {
            Ok(url) => url,
            Err(_) => return,
        };
        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            match http.get(probe_url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {}
                _ => {
                    log::warn!("C2 heartbeat: gateway probe failed, marking session disconnected");
                    // `send_replace` wakes every `Execution::stream` awaiting `disconnected.changed()`
                    // so pending executions fail with `ConnectionLost` instead of hanging until
                    // their own timeout.
                    disconnected.send_replace(true);
                    break;
                }
            }
        }
    })
}

impl Drop for Session {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}
