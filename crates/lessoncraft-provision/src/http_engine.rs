//! Container engine over the Docker Engine HTTP API.
//!
//! Each session's DinD daemon is network-reachable; this engine dials it
//! directly. REST calls ride a breaker-guarded HTTP client; the terminal
//! attach uses the engine's WebSocket endpoint and pumps bytes between the
//! socket and a [`Terminal`] channel pair.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use lessoncraft_resilience::{BreakerOptions, GuardedHttpClient, HttpGuardError};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::engine::{ContainerEngine, CreateContainerOpts, EngineStats, Terminal};
use crate::error::{ProvisionError, Result};
use crate::tar;

/// Request deadline for engine REST calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`ContainerEngine`] implementation speaking the Docker Engine API.
pub struct HttpEngine {
    base_url: String,
    ws_base: String,
    http: GuardedHttpClient,
}

impl HttpEngine {
    /// Create an engine for the daemon at `endpoint` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = GuardedHttpClient::with_timeout(
            REQUEST_TIMEOUT,
            BreakerOptions::named(format!("engine-{endpoint}")),
        )
        .map_err(|e| ProvisionError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: format!("http://{endpoint}"),
            ws_base: format!("ws://{endpoint}"),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let response = self.http.execute(request).await.map_err(map_http_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(ProvisionError::NoSuchContainer(message))
        } else {
            Err(ProvisionError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn build(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Request> {
        builder
            .build()
            .map_err(|e| ProvisionError::Transport(e.to_string()))
    }
}

fn map_http_error(err: HttpGuardError) -> ProvisionError {
    match err {
        HttpGuardError::CircuitOpen => ProvisionError::CircuitOpen,
        HttpGuardError::Server(status) => ProvisionError::Api {
            status: status.as_u16(),
            message: "engine server error".to_string(),
        },
        HttpGuardError::Transport(e) => ProvisionError::Transport(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ExecCreated {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ExecInspect {
    #[serde(rename = "ExitCode")]
    exit_code: Option<i64>,
}

#[async_trait]
impl ContainerEngine for HttpEngine {
    async fn container_create(&self, opts: CreateContainerOpts) -> Result<()> {
        let primary_network = opts.networks.first().cloned().unwrap_or_default();

        let mut host_config = json!({
            "Privileged": opts.privileged,
            "NetworkMode": primary_network,
        });
        if let Some(pids) = opts.max_processes {
            host_config["PidsLimit"] = json!(pids);
        }
        if let Some(memory_mb) = opts.max_memory_mb {
            host_config["Memory"] = json!(memory_mb * 1024 * 1024);
        }
        if let Some(size) = &opts.storage_size {
            host_config["StorageOpt"] = json!({ "size": size });
        }
        if let Some(profile) = &opts.apparmor_profile {
            host_config["SecurityOpt"] = json!([format!("apparmor={profile}")]);
        }

        let body = json!({
            "Image": opts.image,
            "Hostname": opts.hostname,
            "Env": opts.envs,
            "Tty": true,
            "OpenStdin": true,
            "HostConfig": host_config,
        });

        let request = self.build(
            self.http
                .inner()
                .post(self.url("/containers/create"))
                .query(&[("name", opts.name.as_str())])
                .json(&body),
        )?;
        self.send(request).await?;

        // Attach any additional networks before start.
        for network in opts.networks.iter().skip(1) {
            let request = self.build(
                self.http
                    .inner()
                    .post(self.url(&format!("/networks/{network}/connect")))
                    .json(&json!({ "Container": opts.name })),
            )?;
            self.send(request).await?;
        }

        let request = self.build(
            self.http
                .inner()
                .post(self.url(&format!("/containers/{}/start", opts.name))),
        )?;
        self.send(request).await?;

        debug!(container = %opts.name, image = %opts.image, "created container");
        Ok(())
    }

    async fn container_ip(&self, name: &str, network: &str) -> Result<String> {
        let request = self.build(
            self.http
                .inner()
                .get(self.url(&format!("/containers/{name}/json"))),
        )?;
        let response = self.send(request).await?;
        let inspect: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProvisionError::Protocol(e.to_string()))?;

        inspect["NetworkSettings"]["Networks"][network]["IPAddress"]
            .as_str()
            .filter(|ip| !ip.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                ProvisionError::Protocol(format!("container {name} has no address on {network}"))
            })
    }

    async fn container_delete(&self, name: &str) -> Result<()> {
        let request = self.build(
            self.http
                .inner()
                .delete(self.url(&format!("/containers/{name}")))
                .query(&[("force", "true")]),
        )?;
        self.send(request).await.map(|_| ())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<i64> {
        self.exec_capture(name, cmd).await.map(|(code, _)| code)
    }

    async fn exec_capture(&self, name: &str, cmd: &[String]) -> Result<(i64, String)> {
        let request = self.build(
            self.http
                .inner()
                .post(self.url(&format!("/containers/{name}/exec")))
                .json(&json!({
                    "Cmd": cmd,
                    "AttachStdout": true,
                    "AttachStderr": true,
                    "Tty": true,
                })),
        )?;
        let created: ExecCreated = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProvisionError::Protocol(e.to_string()))?;

        let request = self.build(
            self.http
                .inner()
                .post(self.url(&format!("/exec/{}/start", created.id)))
                .json(&json!({ "Detach": false, "Tty": true })),
        )?;
        let output = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(|e| ProvisionError::Protocol(e.to_string()))?;

        let request = self.build(
            self.http
                .inner()
                .get(self.url(&format!("/exec/{}/json", created.id))),
        )?;
        let inspect: ExecInspect = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProvisionError::Protocol(e.to_string()))?;

        Ok((inspect.exit_code.unwrap_or(-1), output))
    }

    async fn attach(&self, name: &str) -> Result<Terminal> {
        let url = format!(
            "{}/containers/{name}/attach/ws?stream=1&stdin=1&stdout=1&stderr=1",
            self.ws_base
        );

        let connect = tokio_tungstenite::connect_async(&url).await;
        // The handshake feeds the same breaker as the REST calls.
        self.http.breaker().record(connect.is_ok());
        let (socket, _) = connect.map_err(|e| ProvisionError::Transport(e.to_string()))?;

        let (mut ws_write, mut ws_read) = socket.split();
        let (terminal, mut input_rx, output_tx) = Terminal::channel(64);

        tokio::spawn(async move {
            while let Some(data) = input_rx.recv().await {
                if ws_write.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        let container = name.to_string();
        tokio::spawn(async move {
            while let Some(message) = ws_read.next().await {
                match message {
                    Ok(Message::Binary(data)) => {
                        if output_tx.send(data.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Text(text)) => {
                        if output_tx.send(text.as_bytes().to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            debug!(container = %container, "terminal stream ended");
        });

        Ok(terminal)
    }

    async fn copy_to(
        &self,
        name: &str,
        dest_dir: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<()> {
        let archive = tar::encode_file(file_name, &data);
        let request = self.build(
            self.http
                .inner()
                .put(self.url(&format!("/containers/{name}/archive")))
                .query(&[("path", dest_dir)])
                .header("Content-Type", "application/x-tar")
                .body(archive),
        )?;
        self.send(request).await.map(|_| ())
    }

    async fn copy_from(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        let request = self.build(
            self.http
                .inner()
                .get(self.url(&format!("/containers/{name}/archive")))
                .query(&[("path", path)]),
        )?;
        let archive = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| ProvisionError::Protocol(e.to_string()))?;
        tar::extract_first_file(&archive)
    }

    async fn stats_sample(&self, name: &str) -> Result<EngineStats> {
        let request = self.build(
            self.http
                .inner()
                .get(self.url(&format!("/containers/{name}/stats")))
                .query(&[("stream", "false")]),
        )?;
        let sample: serde_json::Value = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProvisionError::Protocol(e.to_string()))?;

        Ok(parse_stats(&sample))
    }

    async fn container_ports(&self, name: &str) -> Result<Vec<u16>> {
        let request = self.build(
            self.http
                .inner()
                .get(self.url(&format!("/containers/{name}/json"))),
        )?;
        let inspect: serde_json::Value = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProvisionError::Protocol(e.to_string()))?;

        // Keys look like "8080/tcp".
        let mut ports: Vec<u16> = inspect["NetworkSettings"]["Ports"]
            .as_object()
            .map(|map| {
                map.keys()
                    .filter_map(|key| key.split('/').next())
                    .filter_map(|port| port.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        ports.sort_unstable();
        ports.dedup();
        Ok(ports)
    }

    async fn resize(&self, name: &str, rows: u32, cols: u32) -> Result<()> {
        let request = self.build(
            self.http
                .inner()
                .post(self.url(&format!("/containers/{name}/resize")))
                .query(&[("h", rows.to_string()), ("w", cols.to_string())]),
        )?;
        match self.send(request).await {
            Ok(_) => Ok(()),
            // Resizing a TTY that is not yet allocated is harmless.
            Err(ProvisionError::Api { status, message }) if status == 409 => {
                warn!(container = %name, message = %message, "resize before TTY allocation");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Derive a stats row from one engine sample, mirroring the engine's own
/// CPU accounting: delta of container usage over delta of system usage,
/// scaled by the core count.
fn parse_stats(sample: &serde_json::Value) -> EngineStats {
    let mem_usage = sample["memory_stats"]["usage"].as_f64().unwrap_or(0.0);
    let mem_limit = sample["memory_stats"]["limit"].as_f64().unwrap_or(0.0);

    let cpu_total = sample["cpu_stats"]["cpu_usage"]["total_usage"]
        .as_f64()
        .unwrap_or(0.0);
    let cpu_system = sample["cpu_stats"]["system_cpu_usage"]
        .as_f64()
        .unwrap_or(0.0);
    let pre_total = sample["precpu_stats"]["cpu_usage"]["total_usage"]
        .as_f64()
        .unwrap_or(0.0);
    let pre_system = sample["precpu_stats"]["system_cpu_usage"]
        .as_f64()
        .unwrap_or(0.0);
    let cores = sample["cpu_stats"]["cpu_usage"]["percpu_usage"]
        .as_array()
        .map_or(1.0, |v| v.len() as f64);

    let cpu_delta = cpu_total - pre_total;
    let system_delta = cpu_system - pre_system;
    let cpu_percent = if cpu_delta > 0.0 && system_delta > 0.0 {
        (cpu_delta / system_delta) * cores * 100.0
    } else {
        0.0
    };

    EngineStats {
        mem_usage,
        mem_limit,
        cpu_percent,
    }
}
