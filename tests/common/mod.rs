#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use axum::http::StatusCode;
use color_eyre::Result;
use fsr_bridge::{
    actions::Update,
    config::{Config, DeviceConfig, DevicePort},
    mock::MockDevice,
};
use futures::SinkExt;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const N: usize = 8;

/// A running server talking to a mock pad.
/// Stops the server when dropped.
pub struct TestServer {
    pub port: u16,
    pub device: MockDevice,
    /// Holds the profile log and the images directory.
    pub data: PathBuf,
    _dir: Option<TempDir>,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn test_config(data: &Path) -> Config {
    Config {
        device: DeviceConfig {
            port: DevicePort::Mock,
            read_timeout_ms: 20,
            reconnect_backoff_ms: 20,
            queue_poll_ms: 5,
            values_interval_ms: 5,
            ..Default::default()
        },
        profiles_path: data.join("profiles.txt"),
        images_dir: data.join("images"),
        ..Default::default()
    }
}

pub async fn start_server() -> Result<TestServer> {
    let dir = tempfile::tempdir()?;

    let mut server = start_server_in(dir.path()).await?;
    server._dir = Some(dir);

    Ok(server)
}

/// Start a server keeping its data in an existing directory.
pub async fn start_server_in(data: &Path) -> Result<TestServer> {
    if !data.join("images").exists() {
        std::fs::create_dir(data.join("images"))?;
    }

    let config = test_config(data);
    let device = MockDevice::new(N);
    // Agree with the default profile from the start.
    device.set_thresholds(vec![1000; N]);
    let shutdown = CancellationToken::new();

    let (port_tx, port_rx) = oneshot::channel();

    tokio::spawn({
        let device = device.clone();
        let shutdown = shutdown.clone();
        async move { fsr_bridge::server::run_any_port_with_mock(config, device, port_tx, shutdown).await }
    });

    let port = port_rx.await?;

    Ok(TestServer {
        port,
        device,
        data: data.to_owned(),
        _dir: None,
        shutdown,
    })
}

pub async fn connect(port: u16) -> Result<Client> {
    info!("Connecting to server on port {port}");
    let (stream, http_response) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/ws")).await?;

    assert_eq!(http_response.status(), StatusCode::SWITCHING_PROTOCOLS);

    Ok(stream)
}

pub async fn receive(client: &mut Client) -> Result<Update> {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await?
            .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

        if message.is_text() {
            return Ok(serde_json::from_str(message.to_text()?)?);
        }
    }
}

/// Receive until an update matches, skipping others (like the steady stream of values).
pub async fn receive_until(
    client: &mut Client,
    mut matches: impl FnMut(&Update) -> bool,
) -> Result<Update> {
    let deadline = Instant::now() + Duration::from_secs(5);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let update = timeout(remaining, receive(client)).await??;

        if matches(&update) {
            return Ok(update);
        }
    }
}

/// Receive until an update with the given key arrives.
pub async fn receive_key(client: &mut Client, key: &str) -> Result<Update> {
    receive_until(client, |update| update.key() == key).await
}

pub async fn send(client: &mut Client, request: String) -> Result<()> {
    client.send(tungstenite::Message::Text(request)).await?;
    Ok(())
}

/// A plain HTTP GET, returning the body.
pub async fn get(port: u16, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;

    stream
        .write_all(
            format!("GET {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n").as_bytes(),
        )
        .await?;

    let mut response = String::new();
    timeout(Duration::from_secs(5), stream.read_to_string(&mut response)).await??;

    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| color_eyre::eyre::eyre!("No HTTP body in {response:?}"))?;

    if !head.starts_with("HTTP/1.1 200") {
        return Err(color_eyre::eyre::eyre!("Bad response: {head}"));
    }

    Ok(body.to_owned())
}

/// Wait for something that happens in the background.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !condition() {
        if Instant::now() > deadline {
            return Err(color_eyre::eyre::eyre!("Timed out waiting for: {what}"));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    Ok(())
}
