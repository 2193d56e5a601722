use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, get_service},
    Extension, Json, Router,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    bridge::{self, Bridge},
    config::Config,
    error::Error,
    mock::MockDevice,
    websocket,
};

/// The default port to run the server on.
pub const DEFAULT_PORT: u16 = 5000;

async fn run(
    config: Config,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
    mock: Option<MockDevice>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    config.validate()?;

    let bridge = Bridge::new(&config, shutdown.clone())?;
    let link = bridge.start_link(bridge::connector(&config, mock), &config)?;

    let images = get_service(ServeDir::new(bridge.commands.images().dir())).handle_error(
        |error: std::io::Error| async move {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unhandled internal error: {error}"),
            )
        },
    );

    let app = Router::new()
        .route("/ws", get(websocket::ws_handler))
        .route("/defaults", get(show_defaults))
        .route("/config", get(show_config))
        .route("/version", get(show_version))
        .route("/images", get(list_images))
        .nest("/images", images)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Each websocket needs to be able to reach the profiles and the device
                .layer(Extension(bridge))
                // Sessions end when the server does
                .layer(Extension(shutdown.clone()))
                .layer(Extension(config.clone())),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let served = match axum::Server::try_bind(&addr) {
        Ok(builder) => {
            let server =
                builder.serve(app.into_make_service_with_connect_info::<SocketAddr>());
            let addr = server.local_addr();

            if let Some(port_reply) = allocated_port {
                if port_reply.send(addr.port()).is_err() {
                    warn!("Nobody wanted to know which port was allocated");
                }
            }

            info!("listening on {}", addr);

            server
                .with_graceful_shutdown(shutdown.cancelled())
                .await
                .map_err(|e| Error::InternalIssue(format!("Server problem: {e}")))
        }
        Err(e) => Err(Error::InternalIssue(format!("Could not bind {addr}: {e}"))),
    };

    // Whatever stopped the server also stops the device link.
    shutdown.cancel();
    if tokio::task::spawn_blocking(move || link.join()).await.is_err() {
        warn!("Could not join the device link");
    }
    info!("Server stopped");

    served
}

/// Start the server on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
///
/// Runs until the token is cancelled.
pub async fn run_any_port(
    config: Config,
    allocated_port: oneshot::Sender<u16>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    run(config, None, Some(allocated_port), None, shutdown).await
}

/// Start the server on the given port.
///
/// Runs until the token is cancelled.
pub async fn run_on_port(
    config: Config,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    run(config, Some(port), None, None, shutdown).await
}

/// As [`run_any_port`], but talking to the given mock device
/// no matter what the configuration says.
pub async fn run_any_port_with_mock(
    config: Config,
    mock: MockDevice,
    allocated_port: oneshot::Sender<u16>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    run(config, None, Some(allocated_port), Some(mock), shutdown).await
}

async fn show_defaults(Extension(bridge): Extension<Bridge>) -> impl IntoResponse {
    bridge
        .with_store(|store| store.snapshot())
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn list_images(Extension(bridge): Extension<Bridge>) -> impl IntoResponse {
    let images = bridge.commands.images().clone();

    match tokio::task::spawn_blocking(move || images.list()).await {
        Ok(Ok(names)) => Ok(Json(names)),
        Ok(Err(e)) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Listing failed: {e}"))),
    }
}

async fn show_config(Extension(config): Extension<Config>) -> impl IntoResponse {
    config.serialize_pretty()
}

async fn show_version() -> impl IntoResponse {
    format!("fsr-bridge v{}\n", env!("CARGO_PKG_VERSION"))
}
