use std::net::SocketAddr;

use futures::{sink::Sink, stream::Stream, SinkExt, StreamExt};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{actions::Action, bridge::Bridge, hub::Subscription, peer::Peer, user::User};

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(bridge): Extension<Bridge>,
    Extension(shutdown): Extension<CancellationToken>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    }

    ws.on_upgrade(move |socket| {
        let user = User::new(&addr.to_string());

        let span = info_span!("User", %user);

        handle_websocket(socket, user, bridge, shutdown).instrument(span)
    })
}

pub(crate) async fn read<S>(mut receiver: S, peer: Peer)
where
    S: Unpin,
    S: Stream<Item = Result<Message, axum::Error>>,
{
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(request_text) => {
                trace!(%request_text, "peer request");
                match Action::parse(&request_text) {
                    Ok(action) => peer.do_user_action(action).await,
                    Err(e) => warn!(%e, "Ignoring request"),
                }
            }
            Message::Binary(_) => {
                debug!("client sent binary data");
            }
            Message::Ping(_) => {
                debug!("socket ping");
            }
            Message::Pong(_) => {
                debug!("socket pong");
            }
            Message::Close(_) => {
                debug!("client disconnected");
            }
        }
    }

    debug!("no more stuff");
}

pub(crate) async fn write(
    mut sender: impl Sink<Message> + Unpin,
    mut subscription: Subscription,
) {
    while let Some(update) = subscription.recv().await {
        trace!(%update, "Update");

        if sender.send(Message::Text(update.serialize())).await.is_err() {
            debug!("client disconnected");
            return;
        }
    }
}

pub(crate) async fn handle_websocket(
    websocket: WebSocket,
    user: User,
    bridge: Bridge,
    shutdown: CancellationToken,
) {
    let (mut stream_sender, stream_receiver) = websocket.split();

    let subscription = bridge.hub.register();
    debug!(id = %subscription.id(), "Subscribed");

    // The device may disagree with the stored thresholds.
    if let Err(e) = bridge.commands.query_thresholds() {
        warn!(?e, "Could not ask the device for thresholds");
    }

    let replay = match bridge.with_store(|store| store.current_fields()).await {
        Ok(replay) => replay,
        Err(e) => {
            warn!(?e, "Could not read the current profile");
            return;
        }
    };

    for update in replay {
        if stream_sender
            .send(Message::Text(update.serialize()))
            .await
            .is_err()
        {
            debug!("client disconnected during replay");
            return;
        }
    }

    let span = info_span!("User", %user);

    let peer = Peer::new(user, bridge);

    let mut read_handle = tokio::spawn(
        read(stream_receiver, peer).instrument(info_span!(parent: &span, "Read")),
    );
    let write_handle = tokio::spawn(
        write(stream_sender, subscription).instrument(info_span!(parent: &span, "Write")),
    );
    drop(span);

    tokio::select! {
        joined = &mut read_handle => match joined {
            Ok(()) => debug!("Read task joined"),
            Err(e) => warn!("Read task join error: {e:?}"),
        },
        _ = shutdown.cancelled() => {
            debug!("Shutting down, aborting read task");
            read_handle.abort();
        }
    }

    debug!("Aborting write task");
    // This ensures the underlying TCP connection gets closed,
    // which signals the peer that the session is over.
    // It also drops the subscription.
    write_handle.abort();
}
