//! `GET /ws` upgrade handler.

use super::identity::SubscriberIdentity;
use crate::actors::{run_inbound_pump, run_outbound_pump, Delivery, Session};
use crate::errors::GatewayError;
use crate::events::Event;
use crate::routes::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::Extension;
use common::types::{SessionId, SubscriberId};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Upgrade the request and hand the socket to [`serve_session`].
///
/// Requests that are not valid WebSocket handshakes are rejected by the
/// `WebSocketUpgrade` extractor before the hub is involved.
#[instrument(skip_all, name = "rt.gateway.upgrade")]
pub async fn ws_upgrade(
    State(state): State<AppState>,
    identity: Option<Extension<SubscriberIdentity>>,
    ws: WebSocketUpgrade,
) -> Response {
    let subscriber = identity.map(|Extension(identity)| identity.subscriber_id);
    let limit = state.timings.max_message_bytes;

    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            if let Err(e) = serve_session(socket, state, subscriber).await {
                warn!(target: "rt.gateway", error = %e, "Failed to open session");
            }
        })
}

/// Turn an upgraded socket into a registered session with running pumps.
///
/// The `Connection` acknowledgement is queued before registration so it is
/// the first frame the client sees. If the hub refuses the session the socket
/// is closed and no pump is started.
///
/// # Errors
///
/// Returns `GatewayError::Registration` if the hub is unavailable.
pub async fn serve_session(
    mut socket: WebSocket,
    state: AppState,
    subscriber: Option<SubscriberId>,
) -> Result<SessionId, GatewayError> {
    let (session, mailbox) =
        Session::new(SessionId::new(), subscriber, state.config.mailbox_capacity);
    let session_id = session.id();

    if session.try_deliver(Arc::new(Event::connection_ack())) != Delivery::Delivered {
        debug!(
            target: "rt.gateway",
            session_id = %session_id,
            "Connection acknowledgement not queued"
        );
    }

    if let Err(e) = state.hub.register(Arc::clone(&session)).await {
        session.abort("registration failed");
        if let Err(close_err) = socket.send(Message::Close(None)).await {
            debug!(
                target: "rt.gateway",
                session_id = %session_id,
                error = %close_err,
                "Failed to close socket after registration failure"
            );
        }
        return Err(e.into());
    }

    session.mark_open();
    info!(
        target: "rt.gateway",
        session_id = %session_id,
        subscriber_id = session.subscriber().map_or("anonymous", |s| s.as_str()),
        "Session opened"
    );

    let (sink, stream) = socket.split();
    tokio::spawn(run_outbound_pump(
        Arc::clone(&session),
        state.hub.clone(),
        sink,
        mailbox,
        state.timings,
    ));
    tokio::spawn(run_inbound_pump(
        session,
        state.hub.clone(),
        stream,
        state.timings,
    ));

    Ok(session_id)
}
