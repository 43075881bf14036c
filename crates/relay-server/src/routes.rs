//! HTTP routes: room allocation and the room WebSocket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, trace, warn};

use sendit_protocol::constants::{
    RELAY_CREATE_ROOM_PATH, RELAY_MAX_MESSAGE_SIZE, RELAY_WS_PATH,
};
use sendit_protocol::{CreateRoomResponse, SignalingMessage};

use crate::rooms::{ParticipantId, RoomRegistry};

#[derive(Debug, Deserialize)]
struct JoinParams {
    room: Option<String>,
}

/// Builds the relay's router over `rooms`.
pub fn router(rooms: RoomRegistry) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(RELAY_CREATE_ROOM_PATH, post(create_room))
        .route(RELAY_WS_PATH, get(join_room))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(rooms)
}

async fn create_room(State(rooms): State<RoomRegistry>) -> Json<CreateRoomResponse> {
    let room_id = rooms.create().await;
    Json(CreateRoomResponse { room_id })
}

async fn join_room(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(rooms): State<RoomRegistry>,
) -> Response {
    let Some(room) = params
        .room
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "missing room parameter").into_response();
    };
    if let Err(e) = rooms.check(&room).await {
        warn!(%room, "rejecting join: {e}");
        return e.into_response();
    }

    ws.max_message_size(RELAY_MAX_MESSAGE_SIZE)
        .max_frame_size(RELAY_MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| serve_participant(socket, room, rooms))
}

/// Runs one participant's connection until either direction ends.
async fn serve_participant(socket: WebSocket, room: String, rooms: RoomRegistry) {
    // The room may have filled between the check and the upgrade.
    let (id, mut inbox) = match rooms.join(&room).await {
        Ok(joined) => joined,
        Err(e) => {
            warn!(%room, "join failed after upgrade: {e}");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = inbox.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let rooms = rooms.clone();
        let room = room.clone();
        async move {
            while let Some(Ok(msg)) = stream.next().await {
                match msg {
                    Message::Text(text) => relay_text(&rooms, &room, id, text.as_str()).await,
                    Message::Close(_) => break,
                    Message::Binary(data) => {
                        warn!(%room, participant = id, len = data.len(), "dropping binary frame");
                    }
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    rooms.leave(&room, id).await;
    info!(%room, participant = id, "connection closed");
}

/// Forwards one text frame if it is a signaling message; drops it otherwise.
async fn relay_text(rooms: &RoomRegistry, room: &str, from: ParticipantId, text: &str) {
    let kind = match SignalingMessage::from_json(text) {
        Ok(msg) => msg.kind(),
        Err(e) => {
            warn!(%room, participant = from, "dropping relay payload: {e}");
            return;
        }
    };
    let delivered = rooms.forward(room, from, text).await;
    if delivered == 0 {
        debug!(%room, kind, "no other participant to receive message");
    } else {
        trace!(%room, kind, "relayed");
    }
}
