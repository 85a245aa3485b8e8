//! WebSocket endpoint for joining a room.
//!
//! `GET /ws/{id}` upgrades the request and hands the socket to the hub,
//! which relays every text or binary message to the other members of the
//! room. Ping/pong is answered by the transport and never reaches the hub.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use huddle_hub::{
    Connection, ConnectionError, Frame, FrameReader, FrameWriter, Hub, Message, Room,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppState};
use crate::observability::METRICS;

/// WebSocket upgrade handler.
///
/// The room is resolved before the upgrade so an unknown id is answered
/// with 404 instead of a socket.
pub async fn ws_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let room = state.hub.room(&id)?;
    if state.hub.is_shutting_down() {
        return Err(ApiError::ShuttingDown);
    }
    let ws = ws?;

    let hub = state.hub.clone();
    Ok(ws
        .max_message_size(state.max_message_size)
        .on_failed_upgrade(|e| {
            METRICS.websocket_upgrade_failures.inc();
            warn!(error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_socket(socket, hub, room)))
}

/// Run an upgraded socket as a hub client.
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, room: Arc<Room>) {
    METRICS.websocket_connections.inc();
    debug!(room_id = %room.id, "WebSocket connected");

    match hub.accept(WsConnection::new(socket), room).await {
        Ok(summary) => {
            METRICS.record_session(&summary);
            info!(
                client_id = %summary.client_id,
                room_id = %summary.room_id,
                reason = %summary.reason,
                "WebSocket session ended"
            );
        }
        Err(e) => warn!(error = %e, "WebSocket rejected by hub"),
    }

    METRICS.websocket_connections.dec();
}

/// An axum WebSocket as a hub [`Connection`].
pub struct WsConnection {
    socket: WebSocket,
}

impl WsConnection {
    /// Wrap an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Connection for WsConnection {
    type Writer = WsWriter;
    type Reader = WsReader;

    fn split(self) -> (WsWriter, WsReader) {
        let (sink, stream) = self.socket.split();
        (WsWriter { sink }, WsReader { stream })
    }
}

/// Read half of a [`WsConnection`].
pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn recv(&mut self) -> Option<Result<Frame, ConnectionError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ConnectionError::transport(e))),
            };

            match message {
                WsMessage::Text(text) => {
                    return Some(Ok(Frame::Message(Message::Text(text.as_str().to_owned()))))
                }
                WsMessage::Binary(data) => return Some(Ok(Frame::Message(Message::Binary(data)))),
                WsMessage::Close(frame) => {
                    debug!(code = ?frame.as_ref().map(|f| f.code), "WebSocket close received");
                    return Some(Ok(Frame::Close));
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            }
        }
    }
}

/// Write half of a [`WsConnection`].
pub struct WsWriter {
    sink: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        let frame = match message {
            Message::Text(text) => WsMessage::Text(text.into()),
            Message::Binary(data) => WsMessage::Binary(data),
        };
        self.sink
            .send(frame)
            .await
            .map_err(ConnectionError::transport)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.sink.close().await.map_err(ConnectionError::transport)
    }
}
