//! Realtime task updates over WebSocket.
//!
//! A socket joins `task_{id}` rooms and receives every [`TaskUpdate`]
//! addressed to one of them. There is no authorisation on joins.

use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sloppy_core::notify::{TaskUpdate, room_name};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientEvent {
    JoinTaskRoom { task_id: String },
    LeaveTaskRoom { task_id: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ServerEvent {
    Connected { client_id: String },
    JoinedRoom { room: String },
    LeftRoom { room: String },
    TaskUpdate(TaskUpdate),
    Error { message: String },
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client_id = Uuid::new_v4().to_string();
    info!(client_id = %client_id, "realtime client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.hub.subscribe();
    let mut rooms: HashSet<String> = HashSet::new();

    let hello = ServerEvent::Connected {
        client_id: client_id.clone(),
    };
    if !send(&mut sender, &hello).await {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_client_event(&client_id, &mut rooms, text.as_str());
                    if !send(&mut sender, &reply).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client_id = %client_id, error = %e, "websocket receive failed");
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(update) => {
                    if deliverable(&rooms, &update)
                        && !send(&mut sender, &ServerEvent::TaskUpdate(update)).await
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(client_id = %client_id, skipped, "realtime client lagging; updates dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!(client_id = %client_id, "realtime client disconnected");
}

fn handle_client_event(client_id: &str, rooms: &mut HashSet<String>, text: &str) -> ServerEvent {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::JoinTaskRoom { task_id }) => {
            let room = room_name(&task_id);
            info!(client_id, room = %room, "joined task room");
            rooms.insert(room.clone());
            ServerEvent::JoinedRoom { room }
        }
        Ok(ClientEvent::LeaveTaskRoom { task_id }) => {
            let room = room_name(&task_id);
            info!(client_id, room = %room, "left task room");
            rooms.remove(&room);
            ServerEvent::LeftRoom { room }
        }
        Err(e) => ServerEvent::Error {
            message: format!("unrecognised event: {e}"),
        },
    }
}

fn deliverable(rooms: &HashSet<String>, update: &TaskUpdate) -> bool {
    update.rooms().iter().any(|room| rooms.contains(room))
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode realtime event");
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_and_leave_track_rooms() {
        let mut rooms = HashSet::new();
        let reply = handle_client_event(
            "c",
            &mut rooms,
            r#"{"event":"join_task_room","task_id":"abc"}"#,
        );
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({ "event": "joined_room", "data": { "room": "task_abc" } })
        );
        assert!(rooms.contains("task_abc"));

        handle_client_event("c", &mut rooms, r#"{"event":"leave_task_room","task_id":"abc"}"#);
        assert!(rooms.is_empty());

        let reply = handle_client_event("c", &mut rooms, r#"{"event":"dance"}"#);
        assert!(matches!(reply, ServerEvent::Error { .. }));
    }

    #[test]
    fn script_room_receives_downstream_updates() {
        let rooms = HashSet::from([room_name("script-1")]);
        let update = TaskUpdate::failed("task-9", "script-1", "ProviderFailure: HF_TOKEN missing");
        assert!(deliverable(&rooms, &update));
        assert!(!deliverable(&rooms, &TaskUpdate::completed("task-7", "script-2")));
    }

    #[test]
    fn task_update_wire_shape() {
        let event = ServerEvent::TaskUpdate(TaskUpdate::completed("t1", "t1"));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "event": "task_update", "data": { "task_id": "t1", "type": "completed" } })
        );
    }
}
