use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};

use crate::auth::AuthUser;
use crate::hub::{Client, Envelope, Hub};
use crate::state::AppState;

pub const WRITE_WAIT: Duration = Duration::from_secs(10);
pub const PONG_WAIT: Duration = Duration::from_secs(60);
pub const PING_PERIOD: Duration = Duration::from_secs(54);
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Client→server frame. `payload` stays raw so signaling bytes are relayed
/// untouched.
#[derive(Debug, Deserialize)]
struct ClientFrame<'a> {
    #[serde(rename = "type")]
    kind: String,
    #[serde(borrow)]
    payload: &'a RawValue,
}

#[derive(Debug, Deserialize)]
struct TypingPayload {
    to: i64,
    #[allow(dead_code)]
    typing: bool,
}

#[derive(Debug, Deserialize)]
struct SignalPayload<'a> {
    to: i64,
    #[serde(borrow)]
    data: &'a RawValue,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthUser,
) -> impl IntoResponse {
    tracing::debug!(user_id = user.id, username = %user.username, "websocket upgrade");
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    let (client, outbound) = Client::new(user.id, user.username.clone());
    let conn_id = client.conn_id;
    let (sender, receiver) = socket.split();

    state.hub.register(client).await;

    tokio::spawn(write_pump(sender, outbound));
    read_pump(receiver, &state.hub, user.id).await;

    state.hub.unregister(user.id, conn_id).await;
    tracing::debug!(user_id = user.id, "websocket closed");
}

/// Drains the outbound queue onto the socket and keeps the peer alive with
/// periodic pings. Queue closure (eviction or unregister) sends a close
/// frame and ends the task.
async fn write_pump(mut sender: SplitSink<WebSocket, Message>, mut outbound: mpsc::Receiver<String>) {
    let mut ticker = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    match timeout(WRITE_WAIT, sender.send(Message::Text(text))).await {
                        Ok(Ok(())) => {}
                        _ => break,
                    }
                }
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                match timeout(WRITE_WAIT, sender.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
}

/// Reads frames until the socket dies or the peer stops answering pings.
/// Every inbound frame (pongs included) re-arms the 60 s deadline.
async fn read_pump(mut receiver: SplitStream<WebSocket>, hub: &Hub, user_id: i64) {
    loop {
        let frame = match timeout(PONG_WAIT, receiver.next()).await {
            Err(_) => {
                tracing::debug!(user_id, "websocket read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::debug!(user_id, error = %err, "websocket read error");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => handle_frame(hub, user_id, &text),
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Dispatch one inbound frame. Unparseable frames and unknown types are
/// ignored, never fatal.
fn handle_frame(hub: &Hub, from: i64, text: &str) {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        return;
    };

    match frame.kind.as_str() {
        "typing" => {
            let Ok(payload) = serde_json::from_str::<TypingPayload>(frame.payload.get()) else {
                return;
            };
            hub.send_message(
                payload.to,
                Envelope {
                    kind: "typing".to_string(),
                    from,
                    data: Some(frame.payload.get().as_bytes().to_vec()),
                    timestamp: Utc::now().timestamp(),
                    ..Default::default()
                },
            );
        }
        "call_offer" | "call_answer" | "call_ice" | "call_end" => {
            let Ok(payload) = serde_json::from_str::<SignalPayload>(frame.payload.get()) else {
                return;
            };
            hub.send_message(
                payload.to,
                Envelope {
                    kind: frame.kind.clone(),
                    from,
                    data: Some(payload.data.get().as_bytes().to_vec()),
                    timestamp: Utc::now().timestamp(),
                    ..Default::default()
                },
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;
    use tokio::time::timeout as tokio_timeout;

    async fn hub_with_client(user_id: i64, name: &str) -> (Hub, mpsc::Receiver<String>) {
        let hub = Hub::spawn(store::test_pool().await);
        let (client, rx) = Client::new(user_id, name.to_string());
        hub.register(client).await;
        (hub, rx)
    }

    async fn next_envelope(rx: &mut mpsc::Receiver<String>) -> Envelope {
        let frame = tokio_timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame within deadline")
            .expect("channel open");
        serde_json::from_str(&frame).expect("valid envelope")
    }

    #[tokio::test]
    async fn typing_is_relayed_with_the_original_payload() {
        let (hub, mut rx) = hub_with_client(2, "bob").await;
        let _ = next_envelope(&mut rx).await; // bob's own presence

        handle_frame(&hub, 1, r#"{"type":"typing","payload":{"to":2,"typing":true}}"#);

        let envelope = next_envelope(&mut rx).await;
        assert_eq!(envelope.kind, "typing");
        assert_eq!(envelope.from, 1);
        assert_eq!(envelope.to, Some(2));
        let payload: serde_json::Value =
            serde_json::from_slice(envelope.data.as_deref().unwrap()).unwrap();
        assert_eq!(payload["to"], 2);
        assert_eq!(payload["typing"], true);
    }

    #[tokio::test]
    async fn signaling_data_is_relayed_opaquely() {
        let (hub, mut rx) = hub_with_client(2, "bob").await;
        let _ = next_envelope(&mut rx).await;

        handle_frame(
            &hub,
            1,
            r#"{"type":"call_offer","payload":{"to":2,"data":{"sdp":"v=0..."}}}"#,
        );

        let envelope = next_envelope(&mut rx).await;
        assert_eq!(envelope.kind, "call_offer");
        assert_eq!(envelope.from, 1);
        let data: serde_json::Value =
            serde_json::from_slice(envelope.data.as_deref().unwrap()).unwrap();
        assert_eq!(data["sdp"], "v=0...");
    }

    #[tokio::test]
    async fn call_end_relays_like_the_other_signals() {
        let (hub, mut rx) = hub_with_client(2, "bob").await;
        let _ = next_envelope(&mut rx).await;

        handle_frame(&hub, 1, r#"{"type":"call_end","payload":{"to":2,"data":{}}}"#);
        let envelope = next_envelope(&mut rx).await;
        assert_eq!(envelope.kind, "call_end");
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_ignored() {
        let (hub, mut rx) = hub_with_client(2, "bob").await;
        let _ = next_envelope(&mut rx).await;

        handle_frame(&hub, 1, "not json at all");
        handle_frame(&hub, 1, r#"{"type":"typing","payload":{"to":"x"}}"#);
        handle_frame(&hub, 1, r#"{"type":"shout","payload":{"to":2}}"#);
        handle_frame(&hub, 1, r#"{"type":"call_offer","payload":{}}"#);

        assert!(
            tokio_timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err(),
            "no frame should have been relayed"
        );
    }
}
