//! Push channel for dashboard clients: relays every hub event and accepts
//! `control_led` commands. One task per connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::core::Hub;
use crate::handlers::SharedState;
use crate::types::{ClientMessage, Event, Severity};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: SharedState) {
    let (mut sink, mut stream) = socket.split();
    let mut events = state.hub.subscribe();

    // Seed the fresh listener so it does not wait for the next command.
    let seed = Event::LedUpdate(state.hub.led_state().await);
    if sink.send(to_frame(&seed)).await.is_err() {
        return;
    }
    info!("push channel client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if sink.send(to_frame(&event)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push channel client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_frame(&state.hub, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("push channel receive error: {e}");
                    break;
                }
            },
        }
    }
    info!("push channel client disconnected");
}

fn to_frame(event: &Event) -> Message {
    Message::Text(serde_json::to_string(event).unwrap_or_default())
}

// A malformed frame is logged and dropped; the connection stays up.
async fn handle_client_frame(hub: &Hub, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::ControlLed(cmd)) => match hub.set_led(cmd).await {
            Ok(state) => {
                info!(red = state.led_red, green = state.led_green, "led command applied");
            }
            Err(e) => {
                warn!("led command rejected: {e}");
                hub.notify(Severity::Error, format!("LED command rejected: {e}"));
            }
        },
        Err(e) => {
            warn!("dropping malformed push channel frame: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::LedState;
    use tokio::sync::{broadcast, mpsc};

    async fn hub() -> Hub {
        let store = Store::memory().await.unwrap();
        store.migrate().await.unwrap();
        let (events, _) = broadcast::channel(16);
        let (forward_tx, _forward_rx) = mpsc::channel(16);
        Hub::new(store, events, forward_tx)
    }

    #[tokio::test]
    async fn control_led_frame_mutates_state() {
        let hub = hub().await;
        handle_client_frame(
            &hub,
            r#"{"event": "control_led", "data": {"ledRed": 1, "ledGreen": 1}}"#,
        )
        .await;
        assert_eq!(
            hub.led_state().await,
            LedState {
                led_red: 1,
                led_green: 1,
            }
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_silently() {
        let hub = hub().await;
        handle_client_frame(&hub, "not json").await;
        handle_client_frame(&hub, r#"{"event": "reboot", "data": {}}"#).await;
        assert_eq!(hub.led_state().await, LedState::default());
    }

    #[tokio::test]
    async fn invalid_command_reports_without_state_change() {
        let hub = hub().await;
        let mut events = hub.subscribe();
        handle_client_frame(
            &hub,
            r#"{"event": "control_led", "data": {"ledRed": 5, "ledGreen": 0}}"#,
        )
        .await;
        assert_eq!(hub.led_state().await, LedState::default());
        match events.recv().await.unwrap() {
            Event::ServerMessage(msg) => assert_eq!(msg.kind, Severity::Error),
            other => panic!("expected server_message, got {other:?}"),
        }
    }
}
