//! Helpers shared by the integration tests.

#![allow(dead_code)]

use futures_util::StreamExt;
use previewcast::message::Message;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Timeout for a message that is expected to arrive.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(5);
/// Wait used to assert that nothing arrives.
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a WebSocket connection to a local server.
pub async fn connect(port: u16) -> Client {
    let url = format!("ws://127.0.0.1:{}", port);
    let (client, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("WebSocket connect failed");
    client
}

/// Next record from the server, `None` on timeout, close or error.
pub async fn next_message(client: &mut Client, within: Duration) -> Option<Message> {
    loop {
        match timeout(within, client.next()).await {
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                return Some(serde_json::from_str(&text).expect("server sent an invalid record"))
            }
            Ok(Some(Ok(WsMessage::Ping(_)))) | Ok(Some(Ok(WsMessage::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Reads records until one matches `predicate`.
pub async fn wait_for_message<F>(client: &mut Client, predicate: F) -> Option<Message>
where
    F: Fn(&Message) -> bool,
{
    while let Some(message) = next_message(client, SHORT_TIMEOUT).await {
        if predicate(&message) {
            return Some(message);
        }
    }
    None
}

/// Polls `condition` every 20 ms until it holds or `within` elapses.
pub async fn wait_until<F>(condition: F, within: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Title field of a document record.
pub fn document_title(message: &Message) -> Option<&str> {
    match message {
        Message::Document { data: Some(data) } => data.get("title").and_then(|t| t.as_str()),
        _ => None,
    }
}
