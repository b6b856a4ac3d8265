//! WebSocket transport for the streaming synthesis service.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Error;

const CONN_TIMEOUT: Duration = Duration::from_secs(10);

/// Reserved prefix of voice-replica speakers.
const REPLICA_SPEAKER_PREFIX: &str = "S_";

/// Resource family serving voice-replica speakers.
const RESOURCE_ID_REPLICA: &str = "volc.megatts.default";

/// Resource family serving stock speakers.
const RESOURCE_ID_STANDARD: &str = "volc.service_type.10029";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Returns the resource id routing the given speaker to its backend family.
///
/// Replica voices (speaker ids starting with `S_`) are served by a dedicated
/// resource family; every other speaker uses the standard one.
pub fn resource_id(speaker: &str) -> &'static str {
    if speaker.starts_with(REPLICA_SPEAKER_PREFIX) {
        RESOURCE_ID_REPLICA
    } else {
        RESOURCE_ID_STANDARD
    }
}

/// Authenticated WebSocket connection to the synthesis service.
pub struct WebSocket {
    write: Arc<Mutex<futures_util::stream::SplitSink<WsStream, Message>>>,
    read: Arc<Mutex<futures_util::stream::SplitStream<WsStream>>>,
}

impl WebSocket {
    /// Opens a new connection authenticated with the application key and
    /// access key, routed by the speaker's resource id. A fresh connect id
    /// is generated per connection.
    pub async fn connect(
        url: &str,
        app_id: &str,
        access_token: &str,
        speaker: &str,
        max_message_size: usize,
    ) -> Result<Self, Error> {
        let connect_id = Uuid::new_v4().to_string();
        info!(url = %url, connect_id = %connect_id, "WebSocket connecting");

        let request = Request::builder()
            .uri(url)
            .header("X-Api-App-Key", app_id)
            .header("X-Api-Access-Key", access_token)
            .header("X-Api-Resource-Id", resource_id(speaker))
            .header("X-Api-Connect-Id", connect_id.as_str())
            .header("Host", extract_host(url))
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| Error::WebSocket(e.into()))?;

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max_message_size);

        let (ws_stream, response) = timeout(
            CONN_TIMEOUT,
            tokio_tungstenite::connect_async_with_config(request, Some(config), false),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(Error::WebSocket)?;

        let logid = response
            .headers()
            .get("x-tt-logid")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("N/A");
        info!(url = %url, logid = %logid, "WebSocket connected");

        let (write, read) = ws_stream.split();

        Ok(Self {
            write: Arc::new(Mutex::new(write)),
            read: Arc::new(Mutex::new(read)),
        })
    }

    /// Sends a binary message.
    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Binary(data))
            .await
            .map_err(Error::WebSocket)
    }

    /// Receives the next binary message within the given time budget.
    ///
    /// Control messages (ping/pong) are answered or skipped; a close frame
    /// or stream end maps to [`Error::ConnectionClosed`], a text message to
    /// [`Error::UnexpectedTextMessage`].
    pub async fn recv_binary(&self, budget: Duration) -> Result<Vec<u8>, Error> {
        let mut reader = self.read.lock().await;
        loop {
            let msg = match timeout(budget, reader.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => return Err(Error::WebSocket(e)),
                Ok(None) => return Err(Error::ConnectionClosed),
                Err(_) => return Err(Error::SynthesisTimeout),
            };

            match msg {
                Message::Binary(data) => return Ok(data),
                Message::Text(text) => return Err(Error::UnexpectedTextMessage(text)),
                Message::Ping(data) => {
                    debug!("received ping");
                    self.send_pong(data).await?;
                }
                Message::Pong(_) => debug!("received pong"),
                Message::Close(frame) => {
                    debug!(frame = ?frame, "received close");
                    return Err(Error::ConnectionClosed);
                }
                Message::Frame(_) => debug!("received raw frame"),
            }
        }
    }

    async fn send_pong(&self, data: Vec<u8>) -> Result<(), Error> {
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Pong(data))
            .await
            .map_err(Error::WebSocket)
    }

    /// Closes the connection.
    pub async fn close(&self) {
        info!("WebSocket closing");
        let mut writer = self.write.lock().await;
        let _ = writer.send(Message::Close(None)).await;
        let _ = writer.close().await;
        info!("WebSocket closed");
    }
}

fn extract_host(url: &str) -> &str {
    url.strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .and_then(|s| s.split('/').next())
        .unwrap_or("localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_routing() {
        assert_eq!(resource_id("S_HLw7rGSx1"), "volc.megatts.default");
        assert_eq!(resource_id("zh_female_tianmei"), "volc.service_type.10029");
        // Prefix match is exact and case-sensitive.
        assert_eq!(resource_id("s_lowercase"), "volc.service_type.10029");
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("wss://openspeech.bytedance.com/api/v3/tts/bidirection"),
            "openspeech.bytedance.com"
        );
        assert_eq!(extract_host("ws://127.0.0.1:9000/tts"), "127.0.0.1:9000");
        assert_eq!(extract_host("not-a-url"), "localhost");
    }
}
