//! WebSocket client for the relay.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::debug;

use crate::relay::protocol::{ClientEvent, SendMessage, ServerEvent, TypingSignal};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach relay at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("transport: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("undecodable frame from relay: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One persistent connection to the relay.
pub struct RelayClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|source| ClientError::Connect {
                url: url.to_string(),
                source,
            })?;
        debug!(url, "Connected to relay");
        Ok(Self { stream })
    }

    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), ClientError> {
        let json = serde_json::to_string(event)?;
        self.send_raw(json).await
    }

    /// Send a text frame as-is.
    pub async fn send_raw(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        let text: String = text.into();
        self.stream
            .send(tungstenite::Message::Text(text.into()))
            .await?;
        Ok(())
    }

    pub async fn join(&mut self, user_id: &str) -> Result<(), ClientError> {
        self.send(&ClientEvent::Join(user_id.to_string())).await
    }

    /// Announce a message the API layer has already persisted.
    pub async fn send_persisted(&mut self, message: SendMessage) -> Result<(), ClientError> {
        self.send(&ClientEvent::SendMessage(message)).await
    }

    pub async fn typing(
        &mut self,
        sender_id: &str,
        receiver_id: &str,
        is_typing: bool,
    ) -> Result<(), ClientError> {
        self.send(&ClientEvent::Typing(TypingSignal {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            is_typing,
        }))
        .await
    }

    /// Next server event, skipping control and binary frames. `None` once the
    /// relay closes the connection.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, ClientError> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                tungstenite::Message::Text(text) => {
                    return Ok(Some(serde_json::from_str(text.as_str())?));
                }
                tungstenite::Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
