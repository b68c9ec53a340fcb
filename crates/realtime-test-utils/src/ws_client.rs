//! WebSocket test client
//!
//! Thin wrapper over `tokio-tungstenite` that understands the service's
//! newline-batched JSON frames.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for E2E tests
///
/// Control frames are handled by `tokio-tungstenite` while the client is
/// reading: pings are answered with pongs automatically. A client that never
/// reads therefore never answers pings.
pub struct WsTestClient {
    stream: WsStream,
}

impl WsTestClient {
    /// Connect anonymously
    pub async fn connect(ws_url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {}", e))?;
        Ok(Self { stream })
    }

    /// Connect with an `Authorization: Bearer` header
    pub async fn connect_with_token(ws_url: &str, token: &str) -> Result<Self, anyhow::Error> {
        let mut request = ws_url.into_client_request()?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {}", e))?;
        Ok(Self { stream })
    }

    /// Next text frame, skipping control frames
    ///
    /// Returns `Ok(None)` once the server closes the connection.
    pub async fn next_text(&mut self, wait: Duration) -> Result<Option<String>, anyhow::Error> {
        let read = async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(anyhow::anyhow!("WebSocket read failed: {}", e)),
                }
            }
        };

        tokio::time::timeout(wait, read)
            .await
            .map_err(|_| anyhow::anyhow!("no frame within {:?}", wait))?
    }

    /// Next text frame split on newlines and parsed as JSON envelopes
    pub async fn next_events(
        &mut self,
        wait: Duration,
    ) -> Result<Vec<serde_json::Value>, anyhow::Error> {
        let text = self
            .next_text(wait)
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection closed"))?;

        text.split('\n')
            .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
            .collect()
    }

    /// Collect envelopes across frames until `count` have arrived
    ///
    /// Returns the envelopes and the number of frames they arrived in.
    pub async fn collect_events(
        &mut self,
        count: usize,
        wait: Duration,
    ) -> Result<(Vec<serde_json::Value>, usize), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + wait;
        let mut events = Vec::with_capacity(count);
        let mut frames = 0;

        while events.len() < count {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            events.extend(self.next_events(remaining).await?);
            frames += 1;
        }

        Ok((events, frames))
    }

    /// Wait until the server closes the connection, discarding data frames
    ///
    /// A transport error counts as closed.
    pub async fn wait_for_close(&mut self, wait: Duration) -> Result<(), anyhow::Error> {
        let drain = async {
            while let Some(frame) = self.stream.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        };

        tokio::time::timeout(wait, drain)
            .await
            .map_err(|_| anyhow::anyhow!("connection still open after {:?}", wait))
    }

    /// Send a text frame
    pub async fn send_text(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a close frame
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream.close(None).await?;
        Ok(())
    }
}
