//! Dialogue transport.
//!
//! A transport moves whole JSON text frames.  It knows nothing about events
//! or retries; [`ConnectionManager`][crate::connection::ConnectionManager]
//! layers those on top.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use riddlefish_types::FishError;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

/// Errors raised by a [`DialogueTransport`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connect to {url} failed: {details}")]
    Connect { url: String, details: String },
    #[error("send failed: {0}")]
    Send(String),
}

impl From<TransportError> for FishError {
    fn from(e: TransportError) -> Self {
        FishError::Transport(e.to_string())
    }
}

/// A bidirectional, message-oriented link to the remote dialogue service.
#[async_trait]
pub trait DialogueTransport: Send {
    /// Open the connection, replacing any previous one.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the connection.  Idempotent.
    async fn disconnect(&mut self);

    /// Send one text frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Next inbound text frame.
    ///
    /// Returns `None` once the connection has been lost; the transport is
    /// then disconnected.  While disconnected this never resolves, so it can
    /// sit in a `select!` next to other wake-ups.  Must be cancel-safe.
    async fn recv(&mut self) -> Option<String>;

    fn is_connected(&self) -> bool;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Persistent WebSocket client speaking one JSON document per text frame.
pub struct WebSocketTransport {
    url: String,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    /// `url` is the `ws://` or `wss://` endpoint of the dialogue service.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }
}

#[async_trait]
impl DialogueTransport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.disconnect().await;
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                details: e.to_string(),
            })?;
        info!(url = %self.url, "dialogue service connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, "websocket close failed");
            }
            info!(url = %self.url, "dialogue service disconnected");
        }
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<String> {
        let Some(stream) = self.stream.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "dialogue service closed the connection");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    break;
                }
                None => break,
            }
        }
        self.stream = None;
        None
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-shot echo server speaking WebSocket on an ephemeral port.
    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    ws.send(msg).await.unwrap();
                } else if msg.is_close() {
                    break;
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn send_and_receive_text_frames() {
        let url = echo_server().await;
        let mut t = WebSocketTransport::new(url);
        assert!(!t.is_connected());
        t.connect().await.unwrap();
        assert!(t.is_connected());
        t.send(r#"{"event":"ping"}"#.to_string()).await.unwrap();
        assert_eq!(t.recv().await.as_deref(), Some(r#"{"event":"ping"}"#));
        t.disconnect().await;
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn send_while_disconnected_fails() {
        let mut t = WebSocketTransport::new("ws://127.0.0.1:1");
        assert!(matches!(
            t.send("x".into()).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut t = WebSocketTransport::new(format!("ws://{addr}"));
        let err = t.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn server_close_reports_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();
        });
        let mut t = WebSocketTransport::new(format!("ws://{addr}"));
        t.connect().await.unwrap();
        assert_eq!(t.recv().await, None);
        assert!(!t.is_connected());
    }
}
