//! In-process [`DialogueTransport`] for tests.
//!
//! [`LoopbackTransport`] plays the local end; the paired [`LoopbackRemote`]
//! plays the dialogue service.  The remote can push frames, drop the
//! connection, make connects or sends fail, and inspect everything that was
//! sent.
//!
//! # Example
//!
//! ```rust
//! use riddlefish_middleware::DialogueTransport;
//! use riddlefish_middleware::loopback::LoopbackTransport;
//!
//! # tokio_test_block_on(async {
//! let (mut transport, remote) = LoopbackTransport::pair();
//! transport.connect().await.unwrap();
//! transport.send("hello".to_string()).await.unwrap();
//! remote.push("world");
//! assert_eq!(transport.recv().await.as_deref(), Some("world"));
//! assert_eq!(remote.sent(), vec!["hello".to_string()]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::transport::{DialogueTransport, TransportError};

enum Inbound {
    Frame(String),
    Drop,
}

#[derive(Default)]
struct Shared {
    connected: bool,
    connects: u32,
    failing_connects: u32,
    failing_sends: u32,
    sent: Vec<String>,
}

/// Local end of an in-process dialogue link.
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
    inbound: UnboundedReceiver<Inbound>,
}

/// Remote end of an in-process dialogue link.
#[derive(Clone)]
pub struct LoopbackRemote {
    shared: Arc<Mutex<Shared>>,
    inbound: UnboundedSender<Inbound>,
}

impl LoopbackTransport {
    pub fn pair() -> (LoopbackTransport, LoopbackRemote) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (tx, rx) = unbounded_channel();
        (
            LoopbackTransport {
                shared: Arc::clone(&shared),
                inbound: rx,
            },
            LoopbackRemote { shared, inbound: tx },
        )
    }

    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> Option<R> {
        self.shared.lock().ok().map(|mut s| f(&mut s))
    }
}

#[async_trait]
impl DialogueTransport for LoopbackTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let accepted = self
            .with_shared(|s| {
                s.connects += 1;
                if s.failing_connects > 0 {
                    s.failing_connects -= 1;
                    s.connected = false;
                    false
                } else {
                    s.connected = true;
                    true
                }
            })
            .unwrap_or(false);
        if accepted {
            Ok(())
        } else {
            Err(TransportError::Connect {
                url: "loopback".to_string(),
                details: "connection refused".to_string(),
            })
        }
    }

    async fn disconnect(&mut self) {
        self.with_shared(|s| s.connected = false);
    }

    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.with_shared(|s| {
            if !s.connected {
                return Err(TransportError::NotConnected);
            }
            if s.failing_sends > 0 {
                s.failing_sends -= 1;
                return Err(TransportError::Send("broken pipe".to_string()));
            }
            s.sent.push(frame);
            Ok(())
        })
        .unwrap_or(Err(TransportError::NotConnected))
    }

    async fn recv(&mut self) -> Option<String> {
        if !self.is_connected() {
            return std::future::pending().await;
        }
        match self.inbound.recv().await {
            Some(Inbound::Frame(frame)) => Some(frame),
            Some(Inbound::Drop) | None => {
                self.with_shared(|s| s.connected = false);
                None
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.with_shared(|s| s.connected).unwrap_or(false)
    }
}

impl LoopbackRemote {
    fn with_shared<R: Default>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        self.shared.lock().map(|mut s| f(&mut s)).unwrap_or_default()
    }

    /// Deliver a text frame to the local end.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.inbound.send(Inbound::Frame(frame.into()));
    }

    /// Drop the connection as seen from the local end's next `recv`.
    pub fn drop_connection(&self) {
        let _ = self.inbound.send(Inbound::Drop);
    }

    /// Refuse the next `n` connect attempts.
    pub fn fail_connects(&self, n: u32) {
        self.with_shared(|s| s.failing_connects = n);
    }

    /// Fail the next `n` sends.
    pub fn fail_sends(&self, n: u32) {
        self.with_shared(|s| s.failing_sends = n);
    }

    /// Every frame sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.with_shared(|s| s.sent.clone())
    }

    /// Number of connect attempts so far.
    pub fn connects(&self) -> u32 {
        self.with_shared(|s| s.connects)
    }

    pub fn is_connected(&self) -> bool {
        self.with_shared(|s| s.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_failures() {
        let (mut t, remote) = LoopbackTransport::pair();
        remote.fail_connects(1);
        assert!(t.connect().await.is_err());
        t.connect().await.unwrap();
        assert_eq!(remote.connects(), 2);

        remote.fail_sends(1);
        assert!(t.send("a".into()).await.is_err());
        t.send("b".into()).await.unwrap();
        assert_eq!(remote.sent(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn dropped_connection_reads_none() {
        let (mut t, remote) = LoopbackTransport::pair();
        t.connect().await.unwrap();
        remote.drop_connection();
        assert_eq!(t.recv().await, None);
        assert!(!t.is_connected());
        assert!(matches!(
            t.send("x".into()).await,
            Err(TransportError::NotConnected)
        ));
    }
}
