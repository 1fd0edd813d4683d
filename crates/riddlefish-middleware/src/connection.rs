//! [`ConnectionManager`] – keeps the dialogue link up.
//!
//! The manager owns a [`DialogueTransport`] and layers two policies on top:
//!
//! * **Reconnect** – when the link drops (or a connect attempt fails) a
//!   reconnect is scheduled after a capped exponential [`Backoff`] delay.
//!   The orchestrator awaits [`reconnect_due`] in its event loop and calls
//!   [`ConnectionManager::try_reconnect`] when it fires, so reconnecting
//!   interleaves with everything else the loop does.
//! * **Emit with retry** – [`ConnectionManager::emit`] tries a send up to
//!   [`RetryPolicy::attempts`] times.  After each failed attempt but the
//!   last, the link is torn down and re-established and the manager pauses
//!   for [`RetryPolicy::pause`].  When every attempt fails the event is
//!   dropped and only logged.

use std::time::Duration;

use riddlefish_types::protocol::{InboundEvent, OutboundEvent};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::transport::{DialogueTransport, TransportError};

/// Resolves at `deadline`; never resolves for `None`.  Takes the deadline by
/// value so it can share a `select!` with [`ConnectionManager::recv`].
pub async fn reconnect_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Send retry knobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            pause: Duration::from_millis(1500),
        }
    }
}

pub struct ConnectionManager<T: DialogueTransport> {
    transport: T,
    state: ConnectionState,
    backoff: Backoff,
    retry: RetryPolicy,
    reconnect_at: Option<Instant>,
}

impl<T: DialogueTransport> ConnectionManager<T> {
    pub fn new(transport: T, backoff: Backoff, retry: RetryPolicy) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            backoff,
            retry,
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// When the next scheduled reconnect is due, if one is pending.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Connect now.  On failure a reconnect is scheduled.
    pub async fn start(&mut self) -> bool {
        self.try_reconnect().await
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.on_failure();
        debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    /// One connect attempt.  Success resets the backoff; failure schedules
    /// the next attempt.
    pub async fn try_reconnect(&mut self) -> bool {
        self.reconnect_at = None;
        self.state = ConnectionState::Connecting;
        match self.transport.connect().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.backoff.reset();
                true
            }
            Err(e) => {
                warn!(error = %e, "connect to dialogue service failed");
                self.state = ConnectionState::Disconnected;
                self.schedule_reconnect();
                false
            }
        }
    }

    /// Next inbound event.
    ///
    /// Frames that do not parse are logged and skipped.  A lost connection
    /// schedules a reconnect and returns `None`.  While disconnected this
    /// never resolves.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        loop {
            if self.state != ConnectionState::Connected {
                return std::future::pending().await;
            }
            match self.transport.recv().await {
                Some(frame) => match InboundEvent::from_frame(&frame) {
                    Ok(event) => return Some(event),
                    Err(e) => warn!(error = %e, "ignoring unparseable frame"),
                },
                None => {
                    warn!("dialogue service connection lost");
                    self.state = ConnectionState::Disconnected;
                    self.schedule_reconnect();
                    return None;
                }
            }
        }
    }

    async fn force_reconnect(&mut self) {
        self.transport.disconnect().await;
        self.state = ConnectionState::Disconnected;
        self.try_reconnect().await;
    }

    /// `emit_with_retry`: send `event`, retrying per the [`RetryPolicy`].
    /// Returns whether the event was delivered to the transport.
    pub async fn emit(&mut self, event: &OutboundEvent) -> bool {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(event = event.name(), error = %e, "cannot encode event");
                return false;
            }
        };

        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            let outcome = if self.is_connected() {
                self.transport.send(frame.clone()).await
            } else {
                Err(TransportError::NotConnected)
            };
            match outcome {
                Ok(()) => {
                    debug!(event = event.name(), attempt, "event sent");
                    return true;
                }
                Err(e) => warn!(event = event.name(), attempt, error = %e, "send failed"),
            }
            if attempt < attempts {
                self.force_reconnect().await;
                sleep(self.retry.pause).await;
            }
        }
        error!(event = event.name(), attempts, "dropping event after repeated send failures");
        false
    }

    /// Close the link for good.
    pub async fn shutdown(&mut self) {
        self.reconnect_at = None;
        self.transport.disconnect().await;
        self.state = ConnectionState::Disconnected;
        info!("dialogue link closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackRemote, LoopbackTransport};
    use riddlefish_types::protocol::RemoteError;
    use riddlefish_types::{Language, Preference};
    use uuid::Uuid;

    fn manager() -> (ConnectionManager<LoopbackTransport>, LoopbackRemote) {
        let (t, remote) = LoopbackTransport::pair();
        (
            ConnectionManager::new(t, Backoff::default(), RetryPolicy::default()),
            remote,
        )
    }

    /// Two pauses of 1.5 s, give or take timer rounding.
    fn assert_paused_elapsed(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(elapsed >= expected, "elapsed {elapsed:?}");
        assert!(elapsed < expected + Duration::from_millis(50), "elapsed {elapsed:?}");
    }

    fn event() -> OutboundEvent {
        OutboundEvent::SavePlayerPreferences(Preference {
            id: Uuid::nil(),
            language: Language::English,
            voice: "v.wav".into(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn emit_first_try() {
        let (mut m, remote) = manager();
        assert!(m.start().await);
        assert!(m.emit(&event()).await);
        assert_eq!(remote.sent().len(), 1);
        assert_eq!(remote.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_reconnects_twice() {
        let (mut m, remote) = manager();
        m.start().await;
        remote.fail_sends(2);
        let started = Instant::now();
        assert!(m.emit(&event()).await);
        assert_eq!(remote.sent().len(), 1);
        assert_eq!(remote.connects(), 3);
        assert_paused_elapsed(started, Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_drops_after_three_attempts() {
        let (mut m, remote) = manager();
        m.start().await;
        remote.fail_sends(10);
        let started = Instant::now();
        assert!(!m.emit(&event()).await);
        assert!(remote.sent().is_empty());
        // Reconnects happen between attempts only.
        assert_eq!(remote.connects(), 3);
        assert_paused_elapsed(started, Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn emit_while_disconnected_reconnects() {
        let (mut m, remote) = manager();
        remote.fail_connects(1);
        assert!(!m.start().await);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(m.emit(&event()).await);
        assert_eq!(remote.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_back_off_exponentially() {
        let (mut m, remote) = manager();
        remote.fail_connects(3);
        let t0 = Instant::now();
        assert!(!m.start().await);
        assert_eq!(m.reconnect_deadline(), Some(t0 + Duration::from_millis(100)));

        reconnect_due(m.reconnect_deadline()).await;
        assert!(!m.try_reconnect().await);
        assert_eq!(
            m.reconnect_deadline(),
            Some(t0 + Duration::from_millis(100 + 200))
        );

        reconnect_due(m.reconnect_deadline()).await;
        assert!(!m.try_reconnect().await);
        assert_eq!(
            m.reconnect_deadline(),
            Some(t0 + Duration::from_millis(100 + 200 + 400))
        );

        reconnect_due(m.reconnect_deadline()).await;
        assert!(m.try_reconnect().await);
        assert_eq!(m.reconnect_deadline(), None);
        assert!(m.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_schedules_reconnect_from_base() {
        let (mut m, remote) = manager();
        m.start().await;
        remote.drop_connection();
        let t0 = Instant::now();
        assert!(m.recv().await.is_none());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.reconnect_deadline(), Some(t0 + Duration::from_millis(100)));
        reconnect_due(m.reconnect_deadline()).await;
        assert!(m.try_reconnect().await);

        // After a successful reconnect the delay starts over.
        remote.drop_connection();
        let t1 = Instant::now();
        assert!(m.recv().await.is_none());
        assert_eq!(m.reconnect_deadline(), Some(t1 + Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn recv_skips_garbage_frames() {
        let (mut m, remote) = manager();
        m.start().await;
        remote.push("not json");
        remote.push(r#"{"event":"error","data":{"error":"boom"}}"#);
        assert_eq!(
            m.recv().await,
            Some(InboundEvent::Error(RemoteError {
                error: "boom".into()
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recv_pends_while_disconnected() {
        let (mut m, _remote) = manager();
        let res = tokio::time::timeout(Duration::from_secs(1), m.recv()).await;
        assert!(res.is_err());
    }
}
