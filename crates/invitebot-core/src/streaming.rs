//! Streaming subscription state machine.
//!
//! `Disconnected -> Connecting -> Open -> Reconnecting -> Connecting -> ...`
//!
//! A close of any kind sends the connector to `Reconnecting`; the next pull
//! reconnects, retrying failed handshakes with backoff, and yields a fresh
//! `ConnectionReady`. A failed first connect, decode failures and other
//! transport errors are returned to the caller and leave the connector
//! `Disconnected`, so pulling again restarts the subscription from scratch.

use std::{sync::Arc, time::Duration};

use crate::{
    dispatch::{classify, decode_frame},
    domain::{StreamChannel, StreamEvent},
    ports::{FrameSource, StreamTransport, TransportFrame},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

/// Delay before re-opening a closed subscription.
///
/// Doubles on every reconnect attempt, failed or not, that is not separated
/// by a received frame, and falls back to `min_delay` once frames flow again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Reconnect as soon as the connection closes.
    pub fn immediate() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

pub struct StreamingConnector {
    transport: Arc<dyn StreamTransport>,
    channel: StreamChannel,
    policy: ReconnectPolicy,
    state: ConnectionState,
    source: Option<Box<dyn FrameSource>>,
    delay: Duration,
}

impl StreamingConnector {
    /// Create a subscription. Nothing is opened until the first `next_event`.
    pub fn subscribe(
        transport: Arc<dyn StreamTransport>,
        channel: StreamChannel,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            channel,
            policy,
            state: ConnectionState::Disconnected,
            source: None,
            delay: policy.min_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Next classified event. Never ends on a close; see module docs for errors.
    pub async fn next_event(&mut self) -> Result<StreamEvent> {
        loop {
            match self.state {
                ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::Reconnecting => return self.open().await,
                ConnectionState::Open => {
                    if let Some(event) = self.read_event().await? {
                        return Ok(event);
                    }
                }
            }
        }
    }

    /// Open the transport. A failed first connect is returned; once the stream
    /// has been up, failed reconnects are retried with backoff.
    async fn open(&mut self) -> Result<StreamEvent> {
        loop {
            let reconnecting = self.state == ConnectionState::Reconnecting;
            if reconnecting {
                if !self.delay.is_zero() {
                    tracing::info!(
                        channel = %self.channel,
                        delay_ms = self.delay.as_millis() as u64,
                        "reconnecting after delay"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                self.delay = self.policy.next_delay(self.delay);
            }

            self.state = ConnectionState::Connecting;
            tracing::debug!(channel = %self.channel, "connecting to stream");
            match self.transport.connect(self.channel).await {
                Ok(source) => {
                    self.source = Some(source);
                    self.state = ConnectionState::Open;
                    tracing::info!(channel = %self.channel, "stream connected");
                    return Ok(StreamEvent::ConnectionReady {
                        channel: self.channel,
                    });
                }
                Err(e) if reconnecting => {
                    tracing::warn!(channel = %self.channel, error = %e, "reconnect failed");
                    self.state = ConnectionState::Reconnecting;
                }
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(e);
                }
            }
        }
    }

    /// `Ok(None)` when the frame was dropped or the connection closed.
    async fn read_event(&mut self) -> Result<Option<StreamEvent>> {
        let Some(source) = self.source.as_mut() else {
            self.state = ConnectionState::Reconnecting;
            return Ok(None);
        };

        let frame = match source.next_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                self.disconnect();
                return Err(e);
            }
        };

        match frame {
            TransportFrame::Text(text) => {
                self.delay = self.policy.min_delay;
                match decode_frame(&text).and_then(|frame| classify(&frame)) {
                    Ok(event) => Ok(event),
                    Err(e) => {
                        self.disconnect();
                        Err(e)
                    }
                }
            }
            TransportFrame::Closed => {
                tracing::info!(channel = %self.channel, "stream closed, reconnecting");
                self.source = None;
                self.state = ConnectionState::Reconnecting;
                Ok(None)
            }
        }
    }

    fn disconnect(&mut self) {
        self.source = None;
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        dispatch::tests::{account_json, notification_frame, status_json},
        errors::Error,
    };

    pub(crate) type Script = Vec<Result<TransportFrame>>;

    struct ScriptedSource {
        frames: VecDeque<Result<TransportFrame>>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn next_frame(&mut self) -> Result<TransportFrame> {
            self.frames.pop_front().unwrap_or(Ok(TransportFrame::Closed))
        }
    }

    /// Hands out one scripted connection per `connect` call.
    pub(crate) struct ScriptedTransport {
        connections: Mutex<VecDeque<Result<Script>>>,
        connects: AtomicUsize,
    }

    impl ScriptedTransport {
        pub(crate) fn new(connections: Vec<Result<Script>>) -> Arc<Self> {
            Arc::new(Self {
                connections: Mutex::new(connections.into()),
                connects: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn connect(&self, _channel: StreamChannel) -> Result<Box<dyn FrameSource>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let script = self
                .connections
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("no more connections".to_string())))?;
            Ok(Box::new(ScriptedSource {
                frames: script.into(),
            }))
        }
    }

    fn text(s: impl Into<String>) -> Result<TransportFrame> {
        Ok(TransportFrame::Text(s.into()))
    }

    fn mention_frame() -> String {
        let status = status_json(account_json("alice", "alice"), "<p>hi</p>");
        notification_frame("mention", Some(status))
    }

    fn delete_frame(id: &str) -> String {
        serde_json::json!({ "event": "delete", "payload": id }).to_string()
    }

    fn connector(transport: Arc<ScriptedTransport>) -> StreamingConnector {
        StreamingConnector::subscribe(transport, StreamChannel::User, ReconnectPolicy::immediate())
    }

    fn ready() -> StreamEvent {
        StreamEvent::ConnectionReady {
            channel: StreamChannel::User,
        }
    }

    #[tokio::test]
    async fn subscribe_is_lazy() {
        let transport = ScriptedTransport::new(vec![Ok(vec![])]);
        let conn = connector(transport.clone());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clean_close_reconnects_transparently() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![text(mention_frame()), Ok(TransportFrame::Closed)]),
            Ok(vec![text(delete_frame("109"))]),
        ]);
        let mut conn = connector(transport.clone());

        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(matches!(
            conn.next_event().await.unwrap(),
            StreamEvent::NotificationReceived { .. }
        ));
        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_eq!(
            conn.next_event().await.unwrap(),
            StreamEvent::StatusDeleted {
                status_id: "109".to_string()
            }
        );
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unrecognized_frames_are_skipped() {
        let transport = ScriptedTransport::new(vec![Ok(vec![
            text(r#"{"event":"filters_changed"}"#),
            text(r#"{"event":"announcement","payload":"{}"}"#),
            text(delete_frame("7")),
        ])]);
        let mut conn = connector(transport);

        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_eq!(
            conn.next_event().await.unwrap(),
            StreamEvent::StatusDeleted {
                status_id: "7".to_string()
            }
        );
    }

    #[tokio::test]
    async fn decode_error_surfaces_and_connector_restarts() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![text("not json")]),
            Ok(vec![text(delete_frame("8"))]),
        ]);
        let mut conn = connector(transport.clone());

        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert!(matches!(conn.next_event().await, Err(Error::Decode(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_eq!(
            conn.next_event().await.unwrap(),
            StreamEvent::StatusDeleted {
                status_id: "8".to_string()
            }
        );
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transport_errors_surface() {
        let transport = ScriptedTransport::new(vec![Ok(vec![Err(Error::Transport(
            "tls failure".to_string(),
        ))])]);
        let mut conn = connector(transport);

        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert!(matches!(conn.next_event().await, Err(Error::Transport(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_failure_surfaces() {
        let transport = ScriptedTransport::new(vec![Err(Error::Transport(
            "401 Unauthorized".to_string(),
        ))]);
        let mut conn = connector(transport);

        assert!(matches!(conn.next_event().await, Err(Error::Transport(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_reconnect_is_retried() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![Ok(TransportFrame::Closed)]),
            Err(Error::Transport(
                "stream handshake failed: Connection refused".to_string(),
            )),
            Ok(vec![text(delete_frame("1"))]),
        ]);
        let mut conn = connector(transport.clone());

        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(
            conn.next_event().await.unwrap(),
            StreamEvent::StatusDeleted {
                status_id: "1".to_string()
            }
        );
        assert_eq!(transport.connects.load(Ordering::SeqCst), 3);
    }

    /// The paused clock may round a sleep up to the next millisecond tick.
    fn assert_elapsed(start: tokio::time::Instant, millis: u64) {
        let elapsed = start.elapsed();
        let expected = Duration::from_millis(millis);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "elapsed {elapsed:?}, expected about {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delay_doubles_until_a_frame_arrives() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![]),
            Err(Error::Transport("Connection refused".to_string())),
            Ok(vec![]),
            Ok(vec![text(delete_frame("2"))]),
            Ok(vec![]),
        ]);
        let policy = ReconnectPolicy {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };
        let mut conn = StreamingConnector::subscribe(transport.clone(), StreamChannel::User, policy);
        let start = tokio::time::Instant::now();

        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_elapsed(start, 0);

        // 100ms before the refused attempt, 200ms before the next one.
        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_elapsed(start, 300);

        // Capped at 300ms.
        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_elapsed(start, 600);

        assert_eq!(
            conn.next_event().await.unwrap(),
            StreamEvent::StatusDeleted {
                status_id: "2".to_string()
            }
        );

        // The frame reset the delay.
        assert_eq!(conn.next_event().await.unwrap(), ready());
        assert_elapsed(start, 700);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn backoff_doubles_within_bounds() {
        let policy = ReconnectPolicy {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        };
        assert_eq!(
            policy.next_delay(Duration::from_millis(500)),
            Duration::from_secs(1)
        );
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next_delay(Duration::from_secs(2)), Duration::from_secs(2));
        assert_eq!(
            ReconnectPolicy::immediate().next_delay(Duration::ZERO),
            Duration::ZERO
        );
    }
}
