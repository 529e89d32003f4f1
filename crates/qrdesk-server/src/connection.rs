//! Per-connection protocol loop for printing agents.
//!
//! The loop is written against a stream of [`Frame`]s so it can run over an
//! axum WebSocket or a plain in-memory stream.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, Stream, StreamExt};
use qrdesk_core::protocol::{InboundMessage, StatusMessage};
use qrdesk_core::{ClientId, PrintSink, ProtocolError, RegistryError, RenderedPrintMessage, SinkError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::registry::{ConnectionRegistry, SinkHandle};

/// Transport-neutral inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close,
}

impl From<WsMessage> for Frame {
    fn from(msg: WsMessage) -> Self {
        match msg {
            WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            WsMessage::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            WsMessage::Ping(_) => Frame::Ping,
            WsMessage::Pong(_) => Frame::Pong,
            WsMessage::Close(_) => Frame::Close,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame or end of stream.
    Clean,
    /// The peer sent something that is not a JSON object.
    ProtocolError(ProtocolError),
    /// Reading from the transport failed.
    Transport(String),
    /// The connection was never registered.
    Rejected(RegistryError),
}

/// [`PrintSink`] over a bounded outbound queue drained by the writer task.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Queue a pre-encoded text frame.
    pub fn send_text(&self, text: String) -> Result<usize, SinkError> {
        let len = text.len();
        match self.tx.try_send(text) {
            Ok(()) => Ok(len),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SinkError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }
}

#[async_trait]
impl PrintSink for ChannelSink {
    async fn send(&self, message: &RenderedPrintMessage) -> Result<usize, SinkError> {
        let text = message.to_json().map_err(|e| SinkError::Encode(e.to_string()))?;
        self.send_text(text)
    }
}

/// One agent connection, from handshake to teardown.
pub struct ProtocolSession {
    client_id: ClientId,
    registry: Arc<ConnectionRegistry>,
    sink: Arc<ChannelSink>,
    handle: SinkHandle,
    state: ConnectionState,
}

impl ProtocolSession {
    pub fn new(
        client_id: ClientId,
        registry: Arc<ConnectionRegistry>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        let sink = Arc::new(ChannelSink::new(outbound));
        let handle: SinkHandle = sink.clone();
        Self {
            client_id,
            registry,
            sink,
            handle,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Register this connection under its client id.
    pub fn open(&mut self) -> Result<(), RegistryError> {
        self.registry
            .register(self.client_id.clone(), Arc::clone(&self.handle))?;
        self.state = ConnectionState::Open;
        Ok(())
    }

    /// Release the registry entry if it is still ours.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Open {
            self.registry.release(&self.client_id, &self.handle);
        }
        self.state = ConnectionState::Closed;
    }

    /// Handle one inbound text frame.
    pub fn handle_text(&self, text: &str) -> Result<(), ProtocolError> {
        match InboundMessage::decode(text)? {
            InboundMessage::RegisterPrinter { printer_name } => {
                let name = printer_name.unwrap_or_else(|| format!("Printer_{}", self.client_id));
                tracing::info!(client_id = %self.client_id, printer_name = %name, "printer registered");
            }
            InboundMessage::SetDefault => {
                self.registry.set_default(self.client_id.clone());
                self.reply(&StatusMessage::default_set());
            }
            InboundMessage::Unknown { kind } => {
                tracing::debug!(client_id = %self.client_id, kind = ?kind, "ignoring message");
            }
        }
        Ok(())
    }

    fn reply(&self, status: &StatusMessage) {
        let result = serde_json::to_string(status)
            .map_err(|e| SinkError::Encode(e.to_string()))
            .and_then(|text| self.sink.send_text(text));
        if let Err(e) = result {
            tracing::warn!(client_id = %self.client_id, error = %e, "status reply not sent");
        }
    }

    /// Register, process frames in arrival order until the connection ends,
    /// then release the registry entry.
    pub async fn run<S, E>(mut self, mut frames: S) -> CloseReason
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: fmt::Display,
    {
        if let Err(e) = self.open() {
            tracing::warn!(client_id = %self.client_id, error = %e, "connection rejected");
            self.close();
            return CloseReason::Rejected(e);
        }

        let reason = loop {
            match frames.next().await {
                None | Some(Ok(Frame::Close)) => break CloseReason::Clean,
                Some(Err(e)) => break CloseReason::Transport(e.to_string()),
                Some(Ok(Frame::Ping | Frame::Pong)) => {}
                Some(Ok(Frame::Binary(_))) => {
                    break CloseReason::ProtocolError(ProtocolError::Decode(
                        "binary frames are not supported".into(),
                    ))
                }
                Some(Ok(Frame::Text(text))) => {
                    if let Err(e) = self.handle_text(&text) {
                        break CloseReason::ProtocolError(e);
                    }
                }
            }
        };

        self.close();
        match &reason {
            CloseReason::Clean => {
                tracing::info!(client_id = %self.client_id, "connection closed");
            }
            other => {
                tracing::warn!(client_id = %self.client_id, reason = ?other, "connection terminated");
            }
        }
        reason
    }
}

/// Serve one upgraded WebSocket: a writer task drains the outbound queue and
/// pings every `heartbeat`, while the protocol loop reads.
pub async fn serve_socket(
    socket: WebSocket,
    client_id: ClientId,
    registry: Arc<ConnectionRegistry>,
    max_send_queue: usize,
    heartbeat: Duration,
) -> CloseReason {
    let (ws_tx, ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(max_send_queue.max(1));

    let writer = tokio::spawn(write_loop(ws_tx, rx, heartbeat, client_id.clone()));

    let session = ProtocolSession::new(client_id, registry, tx);
    supervise(session, ws_rx.map(|msg| msg.map(Frame::from)), writer).await
}

/// Run `session` until either the reader ends or the writer task stops.
/// A writer that stops first ends the read side too, so the registry entry
/// is always released.
async fn supervise<S, E>(session: ProtocolSession, frames: S, writer: JoinHandle<()>) -> CloseReason
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: fmt::Display,
{
    let client_id = session.client_id().clone();
    let mut frames = frames.take_until(writer);
    let reason = session.run(&mut frames).await;

    // The session owned the last long-lived sender; the writer flushes what is
    // queued and stops.
    let stopped = match Pin::new(&mut frames).take_result() {
        Some(result) => result,
        None => match Pin::new(&mut frames).take_future() {
            Some(writer) => writer.await,
            None => Ok(()),
        },
    };

    match stopped {
        Ok(()) => reason,
        Err(e) => {
            tracing::error!(client_id = %client_id, error = %e, "writer task failed");
            CloseReason::Transport(format!("writer task failed: {e}"))
        }
    }
}

async fn write_loop<W>(
    mut ws_tx: W,
    mut rx: mpsc::Receiver<String>,
    heartbeat: Duration,
    client_id: ClientId,
) where
    W: futures::Sink<WsMessage> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat.max(Duration::from_millis(1)));
    ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Default::default())).await.is_err() {
                    break;
                }
                tracing::trace!(client_id = %client_id, "sent ping");
            }
        }
    }
    let _ = ws_tx.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use futures::stream;
    use qrdesk_core::protocol::DEFAULT_SET_MESSAGE;

    fn text(s: &str) -> Result<Frame, Infallible> {
        Ok(Frame::Text(s.to_owned()))
    }

    fn session(name: &str) -> (Arc<ConnectionRegistry>, ProtocolSession, mpsc::Receiver<String>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        let session = ProtocolSession::new(ClientId::from(name), Arc::clone(&registry), tx);
        (registry, session, rx)
    }

    #[test]
    fn state_transitions() {
        let (registry, mut session, _rx) = session("A");
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(!registry.contains(session.client_id()));

        session.open().unwrap();
        assert_eq!(session.state(), ConnectionState::Open);
        assert!(registry.contains(&ClientId::from("A")));

        session.close();
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(!registry.contains(&ClientId::from("A")));
    }

    #[tokio::test]
    async fn set_default_replies_with_status() {
        let (registry, session, mut rx) = session("A");
        let frames = stream::iter(vec![text(r#"{"type":"set_default"}"#)]);
        let reason = session.run(frames).await;

        assert_eq!(reason, CloseReason::Clean);
        assert_eq!(registry.default_destination(), Some(ClientId::from("A")));
        let reply: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["type"], "status");
        assert_eq!(reply["message"], DEFAULT_SET_MESSAGE);
    }

    #[tokio::test]
    async fn register_printer_and_unknown_types_send_nothing() {
        let (registry, session, mut rx) = session("A");
        let frames = stream::iter(vec![
            text(r#"{"type":"register_printer","printer_name":"Zebra"}"#),
            text(r#"{"type":"register_printer"}"#),
            text(r#"{"type":"paper_low"}"#),
            text(r#"{}"#),
            Ok(Frame::Ping),
            Ok(Frame::Close),
            text(r#"{"type":"set_default"}"#),
        ]);
        assert_eq!(session.run(frames).await, CloseReason::Clean);
        // Nothing after the close frame is read.
        assert!(registry.default_destination().is_none());
        assert!(rx.try_recv().is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_terminates_connection() {
        let (registry, session, mut rx) = session("A");
        let frames = stream::iter(vec![text("not json"), text(r#"{"type":"set_default"}"#)]);
        let reason = session.run(frames).await;

        assert!(matches!(reason, CloseReason::ProtocolError(ProtocolError::Decode(_))));
        assert!(registry.default_destination().is_none());
        assert!(rx.try_recv().is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn binary_frame_is_a_protocol_error() {
        let (registry, session, _rx) = session("A");
        let frames = stream::iter(vec![Ok::<_, Infallible>(Frame::Binary(vec![1, 2, 3]))]);
        assert!(matches!(session.run(frames).await, CloseReason::ProtocolError(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn transport_error_is_reported() {
        let (registry, session, _rx) = session("A");
        let frames = stream::iter(vec![Err::<Frame, _>("connection reset")]);
        assert_eq!(
            session.run(frames).await,
            CloseReason::Transport("connection reset".into())
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn empty_client_id_is_rejected() {
        let (registry, session, _rx) = session("");
        let frames = stream::iter(Vec::<Result<Frame, Infallible>>::new());
        assert_eq!(
            session.run(frames).await,
            CloseReason::Rejected(RegistryError::EmptyClientId)
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn replaced_session_closing_keeps_replacement() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let id = ClientId::from("A");

        let mut first = ProtocolSession::new(id.clone(), Arc::clone(&registry), tx1);
        first.open().unwrap();
        let mut second = ProtocolSession::new(id.clone(), Arc::clone(&registry), tx2);
        second.open().unwrap();

        first.close();
        let (_, handle) = registry.resolve(Some(&id)).unwrap();
        let message = RenderedPrintMessage {
            qr_data: "x".into(),
            qr_image: "aQ==".into(),
            printer_id: "default".into(),
        };
        handle.send(&message).await.unwrap();
        assert!(rx2.recv().await.unwrap().contains(r#""type":"print""#));

        second.close();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn writer_panic_releases_registry_entry() {
        let (registry, session, _rx) = session("A");
        let writer = tokio::spawn(async { panic!("writer went away") });
        let frames = stream::pending::<Result<Frame, Infallible>>();

        let reason = tokio::time::timeout(Duration::from_secs(5), supervise(session, frames, writer))
            .await
            .unwrap();
        assert!(matches!(reason, CloseReason::Transport(ref msg) if msg.contains("writer task failed")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn writer_exit_ends_an_idle_session() {
        let (registry, session, _rx) = session("A");
        let writer = tokio::spawn(async {});
        let frames = stream::pending::<Result<Frame, Infallible>>();

        let reason = tokio::time::timeout(Duration::from_secs(5), supervise(session, frames, writer))
            .await
            .unwrap();
        assert_eq!(reason, CloseReason::Clean);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reader_end_waits_for_writer() {
        let (registry, session, _rx) = session("A");
        let writer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        let frames = stream::iter(vec![text(r#"{"type":"set_default"}"#)]);

        let reason = supervise(session, frames, writer).await;
        assert_eq!(reason, CloseReason::Clean);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn zero_heartbeat_does_not_panic_writer() {
        let (tx, rx) = mpsc::channel::<String>(1);
        drop(tx);
        let writer = tokio::spawn(write_loop(
            futures::sink::drain(),
            rx,
            Duration::ZERO,
            ClientId::from("A"),
        ));
        let joined = tokio::time::timeout(Duration::from_secs(5), writer).await.unwrap();
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn channel_sink_maps_queue_errors() {
        let (tx, rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);
        assert_eq!(sink.send_text("a".into()), Ok(1));
        assert_eq!(sink.send_text("b".into()), Err(SinkError::QueueFull));
        drop(rx);
        assert_eq!(sink.send_text("c".into()), Err(SinkError::Closed));
    }
}
