//! Chat sessions over an established duplex stream
//!
//! A session exclusively owns its stream. The read half belongs to a
//! dedicated receive loop that decodes one line at a time; the write half sits
//! behind an async mutex so sends are written and flushed one at a time in
//! call order.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rfchat_core::{
    decode_line, encode_line, BoxedStream, ConnectionRole, EstablishError, PeerDevice,
    SessionError, SessionId, LINE_TERMINATOR,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use crate::events::{EventSink, LinkEvent};
use crate::workers::WorkerSet;

// ----------------------------------------------------------------------------
// Chat Session
// ----------------------------------------------------------------------------

/// One live duplex connection to exactly one peer
pub struct ChatSession {
    id: SessionId,
    role: ConnectionRole,
    peer: Option<PeerDevice>,
    max_message_len: usize,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    closed: AtomicBool,
    close_signal: watch::Sender<bool>,
    ended: watch::Sender<bool>,
}

/// Cheap, clonable reference to a session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<ChatSession>,
}

/// Releases a freshly opened session's receive loop
///
/// The loop holds back until the session has been announced, so no message
/// can reach the presentation layer ahead of its `SessionEstablished` event.
/// Dropping the gate releases the loop as well.
#[derive(Debug)]
pub struct ReceiveGate {
    tx: oneshot::Sender<()>,
}

impl ReceiveGate {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

impl ChatSession {
    /// Wrap `stream` and spawn its receive loop on `workers`
    ///
    /// On failure the stream is dropped, which closes it.
    pub fn open(
        id: SessionId,
        role: ConnectionRole,
        peer: Option<PeerDevice>,
        stream: BoxedStream,
        sink: EventSink,
        workers: &WorkerSet,
        max_message_len: usize,
    ) -> Result<(SessionHandle, ReceiveGate), EstablishError> {
        let (reader, writer) = tokio::io::split(stream);
        let (close_signal, _) = watch::channel(false);
        let (ended, _) = watch::channel(false);

        let handle = SessionHandle {
            inner: Arc::new(ChatSession {
                id,
                role,
                peer,
                max_message_len,
                writer: Mutex::new(Some(writer)),
                closed: AtomicBool::new(false),
                close_signal,
                ended,
            }),
        };

        let (gate_tx, gate_rx) = oneshot::channel();
        let session = handle.inner.clone();
        workers.spawn("receive", receive_loop(session, reader, gate_rx, sink))?;

        debug!("Opened {} session {}", role, id);
        Ok((handle, ReceiveGate { tx: gate_tx }))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Remote peer, when the client path knows it
    pub fn peer(&self) -> Option<&PeerDevice> {
        self.peer.as_ref()
    }

    /// Name to show for the remote side
    pub fn remote_label(&self) -> &str {
        self.peer
            .as_ref()
            .map(PeerDevice::label)
            .unwrap_or("remote device")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write `text` plus the line terminator and flush
    ///
    /// Concurrent sends are serialized in the order they reach the writer
    /// lock; each completes its write and flush before the next starts. A
    /// close while a write is stalled abandons that write.
    pub async fn send(&self, text: &str) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::WriteAfterClose);
        }
        let line = encode_line(text, self.max_message_len)?;
        let mut close_rx = self.close_signal.subscribe();

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(SessionError::WriteAfterClose)?;
        let written = tokio::select! {
            biased;
            _ = close_rx.wait_for(|closed| *closed) => None,
            written = write_line(stream, &line) => Some(written),
        };

        let Some(written) = written else {
            writer.take();
            debug!("Abandoned write on closed session {}", self.id);
            return Err(SessionError::WriteAfterClose);
        };
        written.map_err(|e| SessionError::Io(e.to_string()))?;

        debug!("Sent {} bytes on session {}", line.len(), self.id);
        Ok(())
    }

    /// Close the stream; later calls are no-ops
    ///
    /// Never waits on a peer: a send stalled on a full pipe is woken by the
    /// close signal and releases the writer first.
    pub async fn close(&self) {
        if self.mark_closed() {
            // Dropping the write half here; the receive loop drops the read half.
            self.writer.lock().await.take();
            info!("Closed {} session {}", self.role, self.id);
        }
    }

    /// Wait until the receive loop has terminated
    pub async fn wait_ended(&self) {
        let mut ended = self.ended.subscribe();
        let _ = ended.wait_for(|done| *done).await;
    }

    pub fn has_ended(&self) -> bool {
        *self.ended.borrow()
    }

    /// Flip to closed and wake the receive loop; true for the first caller only
    fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.close_signal.send_replace(true);
        true
    }
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionHandle {
    /// Whether both handles refer to the same session
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for SessionHandle {
    type Target = ChatSession;

    fn deref(&self) -> &ChatSession {
        &self.inner
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

// ----------------------------------------------------------------------------
// Receive Loop
// ----------------------------------------------------------------------------

async fn write_line(stream: &mut WriteHalf<BoxedStream>, line: &[u8]) -> std::io::Result<()> {
    stream.write_all(line).await?;
    stream.flush().await
}

async fn receive_loop(
    session: Arc<ChatSession>,
    reader: ReadHalf<BoxedStream>,
    gate: oneshot::Receiver<()>,
    sink: EventSink,
) {
    let mut close_rx = session.close_signal.subscribe();

    // A session closed before it was announced ends silently
    let released = tokio::select! {
        biased;
        _ = close_rx.wait_for(|closed| *closed) => false,
        _ = gate => true,
    };

    if released {
        // One line is at most the message bound plus its terminator
        let limit = session.max_message_len as u64 + 1;
        let mut reader = BufReader::new(reader).take(limit);
        let mut line = Vec::new();
        loop {
            line.clear();
            reader.set_limit(limit);
            let read = tokio::select! {
                biased;
                _ = close_rx.wait_for(|closed| *closed) => break,
                read = reader.read_until(LINE_TERMINATOR, &mut line) => read,
            };

            match read {
                Ok(0) => {
                    debug!("Session {} reached end of stream", session.id);
                    break;
                }
                Ok(n) if n as u64 == limit && line.last() != Some(&LINE_TERMINATOR) => {
                    let err = SessionError::LineTooLong {
                        max_size: session.max_message_len,
                    };
                    warn!("Ending session {}: {}", session.id, err);
                    break;
                }
                Ok(_) => sink.emit(LinkEvent::MessageReceived {
                    session: session.id,
                    text: decode_line(&line),
                }),
                Err(e) => {
                    warn!("Read error on session {}: {}", session.id, e);
                    break;
                }
            }
        }
    }

    // End of stream destroys the session just like an explicit close
    if session.mark_closed() {
        session.writer.lock().await.take();
        info!("Session {} ended by peer", session.id);
    }
    session.ended.send_replace(true);
    if released {
        sink.emit(LinkEvent::SessionEnded {
            session: session.id,
            role: session.role,
        });
    }
}

// ----------------------------------------------------------------------------
// Active Session Slot
// ----------------------------------------------------------------------------

/// The single process-wide active session
///
/// Replacement is a swap-and-close under one lock: the previous session is
/// closed before the new one is installed and announced, so two sessions are
/// never active together. Once retired the slot refuses every promotion.
#[derive(Debug, Default)]
pub struct ActiveSessionSlot {
    current: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    session: Option<SessionHandle>,
    retired: bool,
}

impl ActiveSessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle`, closing any previous session, then announce it
    ///
    /// Returns the id of the superseded session, if one was still open. A
    /// retired slot closes `handle` unannounced and refuses it.
    pub async fn promote(
        &self,
        handle: SessionHandle,
        gate: ReceiveGate,
        sink: &EventSink,
    ) -> Result<Option<SessionId>, EstablishError> {
        let mut current = self.current.lock().await;
        if current.retired {
            handle.close().await;
            drop(gate);
            return Err(EstablishError::ShuttingDown);
        }

        let superseded = match current.session.take() {
            Some(old) if !old.is_closed() => {
                old.close().await;
                info!("Session {} superseded by {}", old.id(), handle.id());
                Some(old.id())
            }
            _ => None,
        };

        current.session = Some(handle.clone());
        sink.emit(LinkEvent::SessionEstablished { handle });
        gate.release();
        Ok(superseded)
    }

    /// The active session, if it is still open
    pub async fn current(&self) -> Option<SessionHandle> {
        let current = self.current.lock().await;
        current.session.as_ref().filter(|h| !h.is_closed()).cloned()
    }

    /// Close and clear the active session
    ///
    /// Returns the session that was closed by this call, if it was still open.
    pub async fn close_active(&self) -> Option<SessionHandle> {
        let mut current = self.current.lock().await;
        Self::close_current(&mut current).await
    }

    /// Close the active session and refuse all later promotions
    pub async fn retire(&self) -> Option<SessionHandle> {
        let mut current = self.current.lock().await;
        current.retired = true;
        Self::close_current(&mut current).await
    }

    pub async fn is_retired(&self) -> bool {
        self.current.lock().await.retired
    }

    async fn close_current(state: &mut SlotState) -> Option<SessionHandle> {
        let handle = state.session.take()?;
        if handle.is_closed() {
            return None;
        }
        handle.close().await;
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::time::timeout;

    fn open_session(
        id: u64,
        sink: EventSink,
        workers: &WorkerSet,
    ) -> (SessionHandle, ReceiveGate, DuplexStream) {
        open_session_with(id, sink, workers, 1024, 64)
    }

    fn open_session_with(
        id: u64,
        sink: EventSink,
        workers: &WorkerSet,
        pipe_capacity: usize,
        max_message_len: usize,
    ) -> (SessionHandle, ReceiveGate, DuplexStream) {
        let (local, remote) = tokio::io::duplex(pipe_capacity);
        let (handle, gate) = ChatSession::open(
            SessionId(id),
            ConnectionRole::Client,
            Some(PeerDevice::new("AA", Some("Phone".into()))),
            Box::new(local),
            sink,
            workers,
            max_message_len,
        )
        .unwrap();
        (handle, gate, remote)
    }

    #[tokio::test]
    async fn test_send_frames_and_flushes() {
        let (sink, _events) = event_channel();
        let workers = WorkerSet::new(4);
        let (handle, gate, mut remote) = open_session(1, sink, &workers);
        gate.release();

        handle.send("bonjour").await.unwrap();
        handle.send("").await.unwrap();

        let mut buf = [0u8; 9];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"bonjour\n\n");
    }

    #[tokio::test]
    async fn test_send_rejects_embedded_newline_without_writing() {
        let (sink, _events) = event_channel();
        let workers = WorkerSet::new(4);
        let (handle, _gate, _remote) = open_session(1, sink, &workers);

        assert_eq!(
            handle.send("a\nb").await,
            Err(SessionError::EmbeddedNewline)
        );
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_gate_holds_messages_until_released() {
        let (sink, mut events) = event_channel();
        let workers = WorkerSet::new(4);
        let (handle, gate, mut remote) = open_session(3, sink, &workers);

        remote.write_all(b"early\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_none());

        gate.release();
        match timeout(Duration::from_secs(1), events.recv()).await.unwrap() {
            Some(LinkEvent::MessageReceived { session, text }) => {
                assert_eq!(session, handle.id());
                assert_eq!(text, "early");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let (sink, mut events) = event_channel();
        let workers = WorkerSet::new(4);
        let (handle, gate, remote) = open_session(4, sink, &workers);
        gate.release();

        drop(remote);
        timeout(Duration::from_secs(1), handle.wait_ended())
            .await
            .unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::SessionEnded { .. })
        ));
        assert_eq!(handle.send("late").await, Err(SessionError::WriteAfterClose));
    }

    #[tokio::test]
    async fn test_promote_closes_previous_session() {
        let (sink, mut events) = event_channel();
        let workers = WorkerSet::new(4);
        let slot = ActiveSessionSlot::new();

        let (first, gate1, _remote1) = open_session(1, sink.clone(), &workers);
        assert_eq!(slot.promote(first.clone(), gate1, &sink).await, Ok(None));

        let (second, gate2, _remote2) = open_session(2, sink.clone(), &workers);
        assert_eq!(
            slot.promote(second.clone(), gate2, &sink).await,
            Ok(Some(SessionId(1)))
        );

        assert!(first.is_closed());
        assert!(!second.is_closed());
        let active = slot.current().await.unwrap();
        assert!(active.same_session(&second));

        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::SessionEstablished { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_session_is_not_current() {
        let (sink, _events) = event_channel();
        let workers = WorkerSet::new(4);
        let slot = ActiveSessionSlot::new();

        let (handle, gate, _remote) = open_session(1, sink.clone(), &workers);
        slot.promote(handle.clone(), gate, &sink).await.unwrap();
        handle.close().await;

        assert!(slot.current().await.is_none());
        assert!(slot.close_active().await.is_none());
    }

    #[tokio::test]
    async fn test_close_twice_is_a_no_op() {
        let (sink, mut events) = event_channel();
        let workers = WorkerSet::new(4);
        let (handle, gate, _remote) = open_session(5, sink, &workers);
        gate.release();

        handle.close().await;
        handle.close().await;
        assert!(handle.is_closed());

        timeout(Duration::from_secs(1), handle.wait_ended())
            .await
            .unwrap();
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::SessionEnded { session, .. }) if session == SessionId(5)
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_send_stalled_on_full_pipe() {
        let (sink, _events) = event_channel();
        let workers = WorkerSet::new(4);
        // The remote never reads, so a large write cannot complete
        let (handle, gate, _remote) = open_session_with(6, sink, &workers, 16, 4096);
        gate.release();

        let sending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.send(&"x".repeat(1000)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sending.is_finished());

        timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("close waited on a stalled send");
        assert_eq!(
            timeout(Duration::from_secs(1), sending).await.unwrap().unwrap(),
            Err(SessionError::WriteAfterClose)
        );
        timeout(Duration::from_secs(1), handle.wait_ended())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_active_with_stalled_send() {
        let (sink, _events) = event_channel();
        let workers = WorkerSet::new(4);
        let slot = ActiveSessionSlot::new();

        let (handle, gate, _remote) = open_session_with(7, sink.clone(), &workers, 16, 4096);
        slot.promote(handle.clone(), gate, &sink).await.unwrap();

        let sending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.send(&"y".repeat(1000)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let closed = timeout(Duration::from_secs(1), slot.close_active())
            .await
            .expect("close_active waited on a stalled send");
        assert!(closed.unwrap().same_session(&handle));
        assert!(sending.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_overlong_line_ends_session() {
        let (sink, mut events) = event_channel();
        let workers = WorkerSet::new(4);
        let (handle, gate, mut remote) = open_session_with(8, sink, &workers, 1024, 8);
        gate.release();

        remote.write_all(b"ok
").await.unwrap();
        remote.write_all(&[b'z'; 100]).await.unwrap();

        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::MessageReceived { text, .. }) if text == "ok"
        ));
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::SessionEnded { .. })
        ));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_line_at_the_bound_is_delivered() {
        let (sink, mut events) = event_channel();
        let workers = WorkerSet::new(4);
        let (_handle, gate, mut remote) = open_session_with(9, sink, &workers, 1024, 8);
        gate.release();

        remote.write_all(b"12345678
").await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::MessageReceived { text, .. }) if text == "12345678"
        ));
    }

    #[tokio::test]
    async fn test_retired_slot_refuses_promotion() {
        let (sink, mut events) = event_channel();
        let workers = WorkerSet::new(4);
        let slot = ActiveSessionSlot::new();

        let (first, gate1, _remote1) = open_session(1, sink.clone(), &workers);
        slot.promote(first.clone(), gate1, &sink).await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::SessionEstablished { .. })
        ));

        let retired = slot.retire().await.unwrap();
        assert!(retired.same_session(&first));
        assert!(slot.is_retired().await);

        // A worker finishing after retirement cannot install its session
        let (late, gate2, _remote2) = open_session(2, sink.clone(), &workers);
        assert_eq!(
            slot.promote(late.clone(), gate2, &sink).await,
            Err(EstablishError::ShuttingDown)
        );
        assert!(late.is_closed());
        assert!(slot.current().await.is_none());

        timeout(Duration::from_secs(1), late.wait_ended())
            .await
            .unwrap();
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::SessionEnded { session, .. }) if session == SessionId(1)
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_none());
    }
}
