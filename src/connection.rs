//! Connection lifecycle: endpoint fallback, read loops, keepalive, teardown.
//!
//! A connection is a small state machine (Connecting, Connected, Closed)
//! that only ever moves forward. Establishment tries each candidate endpoint
//! in list order, one pass, first success wins. Once connected, up to two
//! read loops (datagram and reliable stream) feed the inbound queue, a
//! single writer task drains queued reliable frames in send order, and a
//! keepalive timer covers idle periods. Whichever loop finishes or errors
//! first initiates teardown: a shared cancellation token stops the others at
//! their next suspension point, closing the session releases any read still
//! parked in I/O, and the supervisor joins everything before releasing the
//! connection's resources.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec;
use crate::codec::StreamDecoder;
use crate::core::{FRAME_PREFIX_SIZE, KEEPALIVE_INTERVAL, TransportConfig};
use crate::pool::{BufferPool, PooledBuf};
use crate::session::{Dialer, Session};

/// Connection lifecycle state.
///
/// Discriminants are the values reported across the embedding boundary:
/// closed-or-unknown is 0, so a caller polling a stale handle reads the same
/// answer as one polling a torn-down connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// Torn down, or the handle is unknown. Terminal.
    Closed = 0,
    /// Candidate endpoints are being tried.
    Connecting = 1,
    /// Session established; send and receive are live.
    Connected = 2,
}

impl TransportState {
    /// Integer value used on the embedding call surface.
    pub fn as_wire(self) -> u8 {
        self as u8
    }

    fn from_wire(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

/// A framed reliable message queued for the writer task.
///
/// Frames that fit the pool's size class ride a pooled buffer; oversized
/// frames fall back to the heap. Dropping a queued frame on teardown
/// returns any pooled storage.
enum OutboundFrame {
    Pooled(PooledBuf, usize),
    Heap(Vec<u8>),
}

impl OutboundFrame {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Pooled(buf, framed) => &buf[..*framed],
            Self::Heap(frame) => frame,
        }
    }
}

struct Inner<S: Session> {
    state: AtomicU8,
    /// Fixed from the negotiated session; meaningless unless Connected.
    max_datagram_size: AtomicUsize,
    /// Fully-decoded messages awaiting application pickup, FIFO per channel.
    inbound: Mutex<VecDeque<Vec<u8>>>,
    /// Monotonic time of the most recent outbound send.
    last_send: Mutex<Instant>,
    session: OnceLock<Arc<S>>,
    /// Queue feeding the single reliable writer task, set before Connected.
    reliable_tx: OnceLock<mpsc::UnboundedSender<OutboundFrame>>,
    cancel: CancellationToken,
    pool: Arc<BufferPool>,
}

impl<S: Session> Inner<S> {
    fn push_inbound(&self, message: Vec<u8>) {
        self.inbound.lock().expect("queue lock").push_back(message);
    }

    fn touch_send(&self) {
        *self.last_send.lock().expect("timestamp lock") = Instant::now();
    }

    fn finish_closed(&self) {
        self.state
            .store(TransportState::Closed.as_wire(), Ordering::Release);
        self.inbound.lock().expect("queue lock").clear();
    }
}

/// One logical session against a server, shared by the facade and its own
/// background tasks.
pub struct Connection<S: Session> {
    inner: Arc<Inner<S>>,
}

impl<S: Session> Clone for Connection<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Session> Connection<S> {
    /// Create a connection in Connecting state and start establishment in
    /// the background. Returns immediately.
    pub(crate) fn spawn<D>(dialer: Arc<D>, config: TransportConfig, pool: Arc<BufferPool>) -> Self
    where
        D: Dialer<Session = S>,
    {
        let inner = Arc::new(Inner {
            state: AtomicU8::new(TransportState::Connecting.as_wire()),
            max_datagram_size: AtomicUsize::new(0),
            inbound: Mutex::new(VecDeque::new()),
            last_send: Mutex::new(Instant::now()),
            session: OnceLock::new(),
            reliable_tx: OnceLock::new(),
            cancel: CancellationToken::new(),
            pool,
        });
        tokio::spawn(establish(Arc::clone(&inner), dialer, config));
        Self { inner }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        TransportState::from_wire(self.inner.state.load(Ordering::Acquire))
    }

    /// Negotiated maximum datagram payload; 0 unless Connected.
    pub fn max_datagram_size(&self) -> usize {
        if self.state() != TransportState::Connected {
            return 0;
        }
        self.inner.max_datagram_size.load(Ordering::Relaxed)
    }

    /// Pop one decoded inbound message, if any. Never blocks.
    pub fn receive(&self) -> Option<Vec<u8>> {
        self.inner.inbound.lock().expect("queue lock").pop_front()
    }

    /// Queue one outbound message. Silently dropped unless Connected.
    pub fn send(&self, payload: &[u8], reliable: bool) {
        if self.state() != TransportState::Connected {
            debug!(reliable, "send dropped: not connected");
            return;
        }
        let Some(session) = self.inner.session.get() else {
            return;
        };
        let session = Arc::clone(session);
        if reliable {
            self.send_reliable(session, payload);
        } else {
            self.send_datagram(session, payload);
        }
    }

    /// Initiate teardown. Idempotent; safe on any state.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    fn send_datagram(&self, session: Arc<S>, payload: &[u8]) {
        let limit = session.max_datagram_size().min(self.inner.pool.capacity());
        if payload.len() > limit {
            warn!(size = payload.len(), limit, "datagram dropped: payload too large");
            return;
        }

        let mut buf = self.inner.pool.acquire();
        buf[..payload.len()].copy_from_slice(payload);
        let len = payload.len();
        self.inner.touch_send();

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(err) = session.send_datagram(&buf[..len]).await {
                // A failed write on the ordered underlying channel cannot be
                // skipped without desync, so it is session-fatal.
                warn!(%err, "datagram send failed, closing connection");
                inner.cancel.cancel();
            }
            drop(buf);
        });
    }

    /// Frame the payload synchronously, in call order, and hand it to the
    /// connection's single writer task. Queuing here is what preserves the
    /// ordered-stream guarantee across concurrent callers.
    fn send_reliable(&self, session: Arc<S>, payload: &[u8]) {
        if !session.supports_stream() {
            warn!("reliable send dropped: session has no stream channel");
            return;
        }
        let Some(tx) = self.inner.reliable_tx.get() else {
            return;
        };

        let frame = if FRAME_PREFIX_SIZE + payload.len() <= self.inner.pool.capacity() {
            let mut buf = self.inner.pool.acquire();
            match codec::encode_frame_into(payload, &mut buf) {
                Ok(framed) => OutboundFrame::Pooled(buf, framed),
                Err(err) => {
                    warn!(%err, "reliable send rejected");
                    return;
                }
            }
        } else {
            // Cold path: frames too big for the pool's size class.
            match codec::encode_frame(payload) {
                Ok(frame) => OutboundFrame::Heap(frame),
                Err(err) => {
                    warn!(%err, "reliable send rejected");
                    return;
                }
            }
        };

        self.inner.touch_send();
        if tx.send(frame).is_err() {
            debug!("reliable send dropped: writer gone");
        }
    }
}

/// Try candidate endpoints in order; run the connected phase on success.
async fn establish<S, D>(inner: Arc<Inner<S>>, dialer: Arc<D>, config: TransportConfig)
where
    S: Session,
    D: Dialer<Session = S>,
{
    let mut session = None;
    for url in &config.urls {
        let attempt = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            result = dialer.dial(url, &config) => result,
        };
        match attempt {
            Ok(established) => {
                debug!(%url, "endpoint handshake succeeded");
                session = Some(Arc::new(established));
                break;
            }
            Err(err) => debug!(%url, %err, "candidate endpoint failed"),
        }
    }

    let Some(session) = session else {
        debug!("connection establishment failed");
        inner.finish_closed();
        return;
    };

    if inner.cancel.is_cancelled() {
        session.close().await;
        inner.finish_closed();
        return;
    }

    inner
        .max_datagram_size
        .store(session.max_datagram_size(), Ordering::Relaxed);
    inner.touch_send();
    let _ = inner.session.set(Arc::clone(&session));

    // The writer queue must exist before the state flips to Connected, or a
    // caller could observe Connected with nowhere to put a reliable send.
    let reliable_rx = session.supports_stream().then(|| {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = inner.reliable_tx.set(tx);
        rx
    });

    inner
        .state
        .store(TransportState::Connected.as_wire(), Ordering::Release);
    debug!("connected");

    run_connected(inner, session, reliable_rx).await;
}

/// Drain queued reliable frames onto the ordered stream, one at a time.
/// Queue order is send-call order, so the wire sees frames in call order.
async fn reliable_write_loop<S: Session>(
    inner: Arc<Inner<S>>,
    session: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    loop {
        let frame = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => return,
            },
        };
        if let Err(err) = session.send_stream(frame.bytes()).await {
            warn!(%err, "reliable send failed, closing connection");
            inner.cancel.cancel();
            return;
        }
    }
}

/// Supervise the read loops, the writer, and the keepalive timer until
/// teardown.
async fn run_connected<S: Session>(
    inner: Arc<Inner<S>>,
    session: Arc<S>,
    reliable_rx: Option<mpsc::UnboundedReceiver<OutboundFrame>>,
) {
    let mut datagram_task = tokio::spawn(datagram_loop(Arc::clone(&inner), Arc::clone(&session)));
    let mut stream_task = session
        .supports_stream()
        .then(|| tokio::spawn(stream_loop(Arc::clone(&inner), Arc::clone(&session))));
    let writer_task = reliable_rx.map(|rx| {
        tokio::spawn(reliable_write_loop(
            Arc::clone(&inner),
            Arc::clone(&session),
            rx,
        ))
    });
    let keepalive_task = tokio::spawn(keepalive_loop(Arc::clone(&inner), Arc::clone(&session)));

    // Both read loops race: the first to finish or error initiates teardown
    // of the whole connection, even if the other channel is still healthy.
    let mut datagram_done = false;
    let mut stream_done = false;
    match stream_task.as_mut() {
        Some(stream) => {
            tokio::select! {
                _ = &mut datagram_task => datagram_done = true,
                _ = stream => stream_done = true,
                _ = inner.cancel.cancelled() => {}
            }
        }
        None => {
            tokio::select! {
                _ = &mut datagram_task => datagram_done = true,
                _ = inner.cancel.cancelled() => {}
            }
        }
    }

    inner.cancel.cancel();
    // Closing the session releases any read still parked in the other loop.
    session.close().await;

    if !datagram_done {
        let _ = datagram_task.await;
    }
    if let Some(task) = stream_task {
        if !stream_done {
            let _ = task.await;
        }
    }
    if let Some(task) = writer_task {
        let _ = task.await;
    }
    let _ = keepalive_task.await;

    inner.finish_closed();
    debug!("connection closed");
}

/// Deliver inbound datagrams, one message per datagram.
async fn datagram_loop<S: Session>(inner: Arc<Inner<S>>, session: Arc<S>) {
    loop {
        let mut buf = inner.pool.acquire();
        let received = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            result = session.recv_datagram(&mut buf) => result,
        };
        match received {
            // Empty datagrams are peer keepalives, not messages.
            Ok(0) => continue,
            Ok(len) => inner.push_inbound(buf[..len].to_vec()),
            Err(err) => {
                debug!(%err, "datagram read loop ended");
                return;
            }
        }
    }
}

/// Reassemble framed messages from the reliable stream.
///
/// Leftover undecoded bytes ride in the decoder between chunks; on teardown
/// the partial remainder is dropped with the decoder, never delivered.
async fn stream_loop<S: Session>(inner: Arc<Inner<S>>, session: Arc<S>) {
    let mut decoder = StreamDecoder::new();
    loop {
        let mut buf = inner.pool.acquire();
        let received = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            result = session.recv_stream(&mut buf) => result,
        };
        match received {
            Ok(0) => {
                debug!("reliable stream reached end-of-stream");
                return;
            }
            Ok(len) => {
                decoder.push(&buf[..len]);
                while let Some(message) = decoder.next_message() {
                    inner.push_inbound(message);
                }
            }
            Err(err) => {
                debug!(%err, "stream read loop ended");
                return;
            }
        }
    }
}

/// Send an empty datagram whenever the connection sits idle for a full
/// keepalive interval. Failures are logged and swallowed; only the read
/// loops decide that a session is dead.
async fn keepalive_loop<S: Session>(inner: Arc<Inner<S>>, session: Arc<S>) {
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval's first tick completes immediately; consume it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let idle = inner.last_send.lock().expect("timestamp lock").elapsed();
        if idle >= KEEPALIVE_INTERVAL {
            if let Err(err) = session.send_datagram(&[]).await {
                debug!(%err, "keepalive send failed");
            }
            inner.touch_send();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DialError, SessionError};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Session that stays open until closed and never yields data.
    struct SilentSession {
        closed: CancellationToken,
    }

    #[async_trait]
    impl Session for SilentSession {
        fn max_datagram_size(&self) -> usize {
            1200
        }

        fn supports_stream(&self) -> bool {
            false
        }

        async fn send_datagram(&self, _payload: &[u8]) -> Result<(), SessionError> {
            Ok(())
        }

        async fn recv_datagram(&self, _buf: &mut [u8]) -> Result<usize, SessionError> {
            self.closed.cancelled().await;
            Err(SessionError::Closed)
        }

        async fn send_stream(&self, _bytes: &[u8]) -> Result<(), SessionError> {
            Err(SessionError::StreamUnsupported)
        }

        async fn recv_stream(&self, _buf: &mut [u8]) -> Result<usize, SessionError> {
            Err(SessionError::StreamUnsupported)
        }

        async fn close(&self) {
            self.closed.cancel();
        }
    }

    /// Dialer that fails every URL except `good`.
    struct OneGoodDialer {
        good: &'static str,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dialer for OneGoodDialer {
        type Session = SilentSession;

        async fn dial(
            &self,
            url: &str,
            _config: &TransportConfig,
        ) -> Result<SilentSession, DialError> {
            self.attempts.lock().unwrap().push(url.to_string());
            if url == self.good {
                Ok(SilentSession {
                    closed: CancellationToken::new(),
                })
            } else {
                Err(DialError::Unreachable(url.to_string()))
            }
        }
    }

    async fn wait_for_state<S: Session>(conn: &Connection<S>, want: TransportState) {
        for _ in 0..200 {
            if conn.state() == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connection never reached {want:?}, stuck at {:?}", conn.state());
    }

    #[tokio::test]
    async fn first_working_candidate_wins() {
        let dialer = Arc::new(OneGoodDialer {
            good: "https://b.example",
            attempts: Mutex::new(Vec::new()),
        });
        let config = TransportConfig::new(vec![
            "https://a.example".into(),
            "https://b.example".into(),
            "https://c.example".into(),
        ]);

        let conn = Connection::spawn(Arc::clone(&dialer), config, BufferPool::new());
        wait_for_state(&conn, TransportState::Connected).await;

        // The failing candidate was tried first, the winner second, and the
        // remaining candidate never attempted.
        assert_eq!(
            *dialer.attempts.lock().unwrap(),
            vec!["https://a.example".to_string(), "https://b.example".into()]
        );
        assert_eq!(conn.max_datagram_size(), 1200);

        conn.close();
        wait_for_state(&conn, TransportState::Closed).await;
    }

    #[tokio::test]
    async fn all_candidates_failing_closes() {
        let dialer = Arc::new(OneGoodDialer {
            good: "https://nowhere.example",
            attempts: Mutex::new(Vec::new()),
        });
        let config =
            TransportConfig::new(vec!["https://a.example".into(), "https://b.example".into()]);

        let conn = Connection::spawn(Arc::clone(&dialer), config, BufferPool::new());
        wait_for_state(&conn, TransportState::Closed).await;

        assert_eq!(dialer.attempts.lock().unwrap().len(), 2);
        assert_eq!(conn.max_datagram_size(), 0);
        assert!(conn.receive().is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dialer = Arc::new(OneGoodDialer {
            good: "https://a.example",
            attempts: Mutex::new(Vec::new()),
        });
        let config = TransportConfig::new(vec!["https://a.example".into()]);

        let conn = Connection::spawn(dialer, config, BufferPool::new());
        wait_for_state(&conn, TransportState::Connected).await;

        conn.close();
        conn.close();
        wait_for_state(&conn, TransportState::Closed).await;
        conn.close();
        assert_eq!(conn.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn send_before_connected_is_dropped() {
        // Dialer that never completes: the connection stays Connecting.
        struct StuckDialer;

        #[async_trait]
        impl Dialer for StuckDialer {
            type Session = SilentSession;

            async fn dial(
                &self,
                _url: &str,
                _config: &TransportConfig,
            ) -> Result<SilentSession, DialError> {
                std::future::pending().await
            }
        }

        let config = TransportConfig::new(vec!["https://a.example".into()]);
        let conn = Connection::spawn(Arc::new(StuckDialer), config, BufferPool::new());

        assert_eq!(conn.state(), TransportState::Connecting);
        conn.send(b"early", false);
        conn.send(b"early", true);
        assert!(conn.receive().is_none());

        // Disconnecting while Connecting unblocks the parked dial.
        conn.close();
        wait_for_state(&conn, TransportState::Closed).await;
    }

    #[test]
    fn wire_state_values() {
        assert_eq!(TransportState::Closed.as_wire(), 0);
        assert_eq!(TransportState::Connecting.as_wire(), 1);
        assert_eq!(TransportState::Connected.as_wire(), 2);
        assert_eq!(TransportState::from_wire(7), TransportState::Closed);
    }
}
