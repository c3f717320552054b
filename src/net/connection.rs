//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count in-flight work so shutdown can wait for it to drain
//! - Enforce the request head read deadline and the keep-alive idle timeout

use std::io::{self, IoSlice};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{watch, Notify};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts live units of work (connections, dispatch jobs) for graceful shutdown.
///
/// Uses a watch channel so any number of waiters can block until the count
/// reaches zero.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    count: Arc<watch::Sender<usize>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Record a new unit of work. Returns a guard that decrements on drop.
    pub fn track(&self) -> ActivityGuard {
        self.count.send_modify(|count| *count += 1);
        ActivityGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Current number of live units.
    pub fn active_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until nothing is being tracked.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard held for the lifetime of a tracked unit of work.
#[derive(Debug)]
pub struct ActivityGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.count.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Which per-connection deadline ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// No request arrived within the keep-alive idle timeout.
    Idle,
    /// A request head started arriving but was not complete within the read timeout.
    HeadTimeout,
}

#[derive(Debug)]
struct Timing {
    /// When the last request finished.
    last_active: Instant,
    /// When the pending request head started arriving, if one has.
    head_started: Option<Instant>,
}

/// Per-connection request activity, used for the read and idle timeouts.
///
/// Between requests the connection is idle. The first byte of the next
/// request head switches it to the read deadline until the head has been
/// parsed. A fresh connection is on the read deadline from the start.
#[derive(Debug)]
pub struct ConnectionActivity {
    in_flight: AtomicUsize,
    timing: Mutex<Timing>,
    changed: Notify,
}

impl ConnectionActivity {
    pub fn new() -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            timing: Mutex::new(Timing {
                last_active: now,
                head_started: Some(now),
            }),
            changed: Notify::new(),
        })
    }

    /// Mark a request as started. Activity ends when the guard drops.
    pub fn begin(self: &Arc<Self>) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.timing().head_started = None;
        self.changed.notify_waiters();
        RequestGuard {
            activity: Arc::clone(self),
        }
    }

    /// Record bytes read from the client.
    pub fn bytes_received(&self) {
        if self.in_flight() > 0 {
            return;
        }
        let mut timing = self.timing();
        if timing.head_started.is_none() {
            timing.head_started = Some(Instant::now());
            drop(timing);
            self.changed.notify_waiters();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn timing(&self) -> MutexGuard<'_, Timing> {
        match self.timing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn deadline(&self, read_timeout: Duration, idle_timeout: Duration) -> (Instant, Expiry) {
        let timing = self.timing();
        match timing.head_started {
            Some(started) => (started + read_timeout, Expiry::HeadTimeout),
            None => (timing.last_active + idle_timeout, Expiry::Idle),
        }
    }

    /// Resolves when the connection has waited too long with no request in flight.
    pub async fn expired(&self, read_timeout: Duration, idle_timeout: Duration) -> Expiry {
        loop {
            // Registered before the check so a concurrent change is not missed.
            let changed = self.changed.notified();
            if self.in_flight() > 0 {
                changed.await;
                continue;
            }

            let (deadline, expiry) = self.deadline(read_timeout, idle_timeout);
            if Instant::now() >= deadline {
                return expiry;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline.into()) => {}
                _ = changed => {}
            }
        }
    }
}

/// Guard for one in-flight request on a connection.
#[derive(Debug)]
pub struct RequestGuard {
    activity: Arc<ConnectionActivity>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.activity.timing().last_active = Instant::now();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.activity.changed.notify_waiters();
    }
}

/// Client stream that reports incoming bytes to its [`ConnectionActivity`].
#[derive(Debug)]
pub struct WatchedIo<T> {
    inner: T,
    activity: Arc<ConnectionActivity>,
}

impl<T> WatchedIo<T> {
    pub fn new(inner: T, activity: Arc<ConnectionActivity>) -> Self {
        Self { inner, activity }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for WatchedIo<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.activity.bytes_received();
        }
        poll
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for WatchedIo<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn tracker_counts() {
        let tracker = ActivityTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.clone().track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let tracker = ActivityTracker::new();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle())
            .await
            .expect("idle tracker should not block");
    }

    #[tokio::test]
    async fn wait_idle_blocks_until_guards_drop() {
        let tracker = ActivityTracker::new();
        let guard = tracker.track();

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.wait_idle().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    const LONG: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn fresh_connection_owes_a_head() {
        let activity = ConnectionActivity::new();
        let expiry = tokio::time::timeout(
            Duration::from_secs(1),
            activity.expired(Duration::from_millis(50), LONG),
        )
        .await
        .expect("head deadline should run out");
        assert_eq!(expiry, Expiry::HeadTimeout);
    }

    #[tokio::test]
    async fn busy_connection_never_expires() {
        let activity = ConnectionActivity::new();
        let guard = activity.begin();
        assert_eq!(activity.in_flight(), 1);

        let short = Duration::from_millis(50);
        let pending =
            tokio::time::timeout(Duration::from_millis(150), activity.expired(short, short)).await;
        assert!(pending.is_err(), "busy connection must not expire");

        drop(guard);
        let started = Instant::now();
        let expiry = tokio::time::timeout(Duration::from_secs(1), activity.expired(LONG, short))
            .await
            .expect("connection should go idle");
        assert_eq!(expiry, Expiry::Idle);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn keep_alive_gap_uses_idle_timeout() {
        let activity = ConnectionActivity::new();
        drop(activity.begin());

        // Longer than the read timeout, shorter than the idle timeout.
        let read_timeout = Duration::from_millis(50);
        let pending = tokio::time::timeout(
            Duration::from_millis(200),
            activity.expired(read_timeout, LONG),
        )
        .await;
        assert!(pending.is_err(), "waiting between requests is not a read timeout");
    }

    #[tokio::test]
    async fn first_byte_starts_head_deadline() {
        let activity = ConnectionActivity::new();
        drop(activity.begin());
        activity.bytes_received();

        let expiry = tokio::time::timeout(
            Duration::from_secs(1),
            activity.expired(Duration::from_millis(50), LONG),
        )
        .await
        .expect("partial head should time out");
        assert_eq!(expiry, Expiry::HeadTimeout);
    }

    #[tokio::test]
    async fn body_bytes_do_not_start_a_head() {
        let activity = ConnectionActivity::new();
        let guard = activity.begin();
        activity.bytes_received();
        drop(guard);

        let pending = tokio::time::timeout(
            Duration::from_millis(150),
            activity.expired(Duration::from_millis(20), LONG),
        )
        .await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn watched_io_reports_reads() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let activity = ConnectionActivity::new();
        drop(activity.begin());

        let (client, server) = tokio::io::duplex(64);
        let mut watched = WatchedIo::new(server, Arc::clone(&activity));
        let mut client = client;
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = watched.read(&mut buf).await.unwrap();
        assert!(n > 0);

        let expiry = tokio::time::timeout(
            Duration::from_secs(1),
            activity.expired(Duration::from_millis(20), LONG),
        )
        .await
        .unwrap();
        assert_eq!(expiry, Expiry::HeadTimeout);
    }
}
