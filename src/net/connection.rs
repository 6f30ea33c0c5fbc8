//! Per-connection resources.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Bound the number of live connections (backpressure)
//! - Close connections that stay idle past the configured timeout; a
//!   connection with a request in flight or an upgraded socket is never idle
//! - Keep the active-connection gauge current

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, Sleep};
use tower::Service;

use crate::observability::metrics;

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

    /// Get the raw ID value.
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

/// Counts live connections and caps them at `max_connections`.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
    limit: Arc<Semaphore>,
}

impl ConnectionTracker {
    pub fn new(max_connections: usize) -> Self {
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            limit: Arc::new(Semaphore::new(max_connections)),
        }
    }

    /// Wait for a free slot and record a new connection.
    /// The returned guard releases the slot when dropped.
    pub async fn acquire(&self) -> io::Result<ConnectionGuard> {
        let permit = Arc::clone(&self.limit)
            .acquire_owned()
            .await
            .map_err(|_| io::Error::other("connection limiter closed"))?;

        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened();
        let guard = ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
            _permit: permit,
        };
        tracing::trace!(
            connection_id = guard.id.as_u64(),
            available = self.limit.available_permits(),
            "Connection opened"
        );
        Ok(guard)
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Slots still free.
    pub fn available(&self) -> usize {
        self.limit.available_permits()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count and frees the slot when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::connection_closed();
        tracing::trace!(connection_id = self.id.as_u64(), "Connection closed");
    }
}

/// Requests currently being served on one connection.
///
/// Shared by [`IdleTimeoutStream`] and [`ConnectionService`]: the idle
/// deadline only runs while nothing is in flight. Once the connection is
/// upgraded it is never idle again; the socket handler owns its lifetime.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    state: Arc<InFlightState>,
}

#[derive(Debug, Default)]
struct InFlightState {
    requests: AtomicUsize,
    upgraded: AtomicBool,
}

impl InFlight {
    /// Mark a request as started. It ends when the guard drops.
    pub fn enter(&self) -> InFlightGuard {
        self.state.requests.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn is_upgraded(&self) -> bool {
        self.state.upgraded.load(Ordering::SeqCst)
    }

    /// Whether the idle deadline applies right now.
    pub fn is_idle(&self) -> bool {
        self.requests() == 0 && !self.is_upgraded()
    }
}

/// Keeps a request counted as in flight.
#[derive(Debug)]
pub struct InFlightGuard {
    state: Arc<InFlightState>,
}

impl InFlightGuard {
    /// The connection switched protocols; stop applying the idle timeout.
    pub fn upgraded(&self) {
        self.state.upgraded.store(true, Ordering::SeqCst);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.state.requests.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-connection service wrapper counting requests in flight until their
/// response body has been fully sent (or dropped).
#[derive(Debug, Clone)]
pub struct ConnectionService<S> {
    inner: S,
    in_flight: InFlight,
}

impl<S> ConnectionService<S> {
    pub fn new(inner: S, in_flight: InFlight) -> Self {
        Self { inner, in_flight }
    }
}

impl<S, B> Service<Request<B>> for ConnectionService<S>
where
    S: Service<Request<B>, Response = Response<Body>>,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response<Body>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let guard = self.in_flight.enter();
        let response = self.inner.call(request);
        Box::pin(async move {
            let response = response.await?;
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                guard.upgraded();
            }
            Ok(response.map(|body| {
                Body::new(body.map_frame(move |frame| {
                    let _held = &guard;
                    frame
                }))
            }))
        })
    }
}

/// Stream wrapper failing reads with `TimedOut` once the connection has had
/// no request in flight and no bytes moving for `timeout`.
#[derive(Debug)]
pub struct IdleTimeoutStream<S> {
    inner: S,
    timeout: Duration,
    deadline: Pin<Box<Sleep>>,
    in_flight: InFlight,
    guard: Option<ConnectionGuard>,
}

impl<S> IdleTimeoutStream<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            deadline: Box::pin(tokio::time::sleep(timeout)),
            in_flight: InFlight::default(),
            guard: None,
        }
    }

    /// Tie a connection slot to this stream's lifetime.
    pub fn tracked(mut self, guard: ConnectionGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Handle for the service serving this connection.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.guard.as_ref().map(ConnectionGuard::id)
    }

    fn touch(&mut self) {
        let next = Instant::now() + self.timeout;
        self.deadline.as_mut().reset(next);
    }

    fn poll_idle(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        // A busy connection keeps pushing the deadline out, so the timer
        // stays registered and is checked again once the work is done.
        while self.deadline.as_mut().poll(cx).is_ready() {
            if self.in_flight.is_idle() {
                tracing::debug!(
                    connection_id = self.connection_id().map(|id| id.as_u64()),
                    timeout = ?self.timeout,
                    "Closing idle connection"
                );
                return Poll::Ready(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection idle timeout",
                ));
            }
            self.touch();
        }
        Poll::Pending
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for IdleTimeoutStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_idle(cx).map(Err),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for IdleTimeoutStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if matches!(result, Poll::Ready(Ok(_))) {
            this.touch();
        }
        result
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if matches!(result, Poll::Ready(Ok(_))) {
            this.touch();
        }
        result
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn reply(status: StatusCode) -> Result<Response<Body>, Infallible> {
        let mut response = Response::new(Body::from("done"));
        *response.status_mut() = status;
        Ok(response)
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[tokio::test]
    async fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new(2);
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.acquire().await.unwrap();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.acquire().await.unwrap();
        assert_eq!(tracker.active_count(), 2);
        assert_eq!(tracker.available(), 0);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.available(), 2);
    }

    #[tokio::test]
    async fn tracker_waits_for_free_slot() {
        let tracker = ConnectionTracker::new(1);
        let guard = tracker.acquire().await.unwrap();

        let waiting = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.acquire().await.map(|g| g.id()) }
        });
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        drop(guard);
        assert!(waiting.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_times_out_without_traffic() {
        let (client, server) = tokio::io::duplex(64);
        let mut stream = IdleTimeoutStream::new(server, Duration::from_secs(120));

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        drop(client);
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_resets_idle_deadline() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = IdleTimeoutStream::new(server, Duration::from_secs(10));

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(8)).await;
            client.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            stream.write_all(b"pong").await.unwrap();
            client.read_exact(&mut buf).await.unwrap();
        }

        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn request_in_flight_holds_off_idle_timeout() {
        let (_client, server) = tokio::io::duplex(64);
        let mut stream = IdleTimeoutStream::new(server, Duration::from_secs(10));
        let request = stream.in_flight().enter();

        let mut buf = [0u8; 4];
        let pending = tokio::time::timeout(Duration::from_secs(300), stream.read(&mut buf)).await;
        assert!(pending.is_err(), "read ended while a request was running");

        drop(request);
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn upgraded_connection_never_idles_out() {
        let (_client, server) = tokio::io::duplex(64);
        let mut stream = IdleTimeoutStream::new(server, Duration::from_secs(10));
        stream.in_flight().enter().upgraded();

        let mut buf = [0u8; 4];
        let pending = tokio::time::timeout(Duration::from_secs(300), stream.read(&mut buf)).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn request_counts_until_response_body_is_sent() {
        let in_flight = InFlight::default();
        let inner = tower::service_fn(|_: Request<Body>| reply(StatusCode::OK));
        let mut service = ConnectionService::new(inner, in_flight.clone());

        let response = service.call(Request::new(Body::empty())).await.unwrap();
        assert_eq!(in_flight.requests(), 1);
        assert!(!in_flight.is_idle());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"done");
        assert_eq!(in_flight.requests(), 0);
        assert!(in_flight.is_idle());
    }

    #[tokio::test]
    async fn switching_protocols_marks_connection_upgraded() {
        let in_flight = InFlight::default();
        let inner = tower::service_fn(|_: Request<Body>| reply(StatusCode::SWITCHING_PROTOCOLS));
        let mut service = ConnectionService::new(inner, in_flight.clone());

        drop(service.call(Request::new(Body::empty())).await.unwrap());
        assert_eq!(in_flight.requests(), 0);
        assert!(in_flight.is_upgraded());
        assert!(!in_flight.is_idle());
    }
}
