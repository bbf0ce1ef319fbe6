//! Streaming response body.
//!
//! Frames are passed through as they arrive from the upstream; nothing is
//! buffered. The wrapper adds:
//! - an idle deadline reset on every frame
//! - the session guard, released when the body ends or is dropped
//! - returning the upstream connection to the pool after a clean end
//! - byte accounting

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::BoxError;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::observability::metrics;
use crate::session::SessionGuard;
use crate::upstream::{ConnectionPool, PooledConnection};

/// The upstream body produced no frame within the idle deadline.
#[derive(Debug, thiserror::Error)]
#[error("upstream stream idle for {0:?}")]
pub struct StreamIdleTimeout(pub Duration);

/// Upstream body relayed to the client.
pub struct ForwardedBody<B> {
    inner: B,
    idle_timeout: Duration,
    idle: Pin<Box<Sleep>>,
    session: Option<SessionGuard>,
    checkin: Option<(Arc<ConnectionPool>, PooledConnection)>,
    route: String,
    bytes: u64,
}

impl<B> ForwardedBody<B> {
    pub fn new(inner: B, idle_timeout: Duration, route: impl Into<String>) -> Self {
        Self {
            inner,
            idle_timeout,
            idle: Box::pin(tokio::time::sleep(idle_timeout)),
            session: None,
            checkin: None,
            route: route.into(),
            bytes: 0,
        }
    }

    /// Keep the session's request in flight until the body ends.
    pub fn with_session(mut self, guard: Option<SessionGuard>) -> Self {
        self.session = guard;
        self
    }

    /// Return `conn` to `pool` once the body has been read to the end.
    pub fn with_checkin(mut self, pool: Arc<ConnectionPool>, conn: PooledConnection) -> Self {
        self.checkin = Some((pool, conn));
        self
    }

    fn finish(&mut self) {
        if let Some((pool, conn)) = self.checkin.take() {
            pool.checkin(conn);
        }
        self.session = None;
    }

    fn abort(&mut self) {
        // Dropping the sender closes the upstream connection
        self.checkin = None;
        self.session = None;
    }
}

impl<B> Body for ForwardedBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                let deadline = Instant::now() + this.idle_timeout;
                this.idle.as_mut().reset(deadline);
                if this.inner.is_end_stream() {
                    this.finish();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.abort();
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.idle.as_mut().poll(cx).is_ready() {
                    tracing::warn!(
                        route = %this.route,
                        idle = ?this.idle_timeout,
                        "Upstream stream stalled; aborting"
                    );
                    this.abort();
                    return Poll::Ready(Some(Err(StreamIdleTimeout(this.idle_timeout).into())));
                }
                Poll::Pending
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for ForwardedBody<B> {
    fn drop(&mut self) {
        metrics::record_stream_bytes(&self.route, self.bytes);
    }
}
