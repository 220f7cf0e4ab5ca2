//! Accept loop that serves the router over hyper with bounded connections.
//!
//! `axum::serve` hides the connection, so it is driven by hand here: every
//! socket needs a connection slot and is wrapped in a [`DeadlineIo`] before
//! hyper sees it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::io::{DeadlineIo, Timeouts};
use crate::config::ConnectionLimits;
use crate::metrics::{GaugeGuard, CONNECTIONS_REJECTED_TOTAL, OPEN_CONNECTIONS};

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// On shutdown the listener stops accepting and every open connection is
/// asked to finish its in-flight request. Connections still open after
/// `drain_timeout` are abandoned.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    limits: ConnectionLimits,
    drain_timeout: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let slots = Arc::new(Semaphore::new(limits.max_connections));
    let timeouts = Timeouts {
        read: limits.read_timeout,
        write: limits.write_timeout,
        idle: limits.idle_timeout,
    };
    let stop = CancellationToken::new();
    let tracker = TaskTracker::new();

    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    // Usually EMFILE; back off instead of spinning.
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let Ok(permit) = slots.clone().try_acquire_owned() else {
            CONNECTIONS_REJECTED_TOTAL.inc();
            tracing::warn!(
                peer = %peer,
                max_connections = limits.max_connections,
                "connection limit reached, closing connection"
            );
            drop(stream);
            continue;
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
        }

        let io = TokioIo::new(DeadlineIo::new(stream, timeouts));
        let service = TowerToHyperService::new(app.clone());
        let stop = stop.clone();

        tracker.spawn(async move {
            let _permit = permit;
            let _open = GaugeGuard::inc(&OPEN_CONNECTIONS);

            let conn = http1::Builder::new()
                .timer(TokioTimer::new())
                .header_read_timeout(timeouts.read)
                .keep_alive(true)
                .serve_connection(io, service);
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                _ = stop.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                tracing::debug!(peer = %peer, error = %e, "connection closed with error");
            }
        });
    }

    tracing::info!(open = tracker.len(), "listener stopped, draining connections");
    tracker.close();
    stop.cancel();
    if tokio::time::timeout(drain_timeout, tracker.wait()).await.is_err() {
        tracing::warn!(
            open = tracker.len(),
            "drain timeout elapsed with connections still open"
        );
    }
    Ok(())
}
