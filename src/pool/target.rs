use super::connection::Connection;
#[cfg(feature = "metrics")]
use super::metrics::PoolMetrics;
use crate::config::TargetConfig;
use crate::session::{AsyncErrors, Connector};
use crate::utils::error::{Result, RosPoolError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};

/// Connections of one target.
///
/// The pool lock guards membership only; each [`Connection`] guards its own
/// state. The pool lock is always taken first.
pub struct TargetConnections {
    target_name: Arc<str>,
    connector: Arc<dyn Connector>,
    inner: Mutex<PoolInner>,
    cleanup_token: StdMutex<Option<CancellationToken>>,
    span: Span,
}

#[derive(Default)]
struct PoolInner {
    connections: HashMap<u64, Arc<Connection>>,
    next_id: u64,
}

/// Occupancy of one target pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub target: String,
    pub total: usize,
    pub in_use: usize,
    pub idle_healthy: usize,
    pub idle_unhealthy: usize,
}

impl TargetConnections {
    pub fn new(target_name: impl Into<Arc<str>>, connector: Arc<dyn Connector>) -> Self {
        let target_name = target_name.into();
        let span = info_span!("target", target_name = %target_name);
        Self {
            target_name,
            connector,
            inner: Mutex::new(PoolInner::default()),
            cleanup_token: StdMutex::new(None),
            span,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Get an existing unused connection or dial a new one.
    ///
    /// Blocks during health checks of candidates and during the dial. Other
    /// callers of the same pool wait on the pool lock meanwhile.
    pub async fn get(&self, target: &TargetConfig) -> Result<Arc<Connection>> {
        async move {
            let mut inner = self.inner.lock().await;

            trace!("try to find existing connection");
            for connection in inner.connections.values() {
                if connection.try_use(target.timeout()).await {
                    return Ok(Arc::clone(connection));
                }
            }

            info!("connect to target");
            let dialed = match tokio::time::timeout(target.timeout(), self.connector.dial(target))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(RosPoolError::Timeout(format!(
                    "dial not finished within {:?}",
                    target.timeout()
                ))),
            };
            let mut session = match dialed {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "failed to connect to target");
                    #[cfg(feature = "metrics")]
                    PoolMetrics::record_dial_failure(&self.target_name);
                    return Err(e);
                }
            };

            let id = inner.next_id;
            inner.next_id += 1;

            let async_errors = session.take_async_errors();
            let connection = Arc::new(Connection::new(id, self.target_name.clone(), session));
            if let Some(errors) = async_errors {
                spawn_async_error_drain(errors, connection.span().clone());
            }
            inner.connections.insert(id, Arc::clone(&connection));

            debug!(
                connection_id = id,
                pool_size = inner.connections.len(),
                "registered new connection"
            );
            #[cfg(feature = "metrics")]
            PoolMetrics::record_dial(&self.target_name, inner.connections.len());

            Ok(connection)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Close and remove idle connections that are unhealthy or idle longer
    /// than `idle_timeout`. Connections in use are never touched, and no
    /// health check runs here; the flag cached by the last check is used.
    /// A connection whose release check is still running is left for the
    /// next pass.
    pub async fn cleanup(&self, idle_timeout: Duration) -> usize {
        async move {
            let mut inner = self.inner.lock().await;
            trace!("run cleanup");

            let mut evicted = Vec::new();
            for (id, connection) in &inner.connections {
                let Some(status) = connection.try_status() else {
                    trace!(connection_id = *id, "healthcheck in progress, skip");
                    continue;
                };
                if status.in_use {
                    continue;
                }

                let idle_for = status.last_release.elapsed();
                let expired = idle_for > idle_timeout;
                if !status.healthy || expired {
                    let reason = if status.healthy { "expired" } else { "unhealthy" };
                    info!(
                        connection_id = *id,
                        healthy = status.healthy,
                        expired,
                        idle_for = ?idle_for,
                        reason,
                        "close and cleanup connection"
                    );
                    evicted.push((*id, reason));
                }
            }

            for (id, reason) in &evicted {
                if let Some(connection) = inner.connections.remove(id) {
                    connection.close().await;
                    #[cfg(feature = "metrics")]
                    PoolMetrics::record_eviction(&self.target_name, reason);
                }
            }

            #[cfg(feature = "metrics")]
            PoolMetrics::set_pool_size(&self.target_name, inner.connections.len());

            evicted.len()
        }
        .instrument(self.span.clone())
        .await
    }

    /// Run [`TargetConnections::cleanup`] every `interval`, first one
    /// `interval` from now. Replaces a scheduler started earlier.
    ///
    /// A zero `interval` is rejected and leaves any running scheduler alone.
    pub fn start_cleanup(
        self: &Arc<Self>,
        interval: Duration,
        idle_timeout: Duration,
    ) -> Result<()> {
        if interval.is_zero() {
            return Err(RosPoolError::Config(
                "cleanup interval must be greater than 0".to_string(),
            ));
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.lock_cleanup_token().replace(token.clone()) {
            previous.cancel();
        }

        self.span.in_scope(|| {
            debug!(interval = ?interval, idle_timeout = ?idle_timeout, "start cleanup job")
        });

        tokio::spawn(
            run_cleanup(Arc::downgrade(self), interval, idle_timeout, token)
                .instrument(self.span.clone()),
        );
        Ok(())
    }

    /// Signal the scheduler to stop. Never blocks; a pass already running
    /// finishes, and no further pass starts.
    pub fn stop_cleanup(&self) {
        if let Some(token) = self.lock_cleanup_token().take() {
            self.span.in_scope(|| debug!("stop cleanup job"));
            token.cancel();
        }
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.lock_cleanup_token()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    fn lock_cleanup_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.cleanup_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        let mut stats = PoolStats {
            target: self.target_name.to_string(),
            ..Default::default()
        };

        for connection in inner.connections.values() {
            let status = connection.status().await;
            stats.total += 1;
            match (status.in_use, status.healthy) {
                (true, _) => stats.in_use += 1,
                (false, true) => stats.idle_healthy += 1,
                (false, false) => stats.idle_unhealthy += 1,
            }
        }

        stats
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids of all pooled connections, ascending
    pub async fn connection_ids(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<u64> = inner.connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Stop cleanup and close every session, including ones in use
    pub async fn close_all(&self) {
        self.stop_cleanup();

        let mut inner = self.inner.lock().await;
        let count = inner.connections.len();
        for (_, connection) in inner.connections.drain() {
            connection.close().await;
        }

        #[cfg(feature = "metrics")]
        PoolMetrics::set_pool_size(&self.target_name, 0);

        self.span
            .in_scope(|| debug!(closed = count, "closed all connections"));
    }
}

impl Drop for TargetConnections {
    fn drop(&mut self) {
        if let Some(token) = self.lock_cleanup_token().take() {
            token.cancel();
        }
    }
}

async fn run_cleanup(
    pool: Weak<TargetConnections>,
    interval: Duration,
    idle_timeout: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.cleanup(idle_timeout).await;
    }

    trace!("cleanup job stopped");
}

/// Log asynchronous session errors until the session's error stream closes
fn spawn_async_error_drain(mut errors: AsyncErrors, span: Span) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            while let Some(err) = errors.recv().await {
                error!(error = %err, "error during async operation");
            }
            trace!("async error stream closed");
        }
        .instrument(span),
    )
}
