#[cfg(feature = "metrics")]
use super::metrics::PoolMetrics;
use crate::protocol::HEALTHCHECK_COMMAND;
use crate::session::Session;
use crate::utils::error::{Result, RosPoolError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info_span, trace, warn, Instrument, Span};

/// Snapshot of a connection's state taken under one read lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub in_use: bool,
    pub healthy: bool,
    pub last_release: Instant,
}

#[derive(Debug)]
struct ConnectionState {
    in_use: bool,
    healthy: bool,
    last_release: Instant,
}

/// One pooled session plus its ownership and health state.
///
/// All state transitions happen under the connection's write lock, so two
/// concurrent [`Connection::try_use`] calls never both succeed.
pub struct Connection {
    id: u64,
    target: Arc<str>,
    session: Box<dyn Session>,
    state: RwLock<ConnectionState>,
    span: Span,
}

impl Connection {
    /// Wrap a freshly dialed session. The connection starts out claimed by the
    /// caller that dialed it, so no other caller can see it idle first.
    pub(crate) fn new(id: u64, target: Arc<str>, session: Box<dyn Session>) -> Self {
        let span = info_span!("connection", target_name = %target, connection_id = id);
        Self {
            id,
            target,
            session,
            state: RwLock::new(ConnectionState {
                in_use: true,
                healthy: true,
                last_release: Instant::now(),
            }),
            span,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Claim the connection for exclusive use (blocks during the health check).
    ///
    /// Returns `false` without probing when the connection is in use or was
    /// found unhealthy by an earlier check.
    pub async fn try_use(&self, healthcheck_timeout: Duration) -> bool {
        async {
            let mut state = self.state.write().await;

            if state.in_use {
                trace!("skip connection in use");
                return false;
            }
            if !state.healthy {
                trace!("skip unhealthy connection");
                return false;
            }
            if !self.check(&mut state, healthcheck_timeout).await {
                return false;
            }

            trace!("reuse existing connection");
            state.in_use = true;
            true
        }
        .instrument(self.span.clone())
        .await
    }

    /// Release the connection without blocking the caller.
    ///
    /// A background task marks the connection idle, records the release time
    /// and re-checks health for the next claimer. The returned handle may be
    /// dropped; nothing orders the task against the caller's next action.
    pub fn free(self: &Arc<Self>, healthcheck_timeout: Duration) -> JoinHandle<()> {
        let connection = Arc::clone(self);
        tokio::spawn(
            async move { connection.free_internal(healthcheck_timeout).await }
                .instrument(self.span.clone()),
        )
    }

    /// [`Connection::free`] for callers that may not hold a connection
    pub fn release(
        connection: Option<Arc<Connection>>,
        healthcheck_timeout: Duration,
    ) -> Option<JoinHandle<()>> {
        connection.map(|c| c.free(healthcheck_timeout))
    }

    async fn free_internal(&self, healthcheck_timeout: Duration) {
        let mut state = self.state.write().await;

        trace!("free connection");
        state.in_use = false;
        state.last_release = state.last_release.max(Instant::now());
        self.check(&mut state, healthcheck_timeout).await;
    }

    /// Probe the session and record the outcome. Must be called with the write lock held.
    async fn check(&self, state: &mut ConnectionState, timeout: Duration) -> bool {
        trace!("run healthcheck");

        let result = match tokio::time::timeout(timeout, self.probe()).await {
            Ok(result) => result,
            Err(_) => Err(RosPoolError::Timeout(format!(
                "no health check reply within {:?}",
                timeout
            ))),
        };

        state.healthy = result.is_ok();
        match result {
            Ok(()) => trace!("healthcheck successful"),
            Err(e) => {
                warn!(error = %e, "error during healthcheck");
                #[cfg(feature = "metrics")]
                PoolMetrics::record_healthcheck_failure(&self.target);
            }
        }
        state.healthy
    }

    /// Any first frame, the terminator, or end of stream counts as alive.
    /// A `!trap` is still an answer from the device.
    async fn probe(&self) -> Result<()> {
        let mut replies = self
            .session
            .query(&[HEALTHCHECK_COMMAND.to_string()])
            .await?;

        match replies.recv().await {
            Some(Ok(_)) | None => Ok(()),
            Some(Err(RosPoolError::Trap(message))) => {
                trace!(message = %message, "healthcheck answered with trap");
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// Like [`Connection::status`], but `None` while a check holds the lock
    pub(crate) fn try_status(&self) -> Option<ConnectionStatus> {
        let state = self.state.try_read().ok()?;
        Some(ConnectionStatus {
            in_use: state.in_use,
            healthy: state.healthy,
            last_release: state.last_release,
        })
    }

    pub async fn is_in_use(&self) -> bool {
        self.state.read().await.in_use
    }

    pub async fn is_healthy(&self) -> bool {
        self.state.read().await.healthy
    }

    pub async fn last_release(&self) -> Instant {
        self.state.read().await.last_release
    }

    pub async fn status(&self) -> ConnectionStatus {
        let state = self.state.read().await;
        ConnectionStatus {
            in_use: state.in_use,
            healthy: state.healthy,
            last_release: state.last_release,
        }
    }

    pub(crate) async fn close(&self) {
        self.session.close().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
