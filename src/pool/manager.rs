use super::connection::Connection;
use super::target::{PoolStats, TargetConnections};
use crate::config::{PoolSettings, TargetConfig};
use crate::session::Connector;
use crate::utils::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Target pools by target name, created on first use
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    settings: PoolSettings,
    pools: DashMap<String, Arc<TargetConnections>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, settings: PoolSettings) -> Self {
        Self {
            connector,
            settings,
            pools: DashMap::new(),
        }
    }

    /// The target's pool, created with a running cleanup job if missing
    pub fn pool_for(&self, target: &TargetConfig) -> Arc<TargetConnections> {
        if let Some(pool) = self.pools.get(&target.name) {
            return Arc::clone(pool.value());
        }

        let entry = self.pools.entry(target.name.clone()).or_insert_with(|| {
            let pool = Arc::new(TargetConnections::new(
                target.name.as_str(),
                Arc::clone(&self.connector),
            ));
            if let Err(e) = pool.start_cleanup(
                self.settings.cleanup_interval(),
                target.idle_timeout(&self.settings),
            ) {
                warn!(target_name = %target.name, error = %e, "cleanup job not started");
            }
            pool
        });
        Arc::clone(entry.value())
    }

    /// Borrow a connection to `target`; release it with [`Connection::free`]
    pub async fn get(&self, target: &TargetConfig) -> Result<Arc<Connection>> {
        self.pool_for(target).get(target).await
    }

    pub fn pool(&self, name: &str) -> Option<Arc<TargetConnections>> {
        self.pools.get(name).map(|pool| Arc::clone(pool.value()))
    }

    fn all_pools(&self) -> Vec<Arc<TargetConnections>> {
        self.pools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Occupancy of every pool, ordered by target name
    pub async fn stats(&self) -> Vec<PoolStats> {
        let mut stats = Vec::new();
        for pool in self.all_pools() {
            stats.push(pool.stats().await);
        }
        stats.sort_by(|a, b| a.target.cmp(&b.target));
        stats
    }

    /// Stop every cleanup job and close every session
    pub async fn shutdown(&self) {
        let pools = self.all_pools();
        for pool in &pools {
            pool.close_all().await;
        }
        info!(pools = pools.len(), "connection pools shut down");
    }
}
