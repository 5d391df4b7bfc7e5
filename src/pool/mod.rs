pub mod connection;
pub mod manager;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod target;

pub use connection::{Connection, ConnectionStatus};
pub use manager::ConnectionManager;
#[cfg(feature = "metrics")]
pub use metrics::PoolMetrics;
pub use target::{PoolStats, TargetConnections};
