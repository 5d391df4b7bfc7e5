// rospool - Health-verified session pooling for RouterOS management APIs

pub mod config;
pub mod poller;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use utils::error::{Result, RosPoolError};
