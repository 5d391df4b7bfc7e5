pub mod api;

pub use api::{ApiConnector, ApiSession};

use crate::config::TargetConfig;
use crate::protocol::Sentence;
use crate::utils::error::{Result, RosPoolError};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

/// One item of a response stream.
///
/// `Ok(Some(_))` is a data frame, `Ok(None)` terminates the stream (the sender may
/// stay open), `Err(_)` is a transport or device error.
pub type ResponseFrame = Result<Option<Sentence>>;

/// Frames answering one query
pub type ResponseStream = UnboundedReceiver<ResponseFrame>;

/// Errors a session reports outside of any request; closed when the session ends
pub type AsyncErrors = UnboundedReceiver<RosPoolError>;

/// A live channel to one device's management API
#[async_trait]
pub trait Session: Send + Sync {
    /// Issue a request and return the stream of its reply frames
    async fn query(&self, words: &[String]) -> Result<ResponseStream>;

    /// Hand over the asynchronous error stream. Returns `None` after the first call.
    fn take_async_errors(&mut self) -> Option<AsyncErrors>;

    /// Close the session; pending and future queries fail
    async fn close(&self);
}

/// Opens new sessions to a target
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self, target: &TargetConfig) -> Result<Box<dyn Session>>;
}
