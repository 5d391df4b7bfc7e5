use super::{AsyncErrors, Connector, ResponseFrame, ResponseStream, Session};
use crate::config::TargetConfig;
use crate::protocol::{read_sentence, write_sentence, ReplyKind, Sentence, TAG_PREFIX};
use crate::utils::error::{Result, RosPoolError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// In-flight requests by tag
type PendingRequests = Arc<DashMap<String, UnboundedSender<ResponseFrame>>>;

/// Session over the plain-text management API.
///
/// Requests are tagged; a background reader routes every reply to the
/// stream of the request carrying the same tag. Replies that belong to no
/// request go to the asynchronous error stream.
#[derive(Debug)]
pub struct ApiSession {
    peer: String,
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingRequests,
    next_tag: AtomicU64,
    async_errors: Option<AsyncErrors>,
    shutdown: CancellationToken,
}

impl ApiSession {
    /// Connect and log in
    pub async fn connect(addr: &str, username: &str, password: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let session = Self::from_stream(stream, addr.to_string());
        session.login(username, password).await?;

        debug!(peer = %session.peer, user = %username, "API session established");
        Ok(session)
    }

    fn from_stream(stream: TcpStream, peer: String) -> Self {
        let (reader, writer) = stream.into_split();
        let pending: PendingRequests = Arc::new(DashMap::new());
        let (error_tx, error_rx) = unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(read_replies(
            BufReader::new(reader),
            pending.clone(),
            error_tx,
            shutdown.clone(),
        ));

        Self {
            peer,
            writer: Mutex::new(writer),
            pending,
            next_tag: AtomicU64::new(1),
            async_errors: Some(error_rx),
            shutdown,
        }
    }

    /// Post-6.43 plain login
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        let words = vec![
            "/login".to_string(),
            format!("=name={}", username),
            format!("=password={}", password),
        ];
        let mut replies = self.query(&words).await?;

        loop {
            match replies.recv().await {
                Some(Ok(Some(_))) => continue,
                Some(Ok(None)) => return Ok(()),
                Some(Err(RosPoolError::Trap(message))) => {
                    return Err(RosPoolError::AuthFailed(message))
                }
                Some(Err(e)) => return Err(e),
                None => return Err(RosPoolError::ConnectionClosed),
            }
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl Session for ApiSession {
    async fn query(&self, words: &[String]) -> Result<ResponseStream> {
        if self.shutdown.is_cancelled() {
            return Err(RosPoolError::ConnectionClosed);
        }

        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = unbounded_channel();
        self.pending.insert(tag.clone(), tx);

        // The reader may have failed all pending requests between the check above and the insert
        if self.shutdown.is_cancelled() {
            self.pending.remove(&tag);
            return Err(RosPoolError::ConnectionClosed);
        }

        let mut sentence = Sentence::from_words(words.iter().cloned());
        sentence.push(format!("{}{}", TAG_PREFIX, tag));

        let written = {
            let mut writer = self.writer.lock().await;
            write_sentence(&mut *writer, &sentence).await
        };
        if let Err(e) = written {
            self.pending.remove(&tag);
            return Err(e);
        }

        trace!(peer = %self.peer, tag = %tag, command = ?words.first(), "query sent");
        Ok(rx)
    }

    fn take_async_errors(&mut self) -> Option<AsyncErrors> {
        self.async_errors.take()
    }

    async fn close(&self) {
        self.shutdown.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            trace!(peer = %self.peer, error = %e, "shutdown of write half failed");
        }
        debug!(peer = %self.peer, "API session closed");
    }
}

impl Drop for ApiSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_replies(
    mut reader: BufReader<OwnedReadHalf>,
    pending: PendingRequests,
    errors: UnboundedSender<RosPoolError>,
    shutdown: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = read_sentence(&mut reader) => result,
        };

        match result {
            Ok(sentence) => match route_reply(&pending, sentence) {
                Ok(()) => {}
                Err(e @ RosPoolError::Fatal(_)) => {
                    let _ = errors.send(e);
                    break;
                }
                Err(e) => {
                    let _ = errors.send(e);
                }
            },
            Err(e) => {
                if !shutdown.is_cancelled() {
                    let _ = errors.send(e);
                }
                break;
            }
        }
    }

    shutdown.cancel();
    fail_pending(&pending);
}

fn route_reply(pending: &PendingRequests, sentence: Sentence) -> Result<()> {
    let Some(kind) = sentence.reply_kind() else {
        return Err(RosPoolError::Protocol(format!(
            "Unexpected sentence: {}",
            sentence
        )));
    };

    if kind == ReplyKind::Fatal {
        return Err(RosPoolError::Fatal(
            sentence.message().unwrap_or("no reason given").to_string(),
        ));
    }

    let Some(tag) = sentence.tag().map(str::to_string) else {
        return Err(RosPoolError::Protocol(format!(
            "Untagged {} reply",
            kind.as_str()
        )));
    };

    match kind {
        ReplyKind::Re => deliver(pending, &tag, Ok(Some(sentence))),
        ReplyKind::Trap => {
            let message = sentence.message().unwrap_or("unknown error").to_string();
            deliver(pending, &tag, Err(RosPoolError::Trap(message)));
        }
        ReplyKind::Done | ReplyKind::Empty | ReplyKind::Fatal => {
            if let Some((_, tx)) = pending.remove(&tag) {
                let _ = tx.send(Ok(None));
            }
        }
    }

    Ok(())
}

fn deliver(pending: &PendingRequests, tag: &str, frame: ResponseFrame) {
    match pending.get(tag) {
        // The receiver may be gone (e.g. a timed out health probe)
        Some(tx) => {
            let _ = tx.send(frame);
        }
        None => trace!(tag, "reply for unknown tag dropped"),
    }
}

fn fail_pending(pending: &PendingRequests) {
    let tags: Vec<String> = pending.iter().map(|entry| entry.key().clone()).collect();
    for tag in tags {
        if let Some((_, tx)) = pending.remove(&tag) {
            let _ = tx.send(Err(RosPoolError::ConnectionClosed));
        }
    }
}

/// Dials [`ApiSession`]s using the target's address and credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiConnector;

#[async_trait]
impl Connector for ApiConnector {
    async fn dial(&self, target: &TargetConfig) -> Result<Box<dyn Session>> {
        let addr = format!("{}:{}", target.address, target.port);
        let session = ApiSession::connect(&addr, &target.username, &target.password).await?;
        Ok(Box::new(session))
    }
}
