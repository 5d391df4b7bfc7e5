//! In-memory sessions and connector for pool tests
#![allow(dead_code)]

use async_trait::async_trait;
use rospool::config::TargetConfig;
use rospool::protocol::{Sentence, HEALTHCHECK_COMMAND};
use rospool::session::{AsyncErrors, Connector, ResponseFrame, ResponseStream, Session};
use rospool::{Result, RosPoolError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// How a session answers the health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// A data row then the terminator
    Respond,
    /// Only the terminator
    Terminator,
    /// Stream ends without any frame
    EndOfStream,
    /// Never answers
    Hang,
    /// Device rejects the command with a trap
    Trap,
    /// Transport failure
    Error,
}

pub struct MockState {
    pub id: usize,
    probe_mode: Mutex<ProbeMode>,
    rows: Mutex<Vec<Sentence>>,
    fail_commands: AtomicBool,
    closed: AtomicBool,
    queries: AtomicUsize,
    probes: AtomicUsize,
    hung: Mutex<Vec<UnboundedSender<ResponseFrame>>>,
    error_tx: Mutex<Option<UnboundedSender<RosPoolError>>>,
}

impl MockState {
    pub fn set_probe_mode(&self, mode: ProbeMode) {
        *self.probe_mode.lock().unwrap() = mode;
    }

    pub fn set_rows(&self, rows: Vec<Sentence>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Push an error onto the session's asynchronous error stream
    pub fn raise_async_error(&self, err: RosPoolError) -> bool {
        match self.error_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(err).is_ok(),
            None => false,
        }
    }
}

pub struct MockSession {
    state: Arc<MockState>,
    async_errors: Option<AsyncErrors>,
}

#[async_trait]
impl Session for MockSession {
    async fn query(&self, words: &[String]) -> Result<ResponseStream> {
        let state = &self.state;
        state.queries.fetch_add(1, Ordering::SeqCst);
        if state.is_closed() {
            return Err(RosPoolError::ConnectionClosed);
        }

        let (tx, rx) = unbounded_channel();
        let command = words.first().map(String::as_str).unwrap_or_default();

        if command == HEALTHCHECK_COMMAND {
            state.probes.fetch_add(1, Ordering::SeqCst);
            let mode = *state.probe_mode.lock().unwrap();
            match mode {
                ProbeMode::Respond => {
                    let _ = tx.send(Ok(Some(Sentence::from_words(["!re", "=name=MikroTik"]))));
                    let _ = tx.send(Ok(None));
                }
                ProbeMode::Terminator => {
                    let _ = tx.send(Ok(None));
                }
                ProbeMode::EndOfStream => drop(tx),
                ProbeMode::Hang => state.hung.lock().unwrap().push(tx),
                ProbeMode::Trap => {
                    let _ = tx.send(Err(RosPoolError::Trap("not enough permissions (9)".to_string())));
                    let _ = tx.send(Ok(None));
                }
                ProbeMode::Error => {
                    let _ = tx.send(Err(RosPoolError::ConnectionClosed));
                }
            }
            return Ok(rx);
        }

        if state.fail_commands.load(Ordering::SeqCst) {
            let _ = tx.send(Err(RosPoolError::Trap("no such command".to_string())));
            let _ = tx.send(Ok(None));
            return Ok(rx);
        }

        for row in state.rows.lock().unwrap().iter() {
            let _ = tx.send(Ok(Some(row.clone())));
        }
        let _ = tx.send(Ok(None));
        Ok(rx)
    }

    fn take_async_errors(&mut self) -> Option<AsyncErrors> {
        self.async_errors.take()
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.error_tx.lock().unwrap().take();
        self.state.hung.lock().unwrap().clear();
    }
}

#[derive(Default)]
pub struct MockConnector {
    sessions: Mutex<Vec<Arc<MockState>>>,
    dials: AtomicUsize,
    fail: AtomicBool,
    hang: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Dials never complete while set
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// State of the n-th successfully dialed session
    pub fn session(&self, n: usize) -> Arc<MockState> {
        Arc::clone(&self.sessions.lock().unwrap()[n])
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn dial(&self, target: &TargetConfig) -> Result<Box<dyn Session>> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RosPoolError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{} refused connection", target.address),
            )));
        }

        let (error_tx, error_rx) = unbounded_channel();
        let mut sessions = self.sessions.lock().unwrap();
        let state = Arc::new(MockState {
            id: sessions.len(),
            probe_mode: Mutex::new(ProbeMode::Respond),
            rows: Mutex::new(Vec::new()),
            fail_commands: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            hung: Mutex::new(Vec::new()),
            error_tx: Mutex::new(Some(error_tx)),
        });
        sessions.push(Arc::clone(&state));

        Ok(Box::new(MockSession {
            state,
            async_errors: Some(error_rx),
        }))
    }
}

pub fn target(name: &str) -> TargetConfig {
    TargetConfig::new(name, "192.0.2.10")
}
