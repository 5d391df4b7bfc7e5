use crate::config::{Command, Config, MetricType, TargetConfig};
use crate::pool::ConnectionManager;
use crate::protocol::Sentence;
use crate::session::Session;
use crate::utils::error::{Result, RosPoolError};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// One metric value read from a reply row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub metric_name: String,
    pub metric_type: MetricType,
    pub value: f64,
}

/// Values extracted from one `!re` reply
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    pub labels: Vec<(String, String)>,
    pub variables: Vec<(String, String)>,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub rows: Vec<Row>,
}

/// Outcome of polling one target
#[derive(Debug, Clone, Serialize)]
pub struct TargetPoll {
    pub target: String,
    pub commands: Vec<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A target with its commands resolved from modules and extensions
#[derive(Debug, Clone)]
pub struct PollTarget {
    pub config: TargetConfig,
    pub commands: Vec<Command>,
}

pub struct Poller {
    manager: Arc<ConnectionManager>,
    targets: Vec<PollTarget>,
}

impl Poller {
    pub fn new(manager: Arc<ConnectionManager>, config: &Config) -> Self {
        let targets = config
            .targets
            .iter()
            .map(|target| PollTarget {
                commands: config.target_commands(target),
                config: target.clone(),
            })
            .collect();

        Self { manager, targets }
    }

    pub fn targets(&self) -> &[PollTarget] {
        &self.targets
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Run every command of `target` over one pooled connection.
    ///
    /// The connection is released whether or not the commands succeed.
    pub async fn poll_target(&self, target: &PollTarget) -> Result<Vec<CommandResult>> {
        let span = info_span!("poll", target_name = %target.config.name);
        async move {
            let connection = self.manager.get(&target.config).await?;
            let timeout = target.config.timeout();

            let result = run_commands(connection.session(), &target.commands, timeout).await;
            connection.free(timeout);
            result
        }
        .instrument(span)
        .await
    }

    /// Poll all targets concurrently
    pub async fn poll_all(&self) -> Vec<TargetPoll> {
        let started = Instant::now();
        let polls = self.targets.iter().map(|target| async move {
            let outcome = self.poll_target(target).await;
            match outcome {
                Ok(commands) => {
                    debug!(
                        target_name = %target.config.name,
                        commands = commands.len(),
                        "target polled"
                    );
                    TargetPoll {
                        target: target.config.name.clone(),
                        commands,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(target_name = %target.config.name, error = %e, "failed to poll target");
                    TargetPoll {
                        target: target.config.name.clone(),
                        commands: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            }
        });

        let results = join_all(polls).await;
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        info!(
            targets = results.len(),
            failed,
            elapsed = ?started.elapsed(),
            "poll round finished"
        );
        results
    }
}

async fn run_commands(
    session: &dyn Session,
    commands: &[Command],
    timeout: Duration,
) -> Result<Vec<CommandResult>> {
    let mut results = Vec::with_capacity(commands.len());
    for command in commands {
        let result = tokio::time::timeout(timeout, run_command(session, command))
            .await
            .map_err(|_| {
                RosPoolError::Timeout(format!(
                    "{} not answered within {:?}",
                    command.command, timeout
                ))
            })??;
        results.push(result);
    }
    Ok(results)
}

/// Issue one command and collect its rows until the terminator
pub async fn run_command(session: &dyn Session, command: &Command) -> Result<CommandResult> {
    let mut replies = session.query(&command.request_words()).await?;

    let mut rows = Vec::new();
    while let Some(frame) = replies.recv().await {
        match frame? {
            Some(sentence) => rows.push(extract_row(command, &sentence)),
            None => break,
        }
    }

    Ok(CommandResult {
        command: command.command.clone(),
        rows,
    })
}

pub fn extract_row(command: &Command, sentence: &Sentence) -> Row {
    let text = |param: &str, default: &Option<String>| {
        sentence
            .attribute(param)
            .map(str::to_string)
            .or_else(|| default.clone())
            .unwrap_or_default()
    };

    let labels = command
        .labels
        .iter()
        .map(|l| (l.label_name.clone(), text(&l.param_name, &l.default)))
        .collect();
    let variables = command
        .variables
        .iter()
        .map(|v| (v.label_name.clone(), text(&v.param_name, &v.default)))
        .collect();

    let samples = command
        .metrics
        .iter()
        .filter_map(|m| {
            let value = sentence
                .attribute(&m.param_name)
                .and_then(parse_value)
                .or(m.default)?;
            Some(Sample {
                metric_name: m.metric_name.clone(),
                metric_type: m.metric_type,
                value,
            })
        })
        .collect();

    Row {
        labels,
        variables,
        samples,
    }
}

/// Numeric attribute value; booleans map to 1 and 0
pub fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "true" | "yes" => Some(1.0),
        "false" | "no" => Some(0.0),
        _ => raw.parse().ok(),
    }
}
