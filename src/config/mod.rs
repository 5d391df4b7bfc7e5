pub mod command;
pub mod extension;

pub use command::{Command, Label, Metric, MetricType, Named};
pub use extension::{
    apply_extensions, CommandExtension, Extension, ExtensionAction, LabelExtension,
    MetricExtension, ModuleExtension,
};

use crate::protocol::API_PORT;
use crate::utils::error::{Result, RosPoolError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug_span, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Seconds between cleanup passes of every target pool
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Idle timeout for targets that do not set their own
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

/// A named group of commands that targets opt into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<Command>,
}

/// One device and how to reach it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Dial and health check timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overrides `pool.idle_timeout_secs`
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub module_extensions: Vec<ModuleExtension>,
}

// Default values
fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_api_port() -> u16 {
    API_PORT
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PoolSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl TargetConfig {
    /// Minimal target with default timeouts and no modules
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: default_api_port(),
            username: "admin".to_string(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
            idle_timeout_secs: None,
            modules: Vec::new(),
            module_extensions: Vec::new(),
        }
    }

    /// Bound for dialing and for each health probe
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn idle_timeout(&self, pool: &PoolSettings) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(pool.idle_timeout_secs))
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RosPoolError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| RosPoolError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(RosPoolError::Config(format!(
                "Invalid log format: {}. Must be 'pretty' or 'json'",
                self.logging.format
            )));
        }

        if self.pool.cleanup_interval_secs == 0 {
            return Err(RosPoolError::Config(
                "pool.cleanup_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.poller.interval_secs == 0 {
            return Err(RosPoolError::Config(
                "poller.interval_secs must be greater than 0".to_string(),
            ));
        }

        let mut module_names = HashSet::new();
        for module in &self.modules {
            if !module_names.insert(module.name.as_str()) {
                return Err(RosPoolError::Config(format!(
                    "Duplicate module name: {}",
                    module.name
                )));
            }
        }

        let mut target_names = HashSet::new();
        for target in &self.targets {
            if !target_names.insert(target.name.as_str()) {
                return Err(RosPoolError::Config(format!(
                    "Duplicate target name: {}",
                    target.name
                )));
            }

            if target.timeout_secs == 0 {
                return Err(RosPoolError::Config(format!(
                    "Target {}: timeout_secs must be greater than 0",
                    target.name
                )));
            }

            if let Some(missing) = target
                .modules
                .iter()
                .find(|m| !module_names.contains(m.as_str()))
            {
                return Err(RosPoolError::Config(format!(
                    "Target {} references unknown module: {}",
                    target.name, missing
                )));
            }
        }

        Ok(())
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Commands of the target's modules, in module order, with the target's
    /// module extensions applied.
    pub fn target_commands(&self, target: &TargetConfig) -> Vec<Command> {
        let span = debug_span!("target_commands", target_name = %target.name);
        let _guard = span.enter();

        let mut commands = Vec::new();
        for module_name in &target.modules {
            let Some(module) = self.module(module_name) else {
                warn!(module = %module_name, "module not found");
                continue;
            };

            let mut module_commands = module.commands.clone();
            for module_ext in target
                .module_extensions
                .iter()
                .filter(|ext| &ext.name == module_name)
            {
                for command_ext in &module_ext.commands {
                    let mut matched = false;
                    for command in module_commands
                        .iter_mut()
                        .filter(|c| c.command == command_ext.command)
                    {
                        command_ext.extend_command(&target.name, command);
                        matched = true;
                    }
                    if !matched {
                        warn!(
                            module = %module_name,
                            command = %command_ext.command,
                            "command not found, skipping extension"
                        );
                    }
                }
            }
            commands.extend(module_commands);
        }

        for module_ext in &target.module_extensions {
            if !target.modules.contains(&module_ext.name) {
                warn!(module = %module_ext.name, "extension for module not used by target");
            }
        }

        commands
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        std::fs::write(path.as_ref(), EXAMPLE_CONFIG).map_err(|e| {
            RosPoolError::Config(format!("Failed to write example config: {}", e))
        })?;

        Ok(())
    }
}

const EXAMPLE_CONFIG: &str = r#"[pool]
cleanup_interval_secs = 60
idle_timeout_secs = 300

[poller]
interval_secs = 30

[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "pretty"  # Options: "pretty", "json"

[[modules]]
name = "system"

  [[modules.commands]]
  command = "/system/resource/print"

    [[modules.commands.metrics]]
    metric_name = "cpu_load"
    param_name = "cpu-load"

    [[modules.commands.metrics]]
    metric_name = "free_memory_bytes"
    param_name = "free-memory"

    [[modules.commands.labels]]
    label_name = "version"
    param_name = "version"

[[modules]]
name = "interfaces"

  [[modules.commands]]
  command = "/interface/print"

    [[modules.commands.metrics]]
    metric_name = "interface_rx_bytes"
    param_name = "rx-byte"
    metric_type = "counter"

    [[modules.commands.metrics]]
    metric_name = "interface_running"
    param_name = "running"

    [[modules.commands.labels]]
    label_name = "interface"
    param_name = "name"

[[targets]]
name = "core-rtr"
address = "192.168.88.1"
port = 8728
username = "monitor"
password = "secret"
timeout_secs = 10
modules = ["system", "interfaces"]

  # Per-target changes to module commands
  [[targets.module_extensions]]
  name = "system"

    [[targets.module_extensions.commands]]
    command = "/system/resource/print"

      [[targets.module_extensions.commands.metrics]]
      action = "add"  # Options: "add", "overwrite", "remove"
      metric_name = "uptime_seconds"
      param_name = "uptime"

      [[targets.module_extensions.commands.labels]]
      action = "remove"
      label_name = "version"
      param_name = "version"
"#;
