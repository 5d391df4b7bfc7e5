use super::command::{Command, Label, Metric, Named};
use serde::{Deserialize, Serialize};
use tracing::{debug_span, trace, warn};

/// What an extension directive does with its entry.
///
/// Unknown action strings fail deserialization, so a bad action aborts config loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionAction {
    Add,
    Overwrite,
    Remove,
}

/// One directive: the action plus the entry it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension<T> {
    pub action: ExtensionAction,
    #[serde(flatten)]
    pub entry: T,
}

pub type MetricExtension = Extension<Metric>;
pub type LabelExtension = Extension<Label>;

/// Directives for one command, matched by command string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandExtension {
    pub command: String,
    #[serde(default)]
    pub metrics: Vec<MetricExtension>,
    #[serde(default)]
    pub labels: Vec<LabelExtension>,
    #[serde(default)]
    pub variables: Vec<LabelExtension>,
}

/// Directives for the commands of one module, matched by module name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleExtension {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<CommandExtension>,
}

impl CommandExtension {
    /// Apply all directives to `command` in order
    pub fn extend_command(&self, target: &str, command: &mut Command) {
        let span = debug_span!("extend_command", target_name = %target, command = %command.command);
        let _guard = span.enter();

        apply_extensions("label", &self.labels, &mut command.labels);
        apply_extensions("variable", &self.variables, &mut command.variables);
        apply_extensions("metric", &self.metrics, &mut command.metrics);
    }
}

/// `add` appends; `overwrite` and `remove` act on the entry with the same name.
/// A directive whose entry does not exist is logged and skipped.
pub fn apply_extensions<T>(kind: &str, extensions: &[Extension<T>], originals: &mut Vec<T>)
where
    T: Named + Clone,
{
    for extension in extensions {
        let name = extension.entry.name();

        match extension.action {
            ExtensionAction::Add => {
                trace!(kind, name, "add entry");
                originals.push(extension.entry.clone());
            }
            ExtensionAction::Overwrite => match find_by_name(originals, name) {
                Some(index) => {
                    trace!(kind, name, "overwrite entry");
                    originals[index] = extension.entry.clone();
                }
                None => warn!(kind, name, "entry not found, skipping overwrite"),
            },
            ExtensionAction::Remove => match find_by_name(originals, name) {
                Some(index) => {
                    trace!(kind, name, "remove entry");
                    originals.remove(index);
                }
                None => warn!(kind, name, "entry not found, skipping remove"),
            },
        }
    }
}

fn find_by_name<T: Named>(entries: &[T], name: &str) -> Option<usize> {
    entries.iter().position(|e| e.name() == name)
}
