use serde::{Deserialize, Serialize};

/// Entries that extension directives locate by name
pub trait Named {
    fn name(&self) -> &str;
}

/// A metric read from one reply attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_name: String,
    pub param_name: String,
    #[serde(default)]
    pub metric_type: MetricType,
    #[serde(default)]
    pub help: Option<String>,
    /// Value used when the attribute is missing or not numeric
    #[serde(default)]
    pub default: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
}

/// A label (or variable) read from one reply attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub label_name: String,
    pub param_name: String,
    #[serde(default)]
    pub default: Option<String>,
}

/// One API command and what to extract from its reply rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub variables: Vec<Label>,
}

impl Named for Metric {
    fn name(&self) -> &str {
        &self.metric_name
    }
}

impl Named for Label {
    fn name(&self) -> &str {
        &self.label_name
    }
}

impl Metric {
    pub fn gauge(metric_name: impl Into<String>, param_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            param_name: param_name.into(),
            metric_type: MetricType::Gauge,
            help: None,
            default: None,
        }
    }
}

impl Label {
    pub fn new(label_name: impl Into<String>, param_name: impl Into<String>) -> Self {
        Self {
            label_name: label_name.into(),
            param_name: param_name.into(),
            default: None,
        }
    }
}

impl Command {
    /// Request words: the command plus a `.proplist` restricting the reply to the
    /// attributes this command reads.
    pub fn request_words(&self) -> Vec<String> {
        let mut params: Vec<&str> = Vec::new();
        let names = self
            .metrics
            .iter()
            .map(|m| m.param_name.as_str())
            .chain(self.labels.iter().map(|l| l.param_name.as_str()))
            .chain(self.variables.iter().map(|v| v.param_name.as_str()));
        for name in names {
            if !params.contains(&name) {
                params.push(name);
            }
        }

        let mut words = vec![self.command.clone()];
        if !params.is_empty() {
            words.push(format!("=.proplist={}", params.join(",")));
        }
        words
    }
}
