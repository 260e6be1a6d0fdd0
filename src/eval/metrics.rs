//! Evaluation metrics: the built-in set plus user-defined ones.

use crate::catalog::DEFAULT_METRICS;
use crate::error::{RagEvalError, Result};
use serde::{Deserialize, Serialize};

/// A criterion the judge scores from 0 to 10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// Key used in the judge's JSON output.
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Metric {
    /// A user-defined metric; the id is derived from the name.
    pub fn custom(name: &str, description: &str) -> Result<Self> {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() || description.is_empty() {
            return Err(RagEvalError::InvalidInput(
                "Please provide both metric name and description".to_string(),
            ));
        }
        Ok(Self {
            id: metric_id(name),
            name: name.to_string(),
            description: description.to_string(),
        })
    }
}

/// `"Tone-Check Score"` -> `"tone_check_score"`.
pub fn metric_id(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

/// The built-in metrics, in display order.
pub fn default_metrics() -> Vec<Metric> {
    DEFAULT_METRICS
        .iter()
        .map(|(id, name, description)| Metric {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        })
        .collect()
}

/// Ordered metrics used for one evaluation run: defaults first, then custom.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    metrics: Vec<Metric>,
}

impl Default for MetricSet {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
        }
    }
}

impl MetricSet {
    /// Defaults followed by `custom`.
    pub fn with_custom(custom: &[Metric]) -> Self {
        let mut set = Self::default();
        for metric in custom {
            if set.get(&metric.id).is_none() {
                set.metrics.push(metric.clone());
            }
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Add a custom metric to `custom`, rejecting ids already used by a default
/// or custom metric.
pub fn add_custom_metric(custom: &mut Vec<Metric>, name: &str, description: &str) -> Result<Metric> {
    let metric = Metric::custom(name, description)?;
    if MetricSet::with_custom(custom).get(&metric.id).is_some() {
        return Err(RagEvalError::InvalidInput(format!(
            "Metric with ID '{}' already exists!",
            metric.id
        )));
    }
    custom.push(metric.clone());
    Ok(metric)
}

/// Remove a custom metric by id or name. Built-in metrics cannot be removed.
pub fn remove_custom_metric(custom: &mut Vec<Metric>, id_or_name: &str) -> Result<Metric> {
    let id = metric_id(id_or_name);
    match custom.iter().position(|m| m.id == id) {
        Some(pos) => Ok(custom.remove(pos)),
        None if MetricSet::default().get(&id).is_some() => Err(RagEvalError::InvalidInput(
            format!("'{}' is a built-in metric and cannot be removed", id),
        )),
        None => Err(RagEvalError::InvalidInput(format!(
            "No custom metric '{}'",
            id_or_name
        ))),
    }
}
