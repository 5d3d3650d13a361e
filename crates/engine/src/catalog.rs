//! Metric catalog.
//!
//! The host supplies the metrics a user may pick as `{id, displayLabel}`
//! pairs. The formula core only ever reads the id; labels are for display.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::formula::tree::CalculationNode;

/// Id of the "nothing selected" entry in a metric picker.
pub const PLACEHOLDER_METRIC_ID: &str = "-1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub display_label: String,
}

impl Metric {
    pub fn new(id: impl Into<String>, display_label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_label: display_label.into(),
        }
    }

    /// False for the picker placeholder.
    pub fn is_selectable(&self) -> bool {
        self.id != PLACEHOLDER_METRIC_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    Io(String),
    Parse(String),
    /// Metric ids referenced by a formula but absent from the catalog.
    UnknownMetrics(Vec<String>),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "failed to read catalog: {msg}"),
            Self::Parse(msg) => write!(f, "invalid catalog: {msg}"),
            Self::UnknownMetrics(ids) => write!(f, "unknown metric(s): {}", ids.join(", ")),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Source of metrics offered to the formula editor.
pub trait MetricCatalog {
    fn metrics(&self) -> &[Metric];

    fn get(&self, id: &str) -> Option<&Metric> {
        self.metrics().iter().find(|m| m.id == id)
    }

    /// Metrics a user can actually pick (placeholder excluded).
    fn selectable(&self) -> Vec<&Metric> {
        self.metrics().iter().filter(|m| m.is_selectable()).collect()
    }

    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some_and(Metric::is_selectable)
    }

    /// Every metric id in `tree` must be a selectable catalog entry.
    fn check_tree(&self, tree: &CalculationNode) -> Result<(), CatalogError> {
        let mut unknown: Vec<String> = Vec::new();
        for id in tree.metric_ids() {
            if !self.contains(id) && !unknown.iter().any(|u| u == id) {
                unknown.push(id.to_string());
            }
        }
        if unknown.is_empty() {
            Ok(())
        } else {
            log::debug!("formula references unknown metrics: {:?}", unknown);
            Err(CatalogError::UnknownMetrics(unknown))
        }
    }
}

/// Catalog held in memory, usually loaded from a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog {
    metrics: Vec<Metric>,
}

impl StaticCatalog {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }
}

impl MetricCatalog for StaticCatalog {
    fn metrics(&self) -> &[Metric] {
        &self.metrics
    }
}
