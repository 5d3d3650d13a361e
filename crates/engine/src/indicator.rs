//! Indicator (KPI) submission payload.
//!
//! A validated formula is packaged with its name and ownership ids into the
//! entity the backend stores. The entity carries both the calculation tree
//! (`expression`) and the formula text (`expressionString`) so the formula
//! can be reopened in the editor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formula::tree::CalculationNode;
use crate::formula::validate::{FormulaValidator, ValidationError};

pub const INDICATOR_TYPE: &str = "kpi";

/// What the user filled in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorDraft {
    pub name: String,
    pub formula: String,
    /// Lower values are better; the goal meter is drawn reversed.
    pub flip: bool,
}

/// Ownership ids supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorScope {
    pub client_id: String,
    pub department_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorAttributes {
    pub name: String,
    pub expression: CalculationNode,
    pub client_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub department_id: String,
    pub group_id: String,
    pub expression_string: String,
    pub flip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub department_id: String,
    pub group_id: String,
    pub client_id: String,
    pub attributes: IndicatorAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    NameRequired,
    Formula(ValidationError),
}

impl fmt::Display for DraftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameRequired => write!(f, "Indicator name is required"),
            Self::Formula(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DraftError {}

impl From<ValidationError> for DraftError {
    fn from(e: ValidationError) -> Self {
        DraftError::Formula(e)
    }
}

impl IndicatorDraft {
    pub fn new(name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formula: formula.into(),
            flip: false,
        }
    }

    /// Validate the draft and build the entity. The name is checked first.
    pub fn to_entity(
        &self,
        validator: &FormulaValidator,
        scope: &IndicatorScope,
    ) -> Result<IndicatorEntity, DraftError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DraftError::NameRequired);
        }
        let expression = validator.compile(&self.formula)?;

        // Groups are departments in this backend.
        let group_id = scope.department_id.clone();
        Ok(IndicatorEntity {
            kind: INDICATOR_TYPE.to_string(),
            department_id: scope.department_id.clone(),
            group_id: group_id.clone(),
            client_id: scope.client_id.clone(),
            attributes: IndicatorAttributes {
                name: name.to_string(),
                expression,
                client_id: scope.client_id.clone(),
                kind: INDICATOR_TYPE.to_string(),
                department_id: scope.department_id.clone(),
                group_id,
                expression_string: self.formula.clone(),
                flip: self.flip,
            },
        })
    }
}
