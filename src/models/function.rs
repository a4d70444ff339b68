//! Stored function models

use super::{empty_as_none, ColumnSchema};
use serde::Deserialize;

/// Function input parameter
///
/// Scalar parameters carry a `csl_type`; tabular parameters carry their
/// expected columns instead (an empty column list means "any schema").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionParameter {
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub csl_type: Option<String>,
    /// Default value, already rendered as a CSL literal
    #[serde(rename = "CslDefaultValue", default, deserialize_with = "empty_as_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

impl FunctionParameter {
    #[allow(dead_code)]
    pub fn scalar(name: impl Into<String>, csl_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            csl_type: Some(csl_type.into()),
            default_value: None,
            columns: Vec::new(),
        }
    }

    #[allow(dead_code)]
    pub fn tabular(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            csl_type: None,
            default_value: None,
            columns,
        }
    }

    #[allow(dead_code)]
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn is_tabular(&self) -> bool {
        !self.columns.is_empty() || self.csl_type.is_none()
    }
}

/// Stored function definition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub folder: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub doc_string: Option<String>,
    #[serde(rename = "InputParameters", default)]
    pub parameters: Vec<FunctionParameter>,
    #[serde(default)]
    pub body: String,
}

impl FunctionSchema {
    #[allow(dead_code)]
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folder: None,
            doc_string: None,
            parameters: Vec::new(),
            body: body.into(),
        }
    }

    #[allow(dead_code)]
    pub fn with_parameters(mut self, parameters: Vec<FunctionParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    #[allow(dead_code)]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into()).filter(|f: &String| !f.is_empty());
        self
    }

    #[allow(dead_code)]
    pub fn with_doc_string(mut self, doc_string: impl Into<String>) -> Self {
        self.doc_string = Some(doc_string.into()).filter(|d: &String| !d.is_empty());
        self
    }
}
