//! Transformation options and their validation.

use serde::{Deserialize, Serialize};

use crate::graph::UninformedPolicy;
use crate::sql::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingStrategy {
    /// One table per class, generalizations become foreign keys
    ClassPerTable,
    /// Specifics are lifted into the ultimate sortal at the root
    #[default]
    KindPerTable,
    /// Generals are flattened into their leaf classes
    ConcreteClassPerTable,
}

impl MappingStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "class-per-table" | "one-table-per-class" => Some(Self::ClassPerTable),
            "kind-per-table" | "one-table-per-kind" | "lifting" => Some(Self::KindPerTable),
            "concrete-class-per-table" | "one-table-per-concrete-class" | "flattening" => {
                Some(Self::ConcreteClassPerTable)
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassPerTable => "class-per-table",
            Self::KindPerTable => "kind-per-table",
            Self::ConcreteClassPerTable => "concrete-class-per-table",
        }
    }
}

/// Connection metadata handed through to the emitters untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub mapping_strategy: MappingStrategy,
    pub target_dialect: Dialect,
    pub standardize_names: bool,
    pub enum_as_lookup_table: bool,
    pub uninformed_cardinality: UninformedPolicy,
    pub database_name: String,
    pub connection: Connection,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mapping_strategy: MappingStrategy::default(),
            target_dialect: Dialect::default(),
            standardize_names: false,
            enum_as_lookup_table: false,
            uninformed_cardinality: UninformedPolicy::default(),
            database_name: "ontology".to_string(),
            connection: Connection::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown mapping strategy: {0}")]
    UnknownStrategy(String),
    #[error("Unknown target dialect: {0}")]
    UnknownDialect(String),
    #[error("Unknown uninformed-cardinality policy: {0}")]
    UnknownPolicy(String),
    #[error("Enumerations as lookup tables are not supported by the {0} dialect")]
    LookupTablesUnsupported(Dialect),
    #[error("Invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Options {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject option combinations before anything is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enum_as_lookup_table && !self.target_dialect.supports_lookup_tables() {
            return Err(ConfigError::LookupTablesUnsupported(self.target_dialect));
        }
        Ok(())
    }
}
