//! Target SQL dialects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL dialect variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// Standard SQL
    #[default]
    #[serde(rename = "generic")]
    Generic,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "h2")]
    H2,
    #[serde(rename = "sqlserver")]
    SqlServer,
    #[serde(rename = "oracle")]
    Oracle,
    #[serde(rename = "postgres")]
    Postgres,
}

impl Dialect {
    /// Parse dialect from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "generic" => Some(Self::Generic),
            "mysql" | "mariadb" => Some(Self::MySql),
            "h2" => Some(Self::H2),
            "sqlserver" | "mssql" => Some(Self::SqlServer),
            "oracle" => Some(Self::Oracle),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Whether enumerations may be emitted as separate lookup tables.
    pub fn supports_lookup_tables(self) -> bool {
        self != Self::Generic
    }

    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident),
            Self::SqlServer => format!("[{}]", ident),
            _ => format!("\"{}\"", ident),
        }
    }

    /// Quote only identifiers that would not survive unquoted.
    pub fn ident(self, ident: &str) -> String {
        let plain = ident
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !is_reserved(ident);
        if plain {
            ident.to_string()
        } else {
            self.quote(ident)
        }
    }

    pub fn jdbc_driver(self) -> &'static str {
        match self {
            Self::Generic => "",
            Self::MySql => "com.mysql.cj.jdbc.Driver",
            Self::H2 => "org.h2.Driver",
            Self::SqlServer => "com.microsoft.sqlserver.jdbc.SQLServerDriver",
            Self::Oracle => "oracle.jdbc.OracleDriver",
            Self::Postgres => "org.postgresql.Driver",
        }
    }

    pub fn default_port(self) -> Option<u16> {
        match self {
            Self::Generic | Self::H2 => None,
            Self::MySql => Some(3306),
            Self::SqlServer => Some(1433),
            Self::Oracle => Some(1521),
            Self::Postgres => Some(5432),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::MySql => "mysql",
            Self::H2 => "h2",
            Self::SqlServer => "sqlserver",
            Self::Oracle => "oracle",
            Self::Postgres => "postgres",
        };
        f.write_str(name)
    }
}

fn is_reserved(ident: &str) -> bool {
    const RESERVED: &[&str] = &[
        "all", "and", "as", "by", "check", "column", "constraint", "create", "default", "delete",
        "from", "group", "index", "insert", "key", "level", "not", "null", "on", "or", "order",
        "primary", "references", "select", "table", "type", "update", "user", "value", "values",
        "where",
    ];
    RESERVED.contains(&ident.to_lowercase().as_str())
}
