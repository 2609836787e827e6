//! Column type mapping per dialect.

use super::Dialect;
use crate::graph::{DataType, EnumDomain, PropertyKind};

/// Render a property kind as a column type. Inline enumerations become
/// `ENUM(...)` on MySQL, a named type on Postgres, and a bounded string
/// elsewhere (checked by [`enum_check`]).
pub fn column_type(kind: &PropertyKind, dialect: Dialect) -> String {
    match kind {
        PropertyKind::Primitive(data_type) => map_type(*data_type, dialect).to_string(),
        PropertyKind::Enumeration(domain) => match dialect {
            Dialect::MySql => format!("ENUM({})", quoted_literals(domain)),
            Dialect::Postgres => dialect.ident(&domain.name),
            Dialect::Oracle => format!("VARCHAR2({})", longest_literal(domain)),
            Dialect::SqlServer => format!("NVARCHAR({})", longest_literal(domain)),
            Dialect::Generic | Dialect::H2 => format!("VARCHAR({})", longest_literal(domain)),
        },
    }
}

/// `CHECK` clause restricting an inline enumeration column, for dialects
/// without a native enumeration type.
pub fn enum_check(column: &str, kind: &PropertyKind, dialect: Dialect) -> Option<String> {
    match (kind, dialect) {
        (_, Dialect::MySql | Dialect::Postgres) => None,
        (PropertyKind::Enumeration(domain), _) => {
            Some(format!("CHECK ({} IN ({}))", column, quoted_literals(domain)))
        }
        (PropertyKind::Primitive(_), _) => None,
    }
}

pub fn map_type(data_type: DataType, dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::MySql => map_mysql_type(data_type),
        Dialect::Postgres => map_postgres_type(data_type),
        Dialect::SqlServer => map_sqlserver_type(data_type),
        Dialect::Oracle => map_oracle_type(data_type),
        Dialect::H2 | Dialect::Generic => map_generic_type(data_type),
    }
}

fn map_postgres_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer => "INTEGER",
        DataType::BigInt => "BIGINT",
        DataType::Float => "REAL",
        DataType::Double => "DOUBLE PRECISION",
        DataType::Decimal => "NUMERIC(18,2)",
        DataType::String => "VARCHAR(255)",
        DataType::Text => "TEXT",
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::Time => "TIME",
        DataType::DateTime => "TIMESTAMP",
        DataType::Binary => "BYTEA",
    }
}

fn map_mysql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer => "INT",
        DataType::BigInt => "BIGINT",
        DataType::Float => "FLOAT",
        DataType::Double => "DOUBLE",
        DataType::Decimal => "DECIMAL(18,2)",
        DataType::String => "VARCHAR(255)",
        DataType::Text => "TEXT",
        // TINYINT(1) under the hood
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::Time => "TIME",
        DataType::DateTime => "DATETIME",
        DataType::Binary => "BLOB",
    }
}

fn map_sqlserver_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer => "INT",
        DataType::BigInt => "BIGINT",
        DataType::Float => "REAL",
        DataType::Double => "FLOAT",
        DataType::Decimal => "DECIMAL(18,2)",
        DataType::String => "NVARCHAR(255)",
        DataType::Text => "NVARCHAR(MAX)",
        DataType::Boolean => "BIT",
        DataType::Date => "DATE",
        DataType::Time => "TIME",
        DataType::DateTime => "DATETIME2",
        DataType::Binary => "VARBINARY(MAX)",
    }
}

fn map_oracle_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer => "NUMBER(10)",
        DataType::BigInt => "NUMBER(19)",
        DataType::Float => "BINARY_FLOAT",
        DataType::Double => "BINARY_DOUBLE",
        DataType::Decimal => "NUMBER(18,2)",
        DataType::String => "VARCHAR2(255)",
        DataType::Text => "CLOB",
        DataType::Boolean => "NUMBER(1)",
        DataType::Date => "DATE",
        // No TIME type
        DataType::Time | DataType::DateTime => "TIMESTAMP",
        DataType::Binary => "BLOB",
    }
}

fn map_generic_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer => "INTEGER",
        DataType::BigInt => "BIGINT",
        DataType::Float => "REAL",
        DataType::Double => "DOUBLE PRECISION",
        DataType::Decimal => "DECIMAL(18,2)",
        DataType::String => "VARCHAR(255)",
        DataType::Text => "CLOB",
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::Time => "TIME",
        DataType::DateTime => "TIMESTAMP",
        DataType::Binary => "BLOB",
    }
}

/// Default value as a SQL literal for the column type.
pub fn default_literal(value: &str, kind: &PropertyKind, dialect: Dialect) -> String {
    match kind {
        PropertyKind::Primitive(DataType::Boolean) => boolean_literal(value == "true", dialect),
        PropertyKind::Primitive(
            DataType::Integer
            | DataType::BigInt
            | DataType::Float
            | DataType::Double
            | DataType::Decimal,
        ) if value.parse::<f64>().is_ok() => value.to_string(),
        _ => string_literal(value),
    }
}

pub fn boolean_literal(value: bool, dialect: Dialect) -> String {
    match (dialect, value) {
        (Dialect::SqlServer | Dialect::Oracle, true) => "1".to_string(),
        (Dialect::SqlServer | Dialect::Oracle, false) => "0".to_string(),
        (_, true) => "TRUE".to_string(),
        (_, false) => "FALSE".to_string(),
    }
}

pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quoted_literals(domain: &EnumDomain) -> String {
    domain
        .literals
        .iter()
        .map(|l| string_literal(l))
        .collect::<Vec<_>>()
        .join(", ")
}

fn longest_literal(domain: &EnumDomain) -> usize {
    domain.literals.iter().map(|l| l.chars().count()).max().unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> PropertyKind {
        PropertyKind::Enumeration(EnumDomain {
            name: "Color".into(),
            literals: vec!["Red".into(), "Light Blue".into()],
        })
    }

    #[test]
    fn test_postgres_types() {
        assert_eq!(map_type(DataType::Double, Dialect::Postgres), "DOUBLE PRECISION");
        assert_eq!(map_type(DataType::Binary, Dialect::Postgres), "BYTEA");
        assert_eq!(column_type(&color(), Dialect::Postgres), "Color");
    }

    #[test]
    fn test_mysql_types() {
        assert_eq!(map_type(DataType::DateTime, Dialect::MySql), "DATETIME");
        assert_eq!(column_type(&color(), Dialect::MySql), "ENUM('Red', 'Light Blue')");
        assert!(enum_check("color", &color(), Dialect::MySql).is_none());
    }

    #[test]
    fn test_check_constraint_elsewhere() {
        assert_eq!(column_type(&color(), Dialect::Oracle), "VARCHAR2(10)");
        assert_eq!(
            enum_check("color", &color(), Dialect::H2).unwrap(),
            "CHECK (color IN ('Red', 'Light Blue'))"
        );
    }

    #[test]
    fn test_default_literals() {
        let boolean = PropertyKind::Primitive(DataType::Boolean);
        assert_eq!(default_literal("false", &boolean, Dialect::Postgres), "FALSE");
        assert_eq!(default_literal("false", &boolean, Dialect::SqlServer), "0");
        let text = PropertyKind::Primitive(DataType::String);
        assert_eq!(default_literal("O'Brien", &text, Dialect::Generic), "'O''Brien'");
    }
}
