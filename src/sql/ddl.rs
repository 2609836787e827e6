//! DDL rendering of a finished transformation.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::types::{column_type, default_literal, enum_check, string_literal};
use super::Dialect;
use crate::graph::{Graph, Node, NodeId, NodeProperty, PropertyKind};
use crate::measure::align;
use crate::transform::Transformation;

/// Render `CREATE TABLE` statements, lookup rows and foreign keys.
pub fn render_ddl(transformation: &Transformation) -> String {
    let graph = &transformation.graph;
    let dialect = transformation.options.target_dialect;
    let mut output = String::new();

    output.push_str(&format!(
        "-- {} ({}, {})\n",
        transformation.options.database_name,
        transformation.options.mapping_strategy.as_str(),
        dialect
    ));

    if dialect == Dialect::Postgres {
        let mut declared = HashSet::new();
        for node in graph.nodes() {
            for property in &node.properties {
                if let PropertyKind::Enumeration(domain) = &property.kind {
                    if declared.insert(domain.name.clone()) {
                        output.push_str(&format!(
                            "\nCREATE TYPE {} AS ENUM ({});\n",
                            dialect.ident(&domain.name),
                            domain
                                .literals
                                .iter()
                                .map(|l| string_literal(l))
                                .collect::<Vec<_>>()
                                .join(", ")
                        ));
                    }
                }
            }
        }
    }

    let order = table_order(graph);
    for id in &order {
        if let Some(node) = graph.node(*id) {
            output.push('\n');
            render_table(&mut output, node, dialect);
        }
    }

    for id in &order {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        if !node.is_lookup() {
            continue;
        }
        let (Some(key), Some(value)) = (node.primary_key(), node.properties.iter().find(|p| !p.primary_key))
        else {
            continue;
        };
        output.push('\n');
        for (i, literal) in node.lookup_values.iter().enumerate() {
            output.push_str(&format!(
                "INSERT INTO {} ({}, {}) VALUES ({}, {});\n",
                dialect.ident(&node.name),
                dialect.ident(&key.name),
                dialect.ident(&value.name),
                i + 1,
                string_literal(literal)
            ));
        }
    }

    let mut constraints = Vec::new();
    for id in &order {
        let Some(node) = graph.node(*id) else {
            continue;
        };
        for property in node.foreign_keys() {
            let Some(fk) = property.foreign_key else {
                continue;
            };
            let Some(target) = graph.node(fk.node) else {
                log::error!("foreign key {} of {} points at a missing node", property.name, node.name);
                continue;
            };
            let Some(target_key) = target.primary_key() else {
                continue;
            };
            constraints.push(format!(
                "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {} ({});\n",
                dialect.ident(&node.name),
                dialect.ident(&property.name),
                dialect.ident(&target.name),
                dialect.ident(&target_key.name)
            ));
        }
    }
    if !constraints.is_empty() {
        output.push('\n');
        for constraint in constraints {
            output.push_str(&constraint);
        }
    }

    output
}

fn render_table(output: &mut String, node: &Node, dialect: Dialect) {
    output.push_str(&format!("CREATE TABLE {} (\n", dialect.ident(&node.name)));

    let rows: Vec<Vec<String>> = node
        .properties
        .iter()
        .map(|p| column_row(p, dialect))
        .collect();
    let lines = align(&rows);
    for (i, line) in lines.iter().enumerate() {
        output.push_str("    ");
        output.push_str(line);
        if i + 1 < lines.len() {
            output.push(',');
        }
        output.push('\n');
    }

    output.push_str(");\n");
}

fn column_row(property: &NodeProperty, dialect: Dialect) -> Vec<String> {
    let name = dialect.ident(&property.name);
    let mut modifiers = Vec::new();
    if !property.nullable {
        modifiers.push("NOT NULL".to_string());
    }
    if let Some(value) = &property.default_value {
        modifiers.push(format!("DEFAULT {}", default_literal(value, &property.kind, dialect)));
    }
    if property.primary_key {
        modifiers.push("PRIMARY KEY".to_string());
    }
    if let Some(check) = enum_check(&name, &property.kind, dialect) {
        modifiers.push(check);
    }
    vec![name.clone(), column_type(&property.kind, dialect), modifiers.join(" ")]
}

/// Tables ordered by foreign-key depth: referenced tables first. Tables on a
/// reference cycle go last.
fn table_order(graph: &Graph) -> Vec<NodeId> {
    let ids: BTreeSet<NodeId> = graph.node_ids().into_iter().collect();

    let mut parents: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
    for node in graph.nodes() {
        let deps = parents.entry(node.id).or_default();
        for property in node.foreign_keys() {
            if let Some(fk) = property.foreign_key {
                if fk.node != node.id && ids.contains(&fk.node) {
                    deps.insert(fk.node);
                }
            }
        }
    }

    let mut levels: BTreeMap<NodeId, usize> = BTreeMap::new();
    for (node, deps) in &parents {
        if deps.is_empty() {
            levels.insert(*node, 0);
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for (node, deps) in &parents {
            if levels.contains_key(node) {
                continue;
            }
            let parent_levels: Vec<usize> = deps.iter().filter_map(|p| levels.get(p).copied()).collect();
            if parent_levels.len() == deps.len() {
                let level = parent_levels.iter().max().copied().unwrap_or(0) + 1;
                levels.insert(*node, level);
                changed = true;
            }
        }
    }

    let max_level = levels.values().copied().max().unwrap_or(0);
    for node in &ids {
        levels.entry(*node).or_insert(max_level + 1);
    }

    let mut order: Vec<NodeId> = ids.into_iter().collect();
    order.sort_by_key(|id| (levels.get(id).copied().unwrap_or(0), *id));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{MappingStrategy, Options};
    use crate::transform::transform_source;

    fn ddl(input: &str, options: Options) -> String {
        render_ddl(&transform_source(input, &options).unwrap())
    }

    #[test]
    fn test_render_simple_table() {
        let result = ddl(
            "kind Person { name string 1, birth date }",
            Options {
                target_dialect: Dialect::Postgres,
                ..Options::default()
            },
        );
        assert!(result.contains("CREATE TABLE Person ("));
        assert!(result.contains("    person_id INTEGER      NOT NULL PRIMARY KEY,\n"));
        assert!(result.contains("    name      VARCHAR(255) NOT NULL,\n"));
        assert!(result.contains("    birth     DATE\n);"));
    }

    #[test]
    fn test_render_foreign_keys_after_tables() {
        let result = ddl(
            "kind Mother\nkind Child\nrel { Mother 1 -- * Child }",
            Options {
                mapping_strategy: MappingStrategy::ClassPerTable,
                ..Options::default()
            },
        );
        let alter = result
            .find("ALTER TABLE Child ADD FOREIGN KEY (mother_id) REFERENCES Mother (mother_id);")
            .unwrap();
        assert!(result.find("CREATE TABLE Child").unwrap() < alter);
        assert!(result.find("CREATE TABLE Mother").unwrap() < result.find("CREATE TABLE Child").unwrap());
    }

    #[test]
    fn test_render_postgres_enum_type() {
        let result = ddl(
            "enum Color { Red, Green }\nkind Car { color Color 1 }",
            Options {
                target_dialect: Dialect::Postgres,
                ..Options::default()
            },
        );
        assert!(result.contains("CREATE TYPE Color AS ENUM ('Red', 'Green');"));
        assert!(result.contains("color  Color   NOT NULL"));
    }

    #[test]
    fn test_render_postgres_type_per_discriminator() {
        let result = ddl(
            r#"
            kind A
            subkind A1 : A
            subkind A2 : A
            genset Status : A disjoint complete { A1, A2 }
            kind B
            subkind B1 : B
            subkind B2 : B
            genset Status : B disjoint complete { B1, B2 }
            "#,
            Options {
                target_dialect: Dialect::Postgres,
                mapping_strategy: MappingStrategy::KindPerTable,
                ..Options::default()
            },
        );
        assert!(result.contains("CREATE TYPE a_status AS ENUM ('A1', 'A2');"));
        assert!(result.contains("CREATE TYPE b_status AS ENUM ('B1', 'B2');"));
        assert_eq!(result.matches("CREATE TYPE").count(), 2);
    }

    #[test]
    fn test_render_check_constraint() {
        let result = ddl("enum Color { Red, Green }\nkind Car { color Color }", Options::default());
        assert!(result.contains("CHECK (color IN ('Red', 'Green'))"));
    }

    #[test]
    fn test_render_lookup_rows() {
        let result = ddl(
            "enum Color { Red, Green }\nkind Car { color Color 1 }",
            Options {
                target_dialect: Dialect::MySql,
                enum_as_lookup_table: true,
                ..Options::default()
            },
        );
        assert!(result.contains("INSERT INTO Color (color_id, `value`) VALUES (1, 'Red');"));
        assert!(result.contains("INSERT INTO Color (color_id, `value`) VALUES (2, 'Green');"));
        assert!(result.contains("ALTER TABLE Car ADD FOREIGN KEY (color_id) REFERENCES Color (color_id);"));
    }

    #[test]
    fn test_boolean_discriminator_default() {
        let result = ddl(
            "kind Person\nrole Student : Person",
            Options {
                target_dialect: Dialect::SqlServer,
                ..Options::default()
            },
        );
        assert!(result.contains("is_student BIT NOT NULL DEFAULT 0"));
    }
}
