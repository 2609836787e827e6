//! Ontop-style OBDA mapping and connection properties.
//!
//! Every class tracer yields one mapping block per node it lives in, plus one
//! block per on-demand join. Individuals are identified by the surrogate key
//! of their identity root, so a class spread over several tables still gets a
//! single IRI per individual.

use std::collections::HashSet;

use crate::graph::{AssociationKind, Graph, Node, NodeId, NodeProperty, PropertyId};
use crate::sql::{boolean_literal, string_literal, Dialect};
use crate::tracker::{FilterValue, JoinKind, JoinedNode, TracedNode, Tracer};
use crate::transform::Transformation;

const PREFIXES: &[(&str, &str)] = &[
    ("owl:", "http://www.w3.org/2002/07/owl#"),
    ("rdf:", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs:", "http://www.w3.org/2000/01/rdf-schema#"),
    ("xsd:", "http://www.w3.org/2001/XMLSchema#"),
];

struct Block {
    id: String,
    target: String,
    source: String,
}

pub fn render_obda(transformation: &Transformation) -> String {
    let graph = &transformation.graph;
    let dialect = transformation.options.target_dialect;
    let mut ids = HashSet::new();
    let mut blocks = Vec::new();

    for tracer in transformation.tracker.tracers().filter(|t| t.is_class()) {
        for (target, traced) in &tracer.targets {
            let Some(node) = graph.node(*target) else {
                continue;
            };
            if let Some(block) = class_block(graph, dialect, tracer, node, traced) {
                blocks.push(block);
            }
            for property in on_demand_properties(traced) {
                if let Some(block) = on_demand_block(graph, dialect, tracer, node, traced, property) {
                    blocks.push(block);
                }
            }
        }
    }

    let classified: HashSet<NodeId> = transformation
        .tracker
        .tracers()
        .filter(|t| t.is_class())
        .flat_map(|t| t.targets.keys().copied())
        .collect();
    for node in graph.nodes() {
        blocks.extend(relation_blocks(graph, dialect, node, &classified));
    }

    let mut output = String::from("[PrefixDeclaration]\n");
    output.push_str(&format!(
        ":\t\thttp://example.org/{}#\n",
        transformation.options.database_name
    ));
    for (prefix, iri) in PREFIXES {
        output.push_str(&format!("{}\t\t{}\n", prefix, iri));
    }

    output.push_str("\n[MappingDeclaration] @collection [[\n");
    for (i, block) in blocks.into_iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let id = unique_id(&mut ids, &block.id);
        output.push_str(&format!("mappingId\t{}\n", id));
        output.push_str(&format!("target\t\t{}\n", block.target));
        output.push_str(&format!("source\t\t{}\n", block.source));
    }
    output.push_str("]]\n");
    output
}

/// JDBC connection settings for the target dialect.
pub fn render_properties(transformation: &Transformation) -> String {
    let options = &transformation.options;
    let dialect = options.target_dialect;
    let host = options.connection.host.as_deref().unwrap_or("localhost");
    let port = options.connection.port.or(dialect.default_port());
    let address = match port {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let database = &options.database_name;

    let url = match dialect {
        Dialect::MySql => format!("jdbc:mysql://{}/{}", address, database),
        Dialect::Postgres => format!("jdbc:postgresql://{}/{}", address, database),
        Dialect::SqlServer => format!("jdbc:sqlserver://{};databaseName={}", address, database),
        Dialect::Oracle => format!("jdbc:oracle:thin:@{}:{}", address, database),
        Dialect::H2 => format!("jdbc:h2:tcp://{}/{}", address, database),
        Dialect::Generic => format!("jdbc://{}/{}", address, database),
    };

    let mut output = String::new();
    output.push_str(&format!("jdbc.url={}\n", url));
    output.push_str(&format!("jdbc.driver={}\n", dialect.jdbc_driver()));
    output.push_str(&format!(
        "jdbc.user={}\n",
        options.connection.user.as_deref().unwrap_or_default()
    ));
    output.push_str(&format!(
        "jdbc.password={}\n",
        options.connection.password.as_deref().unwrap_or_default()
    ));
    output
}

fn class_block(
    graph: &Graph,
    dialect: Dialect,
    tracer: &Tracer,
    node: &Node,
    traced: &TracedNode,
) -> Option<Block> {
    let joins: Vec<&JoinedNode> = traced.mandatory_joins().collect();
    let mut select = Query::new(graph, dialect, node)?;
    for join in &joins {
        select.join(join);
    }
    let subject = select.subject();

    let mut target = format!("{} a :{}", subject, tracer.name());
    for member in select.members() {
        for property in &member.properties {
            if is_data_property(tracer, property) {
                let alias = select.project(member, property);
                target.push_str(&format!(" ; :{} {{{}}}", property.name, alias));
            }
        }
    }
    target.push_str(" .");

    select.filter(traced);
    Some(Block {
        id: format!("{}_{}", tracer.name(), node.name),
        target,
        source: select.render(),
    })
}

fn on_demand_block(
    graph: &Graph,
    dialect: Dialect,
    tracer: &Tracer,
    node: &Node,
    traced: &TracedNode,
    property: PropertyId,
) -> Option<Block> {
    let mut select = Query::new(graph, dialect, node)?;
    for join in traced.mandatory_joins() {
        select.join(join);
    }
    for join in traced.joins.iter().filter(|j| j.on_demand == Some(property)) {
        select.join(join);
    }

    let (holder, column) = select
        .members()
        .into_iter()
        .find_map(|m| m.property(property).map(|p| (m, p)))?;
    if !is_declared_by_lineage(tracer, column) {
        return None;
    }

    // A lookup reference is read through the lookup's value column.
    let (member, projected, name) = match column.foreign_key.and_then(|fk| graph.node(fk.node)) {
        Some(lookup) if lookup.is_lookup() => {
            let value = lookup.properties.iter().find(|p| !p.primary_key)?;
            let name = column.name.strip_suffix("_id").unwrap_or(&column.name);
            (lookup, value, name.to_string())
        }
        _ => (holder, column, column.name.clone()),
    };

    let subject = select.subject();
    let alias = select.project(member, projected);
    select.filter(traced);
    Some(Block {
        id: format!("{}_{}_{}", tracer.name(), node.name, name),
        target: format!("{} :{} {{{}}} .", subject, name, alias),
        source: select.render(),
    })
}

/// Object-property blocks for the keys of `node` that stand for ontology
/// relations.
fn relation_blocks(
    graph: &Graph,
    dialect: Dialect,
    node: &Node,
    classified: &HashSet<NodeId>,
) -> Vec<Block> {
    let mut blocks = Vec::new();
    let table = dialect.ident(&node.name);

    let relation_keys: Vec<&NodeProperty> = node
        .foreign_keys()
        .filter(|p| {
            p.foreign_key.is_some_and(|fk| {
                classified.contains(&fk.node)
                    && graph
                        .association(fk.association)
                        .is_some_and(|a| matches!(a.kind, AssociationKind::Relation(_)))
            })
        })
        .collect();

    if let Some(link) = &node.associative_name {
        let [first, second, ..] = relation_keys.as_slice() else {
            return blocks;
        };
        let (Some(a), Some(b)) = (first.foreign_key, second.foreign_key) else {
            return blocks;
        };
        let name = graph
            .association(a.association)
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| link.clone());
        let left = alias(node, first);
        let right = alias(node, second);
        blocks.push(Block {
            id: format!("{}_{}", name, node.name),
            target: format!(
                "{} :{} {} .",
                iri(graph, a.node, &left),
                name,
                iri(graph, b.node, &right)
            ),
            source: format!(
                "SELECT {table}.{} AS {left}, {table}.{} AS {right} FROM {table}",
                dialect.ident(&first.name),
                dialect.ident(&second.name),
            ),
        });
        return blocks;
    }

    if !classified.contains(&node.id) {
        return blocks;
    }
    let Some(key) = node.primary_key() else {
        return blocks;
    };
    for property in relation_keys {
        let Some(fk) = property.foreign_key else {
            continue;
        };
        let Some(association) = graph.association(fk.association) else {
            continue;
        };
        let Some(relation) = association.as_relation() else {
            continue;
        };
        let name = match &association.name {
            Some(name) => name.clone(),
            None => {
                let referenced = graph.node(fk.node).map(|n| n.name.as_str()).unwrap_or_default();
                format!("{}_{}", node.name, referenced)
            }
        };

        // A shared primary key is its own reference.
        let own = alias(node, key);
        let mut columns = format!("{}.{} AS {}", table, dialect.ident(&key.name), own);
        let other = if key.id == property.id {
            own.clone()
        } else {
            let other = alias(node, property);
            columns.push_str(&format!(", {}.{} AS {}", table, dialect.ident(&property.name), other));
            other
        };

        let own_iri = iri(graph, node.id, &own);
        let other_iri = iri(graph, fk.node, &other);
        let (subject, object) = if relation.source == node.id {
            (own_iri, other_iri)
        } else {
            (other_iri, own_iri)
        };
        blocks.push(Block {
            id: format!("{}_{}", name, node.name),
            target: format!("{} :{} {} .", subject, name, object),
            source: format!(
                "SELECT {} FROM {} WHERE {}.{} IS NOT NULL",
                columns,
                table,
                table,
                dialect.ident(&property.name)
            ),
        });
    }
    blocks
}

/// The node whose surrogate key identifies the individuals stored in `node`,
/// reached through keys that are also references to a general.
fn identity_root(graph: &Graph, node: NodeId) -> NodeId {
    let mut current = node;
    let mut seen = vec![node];
    while let Some(next) = graph
        .node(current)
        .and_then(|n| n.primary_key())
        .and_then(|k| k.foreign_key)
        .filter(|fk| {
            graph
                .association(fk.association)
                .is_some_and(|a| a.as_generalization().is_some())
        })
        .map(|fk| fk.node)
    {
        if seen.contains(&next) {
            break;
        }
        seen.push(next);
        current = next;
    }
    current
}

fn iri(graph: &Graph, node: NodeId, placeholder: &str) -> String {
    let root = identity_root(graph, node);
    let name = graph
        .node(root)
        .map(|n| n.name.to_lowercase())
        .unwrap_or_else(|| root.to_string());
    format!(":{}/{{{}}}", name, placeholder)
}

fn alias(node: &Node, property: &NodeProperty) -> String {
    format!("{}_{}", node.name, property.name)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

fn is_declared_by_lineage(tracer: &Tracer, property: &NodeProperty) -> bool {
    property.source_class.is_some_and(|c| tracer.inherits(c))
}

fn is_data_property(tracer: &Tracer, property: &NodeProperty) -> bool {
    !property.primary_key && property.foreign_key.is_none() && is_declared_by_lineage(tracer, property)
}

fn on_demand_properties(traced: &TracedNode) -> Vec<PropertyId> {
    let mut properties = Vec::new();
    for property in traced.joins.iter().filter_map(|j| j.on_demand) {
        if !properties.contains(&property) {
            properties.push(property);
        }
    }
    properties
}

fn unique_id(used: &mut HashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// A `SELECT` over a target node and the nodes joined to it.
struct Query<'g> {
    graph: &'g Graph,
    dialect: Dialect,
    root: &'g Node,
    members: Vec<&'g Node>,
    joins: Vec<String>,
    columns: Vec<String>,
    conditions: Vec<String>,
}

impl<'g> Query<'g> {
    fn new(graph: &'g Graph, dialect: Dialect, root: &'g Node) -> Option<Self> {
        let key = root.primary_key()?;
        let mut query = Self {
            graph,
            dialect,
            root,
            members: vec![root],
            joins: Vec::new(),
            columns: Vec::new(),
            conditions: Vec::new(),
        };
        query.project(root, key);
        Some(query)
    }

    fn members(&self) -> Vec<&'g Node> {
        self.members.clone()
    }

    fn subject(&self) -> String {
        let key = self.root.primary_key().map(|k| alias(self.root, k)).unwrap_or_default();
        iri(self.graph, self.root.id, &key)
    }

    fn join(&mut self, join: &JoinedNode) {
        if self.members.iter().any(|m| m.id == join.node) {
            return;
        }
        let graph = self.graph;
        let Some(node) = graph.node(join.node) else {
            return;
        };
        let Some(condition) = self.join_condition(node) else {
            log::warn!("no key links {} to {}", node.name, self.root.name);
            return;
        };
        let keyword = match join.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        self.joins
            .push(format!("{} {} ON {}", keyword, self.dialect.ident(&node.name), condition));
        self.members.push(node);
    }

    fn join_condition(&self, node: &Node) -> Option<String> {
        for member in &self.members {
            if let Some(key) = node
                .foreign_keys()
                .find(|p| p.foreign_key.is_some_and(|fk| fk.node == member.id))
            {
                let referenced = member.primary_key()?;
                return Some(format!(
                    "{} = {}",
                    self.column(node, key),
                    self.column(member, referenced)
                ));
            }
            if let Some(key) = member
                .foreign_keys()
                .find(|p| p.foreign_key.is_some_and(|fk| fk.node == node.id))
            {
                let referenced = node.primary_key()?;
                return Some(format!(
                    "{} = {}",
                    self.column(member, key),
                    self.column(node, referenced)
                ));
            }
        }
        None
    }

    fn column(&self, node: &Node, property: &NodeProperty) -> String {
        format!("{}.{}", self.dialect.ident(&node.name), self.dialect.ident(&property.name))
    }

    fn project(&mut self, node: &Node, property: &NodeProperty) -> String {
        let alias = alias(node, property);
        let column = format!("{} AS {}", self.column(node, property), alias);
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
        alias
    }

    fn filter(&mut self, traced: &TracedNode) {
        for filter in &traced.filters {
            let Some(node) = self.members.iter().find(|m| m.id == filter.node) else {
                continue;
            };
            let Some(property) = node.property(filter.property) else {
                continue;
            };
            let value = match &filter.value {
                FilterValue::Literal(literal) => string_literal(literal),
                FilterValue::Bool(flag) => boolean_literal(*flag, self.dialect),
            };
            let condition = format!("{} = {}", self.column(node, property), value);
            self.conditions.push(condition);
        }
    }

    fn render(&self) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.columns.join(", "),
            self.dialect.ident(&self.root.name)
        );
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }
}
