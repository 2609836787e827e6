//! The full ontology to relational pipeline.

use serde::Serialize;

use crate::ast::Model;
use crate::builder::{self, BuildError};
use crate::graph::{Graph, StructuralError};
use crate::options::{ConfigError, Options};
use crate::parser::{ParseError, Parser};
use crate::resolve;
use crate::strategy;
use crate::tracker::Tracker;

/// Everything a rewrite step may touch.
pub struct Context<'a> {
    pub graph: Graph,
    pub tracker: Tracker,
    pub options: &'a Options,
}

impl<'a> Context<'a> {
    pub fn new(graph: Graph, tracker: Tracker, options: &'a Options) -> Self {
        Self {
            graph,
            tracker,
            options,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Build error: {0}")]
    Build(#[from] BuildError),
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),
}

/// Final graph and tracker of one run, read by the emitters.
#[derive(Debug, Serialize)]
pub struct Transformation {
    pub graph: Graph,
    pub tracker: Tracker,
    pub options: Options,
}

impl Transformation {
    /// Graph and tracker as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn transform(model: &Model, options: &Options) -> Result<Transformation, TransformError> {
    options.validate()?;

    let (graph, tracker) = builder::build(model)?;
    let mut ctx = Context::new(graph, tracker, options);
    strategy::apply(&mut ctx)?;
    resolve::run(&mut ctx)?;
    check_resolved(&ctx.graph)?;

    let mut violations = ctx.graph.check_integrity();
    violations.extend(ctx.tracker.check_integrity(&ctx.graph));
    for violation in &violations {
        log::error!("integrity violation: {}", violation);
    }
    debug_assert!(violations.is_empty(), "integrity violations: {:?}", violations);

    log::info!(
        "transformation done: {} tables, {} tracers",
        ctx.graph.node_count(),
        ctx.tracker.len()
    );
    Ok(Transformation {
        graph: ctx.graph,
        tracker: ctx.tracker,
        options: options.clone(),
    })
}

/// Fail on the first relation or generalization no resolver took care of.
fn check_resolved(graph: &Graph) -> Result<(), StructuralError> {
    match graph.associations().find(|a| !a.resolved) {
        Some(association) => Err(StructuralError::UnresolvedAssociation(association.label())),
        None => Ok(()),
    }
}

/// Parse ontology source text and transform it.
pub fn transform_source(source: &str, options: &Options) -> Result<Transformation, TransformError> {
    let model = Parser::new(source)?.parse()?;
    transform(&model, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PropertyKind;
    use crate::options::MappingStrategy;
    use crate::sql::Dialect;
    use crate::tracker::{FilterValue, JoinKind};

    fn run(input: &str, strategy: MappingStrategy) -> Transformation {
        let options = Options {
            mapping_strategy: strategy,
            ..Options::default()
        };
        transform_source(input, &options).unwrap()
    }

    #[test]
    fn test_one_to_one_shares_primary_key() {
        let result = run(
            r#"
            kind Person
            kind Passport
            rel { Person 1 -- 0..1 Passport }
            "#,
            MappingStrategy::ClassPerTable,
        );
        assert_eq!(result.graph.node_count(), 2);
        let person = result.graph.node_by_name("Person").unwrap();
        let passport = result.graph.node_by_name("Passport").unwrap();
        assert_eq!(passport.properties.len(), 1);
        let key = passport.primary_key().unwrap();
        assert_eq!(key.name, "person_id");
        assert_eq!(key.foreign_key.map(|fk| fk.node), Some(person.id));
        assert!(passport.property_by_name("passport_id").is_none());
    }

    #[test]
    fn test_kind_per_table_discriminator() {
        let result = run(
            r#"
            kind Organization
            subkind ForProfit
            subkind NonProfit
            genset Organization disjoint complete { ForProfit, NonProfit }
            "#,
            MappingStrategy::KindPerTable,
        );
        assert_eq!(result.graph.node_count(), 1);
        let organization = result.graph.node_by_name("Organization").unwrap();
        let column = organization.property_by_name("organization_type").unwrap();
        let PropertyKind::Enumeration(domain) = &column.kind else {
            panic!("discriminator is not an enumeration");
        };
        assert_eq!(domain.literals, vec!["ForProfit", "NonProfit"]);
        let tracer = result.tracker.class_tracer("ForProfit").unwrap();
        let filters = &tracer.targets[&organization.id].filters;
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].property, column.id);
        assert_eq!(filters[0].value, FilterValue::Literal("ForProfit".into()));
    }

    #[test]
    fn test_many_to_many_creates_associative_node() {
        let result = run(
            r#"
            kind Student
            kind Course
            rel { Student * -- * Course : "enrolls" }
            "#,
            MappingStrategy::ClassPerTable,
        );
        assert_eq!(result.graph.node_count(), 3);
        let link = result.graph.node_by_name("enrolls").unwrap();
        assert_eq!(link.associative_name.as_deref(), Some("enrolls"));
        let student = result.graph.node_by_name("Student").unwrap().id;
        let course = result.graph.node_by_name("Course").unwrap().id;
        let mut referenced: Vec<_> = link
            .foreign_keys()
            .filter_map(|p| p.foreign_key.map(|fk| fk.node))
            .collect();
        referenced.sort();
        assert_eq!(referenced, vec![student, course]);
        let tracer = result.tracker.tracer(link.id).unwrap();
        assert!(!tracer.is_class());
        assert!(result.tracker.tracers().filter(|t| t.is_class()).all(|t| !t.targets.contains_key(&link.id)));
    }

    #[test]
    fn test_multivalued_attribute_extracted() {
        let result = run(
            "kind Person { name string 1, nickname string * }",
            MappingStrategy::ClassPerTable,
        );
        let person = result.graph.node_by_name("Person").unwrap();
        assert!(person.property_by_name("nickname").is_none());
        let child = result.graph.node_by_name("Person_nickname").unwrap();
        let nickname = child.property_by_name("nickname").unwrap();
        assert!(!nickname.multivalued);
        assert!(child.foreign_keys().any(|p| p.foreign_key.map(|fk| fk.node) == Some(person.id)));

        let traced = result.tracker.traced_node(person.id, person.id).unwrap();
        assert_eq!(traced.joins.len(), 1);
        assert_eq!(traced.joins[0].node, child.id);
        assert_eq!(traced.joins[0].kind, JoinKind::Inner);
        assert_eq!(traced.joins[0].on_demand, Some(nickname.id));
        assert_eq!(traced.mandatory_joins().count(), 0);
    }

    #[test]
    fn test_class_per_table_generalization_key() {
        let result = run(
            r#"
            kind Person { name string 1 }
            role Student : Person { school string }
            "#,
            MappingStrategy::ClassPerTable,
        );
        let person = result.graph.node_by_name("Person").unwrap();
        let student = result.graph.node_by_name("Student").unwrap();
        let key = student.primary_key().unwrap();
        assert_eq!(key.name, "person_id");
        assert_eq!(key.foreign_key.map(|fk| fk.node), Some(person.id));
        let traced = result.tracker.traced_node(student.id, student.id).unwrap();
        assert_eq!(traced.joins[0].node, person.id);
        assert_eq!(traced.joins[0].kind, JoinKind::Inner);
    }

    #[test]
    fn test_lookup_tables_rejected_before_build() {
        let options = Options {
            enum_as_lookup_table: true,
            target_dialect: Dialect::Generic,
            ..Options::default()
        };
        let err = transform_source("kind Person", &options).unwrap_err();
        assert!(matches!(err, TransformError::Config(ConfigError::LookupTablesUnsupported(_))));
    }

    #[test]
    fn test_unresolved_association_fails() {
        use crate::graph::{AssociationKind, Cardinality, Relation};

        let mut graph = Graph::new();
        let person = graph.add_node("Person", None);
        let car = graph.add_node("Car", None);
        let id = graph
            .add_association(
                Some("drives".into()),
                AssociationKind::Relation(Relation {
                    source: person,
                    source_cardinality: Cardinality::ExactlyOne,
                    target: car,
                    target_cardinality: Cardinality::ZeroOrMany,
                    enumeration: None,
                }),
            )
            .unwrap();
        let err = check_resolved(&graph).unwrap_err();
        assert!(matches!(err, StructuralError::UnresolvedAssociation(label) if label.starts_with("drives")));

        graph.mark_resolved(id).unwrap();
        assert!(check_resolved(&graph).is_ok());
    }

    #[test]
    fn test_diamond_kind_per_table_single_table() {
        let result = run(
            r#"
            kind Person
            role Employee : Person
            phase Adult : Person
            role AdultEmployee : Employee, Adult
            "#,
            MappingStrategy::KindPerTable,
        );
        let names: Vec<_> = result.graph.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Person"]);
    }

    #[test]
    fn test_trace_serializes() {
        let result = run("kind Person", MappingStrategy::KindPerTable);
        let json = result.to_json().unwrap();
        assert!(json.contains("\"Person\""));
    }
}
