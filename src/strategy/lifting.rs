//! Kind-per-table: lift every specific node into its general, bottom-up.

use std::collections::HashMap;

use super::{generalizations, is_ancestor, specifics_of, unify_relations};
use crate::graph::{
    AssociationId, AssociationKind, DataType, EnumDomain, Generalization, NodeId, PropertyId,
    PropertyKind, StructuralError,
};
use crate::tracker::{Filter, FilterValue};
use crate::transform::Context;

/// Lift until no generalization is left. Each step takes a generalization
/// whose specific has no specifics of its own, so lifting always starts at
/// the leaves.
pub fn lift(ctx: &mut Context) -> Result<(), StructuralError> {
    let mut discriminators: HashMap<AssociationId, PropertyId> = HashMap::new();

    loop {
        let next = generalizations(&ctx.graph)
            .into_iter()
            .find(|(_, g)| specifics_of(&ctx.graph, g.specific).is_empty());
        let Some((id, generalization)) = next else {
            break;
        };
        lift_one(ctx, id, &generalization, &mut discriminators)?;
    }
    Ok(())
}

fn lift_one(
    ctx: &mut Context,
    generalization_id: AssociationId,
    generalization: &Generalization,
    discriminators: &mut HashMap<AssociationId, PropertyId>,
) -> Result<(), StructuralError> {
    let general = generalization.general;
    let specific = generalization.specific;
    let specific_name = ctx.graph.try_node(specific)?.name.clone();

    let filter = discriminate(ctx, general, &specific_name, generalization.set, discriminators)?;
    let sources = ctx.tracker.sources_targeting(specific);

    // Properties move as they are, except that general rows which are not
    // specific rows leave them empty.
    let moved = {
        let node = ctx.graph.try_node_mut(specific)?;
        let (keys, moved): (Vec<_>, Vec<_>) =
            node.properties.drain(..).partition(|p| p.primary_key);
        node.properties = keys;
        moved
    };
    let target = ctx.graph.try_node_mut(general)?;
    for mut property in moved {
        property.name = target.unique_property_name(&property.name);
        if property.default_value.is_none() {
            property.nullable = true;
        }
        target.properties.push(property);
    }

    ctx.graph.remove_association(generalization_id)?;
    rewire(ctx, specific, general, &specific_name)?;
    unify_relations(&mut ctx.graph, general)?;

    ctx.tracker.redirect(specific, general);
    for source in sources {
        ctx.tracker.add_filter(source, general, filter.clone());
    }

    ctx.graph.retire_node(specific)?;
    log::debug!("lifted {} into {}", specific_name, ctx.graph.try_node(general)?.name);
    Ok(())
}

/// Make sure the general can tell rows of `specific` apart and return the
/// filter selecting them.
fn discriminate(
    ctx: &mut Context,
    general: NodeId,
    specific_name: &str,
    set: Option<AssociationId>,
    discriminators: &mut HashMap<AssociationId, PropertyId>,
) -> Result<Filter, StructuralError> {
    let disjoint_set = set
        .and_then(|id| ctx.graph.association(id).map(|a| (id, a)))
        .and_then(|(id, a)| {
            a.as_generalization_set()
                .filter(|s| s.disjoint)
                .map(|s| (id, a.name.clone(), s.clone()))
        });

    if let Some((set_id, set_name, set)) = disjoint_set {
        let property = match discriminators.get(&set_id) {
            Some(property) => *property,
            None => {
                let general_name = ctx.graph.try_node(general)?.name.clone();
                let prefix = general_name.to_lowercase();
                let (base, domain_base) = match &set_name {
                    Some(name) => {
                        let name = name.to_lowercase().replace(char::is_whitespace, "_");
                        let domain = format!("{}_{}", prefix, name);
                        (name, domain)
                    }
                    None => (format!("{}_type", prefix), format!("{}_type", prefix)),
                };
                let mut literals = Vec::with_capacity(set.specifics.len());
                for node in &set.specifics {
                    literals.push(ctx.graph.try_node(*node)?.name.clone());
                }
                let name = ctx.graph.try_node(general)?.unique_property_name(&base);
                let domain = EnumDomain {
                    name: ctx.graph.unique_domain_name(&domain_base),
                    literals,
                };
                let property = ctx
                    .graph
                    .new_property(name, PropertyKind::Enumeration(domain))
                    .nullable(!set.complete);
                let id = property.id;
                ctx.graph.try_node_mut(general)?.properties.push(property);
                discriminators.insert(set_id, id);
                log::debug!("added discriminator over {} to {}", set_id, general_name);
                id
            }
        };
        return Ok(Filter {
            node: general,
            property,
            value: FilterValue::Literal(specific_name.to_string()),
        });
    }

    let base = format!("is_{}", specific_name.to_lowercase());
    let node = ctx.graph.try_node(general)?;
    let name = node.unique_property_name(&base);
    let property = ctx
        .graph
        .new_property(name, PropertyKind::Primitive(DataType::Boolean))
        .not_null()
        .with_default("false");
    let id = property.id;
    ctx.graph.try_node_mut(general)?.properties.push(property);
    Ok(Filter {
        node: general,
        property: id,
        value: FilterValue::Bool(true),
    })
}

/// Move every association still touching `specific` onto `general`.
fn rewire(
    ctx: &mut Context,
    specific: NodeId,
    general: NodeId,
    specific_name: &str,
) -> Result<(), StructuralError> {
    let ids = ctx.graph.try_node(specific)?.associations().to_vec();

    for id in ids {
        let association = ctx.graph.try_association(id)?.clone();
        match &association.kind {
            AssociationKind::Relation(relation) => {
                let mut updated = association.clone();
                if let Some(r) = updated.as_relation_mut() {
                    // General rows that are not specific rows have no partner.
                    if relation.source == specific {
                        r.target_cardinality = r.target_cardinality.optional();
                    }
                    if relation.target == specific {
                        r.source_cardinality = r.source_cardinality.optional();
                    }
                }
                let mut updated = updated.with_endpoint(specific, general);
                if updated.removed_node_name.is_none() {
                    updated.removed_node_name = Some(specific_name.to_string());
                }
                ctx.graph.replace_association(id, updated)?;
            }
            AssociationKind::Generalization(_) => {
                let updated = association.with_endpoint(specific, general);
                let redundant = updated.as_generalization().is_some_and(|g| {
                    // The general may already sit below the survivor, as in a
                    // diamond; its discriminator filter covers the absorbed class.
                    is_ancestor(&ctx.graph, g.specific, g.general)
                        || generalizations(&ctx.graph).iter().any(|(other, o)| {
                            *other != id && o.general == g.general && o.specific == g.specific
                        })
                });
                if updated.is_degenerate() || redundant {
                    ctx.graph.remove_association(id)?;
                } else {
                    ctx.graph.replace_association(id, updated)?;
                }
            }
            AssociationKind::GeneralizationSet(set) => {
                if set.general == general {
                    let mut updated = association.clone();
                    if let AssociationKind::GeneralizationSet(s) = &mut updated.kind {
                        s.specifics.retain(|n| *n != specific);
                    }
                    if updated.is_degenerate() {
                        ctx.graph.remove_association(id)?;
                    } else {
                        ctx.graph.replace_association(id, updated)?;
                    }
                } else {
                    let updated = association.with_endpoint(specific, general);
                    if updated.is_degenerate() {
                        ctx.graph.remove_association(id)?;
                    } else {
                        ctx.graph.replace_association(id, updated)?;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builder::build;
    use crate::graph::{Cardinality, PropertyKind};
    use crate::options::{MappingStrategy, Options};
    use crate::parser::Parser;
    use crate::tracker::FilterValue;
    use crate::transform::Context;

    fn lifted(input: &str) -> Context<'static> {
        static OPTIONS: std::sync::OnceLock<Options> = std::sync::OnceLock::new();
        let options = OPTIONS.get_or_init(|| Options {
            mapping_strategy: MappingStrategy::KindPerTable,
            ..Options::default()
        });
        let model = Parser::new(input).unwrap().parse().unwrap();
        let (graph, tracker) = build(&model).unwrap();
        let mut ctx = Context::new(graph, tracker, options);
        super::lift(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_lift_disjoint_set_adds_enumeration() {
        let ctx = lifted(
            r#"
            kind Organization { name string 1 }
            subkind ForProfit { revenue decimal 1 }
            subkind NonProfit
            genset Organization disjoint complete { ForProfit, NonProfit }
            "#,
        );
        assert_eq!(ctx.graph.node_count(), 1);
        let organization = ctx.graph.node_by_name("Organization").unwrap();
        let discriminator = organization.property_by_name("organization_type").unwrap();
        assert!(!discriminator.nullable);
        match &discriminator.kind {
            PropertyKind::Enumeration(domain) => {
                assert_eq!(domain.literals, vec!["ForProfit", "NonProfit"])
            }
            other => panic!("unexpected kind {other:?}"),
        }
        let revenue = organization.property_by_name("revenue").unwrap();
        assert!(revenue.nullable);

        let tracer = ctx.tracker.class_tracer("ForProfit").unwrap();
        let traced = &tracer.targets[&organization.id];
        assert_eq!(traced.filters.len(), 1);
        assert_eq!(traced.filters[0].property, discriminator.id);
        assert_eq!(traced.filters[0].value, FilterValue::Literal("ForProfit".into()));

        let own = ctx.tracker.class_tracer("Organization").unwrap();
        assert!(own.targets[&organization.id].filters.is_empty());
        assert!(ctx.graph.check_integrity().is_empty());
        assert!(ctx.tracker.check_integrity(&ctx.graph).is_empty());
    }

    #[test]
    fn test_lift_same_named_sets_get_own_domains() {
        let ctx = lifted(
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
        );
        let domain = |node: &str| {
            let node = ctx.graph.node_by_name(node).unwrap();
            node.property_by_name("status").unwrap().enumeration().unwrap().clone()
        };
        let (a, b) = (domain("A"), domain("B"));
        assert_eq!((a.name.as_str(), b.name.as_str()), ("a_status", "b_status"));
        assert_eq!(a.literals, vec!["A1", "A2"]);
        assert_eq!(b.literals, vec!["B1", "B2"]);
    }

    #[test]
    fn test_lift_without_set_adds_boolean() {
        let ctx = lifted("kind Person\nrole Student : Person");
        let person = ctx.graph.node_by_name("Person").unwrap();
        let flag = person.property_by_name("is_student").unwrap();
        assert!(!flag.nullable);
        assert_eq!(flag.default_value.as_deref(), Some("false"));
        let tracer = ctx.tracker.class_tracer("Student").unwrap();
        assert_eq!(tracer.targets[&person.id].filters[0].value, FilterValue::Bool(true));
    }

    #[test]
    fn test_lift_chain_accumulates_filters() {
        let ctx = lifted(
            r#"
            kind Person
            role Student : Person
            phase Freshman : Student
            "#,
        );
        assert_eq!(ctx.graph.node_count(), 1);
        let person = ctx.graph.node_by_name("Person").unwrap();
        let tracer = ctx.tracker.class_tracer("Freshman").unwrap();
        let filters = &tracer.targets[&person.id].filters;
        assert_eq!(filters.len(), 2);
        assert!(filters.iter().all(|f| f.node == person.id));
        assert!(ctx.tracker.check_integrity(&ctx.graph).is_empty());
    }

    #[test]
    fn test_lift_diamond_collapses_to_root() {
        let ctx = lifted(
            r#"
            kind Person { name string 1 }
            role Employee : Person
            phase Adult : Person
            role AdultEmployee : Employee, Adult
            "#,
        );
        let names: Vec<_> = ctx.graph.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Person"]);
        assert_eq!(ctx.graph.associations().count(), 0);
        let person = ctx.graph.node_by_name("Person").unwrap();
        assert!(person.property_by_name("is_adultemployee").is_some());
        let tracer = ctx.tracker.class_tracer("AdultEmployee").unwrap();
        assert_eq!(tracer.targets.keys().copied().collect::<Vec<_>>(), vec![person.id]);
        assert!(ctx.graph.check_integrity().is_empty());
        assert!(ctx.tracker.check_integrity(&ctx.graph).is_empty());
    }

    #[test]
    fn test_lift_loosens_relation_partner() {
        let ctx = lifted(
            r#"
            kind Person
            role Driver : Person
            kind Car
            rel { Driver 1 -- 1..* Car : "drives" }
            "#,
        );
        let person = ctx.graph.node_by_name("Person").unwrap().id;
        let association = ctx.graph.associations().find(|a| a.as_relation().is_some()).unwrap();
        let relation = association.as_relation().unwrap();
        assert_eq!(relation.source, person);
        assert_eq!(relation.source_cardinality, Cardinality::ExactlyOne);
        assert_eq!(relation.target_cardinality, Cardinality::ZeroOrMany);
        assert_eq!(association.removed_node_name.as_deref(), Some("Driver"));
    }
}
