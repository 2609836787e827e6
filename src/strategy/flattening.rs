//! Flatten general nodes into their specifics, top-down.

use std::collections::HashMap;

use super::{generals_of, specifics_of};
use crate::graph::{
    AssociationKind, Graph, GraphAssociation, NodeId, NodeProperty, PropertyId, StructuralError,
};
use crate::transform::Context;

/// Flatten every general accepted by `should_flatten`. A general is only
/// taken once none of its own generals is still waiting to be flattened, so
/// inherited properties travel all the way down.
pub fn flatten(
    ctx: &mut Context,
    should_flatten: impl Fn(&Graph, NodeId) -> bool,
) -> Result<(), StructuralError> {
    loop {
        let next = ctx.graph.node_ids().into_iter().find(|node| {
            should_flatten(&ctx.graph, *node)
                && !specifics_of(&ctx.graph, *node).is_empty()
                && generals_of(&ctx.graph, *node)
                    .iter()
                    .all(|(_, general)| !should_flatten(&ctx.graph, *general))
        });
        let Some(general) = next else {
            break;
        };
        flatten_one(ctx, general)?;
    }
    Ok(())
}

fn flatten_one(ctx: &mut Context, general: NodeId) -> Result<(), StructuralError> {
    let general_name = ctx.graph.try_node(general)?.name.clone();
    let specifics: Vec<NodeId> = specifics_of(&ctx.graph, general)
        .into_iter()
        .map(|(_, s)| s)
        .collect();

    let covered = ctx.graph.associations().any(|a| {
        a.as_generalization_set()
            .is_some_and(|s| s.general == general && s.complete)
    });
    if !covered {
        log::warn!(
            "{} is not covered by a complete generalization set; its direct instances have no table",
            general_name
        );
    }
    let loosen = specifics.len() > 1 || !covered;

    let inherited: Vec<_> = ctx
        .graph
        .try_node(general)?
        .properties
        .iter()
        .filter(|p| !p.primary_key)
        .cloned()
        .collect();
    let mut property_maps: HashMap<NodeId, HashMap<PropertyId, PropertyId>> = HashMap::new();
    for specific in &specifics {
        let mut map = HashMap::new();
        for property in &inherited {
            let origin = property.copied_from.unwrap_or(property.id);
            // Reached through an earlier general of a diamond already.
            if let Some(existing) = ctx.graph.try_node(*specific)?.copy_of(origin) {
                map.insert(property.id, existing.id);
                continue;
            }
            let fresh = ctx.graph.new_property(property.name.clone(), property.kind.clone());
            let node = ctx.graph.try_node_mut(*specific)?;
            let copy = NodeProperty {
                id: fresh.id,
                name: node.unique_property_name(&property.name),
                copied_from: Some(origin),
                ..property.clone()
            };
            map.insert(property.id, copy.id);
            node.properties.push(copy);
        }
        property_maps.insert(*specific, map);
    }

    let ids = ctx.graph.try_node(general)?.associations().to_vec();
    for id in ids {
        let association = ctx.graph.try_association(id)?.clone();
        match &association.kind {
            AssociationKind::Relation(_) => {
                ctx.graph.remove_association(id)?;
                split_relation(&mut ctx.graph, &association, general, &general_name, &specifics, loosen)?;
            }
            AssociationKind::Generalization(g) if g.specific == general => {
                ctx.graph.remove_association(id)?;
                for specific in &specifics {
                    let exists = ctx.graph.associations().any(|a| {
                        a.as_generalization()
                            .is_some_and(|o| o.general == g.general && o.specific == *specific)
                    });
                    if !exists {
                        ctx.graph
                            .add_association_like(association.with_endpoint(general, *specific))?;
                    }
                }
            }
            AssociationKind::Generalization(_) => {
                ctx.graph.remove_association(id)?;
            }
            AssociationKind::GeneralizationSet(s) if s.general == general => {
                ctx.graph.remove_association(id)?;
            }
            AssociationKind::GeneralizationSet(_) => {
                let mut spliced = association.clone();
                if let AssociationKind::GeneralizationSet(s) = &mut spliced.kind {
                    let mut members = Vec::with_capacity(s.specifics.len() + specifics.len());
                    for member in &s.specifics {
                        let replacement = if *member == general {
                            specifics.clone()
                        } else {
                            vec![*member]
                        };
                        for node in replacement {
                            if !members.contains(&node) {
                                members.push(node);
                            }
                        }
                    }
                    s.specifics = members;
                }
                ctx.graph.replace_association(id, spliced)?;
            }
        }
    }

    ctx.tracker.split(general, &specifics, &property_maps);
    ctx.graph.retire_node(general)?;
    log::debug!("flattened {} into {} specifics", general_name, specifics.len());
    Ok(())
}

/// One copy of a relation per specific standing in for `general`. A relation
/// from `general` to itself is copied for every pair of specifics.
fn split_relation(
    graph: &mut Graph,
    association: &GraphAssociation,
    general: NodeId,
    general_name: &str,
    specifics: &[NodeId],
    loosen: bool,
) -> Result<(), StructuralError> {
    let Some(relation) = association.as_relation() else {
        return Ok(());
    };
    let sources = if relation.source == general {
        specifics.to_vec()
    } else {
        vec![relation.source]
    };
    let targets = if relation.target == general {
        specifics.to_vec()
    } else {
        vec![relation.target]
    };

    for source in &sources {
        for target in &targets {
            let mut copy = association.clone();
            if let Some(r) = copy.as_relation_mut() {
                r.source = *source;
                r.target = *target;
                if loosen && relation.source == general {
                    r.source_cardinality = r.source_cardinality.optional();
                }
                if loosen && relation.target == general {
                    r.target_cardinality = r.target_cardinality.optional();
                }
            }
            if copy.removed_node_name.is_none() {
                copy.removed_node_name = Some(general_name.to_string());
            }
            graph.add_association_like(copy)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::builder::build;
    use crate::graph::Cardinality;
    use crate::options::Options;
    use crate::parser::Parser;
    use crate::transform::Context;

    fn flattened(input: &str) -> Context<'static> {
        static OPTIONS: std::sync::OnceLock<Options> = std::sync::OnceLock::new();
        let options = OPTIONS.get_or_init(Options::default);
        let model = Parser::new(input).unwrap().parse().unwrap();
        let (graph, tracker) = build(&model).unwrap();
        let mut ctx = Context::new(graph, tracker, options);
        super::flatten(&mut ctx, |_, _| true).unwrap();
        ctx
    }

    #[test]
    fn test_flatten_copies_properties_down() {
        let ctx = flattened(
            r#"
            category Agent { name string 1 }
            kind Person : Agent { birth date }
            kind Organization : Agent
            genset Agent disjoint complete { Person, Organization }
            "#,
        );
        assert_eq!(ctx.graph.node_count(), 2);
        let person = ctx.graph.node_by_name("Person").unwrap();
        let organization = ctx.graph.node_by_name("Organization").unwrap();
        let name = person.property_by_name("name").unwrap();
        assert!(!name.nullable);
        assert!(organization.property_by_name("name").is_some());
        assert_ne!(name.id, organization.property_by_name("name").unwrap().id);

        let agent = ctx.tracker.class_tracer("Agent").unwrap();
        let targets: Vec<_> = agent.targets.keys().copied().collect();
        assert_eq!(targets, vec![person.id, organization.id]);
        assert!(ctx.graph.check_integrity().is_empty());
        assert!(ctx.tracker.check_integrity(&ctx.graph).is_empty());
    }

    #[test]
    fn test_flatten_loosens_general_end() {
        let ctx = flattened(
            r#"
            category Agent
            kind Person : Agent
            kind Organization : Agent
            genset Agent disjoint complete { Person, Organization }
            kind Contract
            rel { Agent 1 -- * Contract : "signs" }
            "#,
        );
        let copies: Vec<_> = ctx
            .graph
            .associations()
            .filter_map(|a| a.as_relation().map(|r| (a, r)))
            .collect();
        assert_eq!(copies.len(), 2);
        for (association, relation) in copies {
            assert_eq!(relation.source_cardinality, Cardinality::ZeroOrOne);
            assert_eq!(relation.target_cardinality, Cardinality::ZeroOrMany);
            assert_eq!(association.name.as_deref(), Some("signs"));
            assert_eq!(association.removed_node_name.as_deref(), Some("Agent"));
        }
    }

    #[test]
    fn test_flatten_single_covered_specific_keeps_cardinality() {
        let ctx = flattened(
            r#"
            kind Vehicle
            subkind Car : Vehicle
            genset Vehicle complete { Car }
            kind Garage
            rel { Vehicle 1 -- * Garage }
            "#,
        );
        let car = ctx.graph.node_by_name("Car").unwrap().id;
        let relation = ctx.graph.associations().find_map(|a| a.as_relation()).unwrap();
        assert_eq!(relation.source, car);
        assert_eq!(relation.source_cardinality, Cardinality::ExactlyOne);
    }

    #[test]
    fn test_flatten_reflexive_relation_pairs_specifics() {
        let ctx = flattened(
            r#"
            kind Person
            subkind Man : Person
            subkind Woman : Person
            rel { Person * -- * Person : "knows" }
            "#,
        );
        assert_eq!(ctx.graph.associations().filter(|a| a.as_relation().is_some()).count(), 4);
        assert!(ctx.graph.check_integrity().is_empty());
    }

    #[test]
    fn test_flatten_diamond_copies_once() {
        let ctx = flattened(
            r#"
            kind Person { name string 1 }
            role Employee : Person { salary decimal }
            phase Adult : Person
            role AdultEmployee : Employee, Adult
            "#,
        );
        let both = ctx.graph.node_by_name("AdultEmployee").unwrap();
        let columns: Vec<_> = both.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(columns, vec!["adultemployee_id", "salary", "name"]);

        let person = ctx.tracker.class_tracer("Person").unwrap();
        for traced in person.targets.values() {
            for filter in &traced.filters {
                assert!(ctx.graph.property(filter.node, filter.property).is_ok());
            }
        }
        assert!(ctx.graph.check_integrity().is_empty());
        assert!(ctx.tracker.check_integrity(&ctx.graph).is_empty());
    }

    #[test]
    fn test_flatten_multi_level_hierarchy() {
        let ctx = flattened(
            r#"
            kind Animal { legs int 1 }
            subkind Mammal : Animal
            subkind Bird : Animal
            subkind Dog : Mammal
            subkind Cat : Mammal
            "#,
        );
        let names: Vec<_> = ctx.graph.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Bird", "Dog", "Cat"]);
        let dog = ctx.graph.node_by_name("Dog").unwrap();
        assert!(dog.property_by_name("legs").is_some());
        let animal = ctx.tracker.class_tracer("Animal").unwrap();
        assert_eq!(animal.targets.len(), 3);
        assert!(ctx.tracker.check_integrity(&ctx.graph).is_empty());
    }
}
