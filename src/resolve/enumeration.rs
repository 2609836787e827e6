//! Enumeration columns: relation hints, and optional lookup tables.

use std::collections::HashMap;

use super::place_key;
use crate::graph::{
    AssociationId, AssociationKind, Cardinality, DataType, EnumDomain, ForeignKey, NodeId,
    NodeProperty, PropertyId, PropertyKind, Relation, StructuralError,
};
use crate::tracker::{JoinKind, JoinedNode, TraceOrigin};
use crate::transform::Context;

pub fn resolve(ctx: &mut Context) -> Result<(), StructuralError> {
    attach_relation_hints(ctx)?;
    if ctx.options.enum_as_lookup_table {
        lookup_tables(ctx)?;
    }
    Ok(())
}

/// An enumeration attached to a relation becomes a column next to the
/// relation's foreign key.
fn attach_relation_hints(ctx: &mut Context) -> Result<(), StructuralError> {
    let policy = ctx.options.uninformed_cardinality;
    let hinted: Vec<AssociationId> = ctx
        .graph
        .associations()
        .filter(|a| !a.resolved)
        .filter(|a| a.as_relation().is_some_and(|r| r.enumeration.is_some()))
        .map(|a| a.id)
        .collect();

    for id in hinted {
        let association = ctx.graph.try_association(id)?.clone();
        let Some(domain) = association.as_relation().and_then(|r| r.enumeration.clone()) else {
            continue;
        };
        let placement = place_key(&association, policy)?;
        let holder = ctx.graph.try_node(placement.holder)?;
        let column = holder.unique_property_name(&domain.name.to_lowercase());
        let property = ctx
            .graph
            .new_property(column, PropertyKind::Enumeration(domain))
            .nullable(placement.nullable);
        ctx.graph.try_node_mut(placement.holder)?.properties.push(property);
        ctx.graph.update_association(id, |a| {
            if let Some(r) = a.as_relation_mut() {
                r.enumeration = None;
            }
        })?;
    }
    Ok(())
}

fn lookup_tables(ctx: &mut Context) -> Result<(), StructuralError> {
    let mut lookups: HashMap<String, (NodeId, PropertyId)> = HashMap::new();
    let owners: Vec<(NodeId, PropertyId)> = ctx
        .graph
        .nodes()
        .flat_map(|n| {
            n.properties
                .iter()
                .filter(|p| p.enumeration().is_some())
                .map(move |p| (n.id, p.id))
        })
        .collect();

    for (owner, property) in owners {
        let original = ctx.graph.property(owner, property)?.clone();
        let Some(domain) = original.enumeration() else {
            continue;
        };
        let (lookup, value) = match lookups.get(&domain.name) {
            Some(found) => *found,
            None => {
                let created = lookup_node(ctx, domain)?;
                lookups.insert(domain.name.clone(), created);
                created
            }
        };

        let relation = ctx.graph.add_association(
            Some(domain.name.clone()),
            AssociationKind::Relation(Relation {
                source: owner,
                source_cardinality: Cardinality::ZeroOrMany,
                target: lookup,
                target_cardinality: if original.nullable {
                    Cardinality::ZeroOrOne
                } else {
                    Cardinality::ExactlyOne
                },
                enumeration: None,
            }),
        )?;
        ctx.graph.mark_resolved(relation)?;

        let fresh = ctx
            .graph
            .new_property(String::new(), PropertyKind::Primitive(DataType::Integer));
        let node = ctx.graph.try_node_mut(owner)?;
        let index = node
            .properties
            .iter()
            .position(|p| p.id == property)
            .ok_or(StructuralError::MissingProperty { node: owner, property })?;
        node.properties.remove(index);
        let key = NodeProperty {
            id: fresh.id,
            name: node.unique_property_name(&format!("{}_id", original.name)),
            kind: fresh.kind,
            foreign_key: Some(ForeignKey {
                node: lookup,
                association: relation,
            }),
            default_value: None,
            ..original.clone()
        };
        let key_id = key.id;
        node.properties.insert(index, key);

        let kind = if original.nullable {
            JoinKind::Left
        } else {
            JoinKind::Inner
        };
        for source in ctx.tracker.sources_targeting(owner) {
            ctx.tracker.add_join(
                source,
                owner,
                JoinedNode {
                    node: lookup,
                    kind,
                    on_demand: Some(key_id),
                },
            );
        }
        for (source, target) in ctx.tracker.retarget_filters(owner, property, lookup, value) {
            ctx.tracker.add_join(
                source,
                target,
                JoinedNode {
                    node: lookup,
                    kind: JoinKind::Inner,
                    on_demand: None,
                },
            );
        }
        log::debug!("{} now references lookup table {}", original.name, domain.name);
    }
    Ok(())
}

fn lookup_node(ctx: &mut Context, domain: &EnumDomain) -> Result<(NodeId, PropertyId), StructuralError> {
    let name = ctx.graph.unique_node_name(&domain.name);
    let node = ctx.graph.add_node(name.clone(), None);
    ctx.graph.add_surrogate_key(node)?;
    let value = ctx
        .graph
        .new_property("value", PropertyKind::Primitive(DataType::String))
        .not_null();
    let value_id = value.id;
    let target = ctx.graph.try_node_mut(node)?;
    target.properties.push(value);
    target.lookup_values = domain.literals.clone();
    ctx.tracker.add_derived(node, TraceOrigin::Lookup(name));
    Ok((node, value_id))
}

#[cfg(test)]
mod tests {
    use crate::options::{MappingStrategy, Options};
    use crate::sql::Dialect;
    use crate::tracker::{FilterValue, JoinKind};
    use crate::transform::transform_source;

    fn lookup_options(strategy: MappingStrategy) -> Options {
        Options {
            mapping_strategy: strategy,
            target_dialect: Dialect::Postgres,
            enum_as_lookup_table: true,
            ..Options::default()
        }
    }

    #[test]
    fn test_inline_enumeration_stays() {
        let result = transform_source(
            "enum Color { Red, Green }\nkind Car { color Color 1 }",
            &Options::default(),
        )
        .unwrap();
        let car = result.graph.node_by_name("Car").unwrap();
        assert!(car.property_by_name("color").unwrap().enumeration().is_some());
        assert_eq!(result.graph.node_count(), 1);
    }

    #[test]
    fn test_relation_hint_goes_to_key_holder() {
        let result = transform_source(
            r#"
            enum Role { Lead, Member }
            kind Team
            kind Person
            rel { Team 1 -- * Person : "staffs" with Role }
            "#,
            &Options::default(),
        )
        .unwrap();
        let person = result.graph.node_by_name("Person").unwrap();
        let role = person.property_by_name("role").unwrap();
        assert!(!role.nullable);
        assert!(person.property_by_name("team_id").is_some());
    }

    #[test]
    fn test_lookup_table_replaces_column() {
        let result = transform_source(
            "enum Color { Red, Green }\nkind Car { color Color 0..1 }",
            &lookup_options(MappingStrategy::ClassPerTable),
        )
        .unwrap();
        let car = result.graph.node_by_name("Car").unwrap();
        let lookup = result.graph.node_by_name("Color").unwrap();
        assert_eq!(lookup.lookup_values, vec!["Red", "Green"]);
        assert!(lookup.property_by_name("value").is_some());
        let key = car.property_by_name("color_id").unwrap();
        assert_eq!(key.foreign_key.map(|fk| fk.node), Some(lookup.id));
        assert!(key.nullable);

        let traced = result.tracker.traced_node(car.id, car.id).unwrap();
        assert_eq!(traced.joins.len(), 1);
        assert_eq!(traced.joins[0].kind, JoinKind::Left);
        assert_eq!(traced.joins[0].on_demand, Some(key.id));
        assert!(result.tracker.tracer(lookup.id).is_some());
    }

    #[test]
    fn test_lookup_per_same_named_set() {
        let result = transform_source(
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
            &lookup_options(MappingStrategy::KindPerTable),
        )
        .unwrap();
        let a_status = result.graph.node_by_name("a_status").unwrap();
        let b_status = result.graph.node_by_name("b_status").unwrap();
        assert_eq!(a_status.lookup_values, vec!["A1", "A2"]);
        assert_eq!(b_status.lookup_values, vec!["B1", "B2"]);

        let b = result.graph.node_by_name("B").unwrap();
        let key = b.property_by_name("status_id").unwrap();
        assert_eq!(key.foreign_key.map(|fk| fk.node), Some(b_status.id));
        let traced = &result.tracker.class_tracer("B1").unwrap().targets[&b.id];
        assert_eq!(traced.filters[0].node, b_status.id);
        assert_eq!(traced.filters[0].value, FilterValue::Literal("B1".into()));
    }

    #[test]
    fn test_lookup_discriminator_filters_move() {
        let result = transform_source(
            r#"
            kind Organization
            subkind ForProfit
            subkind NonProfit
            genset Organization disjoint complete { ForProfit, NonProfit }
            "#,
            &lookup_options(MappingStrategy::KindPerTable),
        )
        .unwrap();
        let organization = result.graph.node_by_name("Organization").unwrap();
        let lookup = result.graph.node_by_name("organization_type").unwrap();
        let value = lookup.property_by_name("value").unwrap();
        assert!(organization.property_by_name("organization_type_id").is_some());

        let traced = result.tracker.class_tracer("ForProfit").unwrap().targets[&organization.id].clone();
        assert_eq!(traced.filters[0].node, lookup.id);
        assert_eq!(traced.filters[0].property, value.id);
        assert_eq!(traced.filters[0].value, FilterValue::Literal("ForProfit".into()));
        assert!(traced.mandatory_joins().any(|j| j.node == lookup.id && j.kind == JoinKind::Inner));
    }
}
