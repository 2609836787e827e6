//! Replace relations with two many ends by an associative node.

use super::{is_many_to_many, key_name};
use crate::graph::{
    AssociationId, AssociationKind, Cardinality, DataType, Graph, NodeId, PropertyKind, Relation,
    StructuralError,
};
use crate::tracker::TraceOrigin;
use crate::transform::Context;

pub fn resolve(ctx: &mut Context) -> Result<(), StructuralError> {
    let policy = ctx.options.uninformed_cardinality;
    let pending: Vec<AssociationId> = ctx
        .graph
        .associations()
        .filter(|a| !a.resolved)
        .filter(|a| a.as_relation().is_some_and(|r| is_many_to_many(r, policy)))
        .map(|a| a.id)
        .collect();

    for id in pending {
        link_node(ctx, id)?;
    }
    Ok(())
}

fn link_node(ctx: &mut Context, id: AssociationId) -> Result<NodeId, StructuralError> {
    let association = ctx.graph.try_association(id)?.clone();
    let Some(relation) = association.as_relation() else {
        return Err(StructuralError::MissingAssociation(id));
    };

    let base = match &association.name {
        Some(name) => name.clone(),
        None => format!(
            "{}_{}",
            ctx.graph.try_node(relation.source)?.name,
            ctx.graph.try_node(relation.target)?.name
        ),
    };
    let name = ctx.graph.unique_node_name(&base);
    let node = ctx.graph.add_node(name.clone(), None);
    ctx.graph.try_node_mut(node)?.associative_name = Some(base);
    ctx.graph.add_surrogate_key(node)?;

    for endpoint in [relation.source, relation.target] {
        let column = key_name(ctx, &association, endpoint)?;
        reference(&mut ctx.graph, node, endpoint, &column, association.name.clone())?;
    }

    if let Some(domain) = &relation.enumeration {
        let target = ctx.graph.try_node(node)?;
        let column = target.unique_property_name(&domain.name.to_lowercase());
        let property = ctx
            .graph
            .new_property(column, PropertyKind::Enumeration(domain.clone()))
            .not_null();
        ctx.graph.try_node_mut(node)?.properties.push(property);
    }

    ctx.graph.remove_association(id)?;
    ctx.tracker.add_derived(node, TraceOrigin::Associative(name.clone()));
    log::debug!("resolved many-to-many {} into node {}", association.label(), name);
    Ok(node)
}

/// Add a mandatory foreign key from `holder` to `referenced`, produced by a
/// fresh resolved relation.
pub(crate) fn reference(
    graph: &mut Graph,
    holder: NodeId,
    referenced: NodeId,
    column: &str,
    name: Option<String>,
) -> Result<(), StructuralError> {
    let relation = graph.add_association(
        name,
        AssociationKind::Relation(Relation {
            source: holder,
            source_cardinality: Cardinality::ZeroOrMany,
            target: referenced,
            target_cardinality: Cardinality::ExactlyOne,
            enumeration: None,
        }),
    )?;
    graph.mark_resolved(relation)?;

    let column = graph.try_node(holder)?.unique_property_name(column);
    let key = graph
        .new_property(column, PropertyKind::Primitive(DataType::Integer))
        .not_null()
        .references(referenced, relation);
    graph.try_node_mut(holder)?.properties.push(key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::options::{MappingStrategy, Options};
    use crate::transform::transform_source;

    #[test]
    fn test_reflexive_many_to_many() {
        let options = Options {
            mapping_strategy: MappingStrategy::ClassPerTable,
            ..Options::default()
        };
        let result = transform_source("kind Person\nrel { Person * -- * Person : \"knows\" }", &options)
            .unwrap();
        let link = result.graph.node_by_name("knows").unwrap();
        let names: Vec<_> = link.foreign_keys().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["person_id", "person_id_2"]);
    }

    #[test]
    fn test_unnamed_link_uses_endpoint_names() {
        let options = Options::default();
        let result = transform_source(
            "kind Student\nkind Course\nenum Grade { A, B }\nrel { Student 0..* -- 1..* Course with Grade }",
            &options,
        )
        .unwrap();
        let link = result.graph.node_by_name("Student_Course").unwrap();
        assert_eq!(link.foreign_keys().count(), 2);
        let grade = link.property_by_name("grade").unwrap();
        assert!(grade.enumeration().is_some());
        assert!(!grade.nullable);
    }
}
