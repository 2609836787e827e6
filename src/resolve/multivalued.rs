//! Move multivalued properties into child tables.

use crate::graph::{key_column_name, NodeId, PropertyId, StructuralError};
use crate::tracker::{JoinKind, JoinedNode};
use crate::transform::Context;

use super::many_to_many::reference;

pub fn resolve(ctx: &mut Context) -> Result<(), StructuralError> {
    let pending: Vec<(NodeId, PropertyId)> = ctx
        .graph
        .nodes()
        .flat_map(|n| n.properties.iter().filter(|p| p.multivalued).map(move |p| (n.id, p.id)))
        .collect();

    for (owner, property) in pending {
        extract(ctx, owner, property)?;
    }
    Ok(())
}

fn extract(ctx: &mut Context, owner: NodeId, property: PropertyId) -> Result<NodeId, StructuralError> {
    let owner_name = ctx.graph.try_node(owner)?.name.clone();
    let mut moved = ctx
        .graph
        .try_node_mut(owner)?
        .remove_property(property)
        .ok_or(StructuralError::MissingProperty { node: owner, property })?;

    // A lookup key is named after its attribute plus `_id`.
    let attribute = match moved.foreign_key.and_then(|fk| ctx.graph.node(fk.node)) {
        Some(lookup) if lookup.is_lookup() => {
            moved.name.strip_suffix("_id").unwrap_or(&moved.name).to_string()
        }
        _ => moved.name.clone(),
    };
    let name = ctx.graph.unique_node_name(&format!("{}_{}", owner_name, attribute));
    let child = ctx.graph.add_node(name.clone(), None);
    ctx.graph.add_surrogate_key(child)?;
    reference(&mut ctx.graph, child, owner, &key_column_name(&owner_name), None)?;

    // A lookup reference travels with its column.
    if let Some(fk) = moved.foreign_key {
        let association = ctx.graph.try_association(fk.association)?;
        let rewired = association.with_endpoint(owner, child);
        ctx.graph.replace_association(fk.association, rewired)?;
    }

    moved.multivalued = false;
    moved.nullable = false;
    let source_class = moved.source_class;
    let node = ctx.graph.try_node_mut(child)?;
    moved.name = node.unique_property_name(&moved.name);
    node.properties.push(moved);

    let sources: Vec<NodeId> = ctx
        .tracker
        .sources_targeting(owner)
        .into_iter()
        .filter(|s| {
            source_class.is_none_or(|class| {
                ctx.tracker.tracer(*s).is_some_and(|t| t.inherits(class))
            })
        })
        .collect();
    for source in sources {
        ctx.tracker.add_join(
            source,
            owner,
            JoinedNode {
                node: child,
                kind: JoinKind::Inner,
                on_demand: Some(property),
            },
        );
    }
    log::debug!("extracted multivalued {} of {} into {}", property, owner_name, name);
    Ok(child)
}
