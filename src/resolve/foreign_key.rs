//! Turn remaining generalizations and relations into foreign keys.

use super::{key_name, place_key};
use crate::graph::{
    key_column_name, AssociationId, DataType, Generalization, NodeId, NodeProperty, PropertyKind,
    StructuralError,
};
use crate::tracker::{JoinKind, JoinedNode};
use crate::transform::Context;

pub fn resolve(ctx: &mut Context) -> Result<(), StructuralError> {
    resolve_generalizations(ctx)?;

    let ids = ctx.graph.association_ids();
    for id in ids {
        let association = ctx.graph.try_association(id)?;
        if association.resolved {
            continue;
        }
        if association.as_generalization_set().is_some() {
            ctx.graph.mark_resolved(id)?;
        } else if association.as_relation().is_some() {
            resolve_relation(ctx, id)?;
        }
    }
    Ok(())
}

/// Generalizations left by class-per-table, taken top-down so the joins of a
/// general are complete before its specifics copy them.
fn resolve_generalizations(ctx: &mut Context) -> Result<(), StructuralError> {
    loop {
        let pending: Vec<(AssociationId, Generalization)> = ctx
            .graph
            .associations()
            .filter(|a| !a.resolved)
            .filter_map(|a| a.as_generalization().map(|g| (a.id, g.clone())))
            .collect();
        let next = pending.iter().find(|(_, g)| {
            !pending.iter().any(|(_, other)| other.specific == g.general)
        });
        let Some((id, generalization)) = next.cloned() else {
            break;
        };
        key_to_general(ctx, id, &generalization)?;
        ctx.graph.mark_resolved(id)?;
    }
    Ok(())
}

fn key_to_general(
    ctx: &mut Context,
    id: AssociationId,
    generalization: &Generalization,
) -> Result<(), StructuralError> {
    let general = generalization.general;
    let specific = generalization.specific;
    let column = key_column_name(&ctx.graph.try_node(general)?.name);
    let key = ctx
        .graph
        .new_property(String::new(), PropertyKind::Primitive(DataType::Integer))
        .not_null()
        .references(general, id);

    let node = ctx.graph.try_node_mut(specific)?;
    let surrogate = node
        .properties
        .iter()
        .position(|p| p.primary_key && p.foreign_key.is_none());
    match surrogate {
        Some(index) => {
            node.properties.remove(index);
            let name = node.unique_property_name(&column);
            node.properties.insert(0, NodeProperty { name, ..key }.primary_key());
        }
        None => {
            // A second general: the identity is already borrowed from the first.
            let name = node.unique_property_name(&column);
            node.properties.push(NodeProperty { name, ..key });
        }
    }

    let inherited: Vec<JoinedNode> = ctx
        .tracker
        .traced_node(general, general)
        .map(|t| t.mandatory_joins().cloned().collect())
        .unwrap_or_default();
    for source in ctx.tracker.sources_targeting(specific) {
        ctx.tracker.add_join(
            source,
            specific,
            JoinedNode {
                node: general,
                kind: JoinKind::Inner,
                on_demand: None,
            },
        );
        for join in &inherited {
            ctx.tracker.add_join(source, specific, join.clone());
        }
    }
    log::debug!("keyed {} to {}", specific, general);
    Ok(())
}

fn resolve_relation(ctx: &mut Context, id: AssociationId) -> Result<(), StructuralError> {
    let association = ctx.graph.try_association(id)?.clone();
    let placement = place_key(&association, ctx.options.uninformed_cardinality)?;
    let column = key_name(ctx, &association, placement.referenced)?;
    let reflexive = placement.holder == placement.referenced;

    let key = ctx
        .graph
        .new_property(String::new(), PropertyKind::Primitive(DataType::Integer))
        .nullable(placement.nullable)
        .references(placement.referenced, id);
    let node = ctx.graph.try_node_mut(placement.holder)?;
    let surrogate = node
        .properties
        .iter()
        .position(|p| p.primary_key && p.foreign_key.is_none());

    match surrogate {
        Some(index) if placement.one_to_one && !placement.nullable && !reflexive => {
            node.properties.remove(index);
            let name = node.unique_property_name(&column);
            node.properties
                .insert(0, NodeProperty { name, ..key }.primary_key());
        }
        _ => {
            let name = node.unique_property_name(&column);
            node.properties.push(NodeProperty { name, ..key });
        }
    }

    ctx.graph.mark_resolved(id)?;
    log::debug!(
        "placed key for {} on {}",
        association.label(),
        holder_name(ctx, placement.holder)
    );
    Ok(())
}

fn holder_name(ctx: &Context, node: NodeId) -> String {
    ctx.graph
        .node(node)
        .map(|n| n.name.clone())
        .unwrap_or_else(|| node.to_string())
}
