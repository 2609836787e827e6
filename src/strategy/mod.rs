//! Hierarchy-merging rewrites selected by the mapping strategy.

mod flattening;
mod lifting;

use crate::graph::{AssociationId, Generalization, Graph, NodeId, StructuralError};
use crate::options::MappingStrategy;
use crate::transform::Context;

pub use flattening::flatten;
pub use lifting::lift;

/// Run the configured strategy over the freshly built graph.
pub fn apply(ctx: &mut Context) -> Result<(), StructuralError> {
    match ctx.options.mapping_strategy {
        MappingStrategy::ClassPerTable => {
            log::info!("class-per-table: hierarchy kept, generalizations become foreign keys");
            Ok(())
        }
        MappingStrategy::KindPerTable => {
            log::info!("kind-per-table: flattening non-sortals, lifting sortals");
            flatten(ctx, |graph, node| {
                graph
                    .node(node)
                    .and_then(|n| n.stereotype)
                    .is_some_and(|s| s.is_non_sortal())
            })?;
            lift(ctx)
        }
        MappingStrategy::ConcreteClassPerTable => {
            log::info!("concrete-class-per-table: flattening every general");
            flatten(ctx, |_, _| true)
        }
    }
}

/// Every generalization still in the graph, in id order.
pub(crate) fn generalizations(graph: &Graph) -> Vec<(AssociationId, Generalization)> {
    graph
        .associations()
        .filter_map(|a| a.as_generalization().map(|g| (a.id, g.clone())))
        .collect()
}

pub(crate) fn specifics_of(graph: &Graph, general: NodeId) -> Vec<(AssociationId, NodeId)> {
    generalizations(graph)
        .into_iter()
        .filter(|(_, g)| g.general == general)
        .map(|(id, g)| (id, g.specific))
        .collect()
}

pub(crate) fn generals_of(graph: &Graph, specific: NodeId) -> Vec<(AssociationId, NodeId)> {
    generalizations(graph)
        .into_iter()
        .filter(|(_, g)| g.specific == specific)
        .map(|(id, g)| (id, g.general))
        .collect()
}

/// Whether `ancestor` is `node` or reachable from it through generals.
pub(crate) fn is_ancestor(graph: &Graph, ancestor: NodeId, node: NodeId) -> bool {
    let mut seen = Vec::new();
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
        if current == ancestor {
            return true;
        }
        if seen.contains(&current) {
            continue;
        }
        seen.push(current);
        pending.extend(generals_of(graph, current).into_iter().map(|(_, g)| g));
    }
    false
}

/// Merge same-named relations between the same ends of `node` into one,
/// keeping the weaker cardinality on each end.
pub(crate) fn unify_relations(graph: &mut Graph, node: NodeId) -> Result<(), StructuralError> {
    let ids: Vec<AssociationId> = graph.try_node(node)?.associations().to_vec();
    let mut kept: Vec<AssociationId> = Vec::new();

    for id in ids {
        let candidate = graph.try_association(id)?;
        let (Some(relation), Some(name)) = (candidate.as_relation(), candidate.name.clone()) else {
            continue;
        };
        if candidate.resolved {
            continue;
        }
        let relation = relation.clone();

        let twin = kept.iter().copied().find(|k| {
            graph.association(*k).is_some_and(|a| {
                a.name.as_deref() == Some(name.as_str())
                    && a.as_relation().is_some_and(|r| {
                        r.source == relation.source && r.target == relation.target
                    })
            })
        });

        match twin {
            Some(twin) => {
                graph.update_association(twin, |a| {
                    if let Some(r) = a.as_relation_mut() {
                        r.source_cardinality = r.source_cardinality.weaker(relation.source_cardinality);
                        r.target_cardinality = r.target_cardinality.weaker(relation.target_cardinality);
                        if r.enumeration.is_none() {
                            r.enumeration = relation.enumeration.clone();
                        }
                    }
                })?;
                graph.remove_association(id)?;
                log::debug!("unified relation {} on {}", name, node);
            }
            None => kept.push(id),
        }
    }
    Ok(())
}
