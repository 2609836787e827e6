//! Traceability from original ontology classes to the physical nodes that
//! store them.
//!
//! Each original class owns a [`Tracer`]. A tracer maps every node the class
//! currently lives in to a [`TracedNode`]: the joins and row filters needed to
//! rebuild the class extension from that node. Every rewrite that merges,
//! splits or re-keys nodes goes through the methods here so the map never
//! points at a retired node.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::graph::{Graph, NodeId, PropertyId, Violation};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TraceOrigin {
    /// An ontology class
    Class(String),
    /// Link node created for a many-to-many relation
    Associative(String),
    /// Lookup node created for an enumeration
    Lookup(String),
}

impl TraceOrigin {
    pub fn name(&self) -> &str {
        match self {
            Self::Class(name) | Self::Associative(name) | Self::Lookup(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedNode {
    pub node: NodeId,
    pub kind: JoinKind,
    /// Only needed when this property is projected
    pub on_demand: Option<PropertyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FilterValue {
    Literal(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    /// The traced node itself or one of its joined nodes
    pub node: NodeId,
    pub property: PropertyId,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TracedNode {
    pub joins: Vec<JoinedNode>,
    pub filters: Vec<Filter>,
}

impl TracedNode {
    /// Joins that are always part of the reconstruction.
    pub fn mandatory_joins(&self) -> impl Iterator<Item = &JoinedNode> {
        self.joins.iter().filter(|j| j.on_demand.is_none())
    }

    pub fn joins_node(&self, node: NodeId) -> bool {
        self.joins.iter().any(|j| j.node == node)
    }

    fn absorb(&mut self, other: TracedNode) {
        for join in other.joins {
            if !self.joins.contains(&join) {
                self.joins.push(join);
            }
        }
        for filter in other.filters {
            if !self.filters.contains(&filter) {
                self.filters.push(filter);
            }
        }
    }

    fn replace_node(&mut self, from: NodeId, to: NodeId) {
        for join in &mut self.joins {
            if join.node == from {
                join.node = to;
            }
        }
        for filter in &mut self.filters {
            if filter.node == from {
                filter.node = to;
            }
        }
        let mut seen: Vec<JoinedNode> = Vec::new();
        self.joins.retain(|j| {
            if seen.contains(j) {
                false
            } else {
                seen.push(j.clone());
                true
            }
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Tracer {
    pub source: NodeId,
    pub origin: TraceOrigin,
    /// Original classes whose declared attributes this one inherits, itself first
    pub lineage: Vec<NodeId>,
    pub targets: BTreeMap<NodeId, TracedNode>,
}

impl Tracer {
    pub fn name(&self) -> &str {
        self.origin.name()
    }

    pub fn is_class(&self) -> bool {
        matches!(self.origin, TraceOrigin::Class(_))
    }

    pub fn inherits(&self, class: NodeId) -> bool {
        self.lineage.contains(&class)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Tracker {
    tracers: BTreeMap<NodeId, Tracer>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity entry for an original class: it lives in its own node.
    pub fn seed(&mut self, class: NodeId, name: impl Into<String>, lineage: Vec<NodeId>) {
        self.insert(class, TraceOrigin::Class(name.into()), lineage);
    }

    /// Entry for a node with no ontology counterpart.
    pub fn add_derived(&mut self, node: NodeId, origin: TraceOrigin) {
        self.insert(node, origin, vec![node]);
    }

    fn insert(&mut self, node: NodeId, origin: TraceOrigin, lineage: Vec<NodeId>) {
        let targets = BTreeMap::from([(node, TracedNode::default())]);
        self.tracers.insert(
            node,
            Tracer {
                source: node,
                origin,
                lineage,
                targets,
            },
        );
    }

    pub fn tracer(&self, source: NodeId) -> Option<&Tracer> {
        self.tracers.get(&source)
    }

    pub fn tracers(&self) -> impl Iterator<Item = &Tracer> {
        self.tracers.values()
    }

    pub fn tracers_mut(&mut self) -> impl Iterator<Item = &mut Tracer> {
        self.tracers.values_mut()
    }

    pub fn class_tracer(&self, name: &str) -> Option<&Tracer> {
        self.tracers()
            .find(|t| matches!(&t.origin, TraceOrigin::Class(n) if n == name))
    }

    pub fn len(&self) -> usize {
        self.tracers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracers.is_empty()
    }

    /// Sources of every tracer that currently lives in `node`.
    pub fn sources_targeting(&self, node: NodeId) -> Vec<NodeId> {
        self.tracers()
            .filter(|t| t.targets.contains_key(&node))
            .map(|t| t.source)
            .collect()
    }

    pub fn traced_node(&self, source: NodeId, target: NodeId) -> Option<&TracedNode> {
        self.tracers.get(&source).and_then(|t| t.targets.get(&target))
    }

    pub fn traced_node_mut(&mut self, source: NodeId, target: NodeId) -> Option<&mut TracedNode> {
        self.tracers.get_mut(&source).and_then(|t| t.targets.get_mut(&target))
    }

    /// `from` was merged into `to`: every entry, join and filter follows it.
    pub fn redirect(&mut self, from: NodeId, to: NodeId) {
        for tracer in self.tracers.values_mut() {
            if let Some(mut traced) = tracer.targets.remove(&from) {
                traced.replace_node(from, to);
                traced.joins.retain(|j| j.node != to);
                match tracer.targets.get_mut(&to) {
                    Some(existing) => existing.absorb(traced),
                    None => {
                        tracer.targets.insert(to, traced);
                    }
                }
            }
            for (target, traced) in tracer.targets.iter_mut() {
                traced.replace_node(from, to);
                traced.joins.retain(|j| j.node != *target);
            }
        }
    }

    /// `from` was copied into each node of `copies` and then removed. Filters
    /// follow the properties through `property_maps`, keyed by copy.
    pub fn split(
        &mut self,
        from: NodeId,
        copies: &[NodeId],
        property_maps: &HashMap<NodeId, HashMap<PropertyId, PropertyId>>,
    ) {
        for tracer in self.tracers.values_mut() {
            if let Some(traced) = tracer.targets.remove(&from) {
                for copy in copies {
                    let mut cloned = traced.clone();
                    if let Some(map) = property_maps.get(copy) {
                        for filter in &mut cloned.filters {
                            if filter.node == from {
                                if let Some(p) = map.get(&filter.property) {
                                    filter.property = *p;
                                }
                            }
                        }
                    }
                    cloned.replace_node(from, *copy);
                    match tracer.targets.get_mut(copy) {
                        Some(existing) => existing.absorb(cloned),
                        None => {
                            tracer.targets.insert(*copy, cloned);
                        }
                    }
                }
            }

            for traced in tracer.targets.values_mut() {
                if !traced.joins_node(from) {
                    continue;
                }
                let mut joins = Vec::with_capacity(traced.joins.len() + copies.len());
                for join in traced.joins.drain(..) {
                    if join.node == from {
                        joins.extend(copies.iter().map(|c| JoinedNode {
                            node: *c,
                            kind: JoinKind::Left,
                            on_demand: join.on_demand,
                        }));
                    } else {
                        joins.push(join);
                    }
                }
                traced.joins = joins;
            }
        }
    }

    pub fn add_filter(&mut self, source: NodeId, target: NodeId, filter: Filter) {
        if let Some(traced) = self.traced_node_mut(source, target) {
            if !traced.filters.contains(&filter) {
                traced.filters.push(filter);
            }
        }
    }

    /// Append a join, or place it ahead of joins that depend on the same
    /// on-demand property so join order stays valid.
    pub fn add_join(&mut self, source: NodeId, target: NodeId, join: JoinedNode) {
        let Some(traced) = self.traced_node_mut(source, target) else {
            return;
        };
        if traced.joins.contains(&join) {
            return;
        }
        let position = join
            .on_demand
            .and_then(|p| traced.joins.iter().position(|j| j.on_demand == Some(p)));
        match position {
            Some(index) => traced.joins.insert(index, join),
            None => traced.joins.push(join),
        }
    }

    /// Point filters on `(node, property)` at `(to_node, to_property)`.
    /// Returns the `(source, target)` pairs whose filters moved.
    pub fn retarget_filters(
        &mut self,
        node: NodeId,
        property: PropertyId,
        to_node: NodeId,
        to_property: PropertyId,
    ) -> Vec<(NodeId, NodeId)> {
        let mut moved = Vec::new();
        for tracer in self.tracers.values_mut() {
            for (target, traced) in tracer.targets.iter_mut() {
                let mut touched = false;
                for filter in &mut traced.filters {
                    if filter.node == node && filter.property == property {
                        filter.node = to_node;
                        filter.property = to_property;
                        touched = true;
                    }
                }
                if touched {
                    moved.push((tracer.source, *target));
                }
            }
        }
        moved
    }

    /// Rename enumeration literals used by filters on `property`.
    pub fn rename_filter_literals(
        &mut self,
        node: NodeId,
        property: PropertyId,
        renames: &HashMap<String, String>,
    ) {
        for tracer in self.tracers.values_mut() {
            for traced in tracer.targets.values_mut() {
                for filter in &mut traced.filters {
                    if filter.node != node || filter.property != property {
                        continue;
                    }
                    if let FilterValue::Literal(value) = &mut filter.value {
                        if let Some(renamed) = renames.get(value.as_str()) {
                            *value = renamed.clone();
                        }
                    }
                }
            }
        }
    }

    /// Every broken traceability invariant against `graph`.
    pub fn check_integrity(&self, graph: &Graph) -> Vec<Violation> {
        let mut violations = Vec::new();

        for tracer in self.tracers() {
            let name = tracer.name().to_string();
            if !tracer.targets.keys().any(|n| graph.contains_node(*n)) {
                violations.push(Violation::OrphanTracer {
                    tracer: name.clone(),
                });
            }
            for (target, traced) in &tracer.targets {
                if !graph.contains_node(*target) {
                    violations.push(Violation::DeadTarget {
                        tracer: name.clone(),
                        node: *target,
                    });
                }
                for join in &traced.joins {
                    if !graph.contains_node(join.node) {
                        violations.push(Violation::DeadJoin {
                            tracer: name.clone(),
                            node: join.node,
                        });
                    }
                }
                for filter in &traced.filters {
                    let live = graph
                        .node(filter.node)
                        .is_some_and(|n| n.property(filter.property).is_some());
                    if !live {
                        violations.push(Violation::DeadFilter {
                            tracer: name.clone(),
                            node: filter.node,
                            property: filter.property,
                        });
                    }
                }
            }
        }

        violations
    }
}
