//! Typed associations between nodes.

use std::collections::HashMap;

use serde::Serialize;

use super::{AssociationId, Cardinality, EnumDomain, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphAssociation {
    pub id: AssociationId,
    pub name: Option<String>,
    /// Already turned into a table, key or join
    pub resolved: bool,
    /// Name of the node that was removed while this association was rewired
    pub removed_node_name: Option<String>,
    pub kind: AssociationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AssociationKind {
    Relation(Relation),
    Generalization(Generalization),
    GeneralizationSet(GeneralizationSet),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub source: NodeId,
    pub source_cardinality: Cardinality,
    pub target: NodeId,
    pub target_cardinality: Cardinality,
    /// Enumeration attached to the relation
    pub enumeration: Option<EnumDomain>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generalization {
    pub general: NodeId,
    pub specific: NodeId,
    pub set: Option<AssociationId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralizationSet {
    pub general: NodeId,
    pub specifics: Vec<NodeId>,
    pub disjoint: bool,
    pub complete: bool,
}

impl Relation {
    /// Cardinality written at `node`'s end, if the relation touches it.
    pub fn cardinality_at(&self, node: NodeId) -> Option<Cardinality> {
        if self.source == node {
            Some(self.source_cardinality)
        } else if self.target == node {
            Some(self.target_cardinality)
        } else {
            None
        }
    }

    pub fn is_reflexive(&self) -> bool {
        self.source == self.target
    }
}

impl GraphAssociation {
    pub fn new(id: AssociationId, name: Option<String>, kind: AssociationKind) -> Self {
        Self {
            id,
            name,
            resolved: false,
            removed_node_name: None,
            kind,
        }
    }

    /// Every node this association touches, without duplicates.
    pub fn endpoints(&self) -> Vec<NodeId> {
        let mut nodes = match &self.kind {
            AssociationKind::Relation(r) => vec![r.source, r.target],
            AssociationKind::Generalization(g) => vec![g.general, g.specific],
            AssociationKind::GeneralizationSet(s) => {
                let mut nodes = vec![s.general];
                nodes.extend(s.specifics.iter().copied());
                nodes
            }
        };
        let mut seen = Vec::with_capacity(nodes.len());
        nodes.retain(|n| {
            if seen.contains(n) {
                false
            } else {
                seen.push(*n);
                true
            }
        });
        nodes
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.endpoints().contains(&node)
    }

    /// A copy of this association with every endpoint passed through `mapping`.
    /// Nodes absent from the mapping are kept as they are.
    pub fn remapped(&self, mapping: &HashMap<NodeId, NodeId>) -> Self {
        let map = |n: NodeId| mapping.get(&n).copied().unwrap_or(n);
        let kind = match &self.kind {
            AssociationKind::Relation(r) => AssociationKind::Relation(Relation {
                source: map(r.source),
                target: map(r.target),
                ..r.clone()
            }),
            AssociationKind::Generalization(g) => AssociationKind::Generalization(Generalization {
                general: map(g.general),
                specific: map(g.specific),
                set: g.set,
            }),
            AssociationKind::GeneralizationSet(s) => {
                let mut specifics: Vec<NodeId> = Vec::with_capacity(s.specifics.len());
                for specific in s.specifics.iter().copied().map(map) {
                    if !specifics.contains(&specific) {
                        specifics.push(specific);
                    }
                }
                AssociationKind::GeneralizationSet(GeneralizationSet {
                    general: map(s.general),
                    specifics,
                    disjoint: s.disjoint,
                    complete: s.complete,
                })
            }
        };
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Shorthand for remapping a single node.
    pub fn with_endpoint(&self, from: NodeId, to: NodeId) -> Self {
        self.remapped(&HashMap::from([(from, to)]))
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match &self.kind {
            AssociationKind::Relation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_relation_mut(&mut self) -> Option<&mut Relation> {
        match &mut self.kind {
            AssociationKind::Relation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_generalization(&self) -> Option<&Generalization> {
        match &self.kind {
            AssociationKind::Generalization(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_generalization_set(&self) -> Option<&GeneralizationSet> {
        match &self.kind {
            AssociationKind::GeneralizationSet(s) => Some(s),
            _ => None,
        }
    }

    /// A generalization whose general and specific coincide after a rewire.
    pub fn is_degenerate(&self) -> bool {
        match &self.kind {
            AssociationKind::Relation(_) => false,
            AssociationKind::Generalization(g) => g.general == g.specific,
            AssociationKind::GeneralizationSet(s) => {
                s.specifics.is_empty() || s.specifics.contains(&s.general)
            }
        }
    }

    /// Label used in logs and error messages.
    pub fn label(&self) -> String {
        match (&self.name, &self.kind) {
            (Some(name), _) => format!("{} ({})", name, self.id),
            (None, AssociationKind::Relation(r)) => {
                format!("{} {} -- {} {}", r.source, r.source_cardinality.as_str(), r.target_cardinality.as_str(), r.target)
            }
            (None, AssociationKind::Generalization(g)) => format!("{} -> {}", g.specific, g.general),
            (None, AssociationKind::GeneralizationSet(s)) => format!("set over {}", s.general),
        }
    }
}
