//! Entity-relationship graph the strategies and resolvers rewrite.
//!
//! Nodes and associations live in arenas addressed by integer ids. Retiring a
//! node empties its slot for good, so a stale id can always be detected by
//! [`Graph::check_integrity`] instead of silently pointing at another node.

mod association;
mod cardinality;
mod node;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use association::{
    AssociationKind, Generalization, GeneralizationSet, GraphAssociation, Relation,
};
pub use cardinality::{Cardinality, UninformedPolicy};
pub use node::{DataType, EnumDomain, ForeignKey, Node, NodeProperty, PropertyKind};

use crate::ast::Stereotype;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssociationId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for AssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    #[error("Node {0} does not exist")]
    MissingNode(NodeId),
    #[error("Association {0} does not exist")]
    MissingAssociation(AssociationId),
    #[error("Property {property} does not exist on node {node}")]
    MissingProperty { node: NodeId, property: PropertyId },
    #[error("Node {node} has no primary key")]
    MissingPrimaryKey { node: NodeId },
    #[error("Node {node} is still referenced by {by}")]
    NodeStillReferenced { node: NodeId, by: String },
    #[error("Relation {0} has both ends many and cannot hold a foreign key")]
    UnresolvedManyToMany(String),
    #[error("Association {0} was never turned into a key or table")]
    UnresolvedAssociation(String),
}

/// A broken graph or tracker invariant found by an integrity check.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("association {association} points at missing node {node}")]
    DanglingEndpoint { association: AssociationId, node: NodeId },
    #[error("association {association} is not listed by its endpoint {node}")]
    UnlinkedAssociation { association: AssociationId, node: NodeId },
    #[error("node {node} lists association {association} which does not touch it")]
    StaleContainerEntry { node: NodeId, association: AssociationId },
    #[error("property {property} on node {node} references missing node {target}")]
    DanglingForeignKey { node: NodeId, property: PropertyId, target: NodeId },
    #[error("property {property} on node {node} cites missing association {association}")]
    MissingKeyAssociation { node: NodeId, property: PropertyId, association: AssociationId },
    #[error("node {node} has {count} primary keys")]
    PrimaryKeyCount { node: NodeId, count: usize },
    #[error("tracer for {tracer} has no live target")]
    OrphanTracer { tracer: String },
    #[error("tracer for {tracer} targets missing node {node}")]
    DeadTarget { tracer: String, node: NodeId },
    #[error("tracer for {tracer} joins missing node {node}")]
    DeadJoin { tracer: String, node: NodeId },
    #[error("tracer for {tracer} filters on missing property {property} of node {node}")]
    DeadFilter { tracer: String, node: NodeId, property: PropertyId },
}

/// Name of the surrogate key column of a table.
pub fn key_column_name(table: &str) -> String {
    format!("{}_id", table.to_lowercase())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    associations: Vec<Option<GraphAssociation>>,
    next_property: u32,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, stereotype: Option<Stereotype>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node::new(id, name.into(), stereotype)));
        id
    }

    /// A detached property carrying a fresh id.
    pub fn new_property(&mut self, name: impl Into<String>, kind: PropertyKind) -> NodeProperty {
        let id = PropertyId(self.next_property);
        self.next_property += 1;
        NodeProperty::new(id, name, kind)
    }

    /// Give `node` an integer surrogate primary key in first position.
    pub fn add_surrogate_key(&mut self, node: NodeId) -> Result<PropertyId, StructuralError> {
        let name = key_column_name(&self.try_node(node)?.name);
        let key = self
            .new_property(name, PropertyKind::Primitive(DataType::Integer))
            .primary_key();
        let id = key.id;
        let target = self.try_node_mut(node)?;
        let name = target.unique_property_name(&key.name);
        target.properties.insert(0, NodeProperty { name, ..key });
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn try_node(&self, id: NodeId) -> Result<&Node, StructuralError> {
        self.node(id).ok_or(StructuralError::MissingNode(id))
    }

    pub fn try_node_mut(&mut self, id: NodeId) -> Result<&mut Node, StructuralError> {
        self.node_mut(id).ok_or(StructuralError::MissingNode(id))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(|n| n.id).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes().find(|n| n.name == name)
    }

    /// `base`, or `base_2`, `base_3`... whichever no live node uses.
    pub fn unique_node_name(&self, base: &str) -> String {
        if self.node_by_name(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.node_by_name(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// `base`, or `base_2`, `base_3`... whichever no enumeration domain uses.
    /// Lookup tables and database enum types are keyed by domain name, so
    /// every distinct domain needs its own.
    pub fn unique_domain_name(&self, base: &str) -> String {
        let taken: HashSet<&str> = self
            .nodes()
            .flat_map(|n| n.properties.iter().filter_map(|p| p.enumeration()))
            .chain(
                self.associations()
                    .filter_map(|a| a.as_relation().and_then(|r| r.enumeration.as_ref())),
            )
            .map(|d| d.name.as_str())
            .collect();
        if !taken.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn property(&self, node: NodeId, property: PropertyId) -> Result<&NodeProperty, StructuralError> {
        self.try_node(node)?
            .property(property)
            .ok_or(StructuralError::MissingProperty { node, property })
    }

    pub fn add_association(
        &mut self,
        name: Option<String>,
        kind: AssociationKind,
    ) -> Result<AssociationId, StructuralError> {
        let id = AssociationId(self.associations.len() as u32);
        self.add_association_like(GraphAssociation::new(id, name, kind))
    }

    /// Insert a copy of `template` under a fresh id.
    pub fn add_association_like(
        &mut self,
        template: GraphAssociation,
    ) -> Result<AssociationId, StructuralError> {
        let id = AssociationId(self.associations.len() as u32);
        let association = GraphAssociation { id, ..template };
        self.link(&association)?;
        self.associations.push(Some(association));
        Ok(id)
    }

    pub fn association(&self, id: AssociationId) -> Option<&GraphAssociation> {
        self.associations.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn try_association(&self, id: AssociationId) -> Result<&GraphAssociation, StructuralError> {
        self.association(id).ok_or(StructuralError::MissingAssociation(id))
    }

    pub fn associations(&self) -> impl Iterator<Item = &GraphAssociation> {
        self.associations.iter().flatten()
    }

    pub fn association_ids(&self) -> Vec<AssociationId> {
        self.associations().map(|a| a.id).collect()
    }

    /// Swap in a new version of an association, keeping node containers in
    /// step with its endpoints.
    pub fn replace_association(
        &mut self,
        id: AssociationId,
        updated: GraphAssociation,
    ) -> Result<(), StructuralError> {
        let updated = GraphAssociation { id, ..updated };
        for node in updated.endpoints() {
            if !self.contains_node(node) {
                return Err(StructuralError::MissingNode(node));
            }
        }
        let previous = self.remove_association(id)?;
        log::trace!("rewired {} into {}", previous.label(), updated.label());
        self.link(&updated)?;
        self.associations[id.0 as usize] = Some(updated);
        Ok(())
    }

    /// Edit an association in place. Endpoint changes are re-linked.
    pub fn update_association(
        &mut self,
        id: AssociationId,
        edit: impl FnOnce(&mut GraphAssociation),
    ) -> Result<(), StructuralError> {
        let mut updated = self.try_association(id)?.clone();
        edit(&mut updated);
        self.replace_association(id, updated)
    }

    pub fn mark_resolved(&mut self, id: AssociationId) -> Result<(), StructuralError> {
        match self.associations.get_mut(id.0 as usize).and_then(Option::as_mut) {
            Some(association) => {
                association.resolved = true;
                Ok(())
            }
            None => Err(StructuralError::MissingAssociation(id)),
        }
    }

    pub fn remove_association(&mut self, id: AssociationId) -> Result<GraphAssociation, StructuralError> {
        let association = self
            .associations
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(StructuralError::MissingAssociation(id))?;
        for node in association.endpoints() {
            if let Some(node) = self.node_mut(node) {
                node.associations.retain(|a| *a != id);
            }
        }
        Ok(association)
    }

    /// Remove a node that nothing references any more.
    pub fn retire_node(&mut self, id: NodeId) -> Result<Node, StructuralError> {
        let node = self.try_node(id)?;
        if let Some(association) = node.associations.first() {
            return Err(StructuralError::NodeStillReferenced {
                node: id,
                by: format!("association {}", association),
            });
        }
        if let Some(holder) = self
            .nodes()
            .find(|n| n.id != id && n.foreign_keys().any(|p| p.foreign_key.map(|fk| fk.node) == Some(id)))
        {
            return Err(StructuralError::NodeStillReferenced {
                node: id,
                by: format!("a foreign key of {}", holder.name),
            });
        }
        self.nodes[id.0 as usize]
            .take()
            .ok_or(StructuralError::MissingNode(id))
    }

    fn link(&mut self, association: &GraphAssociation) -> Result<(), StructuralError> {
        let endpoints = association.endpoints();
        for node in &endpoints {
            if !self.contains_node(*node) {
                return Err(StructuralError::MissingNode(*node));
            }
        }
        for node in endpoints {
            if let Some(node) = self.node_mut(node) {
                if !node.associations.contains(&association.id) {
                    node.associations.push(association.id);
                }
            }
        }
        Ok(())
    }

    /// Every broken structural invariant, empty when the graph is sound.
    pub fn check_integrity(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for association in self.associations() {
            for node in association.endpoints() {
                match self.node(node) {
                    None => violations.push(Violation::DanglingEndpoint {
                        association: association.id,
                        node,
                    }),
                    Some(n) if !n.associations.contains(&association.id) => {
                        violations.push(Violation::UnlinkedAssociation {
                            association: association.id,
                            node,
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for node in self.nodes() {
            for association in &node.associations {
                let touches = self.association(*association).is_some_and(|a| a.touches(node.id));
                if !touches {
                    violations.push(Violation::StaleContainerEntry {
                        node: node.id,
                        association: *association,
                    });
                }
            }

            let count = node.properties.iter().filter(|p| p.primary_key).count();
            if count != 1 {
                violations.push(Violation::PrimaryKeyCount { node: node.id, count });
            }

            for property in &node.properties {
                let Some(fk) = property.foreign_key else {
                    continue;
                };
                if !self.contains_node(fk.node) {
                    violations.push(Violation::DanglingForeignKey {
                        node: node.id,
                        property: property.id,
                        target: fk.node,
                    });
                }
                if self.association(fk.association).is_none() {
                    violations.push(Violation::MissingKeyAssociation {
                        node: node.id,
                        property: property.id,
                        association: fk.association,
                    });
                }
            }
        }

        violations
    }
}
