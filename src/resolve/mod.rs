//! Constraint resolvers run after the strategy, in a fixed order.

mod enumeration;
mod foreign_key;
mod many_to_many;
mod multivalued;
mod naming;

use crate::graph::{
    key_column_name, Cardinality, GraphAssociation, NodeId, Relation, StructuralError,
    UninformedPolicy,
};
use crate::transform::Context;

pub use naming::{normalize, snake_case};

pub fn run(ctx: &mut Context) -> Result<(), StructuralError> {
    many_to_many::resolve(ctx)?;
    enumeration::resolve(ctx)?;
    foreign_key::resolve(ctx)?;
    multivalued::resolve(ctx)?;
    if ctx.options.standardize_names {
        normalize(ctx);
    }
    Ok(())
}

/// Where the foreign key of a relation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KeyPlacement {
    pub holder: NodeId,
    pub referenced: NodeId,
    pub nullable: bool,
    pub one_to_one: bool,
}

pub(crate) fn is_many_to_many(relation: &Relation, policy: UninformedPolicy) -> bool {
    relation.source_cardinality.is_many(policy) && relation.target_cardinality.is_many(policy)
}

/// Decide which end of `relation` receives the foreign key. The holder is
/// the end whose partner is single; between two single ends the partner
/// that is exactly one wins, then the target.
pub(crate) fn place_key(
    association: &GraphAssociation,
    policy: UninformedPolicy,
) -> Result<KeyPlacement, StructuralError> {
    let Some(relation) = association.as_relation() else {
        return Err(StructuralError::MissingAssociation(association.id));
    };
    let source_many = relation.source_cardinality.is_many(policy);
    let target_many = relation.target_cardinality.is_many(policy);

    let (holder, referenced, referenced_end) = match (source_many, target_many) {
        (true, true) => return Err(StructuralError::UnresolvedManyToMany(association.label())),
        (false, true) => (relation.target, relation.source, relation.source_cardinality),
        (true, false) => (relation.source, relation.target, relation.target_cardinality),
        (false, false) => {
            if relation.source_cardinality == Cardinality::ExactlyOne
                && relation.target_cardinality != Cardinality::ExactlyOne
            {
                (relation.target, relation.source, relation.source_cardinality)
            } else if relation.target_cardinality == Cardinality::ExactlyOne
                && relation.source_cardinality != Cardinality::ExactlyOne
            {
                (relation.source, relation.target, relation.target_cardinality)
            } else {
                (relation.target, relation.source, relation.source_cardinality)
            }
        }
    };

    Ok(KeyPlacement {
        holder,
        referenced,
        nullable: referenced_end.is_optional(),
        one_to_one: !source_many && !target_many,
    })
}

/// Column name for a key referencing `referenced`. A relation rewired away
/// from a removed class keeps that class's name when the class now lives in
/// the referenced node.
pub(crate) fn key_name(ctx: &Context, association: &GraphAssociation, referenced: NodeId) -> Result<String, StructuralError> {
    let referenced_name = &ctx.graph.try_node(referenced)?.name;
    let removed = association.removed_node_name.as_deref().filter(|removed| {
        ctx.tracker
            .class_tracer(removed)
            .is_some_and(|t| t.targets.contains_key(&referenced))
    });
    Ok(key_column_name(removed.unwrap_or(referenced_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AssociationId, AssociationKind};

    fn association(source: Cardinality, target: Cardinality) -> GraphAssociation {
        GraphAssociation::new(
            AssociationId(0),
            None,
            AssociationKind::Relation(Relation {
                source: NodeId(0),
                source_cardinality: source,
                target: NodeId(1),
                target_cardinality: target,
                enumeration: None,
            }),
        )
    }

    #[test]
    fn test_place_key_one_to_many() {
        let placement = place_key(
            &association(Cardinality::ExactlyOne, Cardinality::ZeroOrMany),
            UninformedPolicy::Many,
        )
        .unwrap();
        assert_eq!(placement.holder, NodeId(1));
        assert_eq!(placement.referenced, NodeId(0));
        assert!(!placement.nullable);
        assert!(!placement.one_to_one);
    }

    #[test]
    fn test_place_key_one_to_one_prefers_mandatory_partner() {
        let placement = place_key(
            &association(Cardinality::ZeroOrOne, Cardinality::ExactlyOne),
            UninformedPolicy::Many,
        )
        .unwrap();
        assert_eq!(placement.holder, NodeId(0));
        assert!(!placement.nullable);
        assert!(placement.one_to_one);
    }

    #[test]
    fn test_place_key_uninformed_policy() {
        let relation = association(Cardinality::Uninformed, Cardinality::ZeroOrMany);
        assert!(matches!(
            place_key(&relation, UninformedPolicy::Many),
            Err(StructuralError::UnresolvedManyToMany(_))
        ));
        let placement = place_key(&relation, UninformedPolicy::One).unwrap();
        assert_eq!(placement.holder, NodeId(1));
        assert!(placement.nullable);
    }
}
