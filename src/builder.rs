//! One-shot translation of an ontology model into the initial graph.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::{Attribute, Model};
use crate::graph::{
    AssociationId, AssociationKind, Cardinality, DataType, EnumDomain, Generalization,
    GeneralizationSet, Graph, NodeId, PropertyKind, Relation, StructuralError,
};
use crate::tracker::Tracker;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Duplicate class or enumeration name: {0}")]
    DuplicateName(String),
    #[error("{element} references unknown class {name}")]
    UnknownClass { element: String, name: String },
    #[error("{element} references unknown enumeration {name}")]
    UnknownEnumeration { element: String, name: String },
    #[error("Generalization set {set} is inconsistent: {reason}")]
    InconsistentGeneralizationSet { set: String, reason: String },
    #[error("Generalization cycle through {0}")]
    GeneralizationCycle(String),
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Build the initial graph and seed the tracker with one identity entry per class.
pub fn build(model: &Model) -> Result<(Graph, Tracker), BuildError> {
    let mut graph = Graph::new();
    let mut seen = HashSet::new();
    for name in model
        .classes
        .iter()
        .map(|c| &c.name)
        .chain(model.enumerations.iter().map(|e| &e.name))
    {
        if !seen.insert(name.as_str()) {
            return Err(BuildError::DuplicateName(name.clone()));
        }
    }

    let mut ids: HashMap<&str, NodeId> = HashMap::new();
    for class in &model.classes {
        let id = graph.add_node(class.name.clone(), Some(class.stereotype));
        graph.add_surrogate_key(id)?;
        ids.insert(class.name.as_str(), id);
    }

    for class in &model.classes {
        let node = ids[class.name.as_str()];
        for attribute in &class.attributes {
            add_attribute(&mut graph, model, node, attribute)?;
        }
    }

    let lookup = |element: &dyn Fn() -> String, name: &str| {
        ids.get(name).copied().ok_or_else(|| BuildError::UnknownClass {
            element: element(),
            name: name.to_string(),
        })
    };

    let mut generalizations: HashMap<(NodeId, NodeId), AssociationId> = HashMap::new();
    for g in &model.generalizations {
        let element = || format!("generalization {} -> {}", g.specific, g.general);
        let general = lookup(&element, &g.general)?;
        let specific = lookup(&element, &g.specific)?;
        if general == specific {
            return Err(BuildError::GeneralizationCycle(g.general.clone()));
        }
        if generalizations.contains_key(&(general, specific)) {
            continue;
        }
        let id = graph.add_association(
            None,
            AssociationKind::Generalization(Generalization {
                general,
                specific,
                set: None,
            }),
        )?;
        generalizations.insert((general, specific), id);
    }

    for set in &model.generalization_sets {
        let set_name = set
            .name
            .clone()
            .unwrap_or_else(|| format!("set over {}", set.general));
        let element = || format!("generalization set {}", set_name);
        let inconsistent = |reason: String| BuildError::InconsistentGeneralizationSet {
            set: set_name.clone(),
            reason,
        };

        let general = lookup(&element, &set.general)?;
        if set.specifics.is_empty() {
            return Err(inconsistent("it has no specifics".to_string()));
        }
        let mut specifics = Vec::with_capacity(set.specifics.len());
        for name in &set.specifics {
            let specific = lookup(&element, name)?;
            if specific == general {
                return Err(inconsistent(format!("{} is its own general", name)));
            }
            if specifics.contains(&specific) {
                return Err(inconsistent(format!("{} is listed twice", name)));
            }
            specifics.push(specific);
        }

        let set_id = graph.add_association(
            set.name.clone(),
            AssociationKind::GeneralizationSet(GeneralizationSet {
                general,
                specifics: specifics.clone(),
                disjoint: set.disjoint,
                complete: set.complete,
            }),
        )?;

        for (specific, name) in specifics.into_iter().zip(&set.specifics) {
            let generalization = match generalizations.get(&(general, specific)) {
                Some(id) => *id,
                None => {
                    let id = graph.add_association(
                        None,
                        AssociationKind::Generalization(Generalization {
                            general,
                            specific,
                            set: None,
                        }),
                    )?;
                    generalizations.insert((general, specific), id);
                    id
                }
            };
            let existing = graph
                .try_association(generalization)?
                .as_generalization()
                .and_then(|g| g.set);
            if existing.is_some() {
                return Err(inconsistent(format!(
                    "{} -> {} already belongs to another set",
                    name, set.general
                )));
            }
            graph.update_association(generalization, |a| {
                if let AssociationKind::Generalization(g) = &mut a.kind {
                    g.set = Some(set_id);
                }
            })?;
        }
    }

    let parents = parent_map(&generalizations);
    if let Some(node) = find_cycle(&parents) {
        return Err(BuildError::GeneralizationCycle(graph.try_node(node)?.name.clone()));
    }

    for relation in &model.relations {
        let element = || match &relation.name {
            Some(name) => format!("relation {}", name),
            None => format!("relation {} -- {}", relation.source, relation.target),
        };
        let source = lookup(&element, &relation.source)?;
        let target = lookup(&element, &relation.target)?;
        let enumeration = match &relation.enumeration {
            Some(name) => Some(enum_domain(model, name).ok_or_else(|| {
                BuildError::UnknownEnumeration {
                    element: element(),
                    name: name.clone(),
                }
            })?),
            None => None,
        };
        graph.add_association(
            relation.name.clone(),
            AssociationKind::Relation(Relation {
                source,
                source_cardinality: Cardinality::parse(relation.source_cardinality.as_deref()),
                target,
                target_cardinality: Cardinality::parse(relation.target_cardinality.as_deref()),
                enumeration,
            }),
        )?;
    }

    let mut tracker = Tracker::new();
    for class in &model.classes {
        let id = ids[class.name.as_str()];
        tracker.seed(id, class.name.clone(), lineage(id, &parents));
    }

    log::info!(
        "built graph: {} nodes, {} associations",
        graph.node_count(),
        graph.association_ids().len()
    );
    Ok((graph, tracker))
}

fn add_attribute(
    graph: &mut Graph,
    model: &Model,
    node: NodeId,
    attribute: &Attribute,
) -> Result<(), BuildError> {
    let kind = match enum_domain(model, &attribute.typ) {
        Some(domain) => PropertyKind::Enumeration(domain),
        None => {
            let data_type = DataType::from_ontology(&attribute.typ).unwrap_or_else(|| {
                log::warn!(
                    "unknown datatype {} on attribute {}, using string",
                    attribute.typ,
                    attribute.name
                );
                DataType::String
            });
            PropertyKind::Primitive(data_type)
        }
    };

    let cardinality = Cardinality::parse(attribute.cardinality.as_deref());
    let nullable = !matches!(cardinality, Cardinality::ExactlyOne | Cardinality::OneOrMany);
    let multivalued = matches!(cardinality, Cardinality::OneOrMany | Cardinality::ZeroOrMany);

    let name = graph.try_node(node)?.unique_property_name(&attribute.name);
    let property = graph
        .new_property(name, kind)
        .nullable(nullable)
        .multivalued(multivalued)
        .declared_by(node);
    graph.try_node_mut(node)?.properties.push(property);
    Ok(())
}

fn enum_domain(model: &Model, name: &str) -> Option<EnumDomain> {
    model.enumeration(name).map(|e| EnumDomain {
        name: e.name.clone(),
        literals: e.literals.clone(),
    })
}

fn parent_map(generalizations: &HashMap<(NodeId, NodeId), AssociationId>) -> HashMap<NodeId, Vec<NodeId>> {
    let mut pairs: Vec<(NodeId, NodeId)> = generalizations.keys().copied().collect();
    pairs.sort();
    let mut parents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for (general, specific) in pairs {
        parents.entry(specific).or_default().push(general);
    }
    parents
}

/// Original classes whose attributes `class` inherits, nearest first.
fn lineage(class: NodeId, parents: &HashMap<NodeId, Vec<NodeId>>) -> Vec<NodeId> {
    let mut order = vec![class];
    let mut queue = VecDeque::from([class]);
    while let Some(current) = queue.pop_front() {
        for parent in parents.get(&current).into_iter().flatten() {
            if !order.contains(parent) {
                order.push(*parent);
                queue.push_back(*parent);
            }
        }
    }
    order
}

fn find_cycle(parents: &HashMap<NodeId, Vec<NodeId>>) -> Option<NodeId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        node: NodeId,
        parents: &HashMap<NodeId, Vec<NodeId>>,
        marks: &mut HashMap<NodeId, Mark>,
    ) -> Option<NodeId> {
        match marks.get(&node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => return Some(node),
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        for parent in parents.get(&node).into_iter().flatten() {
            if let Some(found) = visit(*parent, parents, marks) {
                return Some(found);
            }
        }
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut starts: Vec<NodeId> = parents.keys().copied().collect();
    starts.sort();
    starts
        .into_iter()
        .find_map(|node| visit(node, parents, &mut marks))
}
