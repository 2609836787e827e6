//! Ontology model: the conceptual class diagram a transformation starts from.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub classes: Vec<Class>,
    pub enumerations: Vec<Enumeration>,
    pub relations: Vec<Relation>,
    pub generalizations: Vec<Generalization>,
    pub generalization_sets: Vec<GeneralizationSet>,
}

impl Model {
    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&Enumeration> {
        self.enumerations.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub stereotype: Stereotype,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub typ: String,
    /// Declared cardinality as written (`1`, `0..1`, `1..*`, `0..*`), if any
    pub cardinality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enumeration {
    pub name: String,
    pub literals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: Option<String>,
    pub source: String,
    pub source_cardinality: Option<String>,
    pub target: String,
    pub target_cardinality: Option<String>,
    /// Enumeration attached to the relation itself
    pub enumeration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generalization {
    pub general: String,
    pub specific: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralizationSet {
    pub name: Option<String>,
    pub general: String,
    pub specifics: Vec<String>,
    pub disjoint: bool,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stereotype {
    Kind,
    Subkind,
    Role,
    Phase,
    Category,
    Mixin,
    RoleMixin,
    PhaseMixin,
    Collective,
    Quantity,
    Relator,
    Mode,
    Quality,
    /// Plain class without an ontological nature
    Class,
}

impl Stereotype {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kind" => Some(Self::Kind),
            "subkind" => Some(Self::Subkind),
            "role" => Some(Self::Role),
            "phase" => Some(Self::Phase),
            "category" => Some(Self::Category),
            "mixin" => Some(Self::Mixin),
            "rolemixin" => Some(Self::RoleMixin),
            "phasemixin" => Some(Self::PhaseMixin),
            "collective" => Some(Self::Collective),
            "quantity" => Some(Self::Quantity),
            "relator" => Some(Self::Relator),
            "mode" => Some(Self::Mode),
            "quality" => Some(Self::Quality),
            "class" => Some(Self::Class),
            _ => None,
        }
    }

    /// Non-sortals classify instances of different kinds and carry no identity.
    pub fn is_non_sortal(self) -> bool {
        matches!(
            self,
            Self::Category | Self::Mixin | Self::RoleMixin | Self::PhaseMixin
        )
    }

    /// Ultimate sortals supply the identity principle of their instances.
    pub fn is_ultimate_sortal(self) -> bool {
        matches!(
            self,
            Self::Kind
                | Self::Collective
                | Self::Quantity
                | Self::Relator
                | Self::Mode
                | Self::Quality
        )
    }
}
