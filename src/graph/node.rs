//! Nodes (table candidates) and their properties (columns).

use serde::{Deserialize, Serialize};

use super::{AssociationId, NodeId, PropertyId};
use crate::ast::Stereotype;

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Nature of the class the node was built from; `None` for synthetic nodes
    pub stereotype: Option<Stereotype>,
    pub properties: Vec<NodeProperty>,
    /// Set when the node stands for a resolved many-to-many link
    pub associative_name: Option<String>,
    /// Rows of an enumeration lookup table, one per literal
    pub lookup_values: Vec<String>,
    pub(super) associations: Vec<AssociationId>,
}

impl Node {
    pub(super) fn new(id: NodeId, name: String, stereotype: Option<Stereotype>) -> Self {
        Self {
            id,
            name,
            stereotype,
            properties: Vec::new(),
            associative_name: None,
            lookup_values: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Ids of every association touching this node.
    pub fn associations(&self) -> &[AssociationId] {
        &self.associations
    }

    pub fn primary_key(&self) -> Option<&NodeProperty> {
        self.properties.iter().find(|p| p.primary_key)
    }

    pub fn property(&self, id: PropertyId) -> Option<&NodeProperty> {
        self.properties.iter().find(|p| p.id == id)
    }

    pub fn property_mut(&mut self, id: PropertyId) -> Option<&mut NodeProperty> {
        self.properties.iter_mut().find(|p| p.id == id)
    }

    pub fn property_by_name(&self, name: &str) -> Option<&NodeProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// This node's copy of `origin`, or `origin` itself.
    pub fn copy_of(&self, origin: PropertyId) -> Option<&NodeProperty> {
        self.properties
            .iter()
            .find(|p| p.id == origin || p.copied_from == Some(origin))
    }

    pub fn remove_property(&mut self, id: PropertyId) -> Option<NodeProperty> {
        let index = self.properties.iter().position(|p| p.id == id)?;
        Some(self.properties.remove(index))
    }

    /// Whether this node holds the rows of an enumeration.
    pub fn is_lookup(&self) -> bool {
        !self.lookup_values.is_empty()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &NodeProperty> {
        self.properties.iter().filter(|p| p.foreign_key.is_some())
    }

    /// `base`, or `base_2`, `base_3`... whichever is free on this node.
    pub fn unique_property_name(&self, base: &str) -> String {
        if self.property_by_name(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.property_by_name(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeProperty {
    pub id: PropertyId,
    pub name: String,
    pub kind: PropertyKind,
    pub nullable: bool,
    pub multivalued: bool,
    pub primary_key: bool,
    pub foreign_key: Option<ForeignKey>,
    pub default_value: Option<String>,
    /// Original class that declared the attribute
    pub source_class: Option<NodeId>,
    /// Declared property this one is a flattened copy of
    pub copied_from: Option<PropertyId>,
}

impl NodeProperty {
    pub fn new(id: PropertyId, name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            nullable: true,
            multivalued: false,
            primary_key: false,
            foreign_key: None,
            default_value: None,
            source_class: None,
            copied_from: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn multivalued(mut self, multivalued: bool) -> Self {
        self.multivalued = multivalued;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn references(mut self, node: NodeId, association: AssociationId) -> Self {
        self.foreign_key = Some(ForeignKey { node, association });
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn declared_by(mut self, class: NodeId) -> Self {
        self.source_class = Some(class);
        self
    }

    pub fn enumeration(&self) -> Option<&EnumDomain> {
        match &self.kind {
            PropertyKind::Enumeration(domain) => Some(domain),
            PropertyKind::Primitive(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyKind {
    Primitive(DataType),
    Enumeration(EnumDomain),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDomain {
    pub name: String,
    pub literals: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub node: NodeId,
    /// Association the reference was produced from
    pub association: AssociationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    String,
    Text,
    Boolean,
    Date,
    Time,
    DateTime,
    Binary,
}

impl DataType {
    /// Map an ontology datatype name onto a column type.
    pub fn from_ontology(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        let base = lower
            .rsplit(|c: char| c == ':' || c == '#')
            .next()
            .unwrap_or(lower.as_str());

        match base {
            "int" | "integer" | "short" | "byte" | "nonnegativeinteger" | "positiveinteger" => {
                Some(Self::Integer)
            }
            "long" | "bigint" => Some(Self::BigInt),
            "float" | "real" => Some(Self::Float),
            "double" | "number" => Some(Self::Double),
            "decimal" | "numeric" | "money" => Some(Self::Decimal),
            "string" | "varchar" | "char" | "anyuri" => Some(Self::String),
            "text" => Some(Self::Text),
            "boolean" | "bool" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "datetime" | "timestamp" | "datetimestamp" => Some(Self::DateTime),
            "binary" | "blob" | "bytes" | "base64binary" | "hexbinary" => Some(Self::Binary),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_from_ontology() {
        assert_eq!(DataType::from_ontology("string"), Some(DataType::String));
        assert_eq!(DataType::from_ontology("Integer"), Some(DataType::Integer));
        assert_eq!(DataType::from_ontology("xsd:dateTime"), Some(DataType::DateTime));
        assert_eq!(DataType::from_ontology("Color"), None);
    }

    #[test]
    fn test_unique_property_name() {
        let mut node = Node::new(NodeId(0), "Person".into(), None);
        let kind = PropertyKind::Primitive(DataType::Integer);
        node.properties.push(NodeProperty::new(PropertyId(0), "person_id", kind.clone()));
        node.properties.push(NodeProperty::new(PropertyId(1), "person_id_2", kind));
        assert_eq!(node.unique_property_name("name"), "name");
        assert_eq!(node.unique_property_name("person_id"), "person_id_3");
    }

    #[test]
    fn test_primary_key_builder_is_not_null() {
        let p = NodeProperty::new(PropertyId(0), "id", PropertyKind::Primitive(DataType::Integer))
            .primary_key();
        assert!(p.primary_key);
        assert!(!p.nullable);
    }
}
