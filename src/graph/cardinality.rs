//! Relation-end cardinalities and the loosening lattice used when nodes merge.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    ExactlyOne,  // 1
    ZeroOrOne,   // 0..1
    OneOrMany,   // 1..*
    ZeroOrMany,  // 0..*
    Uninformed,  // unset or unreadable
}

/// How uninformed cardinalities are read when a decision needs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UninformedPolicy {
    #[default]
    Many,
    One,
}

impl UninformedPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "many" => Some(Self::Many),
            "one" => Some(Self::One),
            _ => None,
        }
    }
}

impl Cardinality {
    /// Read a declared cardinality string. Never fails: anything unreadable is
    /// `Uninformed`.
    pub fn parse(declared: Option<&str>) -> Self {
        let Some(text) = declared.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Uninformed;
        };

        let (lower, upper) = match text.split_once("..") {
            Some((lo, hi)) => (lo.trim(), hi.trim()),
            None if text == "*" => ("0", "*"),
            None => (text, text),
        };

        let Ok(lower) = lower.parse::<u64>() else {
            return Self::Uninformed;
        };
        let many = match upper {
            "*" => true,
            n => match n.parse::<u64>() {
                Ok(upper) if upper >= lower && upper > 0 => upper > 1,
                _ => return Self::Uninformed,
            },
        };

        match (lower == 0, many) {
            (false, false) => Self::ExactlyOne,
            (true, false) => Self::ZeroOrOne,
            (false, true) => Self::OneOrMany,
            (true, true) => Self::ZeroOrMany,
        }
    }

    pub fn is_many(self, policy: UninformedPolicy) -> bool {
        match self {
            Self::OneOrMany | Self::ZeroOrMany => true,
            Self::ExactlyOne | Self::ZeroOrOne => false,
            Self::Uninformed => policy == UninformedPolicy::Many,
        }
    }

    /// Lower bound of zero. Uninformed ends are never assumed mandatory.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::ZeroOrOne | Self::ZeroOrMany | Self::Uninformed)
    }

    pub fn is_mandatory_single(self) -> bool {
        self == Self::ExactlyOne
    }

    /// The least restrictive of two cardinalities.
    pub fn weaker(self, other: Self) -> Self {
        if self == Self::Uninformed || other == Self::Uninformed {
            return Self::Uninformed;
        }
        let optional = self.is_optional() || other.is_optional();
        let many = self.is_many(UninformedPolicy::Many) || other.is_many(UninformedPolicy::Many);
        match (optional, many) {
            (false, false) => Self::ExactlyOne,
            (true, false) => Self::ZeroOrOne,
            (false, true) => Self::OneOrMany,
            (true, true) => Self::ZeroOrMany,
        }
    }

    /// Same upper bound, lower bound dropped to zero.
    pub fn optional(self) -> Self {
        self.weaker(Self::ZeroOrOne)
    }

    /// True if `self` admits every population `other` admits.
    pub fn is_at_most_as_strict_as(self, other: Self) -> bool {
        self.weaker(other) == self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactlyOne => "1",
            Self::ZeroOrOne => "0..1",
            Self::OneOrMany => "1..*",
            Self::ZeroOrMany => "0..*",
            Self::Uninformed => "?",
        }
    }
}
