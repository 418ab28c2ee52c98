//! The fixed set of cache namespaces.
//!
//! Three compartments exist: `parse`, `analysis`, and `patterns`. The
//! `patterns` compartment is further split into one sub-namespace per named
//! pattern (`pattern:<name>`). Nothing else can be addressed.

use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// A storage compartment with its own directory under the cache root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamespaceKind {
    /// Parsed syntax trees.
    Parse,
    /// Pattern-match hit lists, one sub-namespace per pattern.
    Patterns,
    /// Per-file analysis summaries.
    Analysis,
}

impl NamespaceKind {
    /// Every compartment, in directory order.
    pub const ALL: [NamespaceKind; 3] = [
        NamespaceKind::Parse,
        NamespaceKind::Patterns,
        NamespaceKind::Analysis,
    ];

    /// Directory name under the cache root.
    pub fn dir_name(self) -> &'static str {
        match self {
            NamespaceKind::Parse => "parse",
            NamespaceKind::Patterns => "patterns",
            NamespaceKind::Analysis => "analysis",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// An addressable namespace: a compartment plus, for patterns, the pattern name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `parse`
    Parse,
    /// `pattern:<name>`
    Pattern(String),
    /// `analysis`
    Analysis,
}

impl Namespace {
    /// Creates a pattern sub-namespace, rejecting empty names.
    pub fn pattern(name: impl Into<String>) -> Result<Self, CacheError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CacheError::InvalidPatternName { name });
        }
        Ok(Namespace::Pattern(name))
    }

    /// The compartment this namespace lives in.
    pub fn kind(&self) -> NamespaceKind {
        match self {
            Namespace::Parse => NamespaceKind::Parse,
            Namespace::Pattern(_) => NamespaceKind::Patterns,
            Namespace::Analysis => NamespaceKind::Analysis,
        }
    }

    /// The label recorded in blob headers, e.g. `"pattern:todo"`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Parse => f.write_str("parse"),
            Namespace::Pattern(name) => write!(f, "pattern:{name}"),
            Namespace::Analysis => f.write_str("analysis"),
        }
    }
}

impl FromStr for Namespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parse" => Ok(Namespace::Parse),
            "analysis" => Ok(Namespace::Analysis),
            other => match other.strip_prefix("pattern:") {
                Some(name) => Namespace::pattern(name),
                None => Err(CacheError::InvalidPatternName {
                    name: other.to_string(),
                }),
            },
        }
    }
}

/// What a `clear` operation removes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClearTarget {
    /// Every compartment, every index record, and all statistics.
    All,
    /// One whole compartment.
    Kind(NamespaceKind),
    /// One pattern sub-namespace.
    Pattern(String),
}
