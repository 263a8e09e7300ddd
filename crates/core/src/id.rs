//! Identifier newtypes used across the workspace.
//!
//! Case identifiers are hierarchical: the root case of a launch is a bare
//! number (`"7"`), and every sub-net expansion appends a child segment
//! (`"7.1"`, `"7.1.3"`). Net and node identifiers come verbatim from the
//! workflow specification. Work item identifiers combine the case, the task,
//! and an optional multi-instance index, and render as
//! `case:task` or `case:task#index`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing identifier strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// A case identifier segment was empty or non-numeric.
    #[error("invalid case id {0:?}: segments must be non-empty decimal numbers")]
    InvalidCaseId(String),

    /// A net or node identifier was empty.
    #[error("identifier must not be empty")]
    Empty,

    /// A work item identifier did not match `case:task` or `case:task#index`.
    #[error("invalid work item id {0:?}")]
    InvalidWorkItemId(String),
}

/// Reference to a registered specification: unique `(uri, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpecKey {
    /// Specification URI.
    pub uri: String,
    /// Specification version label.
    pub version: String,
}

impl SpecKey {
    /// Create a new specification key.
    #[must_use]
    pub fn new(uri: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.uri, self.version)
    }
}

/// Hierarchical case identifier.
///
/// Root cases are single decimal numbers assigned by the engine's launch
/// counter; child cases (sub-net expansions) append `.N` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaseId(String);

impl CaseId {
    /// Create a root case identifier from a launch number.
    #[must_use]
    pub fn root(number: u64) -> Self {
        Self(number.to_string())
    }

    /// Derive the identifier of the `n`-th child of this case.
    #[must_use]
    pub fn child(&self, n: u64) -> Self {
        Self(format!("{}.{n}", self.0))
    }

    /// The parent case identifier, or `None` for a root case.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('.').map(|(head, _)| Self(head.to_string()))
    }

    /// Returns `true` if this is a root case (no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        !self.0.contains('.')
    }

    /// Nesting depth: 0 for a root case, 1 for its children, and so on.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.matches('.').count()
    }

    /// The root ancestor: the case this identifier's tree hangs off.
    #[must_use]
    pub fn root_ancestor(&self) -> Self {
        match self.0.split_once('.') {
            Some((head, _)) => Self(head.to_string()),
            None => self.clone(),
        }
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CaseId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.split('.')
                .all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(IdParseError::InvalidCaseId(s.to_string()))
        }
    }
}

impl TryFrom<String> for CaseId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CaseId> for String {
    fn from(id: CaseId) -> Self {
        id.0
    }
}

macro_rules! name_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier. Panics in debug builds on empty input;
            /// use [`FromStr`] for fallible construction.
            #[must_use]
            pub fn new(name: impl Into<String>) -> Self {
                let name = name.into();
                debug_assert!(!name.is_empty(), "identifier must not be empty");
                Self(name)
            }

            /// The identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    Err(IdParseError::Empty)
                } else {
                    Ok(Self(s.to_string()))
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

name_id! {
    /// Identifier of a net within a specification.
    NetId
}

name_id! {
    /// Identifier of a node (task or condition) within a net.
    NodeId
}

/// Identifier of a work item: a task instantiated for a specific case.
///
/// Multi-instance children carry an instance index; plain items do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkItemId {
    /// The owning case.
    pub case: CaseId,
    /// The task this item instantiates.
    pub task: NodeId,
    /// Multi-instance sibling index, if this item is an MI child.
    pub index: Option<u32>,
}

impl WorkItemId {
    /// Key for a plain (single-instance) work item.
    #[must_use]
    pub fn new(case: CaseId, task: NodeId) -> Self {
        Self {
            case,
            task,
            index: None,
        }
    }

    /// Key for a multi-instance child with the given sibling index.
    #[must_use]
    pub fn instance(case: CaseId, task: NodeId, index: u32) -> Self {
        Self {
            case,
            task,
            index: Some(index),
        }
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}:{}#{i}", self.case, self.task),
            None => write!(f, "{}:{}", self.case, self.task),
        }
    }
}

impl FromStr for WorkItemId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdParseError::InvalidWorkItemId(s.to_string());
        let (case, rest) = s.split_once(':').ok_or_else(invalid)?;
        let case: CaseId = case.parse().map_err(|_| invalid())?;
        let (task, index) = match rest.rsplit_once('#') {
            Some((task, idx)) => (task, Some(idx.parse::<u32>().map_err(|_| invalid())?)),
            None => (rest, None),
        };
        let task: NodeId = task.parse().map_err(|_| invalid())?;
        Ok(Self { case, task, index })
    }
}

impl TryFrom<String> for WorkItemId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WorkItemId> for String {
    fn from(id: WorkItemId) -> Self {
        id.to_string()
    }
}
