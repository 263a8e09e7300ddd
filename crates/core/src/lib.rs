#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Mizzen Core
//!
//! Strongly-typed identifiers for Mizzen entities, shared by every crate in
//! the workspace:
//!
//! - [`SpecKey`] — a specification reference (URI + version)
//! - [`CaseId`] — a hierarchical case number (`"3"`, `"3.1"`, `"3.1.2"`)
//! - [`NetId`] / [`NodeId`] — specification-authored net and node names
//! - [`WorkItemId`] — a work item key (case, task, optional instance index)
//!
//! Identifiers are cheap to clone, hashable, ordered, and serialize as
//! strings so they can be used as JSON map keys in snapshots.

pub mod id;

pub use id::{CaseId, IdParseError, NetId, NodeId, SpecKey, WorkItemId};
