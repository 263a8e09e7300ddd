#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Mizzen Execution
//!
//! The mutable runtime side of the kernel: everything a live case carries
//! between operations, and nothing about how it advances (that is the
//! engine crate's job). It defines:
//!
//! - [`WorkItemStatus`] and [`CaseStatus`] — the two state machines
//! - [`transition`] — validated transitions for both
//! - [`WorkItem`] — one schedulable task instance with timestamps,
//!   data documents, and idempotent completion
//! - [`Marking`] — non-negative token counts per node
//! - [`RunnerState`] / [`CaseState`] — the runner stack and case registry
//! - [`CaseSnapshot`] — schema-versioned byte round trip of a whole case
//! - [`EngineEvent`] — the lifecycle events the announcer distributes

pub mod case;
pub mod error;
pub mod event;
pub mod marking;
pub mod snapshot;
pub mod status;
pub mod transition;
pub mod work_item;

pub use case::{CaseState, RunnerState};
pub use error::ExecutionError;
pub use event::EngineEvent;
pub use marking::Marking;
pub use snapshot::{CaseSnapshot, SNAPSHOT_SCHEMA};
pub use status::{CaseStatus, WorkItemStatus};
pub use work_item::{CompletionOutcome, MiProgress, WorkItem};
