#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Mizzen Spec
//!
//! The immutable, in-memory workflow specification model consumed by the
//! execution kernel. A [`Specification`] is a root [`Net`] plus zero or more
//! sub-nets; each net wires [`Task`]s and [`Condition`]s with directed
//! [`Flow`]s carrying optional predicates and a deterministic rank order.
//!
//! The model is data-only: split/join behaviour, multi-instance attributes,
//! cancellation regions, and timers are plain values the runner dispatches
//! on. Construction goes through the [`builder`] API, which normalizes
//! task-to-task flows through implicit conditions and validates the
//! structural rules the kernel relies on.

pub mod builder;
pub mod error;
pub mod flow;
pub mod net;
pub mod specification;
pub mod task;

pub use builder::{NetBuilder, SpecificationBuilder, TaskBuilder};
pub use error::SpecError;
pub use flow::Flow;
pub use net::{Condition, Net};
pub use specification::Specification;
pub use task::{
    ContinuationPolicy, CreationMode, DataMapping, Decomposition, ExpiryPolicy, JoinType,
    MultiInstance, SplitType, Task, TimerSpec, TimerTrigger,
};
