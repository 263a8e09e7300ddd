#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Mizzen Engine
//!
//! The workflow execution kernel: given an immutable specification
//! ([`mizzen_spec`]), it launches cases, moves tokens through nets, drives
//! work items through their lifecycle, announces every transition to
//! registered listeners, and exposes the whole surface through a facade
//! with two durability shapes (write-through persistent, in-memory
//! stateless with idle eviction).
//!
//! Layering, bottom-up:
//!
//! - [`orjoin`] — informed OR-join residual-reachability analysis
//! - [`runner`] — the kernel loop: enablement, firing, splits/joins,
//!   multi-instance expansion, sub-net composition, cancellation regions,
//!   completion and deadlock detection
//! - [`announcer`] — listener registry with synchronous and deferred
//!   delivery
//! - [`timer`] — the min-heap timer service
//! - [`exceptions`] — ripple-down-rule failure handling
//! - [`registry`] — specification registry and per-case lock cells
//! - [`engine`] — the public facade
//!
//! Concurrency model: one async mutex per case serializes all mutations
//! of that case; the kernel itself is synchronous and collects follow-up
//! work iteratively, so nothing re-enters the lock. Synchronous listeners
//! run under the lock and must not call back into the engine for the same
//! case; deferred listeners run after release.

pub mod announcer;
pub mod cancellation;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod exceptions;
pub mod multi_instance;
pub mod orjoin;
pub mod registry;
pub mod runner;
pub mod timer;

pub use announcer::{Announcer, DeliveryMode, EngineListener, ListenerId};
pub use config::{EngineConfig, OrJoinPolicy};
pub use engine::{Engine, EvictionListener, WorkItemFilter};
pub use error::{EngineError, EngineResult};
pub use exceptions::{ExceptionAction, RdrNode, RdrTree};
pub use runner::Kernel;
