//! Docflow engine: document lifecycles as state graphs.
//!
//! A workflow governs one document type. Each non-terminal state is held by
//! a node whose transition table maps permitted actions to follow-up states.
//! Applying a document event walks exactly one edge of that graph: the event
//! flips from Created to Applied, and one notification intent per recipient
//! group is recorded in the same atomic unit of work.
//!
//! Design stance:
//! - Services take their store explicitly; there is no process-global state.
//! - Callers may pass their own open unit of work to compose engine calls
//!   with surrounding mutations; the engine then never commits or rolls it
//!   back on their behalf.
//! - Definitions (workflows, nodes, transitions) are written once and read
//!   many times; only event status and notifications mutate at runtime.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod engine;
mod registry;

pub use engine::WorkflowEngine;
pub use registry::WorkflowRegistry;
