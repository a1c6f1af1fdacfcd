//! Docflow domain types.
//!
//! This crate defines the data model for the docflow engine:
//! - workflow definitions (one per document type, with a begin state)
//! - nodes and their transition tables (the per-state action routing)
//! - document events and their one-way Created → Applied lifecycle
//! - notification intents handed off after a successful transition
//! - the shared error taxonomy
//!
//! Definition records are immutable once persisted. Catalog management for
//! document types, states and actions lives outside this crate; identifiers
//! here are opaque and only ever compared.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
mod event;
mod id;
mod node;
mod notification;
mod workflow;

pub use error::{FlowError, FlowResult};
pub use event::{DocEvent, EventStatus};
pub use id::{DocActionId, DocStateId, DocTypeId, EventId, GroupId, IntentId, NodeId, WorkflowId};
pub use node::{Node, NodeKind, TransitionTable};
pub use notification::NotificationIntent;
pub use workflow::Workflow;
