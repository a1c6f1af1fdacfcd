use crate::{DocActionId, DocStateId, DocTypeId, EventId, WorkflowId};
use thiserror::Error;

/// Result type for docflow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Docflow errors.
///
/// Every failure is tagged with its kind and returned immediately; nothing
/// is swallowed. [`FlowError::is_rejection`] separates expected business
/// outcomes from caller mistakes and infrastructure failures.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed input, rejected before any storage access.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The event was already consumed by an earlier transition. Permanent.
    #[error("event {0} is already applied")]
    AlreadyApplied(EventId),

    /// The event's document type does not match the workflow's.
    #[error("document type mismatch: workflow governs {workflow}, event carries {event}")]
    TypeMismatch {
        workflow: DocTypeId,
        event: DocTypeId,
    },

    /// No workflow with this id.
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// No node governs this (document type, state) pair.
    #[error("no node for document type {doctype} at state {state}")]
    NodeNotFound {
        doctype: DocTypeId,
        state: DocStateId,
    },

    /// No event with this id.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// The action is not enabled from the current state.
    #[error("action {action} is not enabled at state {state}")]
    IllegalAction {
        state: DocStateId,
        action: DocActionId,
    },

    /// A uniqueness rule was violated (workflow name, node placement,
    /// transition key).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Transaction or connection failure in the storage backend.
    #[error("storage failure: {0}")]
    Store(String),
}

impl FlowError {
    /// True for expected business-rule rejections, the outcomes a host
    /// handles as ordinary results rather than faults.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::AlreadyApplied(_) | Self::IllegalAction { .. })
    }
}
