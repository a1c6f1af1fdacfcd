//! Document event application.
//!
//! `WorkflowEngine::apply_event` is the single write path of a document's
//! life cycle: it walks one edge of the state graph, retires the event, and
//! records notification intents, all in one unit of work.

use docflow_store::memory::MemoryDocStore;
use docflow_store::{DocStore, DocTx, TxScope};
use docflow_types::{
    DocEvent, DocStateId, EventStatus, FlowError, FlowResult, GroupId, Workflow,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Applies document events against registered workflow definitions.
///
/// A stateless service over the storage seam, shareable across tasks.
pub struct WorkflowEngine {
    store: Arc<dyn DocStore>,
}

impl WorkflowEngine {
    /// Create an engine backed by in-memory storage.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryDocStore::new()),
        }
    }

    /// Create an engine backed by an explicit store.
    pub fn with_store(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> Arc<dyn DocStore> {
        Arc::clone(&self.store)
    }

    /// Apply a document event under the given workflow, advancing the
    /// document to the returned state.
    ///
    /// The event's action must be enabled by the node at the event's
    /// current state, else `IllegalAction`. On success the event is
    /// retired (Created becomes Applied, at most once, ever) and one
    /// notification intent is recorded per distinct recipient group; the
    /// recipient list must be non-empty and duplicates collapse.
    ///
    /// Passing `tx` enlists every effect in a caller-owned unit of work,
    /// which the engine never commits or rolls back. With `None`, the
    /// engine opens its own unit and settles it: commit on success,
    /// rollback on any failure. Either way, no partial combination of the
    /// status flip and the intents is ever durably observable.
    pub async fn apply_event(
        &self,
        tx: Option<&mut dyn DocTx>,
        workflow: &Workflow,
        event: &DocEvent,
        recipients: &[GroupId],
    ) -> FlowResult<DocStateId> {
        if recipients.is_empty() {
            return Err(FlowError::InvalidArgument(
                "recipient list must not be empty".to_string(),
            ));
        }
        if event.status == EventStatus::Applied {
            return Err(FlowError::AlreadyApplied(event.id));
        }
        if workflow.doctype != event.doctype {
            return Err(FlowError::TypeMismatch {
                workflow: workflow.doctype,
                event: event.doctype,
            });
        }

        let groups: BTreeSet<GroupId> = recipients.iter().copied().collect();

        let mut scope = TxScope::open(self.store.as_ref(), tx).await?;
        let result = apply_at(scope.tx(), event, &groups).await;
        let new_state = scope.finish(result).await?;

        tracing::info!(
            event = %event.id,
            workflow = %workflow.id,
            from_state = %event.state,
            to_state = %new_state,
            "Document event applied"
        );
        Ok(new_state)
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The transactional tail of an application: resolve the node at the
/// event's state, walk the enabled edge, retire the event, record one
/// intent per group.
///
/// Reads go through the unit of work, not the committed store, so the
/// lookup stays consistent with the mutations and composes with a
/// caller-owned transaction on every backend.
async fn apply_at(
    tx: &mut dyn DocTx,
    event: &DocEvent,
    groups: &BTreeSet<GroupId>,
) -> FlowResult<DocStateId> {
    let node = tx
        .node_by_state(event.doctype, event.state)
        .await?
        .ok_or(FlowError::NodeNotFound {
            doctype: event.doctype,
            state: event.state,
        })?;

    let to_state = node
        .transitions
        .resolve(event.action)
        .ok_or(FlowError::IllegalAction {
            state: event.state,
            action: event.action,
        })?;

    // The conditional status flip is the authoritative idempotency check;
    // the caller's event snapshot may be stale.
    tx.mark_event_applied(event.id).await?;

    for group in groups {
        tx.record_notification(event.id, to_state, *group).await?;
    }

    Ok(to_state)
}
