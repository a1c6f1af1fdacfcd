use async_trait::async_trait;
use docflow_types::{
    DocActionId, DocEvent, DocStateId, DocTypeId, EventId, FlowResult, GroupId, Node, NodeId,
    NodeKind, NotificationIntent, Workflow, WorkflowId,
};

/// Paged read over workflows, ordered by ascending id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListWindow {
    /// Smallest workflow id to include.
    pub from: WorkflowId,
    /// Maximum number of rows; 0 means unbounded.
    pub limit: usize,
}

/// Transactional store for workflow definitions, events and intents.
///
/// Reads observe committed state. All mutation goes through a unit of work
/// obtained from [`DocStore::begin`].
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Open an atomic unit of work.
    async fn begin(&self) -> FlowResult<Box<dyn DocTx>>;

    /// Get one workflow by id.
    async fn workflow(&self, id: WorkflowId) -> FlowResult<Option<Workflow>>;

    /// Get one workflow by its globally-unique name.
    async fn workflow_by_name(&self, name: &str) -> FlowResult<Option<Workflow>>;

    /// List workflows ascending by id; `window.from` is an id lower bound.
    async fn list_workflows(&self, window: ListWindow) -> FlowResult<Vec<Workflow>>;

    /// Get the node governing `(doctype, state)`, with its transition table.
    async fn node_by_state(
        &self,
        doctype: DocTypeId,
        state: DocStateId,
    ) -> FlowResult<Option<Node>>;

    /// List the nodes of one workflow, ascending by id.
    async fn nodes_of_workflow(&self, workflow: WorkflowId) -> FlowResult<Vec<Node>>;

    /// Get one document event by id.
    async fn event(&self, id: EventId) -> FlowResult<Option<DocEvent>>;

    /// List the notification intents recorded for one event, ascending by id.
    async fn notifications_for_event(&self, event: EventId)
        -> FlowResult<Vec<NotificationIntent>>;
}

/// One atomic unit of work.
///
/// Mutations staged here become durable on [`DocTx::commit`] and vanish on
/// [`DocTx::rollback`] (or on drop). The unit also exposes the definition
/// read event application needs, so in-transaction code never has to reach
/// back through [`DocStore`]; on the memory backend that would block
/// behind its own writer guard.
#[async_trait]
pub trait DocTx: Send {
    /// Insert a workflow definition. Fails with `Duplicate` on a name
    /// collision.
    async fn insert_workflow(
        &mut self,
        name: &str,
        doctype: DocTypeId,
        begin_state: DocStateId,
    ) -> FlowResult<WorkflowId>;

    /// Insert a node row. Fails with `Duplicate` when `(doctype, state)` is
    /// already governed.
    async fn insert_node(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
        workflow: WorkflowId,
        name: &str,
        kind: NodeKind,
    ) -> FlowResult<NodeId>;

    /// Insert one transition row. Fails with `Duplicate` when
    /// `(doctype, from_state, action)` is already routed.
    async fn insert_transition(
        &mut self,
        doctype: DocTypeId,
        from_state: DocStateId,
        action: DocActionId,
        to_state: DocStateId,
    ) -> FlowResult<()>;

    /// Record a new document event with status `Created`. This is the
    /// hand-off point for upstream event producers.
    async fn insert_event(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
        action: DocActionId,
    ) -> FlowResult<EventId>;

    /// Flip the event's status Created → Applied, exactly once.
    ///
    /// Fails with `AlreadyApplied` when the event exists but was consumed
    /// before, `EventNotFound` when it does not exist. Under concurrent
    /// attempts the backend serializes this flip so one caller wins.
    async fn mark_event_applied(&mut self, event: EventId) -> FlowResult<()>;

    /// Record one notification intent. Never survives rollback, never
    /// dropped on commit.
    async fn record_notification(
        &mut self,
        event: EventId,
        new_state: DocStateId,
        group: GroupId,
    ) -> FlowResult<NotificationIntent>;

    /// Read the node governing `(doctype, state)` through this unit of work.
    async fn node_by_state(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
    ) -> FlowResult<Option<Node>>;

    /// Make the staged mutations durable.
    async fn commit(self: Box<Self>) -> FlowResult<()>;

    /// Discard the staged mutations.
    async fn rollback(self: Box<Self>) -> FlowResult<()>;
}
