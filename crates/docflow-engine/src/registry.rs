//! Workflow registry: defines workflows and the nodes of their state graphs.
//!
//! Definitions are write-once. A workflow claims a globally-unique name and
//! one document type; each of its nodes claims a (document type, state)
//! placement and carries the transition table enabled there. Terminal
//! states are simply states with no node.

use docflow_store::{DocStore, DocTx, ListWindow, TxScope};
use docflow_store::memory::MemoryDocStore;
use docflow_types::{
    DocStateId, DocTypeId, FlowError, FlowResult, Node, NodeId, NodeKind, TransitionTable,
    Workflow, WorkflowId,
};
use std::sync::Arc;

/// Registry of workflow definitions.
///
/// A stateless service over the storage seam: construct once with the
/// deployment's store and share freely.
pub struct WorkflowRegistry {
    store: Arc<dyn DocStore>,
}

impl WorkflowRegistry {
    /// Create a registry backed by in-memory storage.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryDocStore::new()),
        }
    }

    /// Create a registry backed by an explicit store.
    pub fn with_store(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> Arc<dyn DocStore> {
        Arc::clone(&self.store)
    }

    /// Define a new workflow for a document type, beginning at the given
    /// state.
    ///
    /// Names are trimmed and must be non-empty and globally unique.
    /// Hierarchical names such as `finance.invoice.approval` are
    /// recommended. Passing `tx` enlists the insert in a caller-owned unit
    /// of work; with `None` the registry opens and settles its own.
    pub async fn create(
        &self,
        tx: Option<&mut dyn DocTx>,
        name: &str,
        doctype: DocTypeId,
        begin_state: DocStateId,
    ) -> FlowResult<WorkflowId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FlowError::InvalidArgument(
                "workflow name must not be empty".to_string(),
            ));
        }

        let mut scope = TxScope::open(self.store.as_ref(), tx).await?;
        let result = scope.tx().insert_workflow(name, doctype, begin_state).await;
        let id = scope.finish(result).await?;

        tracing::info!(workflow = %id, name, "Workflow created");
        Ok(id)
    }

    /// Get a workflow by id.
    pub async fn get(&self, id: WorkflowId) -> FlowResult<Workflow> {
        self.store
            .workflow(id)
            .await?
            .ok_or(FlowError::WorkflowNotFound(id))
    }

    /// Look up a workflow by its globally-unique name.
    pub async fn get_by_name(&self, name: &str) -> FlowResult<Option<Workflow>> {
        self.store.workflow_by_name(name.trim()).await
    }

    /// List workflows ascending by id, starting at the smallest id `>=
    /// offset`. A `limit` of 0 means unbounded.
    pub async fn list(&self, offset: i64, limit: i64) -> FlowResult<Vec<Workflow>> {
        if offset < 0 || limit < 0 {
            return Err(FlowError::InvalidArgument(
                "offset and limit must be non-negative".to_string(),
            ));
        }

        self.store
            .list_workflows(ListWindow {
                from: WorkflowId(offset),
                limit: limit as usize,
            })
            .await
    }

    /// List the nodes of a workflow's state graph.
    pub async fn nodes(&self, workflow: WorkflowId) -> FlowResult<Vec<Node>> {
        // Resolve the workflow first so a bad id reports WorkflowNotFound
        // rather than an empty graph.
        let workflow = self.get(workflow).await?;
        self.store.nodes_of_workflow(workflow.id).await
    }

    /// Register a node at a (document type, state) placement, together with
    /// every transition its table enables.
    ///
    /// The node row and all of its transition rows land in one unit of
    /// work: any failure, including a duplicate transition key, leaves
    /// nothing behind. A node must enable at least one action; a state
    /// with no node is terminal.
    pub async fn add_node(
        &self,
        tx: Option<&mut dyn DocTx>,
        doctype: DocTypeId,
        state: DocStateId,
        workflow: WorkflowId,
        name: &str,
        kind: NodeKind,
        transitions: &TransitionTable,
    ) -> FlowResult<NodeId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FlowError::InvalidArgument(
                "node name must not be empty".to_string(),
            ));
        }
        if transitions.is_empty() {
            return Err(FlowError::InvalidArgument(
                "node must enable at least one action".to_string(),
            ));
        }

        let mut scope = TxScope::open(self.store.as_ref(), tx).await?;
        let result =
            insert_node_with_transitions(scope.tx(), doctype, state, workflow, name, kind, transitions)
                .await;
        let id = scope.finish(result).await?;

        tracing::info!(node = %id, workflow = %workflow, state = %state, "Workflow node added");
        Ok(id)
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn insert_node_with_transitions(
    tx: &mut dyn DocTx,
    doctype: DocTypeId,
    state: DocStateId,
    workflow: WorkflowId,
    name: &str,
    kind: NodeKind,
    transitions: &TransitionTable,
) -> FlowResult<NodeId> {
    let id = tx.insert_node(doctype, state, workflow, name, kind).await?;
    for (action, to_state) in transitions.iter() {
        tx.insert_transition(doctype, state, action, to_state).await?;
    }
    Ok(id)
}
