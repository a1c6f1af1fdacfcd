//! In-memory backend for the docflow storage traits.
//!
//! Deterministic and test-friendly. A unit of work holds the store's single
//! writer guard and stages a full copy of the state: commit swaps the copy
//! in, rollback drops it. Conflicting event applications therefore
//! serialize the same way the PostgreSQL row CAS serializes them: one
//! winner, one `AlreadyApplied`.
//!
//! The guard also serializes committed reads against an open unit of work,
//! so in-transaction code must read through [`DocTx`], not back through
//! [`DocStore`]. Production deployments should use the PostgreSQL backend
//! for source-of-truth data.

use crate::traits::{DocStore, DocTx, ListWindow};
use async_trait::async_trait;
use chrono::Utc;
use docflow_types::{
    DocActionId, DocEvent, DocStateId, DocTypeId, EventId, EventStatus, FlowError, FlowResult,
    GroupId, IntentId, Node, NodeId, NodeKind, NotificationIntent, TransitionTable, Workflow,
    WorkflowId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct MemState {
    next_workflow_id: i64,
    next_node_id: i64,
    next_event_id: i64,
    next_intent_id: i64,
    workflows: BTreeMap<WorkflowId, Workflow>,
    // Node rows are stored with empty tables; transitions live in their own
    // keyed map, mirroring the relational layout, and are joined on read.
    nodes: BTreeMap<NodeId, Node>,
    transitions: BTreeMap<(DocTypeId, DocStateId, DocActionId), DocStateId>,
    events: BTreeMap<EventId, DocEvent>,
    notifications: Vec<NotificationIntent>,
}

impl MemState {
    fn hydrate(&self, row: &Node) -> Node {
        let routes: BTreeMap<DocActionId, DocStateId> = self
            .transitions
            .iter()
            .filter(|((doctype, from_state, _), _)| {
                *doctype == row.doctype && *from_state == row.state
            })
            .map(|((_, _, action), to_state)| (*action, *to_state))
            .collect();

        let mut node = row.clone();
        node.transitions = TransitionTable::from(routes);
        node
    }

    fn node_by_state(&self, doctype: DocTypeId, state: DocStateId) -> Option<Node> {
        self.nodes
            .values()
            .find(|node| node.doctype == doctype && node.state == state)
            .map(|row| self.hydrate(row))
    }

    fn list_workflows(&self, window: ListWindow) -> Vec<Workflow> {
        let iter = self.workflows.range(window.from..).map(|(_, w)| w.clone());
        if window.limit == 0 {
            iter.collect()
        } else {
            iter.take(window.limit).collect()
        }
    }
}

/// In-memory docflow storage adapter.
#[derive(Default)]
pub struct MemoryDocStore {
    state: Arc<Mutex<MemState>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocStore for MemoryDocStore {
    async fn begin(&self) -> FlowResult<Box<dyn DocTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn workflow(&self, id: WorkflowId) -> FlowResult<Option<Workflow>> {
        let state = self.state.lock().await;
        Ok(state.workflows.get(&id).cloned())
    }

    async fn workflow_by_name(&self, name: &str) -> FlowResult<Option<Workflow>> {
        let state = self.state.lock().await;
        Ok(state.workflows.values().find(|w| w.name == name).cloned())
    }

    async fn list_workflows(&self, window: ListWindow) -> FlowResult<Vec<Workflow>> {
        let state = self.state.lock().await;
        Ok(state.list_workflows(window))
    }

    async fn node_by_state(
        &self,
        doctype: DocTypeId,
        state: DocStateId,
    ) -> FlowResult<Option<Node>> {
        let guard = self.state.lock().await;
        Ok(guard.node_by_state(doctype, state))
    }

    async fn nodes_of_workflow(&self, workflow: WorkflowId) -> FlowResult<Vec<Node>> {
        let state = self.state.lock().await;
        Ok(state
            .nodes
            .values()
            .filter(|node| node.workflow == workflow)
            .map(|row| state.hydrate(row))
            .collect())
    }

    async fn event(&self, id: EventId) -> FlowResult<Option<DocEvent>> {
        let state = self.state.lock().await;
        Ok(state.events.get(&id).cloned())
    }

    async fn notifications_for_event(
        &self,
        event: EventId,
    ) -> FlowResult<Vec<NotificationIntent>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .filter(|intent| intent.event == event)
            .cloned()
            .collect())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemState>,
    staged: MemState,
}

#[async_trait]
impl DocTx for MemoryTx {
    async fn insert_workflow(
        &mut self,
        name: &str,
        doctype: DocTypeId,
        begin_state: DocStateId,
    ) -> FlowResult<WorkflowId> {
        if self.staged.workflows.values().any(|w| w.name == name) {
            return Err(FlowError::Duplicate(format!(
                "workflow {name} already exists"
            )));
        }

        self.staged.next_workflow_id += 1;
        let id = WorkflowId(self.staged.next_workflow_id);
        self.staged
            .workflows
            .insert(id, Workflow::new(id, name, doctype, begin_state));
        Ok(id)
    }

    async fn insert_node(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
        workflow: WorkflowId,
        name: &str,
        kind: NodeKind,
    ) -> FlowResult<NodeId> {
        if self
            .staged
            .nodes
            .values()
            .any(|node| node.doctype == doctype && node.state == state)
        {
            return Err(FlowError::Duplicate(format!(
                "node for document type {doctype} at state {state} already exists"
            )));
        }

        self.staged.next_node_id += 1;
        let id = NodeId(self.staged.next_node_id);
        self.staged.nodes.insert(
            id,
            Node {
                id,
                doctype,
                state,
                workflow,
                name: name.to_string(),
                kind,
                transitions: TransitionTable::new(),
            },
        );
        Ok(id)
    }

    async fn insert_transition(
        &mut self,
        doctype: DocTypeId,
        from_state: DocStateId,
        action: DocActionId,
        to_state: DocStateId,
    ) -> FlowResult<()> {
        let key = (doctype, from_state, action);
        if self.staged.transitions.contains_key(&key) {
            return Err(FlowError::Duplicate(format!(
                "transition for document type {doctype} from state {from_state} on action {action} already exists"
            )));
        }
        self.staged.transitions.insert(key, to_state);
        Ok(())
    }

    async fn insert_event(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
        action: DocActionId,
    ) -> FlowResult<EventId> {
        self.staged.next_event_id += 1;
        let id = EventId(self.staged.next_event_id);
        self.staged.events.insert(
            id,
            DocEvent {
                id,
                doctype,
                state,
                action,
                status: EventStatus::Created,
            },
        );
        Ok(id)
    }

    async fn mark_event_applied(&mut self, event: EventId) -> FlowResult<()> {
        let record = self
            .staged
            .events
            .get_mut(&event)
            .ok_or(FlowError::EventNotFound(event))?;

        if record.status == EventStatus::Applied {
            return Err(FlowError::AlreadyApplied(event));
        }
        record.status = EventStatus::Applied;
        Ok(())
    }

    async fn record_notification(
        &mut self,
        event: EventId,
        new_state: DocStateId,
        group: GroupId,
    ) -> FlowResult<NotificationIntent> {
        self.staged.next_intent_id += 1;
        let intent = NotificationIntent {
            id: IntentId(self.staged.next_intent_id),
            event,
            new_state,
            group,
            created_at: Utc::now(),
        };
        self.staged.notifications.push(intent.clone());
        Ok(intent)
    }

    async fn node_by_state(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
    ) -> FlowResult<Option<Node>> {
        Ok(self.staged.node_by_state(doctype, state))
    }

    async fn commit(self: Box<Self>) -> FlowResult<()> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> FlowResult<()> {
        drop(self);
        Ok(())
    }
}
