//! Workflow nodes: per-state resolvers of enabled actions.
//!
//! Each node governs exactly one (document type, state) pair and owns a
//! transition table, a partial function from action to destination state.
//! A state with no node has no enabled actions; that is how terminal states
//! are expressed.

use crate::{DocActionId, DocStateId, DocTypeId, FlowError, FlowResult, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Node Kind ────────────────────────────────────────────────────────

/// Role of a node within its workflow's state graph.
///
/// The kind is informational: routing is decided entirely by the transition
/// table, and a document is terminal wherever no node governs its state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Governs the workflow's begin state.
    Start,
    /// An intermediate state in the document's life cycle.
    Normal,
    /// Governs a state whose outgoing actions wind the life cycle down.
    End,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Normal => "normal",
            Self::End => "end",
        };
        write!(f, "{label}")
    }
}

// ── Transition Table ─────────────────────────────────────────────────

/// Action routing for one (document type, state) pair.
///
/// A partial function: each action maps to at most one destination state.
/// Inserting a second destination for an already-mapped action is rejected,
/// and storage enforces the same uniqueness on its transition key, so the
/// in-memory and persisted copies cannot diverge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTable {
    routes: BTreeMap<DocActionId, DocStateId>,
}

impl TransitionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from (action, destination) pairs.
    ///
    /// Fails with [`FlowError::Duplicate`] when a pair repeats an action.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (DocActionId, DocStateId)>,
    ) -> FlowResult<Self> {
        let mut table = Self::new();
        for (action, to_state) in pairs {
            table.insert(action, to_state)?;
        }
        Ok(table)
    }

    /// Route `action` to `to_state`.
    pub fn insert(&mut self, action: DocActionId, to_state: DocStateId) -> FlowResult<()> {
        if self.routes.contains_key(&action) {
            return Err(FlowError::Duplicate(format!(
                "action {action} is already routed in this transition table"
            )));
        }
        self.routes.insert(action, to_state);
        Ok(())
    }

    /// Destination state for `action`, if the action is enabled here.
    pub fn resolve(&self, action: DocActionId) -> Option<DocStateId> {
        self.routes.get(&action).copied()
    }

    /// Iterate (action, destination) pairs in action order.
    pub fn iter(&self) -> impl Iterator<Item = (DocActionId, DocStateId)> + '_ {
        self.routes.iter().map(|(action, to)| (*action, *to))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A map already holds at most one destination per action, so this cannot
/// break the partial-function rule. Used by backends when hydrating a node
/// from uniquely-keyed transition rows.
impl From<BTreeMap<DocActionId, DocStateId>> for TransitionTable {
    fn from(routes: BTreeMap<DocActionId, DocStateId>) -> Self {
        Self { routes }
    }
}

// ── Node ─────────────────────────────────────────────────────────────

/// A node in a workflow's state graph.
///
/// At most one node governs a given (document type, state) pair; storage
/// enforces that uniqueness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Storage-assigned identifier.
    pub id: NodeId,
    /// The document type this node belongs to.
    pub doctype: DocTypeId,
    /// The single state this node governs.
    pub state: DocStateId,
    /// The workflow this node is part of.
    pub workflow: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Informational role tag.
    pub kind: NodeKind,
    /// Enabled actions and their destination states.
    pub transitions: TransitionTable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn insert_rejects_duplicate_action() {
        let mut table = TransitionTable::new();
        table.insert(DocActionId(1), DocStateId(20)).unwrap();

        let result = table.insert(DocActionId(1), DocStateId(30));
        assert!(matches!(result, Err(FlowError::Duplicate(_))));
        // The original route survives.
        assert_eq!(table.resolve(DocActionId(1)), Some(DocStateId(20)));
    }

    #[test]
    fn from_pairs_validates_uniqueness() {
        let result = TransitionTable::from_pairs([
            (DocActionId(1), DocStateId(20)),
            (DocActionId(2), DocStateId(30)),
            (DocActionId(1), DocStateId(40)),
        ]);
        assert!(matches!(result, Err(FlowError::Duplicate(_))));

        let table = TransitionTable::from_pairs([
            (DocActionId(1), DocStateId(20)),
            (DocActionId(2), DocStateId(30)),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn resolve_unmapped_action_returns_none() {
        let table = TransitionTable::from_pairs([(DocActionId(1), DocStateId(20))]).unwrap();
        assert_eq!(table.resolve(DocActionId(99)), None);
    }

    #[test]
    fn iter_yields_pairs_in_action_order() {
        let table = TransitionTable::from_pairs([
            (DocActionId(9), DocStateId(90)),
            (DocActionId(1), DocStateId(20)),
        ])
        .unwrap();
        let pairs: Vec<_> = table.iter().collect();
        assert_eq!(
            pairs,
            vec![
                (DocActionId(1), DocStateId(20)),
                (DocActionId(9), DocStateId(90)),
            ]
        );
    }

    #[test]
    fn node_round_trips_through_json() {
        let node = Node {
            id: NodeId(3),
            doctype: DocTypeId(1),
            state: DocStateId(10),
            workflow: WorkflowId(1),
            name: "draft review".to_string(),
            kind: NodeKind::Start,
            transitions: TransitionTable::from_pairs([(DocActionId(1), DocStateId(20))]).unwrap(),
        };
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    proptest! {
        /// Whatever insertion sequence arrives, the table stays a partial
        /// function: the first destination for an action wins and every
        /// later attempt on the same action is rejected.
        #[test]
        fn table_stays_a_partial_function(
            pairs in proptest::collection::vec((0..16i64, 0..16i64), 0..48)
        ) {
            let mut table = TransitionTable::new();
            let mut expected = std::collections::BTreeMap::new();

            for (action, to_state) in pairs {
                let result = table.insert(DocActionId(action), DocStateId(to_state));
                if expected.contains_key(&action) {
                    prop_assert!(matches!(result, Err(FlowError::Duplicate(_))));
                } else {
                    prop_assert!(result.is_ok());
                    expected.insert(action, to_state);
                }
            }

            prop_assert_eq!(table.len(), expected.len());
            for (action, to_state) in expected {
                prop_assert_eq!(
                    table.resolve(DocActionId(action)),
                    Some(DocStateId(to_state))
                );
            }
        }
    }
}
