//! Workflow definitions: one directed state graph per document type.
//!
//! A workflow record carries only the graph's anchor: the document type it
//! governs and the state every document of that type begins in. The graph's
//! edges live in the per-state transition tables of the workflow's nodes.
//!
//! Definitions are immutable once persisted.

use crate::{DocStateId, DocTypeId, WorkflowId};
use serde::{Deserialize, Serialize};

/// A workflow definition.
///
/// Names are unique system-wide; a hierarchical convention such as
/// `"finance.invoice.approval"` keeps them collision-free across teams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Storage-assigned identifier.
    pub id: WorkflowId,
    /// Globally-unique name.
    pub name: String,
    /// The document type this workflow governs.
    pub doctype: DocTypeId,
    /// The state every document of this type starts its life cycle in.
    pub begin_state: DocStateId,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        name: impl Into<String>,
        doctype: DocTypeId,
        begin_state: DocStateId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            doctype,
            begin_state,
        }
    }
}
