//! Document events: discrete triggers proposed for application.
//!
//! An event is created upstream (by a user action or a system trigger),
//! consumed exactly once by the engine, and retained afterwards as an audit
//! record. Its status is a one-way machine: Created → Applied, exactly once.

use crate::{DocActionId, DocStateId, DocTypeId, EventId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application status of a document event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// Recorded, not yet applied.
    Created,
    /// Consumed by a successful transition. Terminal.
    Applied,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Applied => "applied",
        };
        write!(f, "{label}")
    }
}

/// A document event: `action` proposed against a document of `doctype`
/// currently sitting at `state`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEvent {
    /// Storage-assigned identifier.
    pub id: EventId,
    /// Document type of the document this event concerns.
    pub doctype: DocTypeId,
    /// The state the document is at when the event is proposed.
    pub state: DocStateId,
    /// The action this event carries.
    pub action: DocActionId,
    /// One-way application status.
    pub status: EventStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_are_stable() {
        assert_eq!(EventStatus::Created.to_string(), "created");
        assert_eq!(EventStatus::Applied.to_string(), "applied");
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = DocEvent {
            id: EventId(5),
            doctype: DocTypeId(1),
            state: DocStateId(10),
            action: DocActionId(1),
            status: EventStatus::Created,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: DocEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
