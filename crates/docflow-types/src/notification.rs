//! Notification intents: the hand-off to the delivery machinery.
//!
//! One intent is recorded per recipient group after a successful transition,
//! in the same unit of work as the transition itself. Delivery mechanics
//! (mailboxes, digests, webhooks) consume these records and are out of
//! scope here.

use crate::{DocStateId, EventId, GroupId, IntentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending notification for one recipient group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    /// Storage-assigned identifier.
    pub id: IntentId,
    /// The event whose application produced this intent.
    pub event: EventId,
    /// The state the document moved to.
    pub new_state: DocStateId,
    /// The group to be notified.
    pub group: GroupId,
    /// When the intent was recorded.
    pub created_at: DateTime<Utc>,
}
