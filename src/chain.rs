//! Append-only approval chain ledger and timeline events
//!
//! The ledger is the single source that makes a transaction's history
//! replayable independently of the cached `status` projection. Entries can
//! be appended and read in order; nothing is ever edited or removed, and
//! timestamps are server-assigned so a client can never backdate a
//! decision.
use crate::types::{Actor, Decision, Role, TimeStamp};
use crate::workflow::Stage;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEntry {
    #[n(0)]
    pub stage: Stage,
    #[n(1)]
    pub actor_id: String,
    #[n(2)]
    pub actor_name: String,
    #[n(3)]
    pub role: Role,
    #[n(4)]
    pub decision: Decision,
    #[n(5)]
    pub note: Option<String>,
    #[n(6)]
    pub at: TimeStamp<Utc>,
}

impl ApprovalEntry {
    /// The timestamp is taken here, never from the caller.
    pub fn new(stage: Stage, actor: &Actor, decision: Decision, note: Option<String>) -> Self {
        Self {
            stage,
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            role: actor.role,
            decision,
            note,
            at: TimeStamp::new(),
        }
    }
}

/// The ordered decision history of one transaction. The inner vector is
/// private: the only mutation exposed is [`ApprovalChain::append`].
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalChain {
    #[n(0)]
    entries: Vec<ApprovalEntry>,
}

impl ApprovalChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: ApprovalEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ApprovalEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ApprovalEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A human-readable timeline event, appended alongside every mutation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    #[n(0)]
    pub label: String,
    #[n(1)]
    pub at: TimeStamp<Utc>,
}

impl Event {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            at: TimeStamp::new(),
        }
    }
}
