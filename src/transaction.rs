//! The transaction aggregate: the single mutable record the engine owns
use crate::chain::{ApprovalChain, ApprovalEntry, Event};
use crate::error::EngineError;
use crate::types::{Actor, Decision, TimeStamp};
use crate::utils::new_uuid_to_bech32;
use crate::workflow::{self, RouteOutcome, Stage, Status, TransactionKind};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveRequest {
    #[n(0)]
    pub employee_id: String,
    #[n(1)]
    pub days: u32,
    #[n(2)]
    pub from: TimeStamp<Utc>,
    #[n(3)]
    pub note: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    #[n(0)]
    pub employee_id: String,
    /// Amount in the smallest currency unit.
    #[n(1)]
    pub amount: u64,
    #[n(2)]
    pub reason: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractOp {
    #[n(0)]
    Activate,
    #[n(1)]
    Renew,
    #[n(2)]
    Terminate,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ContractAction {
    #[n(0)]
    pub employee_id: String,
    #[n(1)]
    pub op: ContractOp,
    #[n(2)]
    pub effective: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DeductionProposal {
    #[n(0)]
    pub employee_id: String,
    #[n(1)]
    pub amount: u64,
    #[n(2)]
    pub months: u32,
    #[n(3)]
    pub reason: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AttendanceCorrection {
    #[n(0)]
    pub employee_id: String,
    #[n(1)]
    pub day: TimeStamp<Utc>,
    #[n(2)]
    pub check_in: Option<TimeStamp<Utc>>,
    #[n(3)]
    pub check_out: Option<TimeStamp<Utc>>,
    #[n(4)]
    pub reason: String,
}

/// The immutable input payload, tagged by transaction type.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum TransactionData {
    #[n(0)]
    LeaveRequest(#[n(0)] LeaveRequest),
    #[n(1)]
    Settlement(#[n(0)] Settlement),
    #[n(2)]
    ContractAction(#[n(0)] ContractAction),
    #[n(3)]
    DeductionProposal(#[n(0)] DeductionProposal),
    #[n(4)]
    AttendanceCorrection(#[n(0)] AttendanceCorrection),
}

/// Finance review is pulled in when a leave request spans more than this
/// many days.
const FINANCE_REVIEW_DAYS: u32 = 14;

impl TransactionData {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::LeaveRequest(_) => TransactionKind::LeaveRequest,
            Self::Settlement(_) => TransactionKind::Settlement,
            Self::ContractAction(_) => TransactionKind::ContractAction,
            Self::DeductionProposal(_) => TransactionKind::DeductionProposal,
            Self::AttendanceCorrection(_) => TransactionKind::AttendanceCorrection,
        }
    }

    pub fn employee_id(&self) -> &str {
        match self {
            Self::LeaveRequest(d) => &d.employee_id,
            Self::Settlement(d) => &d.employee_id,
            Self::ContractAction(d) => &d.employee_id,
            Self::DeductionProposal(d) => &d.employee_id,
            Self::AttendanceCorrection(d) => &d.employee_id,
        }
    }

    /// Whether an optional stage of this type's workflow applies to this
    /// concrete payload.
    pub fn wants_stage(&self, stage: Stage) -> bool {
        match (self, stage) {
            (Self::LeaveRequest(leave), Stage::Finance) => leave.days > FINANCE_REVIEW_DAYS,
            _ => false,
        }
    }
}

/// One HR transaction. Mutated only through [`Transaction::apply`],
/// [`Transaction::record_cancel`] and [`Transaction::stamp_executed`];
/// each of those appends to the ledger, pushes a timeline event and bumps
/// `version` in the same step, keeping the cached projection consistent
/// with the history.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub ref_no: String,
    #[n(2)]
    pub data: TransactionData,
    #[n(3)]
    pub status: Status,
    #[n(4)]
    pub current_stage: Stage,
    #[n(5)]
    pub approval_chain: ApprovalChain,
    #[n(6)]
    pub timeline: Vec<Event>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub executed_at: Option<TimeStamp<Utc>>,
    #[n(9)]
    pub pdf_hash: Option<String>,
    #[n(10)]
    pub integrity_id: Option<String>,
    #[n(11)]
    pub rejection_source: Option<Stage>,
    #[n(12)]
    pub ceo_rejected: bool,
    #[n(13)]
    pub version: u64,
}

impl Transaction {
    /// Create a new transaction in its type's initial pending stage.
    pub fn submit(data: TransactionData) -> Result<Self, EngineError> {
        let id = new_uuid_to_bech32("txn_")
            .map_err(|e| EngineError::dependency("id generation", e))?;
        let ref_no = new_uuid_to_bech32(data.kind().ref_prefix())
            .map_err(|e| EngineError::dependency("ref_no generation", e))?;

        let mut txn = Self {
            id,
            ref_no,
            data,
            status: Status::Pending,
            current_stage: Stage::Executor,
            approval_chain: ApprovalChain::new(),
            timeline: vec![],
            created_at: TimeStamp::new(),
            executed_at: None,
            pdf_hash: None,
            integrity_id: None,
            rejection_source: None,
            ceo_rejected: false,
            version: 0,
        };

        let def = workflow::definition(txn.kind());
        txn.current_stage = def.initial_stage(&txn);
        // admin-created types land directly awaiting execution
        if txn.current_stage == Stage::Executor {
            txn.status = Status::Approved;
        }
        txn.timeline.push(Event::new(format!(
            "submitted, pending {}",
            txn.current_stage.as_str()
        )));

        Ok(txn)
    }

    pub fn kind(&self) -> TransactionKind {
        self.data.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a routed transition: ledger append, projection update and
    /// version bump in one step. The entry records the stage the decision
    /// was taken at, not the stage being moved to.
    pub fn apply(&mut self, outcome: RouteOutcome, actor: &Actor, note: Option<&str>) {
        let entry = ApprovalEntry::new(self.current_stage, actor, outcome.decision, clean(note));
        self.approval_chain.append(entry);

        self.timeline.push(Event::new(format!(
            "{:?} by {} at {}",
            outcome.decision,
            actor.name,
            self.current_stage.as_str()
        )));

        self.status = outcome.status;
        self.current_stage = outcome.stage;
        self.rejection_source = outcome.rejection_source;
        self.ceo_rejected = outcome.ceo_rejected;
        self.version += 1;
    }

    /// Record a cancellation. The reason is validated by the caller before
    /// any mutation happens.
    pub fn record_cancel(&mut self, actor: &Actor, reason: String) {
        let entry = ApprovalEntry::new(
            self.current_stage,
            actor,
            Decision::Cancel,
            Some(reason.clone()),
        );
        self.approval_chain.append(entry);
        self.timeline
            .push(Event::new(format!("cancelled by {}: {reason}", actor.name)));
        self.status = Status::Cancelled;
        self.version += 1;
    }

    /// Stamp the record executed. Called exactly once per transaction,
    /// only by the execution guard after the domain effect and document
    /// render succeeded. `executed_at`, `pdf_hash` and `integrity_id` are
    /// set together here and never recomputed afterwards.
    pub(crate) fn stamp_executed(
        &mut self,
        pdf_hash: String,
        integrity_id: String,
        actor: &Actor,
        note: Option<&str>,
    ) {
        let entry = ApprovalEntry::new(self.current_stage, actor, Decision::Execute, clean(note));
        self.approval_chain.append(entry);
        self.timeline
            .push(Event::new(format!("executed by {}", actor.name)));

        self.status = Status::Executed;
        self.executed_at = Some(TimeStamp::new());
        self.pdf_hash = Some(pdf_hash);
        self.integrity_id = Some(integrity_id);
        self.version += 1;
    }
}

/// Notes land in the ledger the way validation saw them: trimmed, and
/// absent when nothing but whitespace was given.
fn clean(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use crate::workflow::Action;

    fn leave(days: u32) -> Transaction {
        Transaction::submit(TransactionData::LeaveRequest(LeaveRequest {
            employee_id: "emp_1".into(),
            days,
            from: TimeStamp::new(),
            note: None,
        }))
        .unwrap()
    }

    #[test]
    fn submit_starts_at_initial_stage() {
        let txn = leave(3);

        assert_eq!(txn.status, Status::Pending);
        assert_eq!(txn.current_stage, Stage::Supervisor);
        assert_eq!(txn.version, 0);
        assert!(txn.approval_chain.is_empty());
        assert!(txn.ref_no.starts_with("lv_1"));
    }

    #[test]
    fn settlement_submits_straight_to_executor() {
        let txn = Transaction::submit(TransactionData::Settlement(Settlement {
            employee_id: "emp_2".into(),
            amount: 120_000,
            reason: "end of service".into(),
        }))
        .unwrap();

        assert_eq!(txn.status, Status::Approved);
        assert_eq!(txn.current_stage, Stage::Executor);
    }

    #[test]
    fn apply_records_the_deciding_stage() {
        let mut txn = leave(3);
        let supervisor = Actor::new("user_sup", "Sami", Role::Supervisor);

        let outcome = workflow::route(&txn, Action::Approve, &supervisor, None).unwrap();
        txn.apply(outcome, &supervisor, Some("fine by me"));

        assert_eq!(txn.current_stage, Stage::Ops);
        assert_eq!(txn.version, 1);
        let entry = txn.approval_chain.last().unwrap();
        assert_eq!(entry.stage, Stage::Supervisor);
        assert_eq!(entry.decision, Decision::Approve);
        assert_eq!(entry.note.as_deref(), Some("fine by me"));
    }

    #[test]
    fn notes_are_stored_trimmed() {
        let mut txn = leave(3);
        txn.current_stage = Stage::Executor;
        txn.status = Status::Approved;
        let gm = Actor::new("user_gm", "Ghada", Role::Gm);

        let note = Some("  policy ceiling exceeded  ");
        let outcome = workflow::route(&txn, Action::Reject, &gm, note).unwrap();
        txn.apply(outcome, &gm, note);

        assert_eq!(
            txn.approval_chain.last().unwrap().note.as_deref(),
            Some("policy ceiling exceeded")
        );
    }

    #[test]
    fn transaction_encoding() {
        let txn = leave(20);

        let encoded = minicbor::to_vec(&txn).unwrap();
        let decoded: Transaction = minicbor::decode(&encoded).unwrap();

        assert_eq!(txn, decoded);
    }
}
