//! Stage router: per-type workflow definitions and the pure transition
//! function
//!
//! Every transaction type declares one fixed, ordered stage sequence with
//! an authorized-role set per stage. The tables live here as immutable
//! statics so there is exactly one place that answers "who may act at this
//! stage" — routing never does ad hoc role comparisons at call sites.
use crate::error::{EngineError, require_reason};
use crate::transaction::Transaction;
use crate::types::{Actor, Decision, Role};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    #[n(0)]
    LeaveRequest,
    #[n(1)]
    Settlement,
    #[n(2)]
    ContractAction,
    #[n(3)]
    DeductionProposal,
    #[n(4)]
    AttendanceCorrection,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeaveRequest => "leave_request",
            Self::Settlement => "settlement",
            Self::ContractAction => "contract_action",
            Self::DeductionProposal => "deduction_proposal",
            Self::AttendanceCorrection => "attendance_correction",
        }
    }

    /// Human-readable prefix used when minting a `ref_no`.
    pub fn ref_prefix(&self) -> &'static str {
        match self {
            Self::LeaveRequest => "lv_",
            Self::Settlement => "st_",
            Self::ContractAction => "ca_",
            Self::DeductionProposal => "dd_",
            Self::AttendanceCorrection => "at_",
        }
    }
}

/// A named step in an approval sequence. The executor stage is always the
/// last entry of a definition.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[n(0)]
    Supervisor,
    #[n(1)]
    Ops,
    #[n(2)]
    Finance,
    #[n(3)]
    HrAdmin,
    #[n(4)]
    Manager,
    #[n(5)]
    Ceo,
    #[n(6)]
    Executor,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Ops => "ops",
            Self::Finance => "finance",
            Self::HrAdmin => "hr_admin",
            Self::Manager => "manager",
            Self::Ceo => "ceo",
            Self::Executor => "executor",
        }
    }
}

/// The cached state-machine projection. Only ever updated together with a
/// ledger append; see [`Transaction::apply`].
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Executed,
    #[n(3)]
    Rejected,
    #[n(4)]
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Rejected | Self::Cancelled)
    }
}

/// An action a caller may take against a non-terminal transaction through
/// `act()`. Execution and cancellation are separate operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
    /// Route a transaction the executor found problematic back to an
    /// earlier stage instead of unilaterally overturning it.
    Return { to: Stage },
}

#[derive(Debug, Clone, Copy)]
pub struct StageDef {
    pub stage: Stage,
    pub roles: &'static [Role],
    /// Optional stages are skipped unless the transaction's payload asks
    /// for them (e.g. finance review of long leave).
    pub optional: bool,
}

impl StageDef {
    pub fn authorizes(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowDefinition {
    pub kind: TransactionKind,
    pub stages: &'static [StageDef],
}

const EXECUTOR: StageDef = StageDef {
    stage: Stage::Executor,
    roles: &[Role::Gm],
    optional: false,
};

static LEAVE_REQUEST: WorkflowDefinition = WorkflowDefinition {
    kind: TransactionKind::LeaveRequest,
    stages: &[
        StageDef {
            stage: Stage::Supervisor,
            roles: &[Role::Supervisor],
            optional: false,
        },
        StageDef {
            stage: Stage::Ops,
            roles: &[Role::Ops],
            optional: false,
        },
        StageDef {
            stage: Stage::Finance,
            roles: &[Role::Finance],
            optional: true,
        },
        EXECUTOR,
    ],
};

// Settlements are admin-created and land directly on the executor's desk.
static SETTLEMENT: WorkflowDefinition = WorkflowDefinition {
    kind: TransactionKind::Settlement,
    stages: &[EXECUTOR],
};

static CONTRACT_ACTION: WorkflowDefinition = WorkflowDefinition {
    kind: TransactionKind::ContractAction,
    stages: &[
        StageDef {
            stage: Stage::HrAdmin,
            roles: &[Role::HrAdmin],
            optional: false,
        },
        StageDef {
            stage: Stage::Ceo,
            roles: &[Role::Ceo],
            optional: false,
        },
        EXECUTOR,
    ],
};

static DEDUCTION_PROPOSAL: WorkflowDefinition = WorkflowDefinition {
    kind: TransactionKind::DeductionProposal,
    stages: &[
        StageDef {
            stage: Stage::Manager,
            roles: &[Role::Manager],
            optional: false,
        },
        EXECUTOR,
    ],
};

static ATTENDANCE_CORRECTION: WorkflowDefinition = WorkflowDefinition {
    kind: TransactionKind::AttendanceCorrection,
    stages: &[
        StageDef {
            stage: Stage::Supervisor,
            roles: &[Role::Supervisor],
            optional: false,
        },
        StageDef {
            stage: Stage::HrAdmin,
            roles: &[Role::HrAdmin],
            optional: false,
        },
        EXECUTOR,
    ],
};

pub fn definition(kind: TransactionKind) -> &'static WorkflowDefinition {
    match kind {
        TransactionKind::LeaveRequest => &LEAVE_REQUEST,
        TransactionKind::Settlement => &SETTLEMENT,
        TransactionKind::ContractAction => &CONTRACT_ACTION,
        TransactionKind::DeductionProposal => &DEDUCTION_PROPOSAL,
        TransactionKind::AttendanceCorrection => &ATTENDANCE_CORRECTION,
    }
}

impl WorkflowDefinition {
    pub fn stage_def(&self, stage: Stage) -> Option<&StageDef> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// True when the role appears anywhere in this workflow's stage table.
    /// Used to gate cancellation, which is not bound to a single stage.
    pub fn authorizes(&self, role: Role) -> bool {
        self.stages.iter().any(|s| s.authorizes(role))
    }

    /// The stage sequence for one concrete transaction, with optional
    /// stages the payload did not ask for filtered out.
    fn included<'a>(&'a self, txn: &'a Transaction) -> impl Iterator<Item = &'a StageDef> {
        self.stages
            .iter()
            .filter(|s| !s.optional || txn.data.wants_stage(s.stage))
    }

    pub fn initial_stage(&self, txn: &Transaction) -> Stage {
        self.included(txn)
            .next()
            .map(|s| s.stage)
            // definitions always carry at least the executor stage
            .unwrap_or(Stage::Executor)
    }

    pub fn next_stage(&self, current: Stage, txn: &Transaction) -> Option<Stage> {
        self.included(txn)
            .skip_while(|s| s.stage != current)
            .nth(1)
            .map(|s| s.stage)
    }
}

/// The result of routing one action: the projection and markers to write,
/// always applied together with a ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteOutcome {
    pub status: Status,
    pub stage: Stage,
    pub decision: Decision,
    pub rejection_source: Option<Stage>,
    pub ceo_rejected: bool,
}

/// Pure transition function: `(type, current stage, action, actor role)`
/// to the next `(status, stage)` or an error. Performs no mutation.
pub fn route(
    txn: &Transaction,
    action: Action,
    actor: &Actor,
    note: Option<&str>,
) -> Result<RouteOutcome, EngineError> {
    if txn.status.is_terminal() {
        // never a silent no-op: callers must be able to tell "nothing
        // happened" from "already happened"
        return Err(EngineError::invalid_state(format!(
            "transaction {} is already {}",
            txn.ref_no,
            txn.status.as_str()
        )));
    }

    let def = definition(txn.kind());
    let current = txn.current_stage;
    let stage_def = def
        .stage_def(current)
        .ok_or_else(|| EngineError::invalid_state(format!("unknown stage {current:?}")))?;

    if !stage_def.authorizes(actor.role) {
        return Err(EngineError::PermissionDenied {
            stage: current,
            role: actor.role,
        });
    }

    match action {
        Action::Approve => {
            if current == Stage::Executor {
                return Err(EngineError::invalid_state(
                    "the executor stage executes, rejects or returns; it does not approve",
                ));
            }
            let next = def.next_stage(current, txn).ok_or_else(|| {
                EngineError::invalid_state(format!("no stage follows {current:?}"))
            })?;
            let status = if next == Stage::Executor {
                Status::Approved
            } else {
                Status::Pending
            };
            Ok(RouteOutcome {
                status,
                stage: next,
                decision: Decision::Approve,
                rejection_source: txn.rejection_source,
                ceo_rejected: txn.ceo_rejected,
            })
        }
        Action::Reject => match current {
            // An executor rejection is final and must carry a reason.
            Stage::Executor => {
                require_reason("note", note)?;
                Ok(RouteOutcome {
                    status: Status::Rejected,
                    stage: current,
                    decision: Decision::Reject,
                    rejection_source: Some(current),
                    ceo_rejected: txn.ceo_rejected,
                })
            }
            // A CEO rejection escalates to the executor for arbitration
            // rather than terminating outright; the executor then either
            // confirms the rejection or returns the record to the CEO.
            Stage::Ceo => Ok(RouteOutcome {
                status: Status::Approved,
                stage: Stage::Executor,
                decision: Decision::Reject,
                rejection_source: Some(Stage::Ceo),
                ceo_rejected: true,
            }),
            _ => Ok(RouteOutcome {
                status: Status::Rejected,
                stage: current,
                decision: Decision::Reject,
                rejection_source: Some(current),
                ceo_rejected: txn.ceo_rejected,
            }),
        },
        Action::Return { to } => {
            if current != Stage::Executor {
                return Err(EngineError::invalid_state(
                    "only the executor stage may return a transaction",
                ));
            }
            // ceo_rejected takes precedence over rejection_source when
            // choosing the legal return target.
            let target = if txn.ceo_rejected {
                Stage::Ceo
            } else {
                txn.rejection_source.ok_or_else(|| {
                    EngineError::invalid_state(
                        "nothing to return: no earlier rejection is recorded",
                    )
                })?
            };
            if to != target {
                return Err(EngineError::invalid_state(format!(
                    "return must target the rejecting stage {target:?}, got {to:?}"
                )));
            }
            if def.stage_def(to).is_none() {
                return Err(EngineError::invalid_state(format!(
                    "stage {to:?} is not part of this workflow"
                )));
            }
            Ok(RouteOutcome {
                status: Status::Pending,
                stage: to,
                decision: Decision::Return,
                rejection_source: None,
                ceo_rejected: false,
            })
        }
    }
}
