//! Policy evaluator boundary: pre-execution checks and evidence
//!
//! The evaluator is an external collaborator; the engine only defines the
//! contract and the gating rule. A `Fail` check blocks execution, a `Warn`
//! is informational, and the trace is display-only context for the human
//! decision — it never influences control flow.
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// A single pre-execution check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
    pub evidence: Option<String>,
}

impl PreCheck {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Pass, detail)
    }

    pub fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Warn, detail)
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Fail, detail)
    }

    fn with_status(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// Before/after snapshot of the authoritative fields the domain effect
/// will touch, plus the formula and policy reference behind the numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeforeAfterSnapshot {
    pub formula: String,
    pub policy_ref: String,
    pub before: Vec<(String, String)>,
    pub after: Vec<(String, String)>,
}

/// One step of the evaluator's evidentiary trace. Display-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub step: String,
    pub checked: String,
    pub found: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub checks: Vec<PreCheck>,
    pub snapshot: BeforeAfterSnapshot,
    pub trace: Vec<TraceStep>,
}

impl Evaluation {
    /// True iff no check failed. Warnings do not block.
    pub fn all_checks_pass(&self) -> bool {
        !self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    pub fn failing(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| c.name.clone())
            .collect()
    }
}

pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, txn: &Transaction) -> anyhow::Result<Evaluation>;
}

/// An evaluator returning a fixed result for every transaction. Useful as
/// a deployment default for types without policy rules and as a test
/// double.
#[derive(Debug, Clone, Default)]
pub struct FixedEvaluator {
    evaluation: Evaluation,
}

impl FixedEvaluator {
    pub fn new(evaluation: Evaluation) -> Self {
        Self { evaluation }
    }

    /// All checks pass, empty evidence.
    pub fn passing() -> Self {
        Self::default()
    }
}

impl PolicyEvaluator for FixedEvaluator {
    fn evaluate(&self, _txn: &Transaction) -> anyhow::Result<Evaluation> {
        Ok(self.evaluation.clone())
    }
}
