//! Execution guard: idempotency, check-gating and atomicity around the
//! `execute` transition
use crate::effects::{DocumentService, EffectRegistry};
use crate::error::EngineError;
use crate::policy::PolicyEvaluator;
use crate::transaction::Transaction;
use crate::types::Actor;
use crate::utils::new_uuid_to_bech32;
use crate::workflow::{self, Stage, Status};

/// What an `execute` call produced. Re-invoking execute on an executed
/// transaction is a completed-fact confirmation, not an error, so both
/// shapes carry the issued document hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Executed { ref_no: String, pdf_hash: String },
    AlreadyExecuted { ref_no: String, pdf_hash: String },
}

impl ExecuteOutcome {
    pub fn pdf_hash(&self) -> &str {
        match self {
            Self::Executed { pdf_hash, .. } | Self::AlreadyExecuted { pdf_hash, .. } => pdf_hash,
        }
    }
}

pub struct ExecutionGuard<'a> {
    evaluator: &'a dyn PolicyEvaluator,
    documents: &'a dyn DocumentService,
    effects: &'a EffectRegistry,
}

impl<'a> ExecutionGuard<'a> {
    pub fn new(
        evaluator: &'a dyn PolicyEvaluator,
        documents: &'a dyn DocumentService,
        effects: &'a EffectRegistry,
    ) -> Self {
        Self {
            evaluator,
            documents,
            effects,
        }
    }

    /// Run the execute transition on an exclusively held record.
    ///
    /// The record is only mutated after every fallible step (pre-checks,
    /// domain effect, document render) has succeeded, so a failure leaves
    /// it untouched and the operation is safely retryable. The caller
    /// persists the stamped record.
    pub fn execute(
        &self,
        txn: &mut Transaction,
        actor: &Actor,
        note: Option<&str>,
        lang: &str,
    ) -> Result<ExecuteOutcome, EngineError> {
        let def = workflow::definition(txn.kind());
        let executor = def
            .stage_def(Stage::Executor)
            .ok_or_else(|| EngineError::invalid_state("workflow has no executor stage"))?;
        if !executor.authorizes(actor.role) {
            return Err(EngineError::PermissionDenied {
                stage: Stage::Executor,
                role: actor.role,
            });
        }

        if txn.status == Status::Executed {
            // no side effects re-applied, no new document issued
            return Ok(ExecuteOutcome::AlreadyExecuted {
                ref_no: txn.ref_no.clone(),
                pdf_hash: txn.pdf_hash.clone().unwrap_or_default(),
            });
        }
        if txn.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "transaction {} is {}",
                txn.ref_no,
                txn.status.as_str()
            )));
        }
        if txn.current_stage != Stage::Executor || txn.status != Status::Approved {
            return Err(EngineError::invalid_state(format!(
                "execute requires an approved transaction at the executor stage, \
                 found {} at {}",
                txn.status.as_str(),
                txn.current_stage.as_str()
            )));
        }
        if txn.ceo_rejected || txn.rejection_source.is_some() {
            return Err(EngineError::invalid_state(
                "an escalated rejection must be rejected or returned, not executed",
            ));
        }

        let evaluation = self
            .evaluator
            .evaluate(txn)
            .map_err(|e| EngineError::dependency("policy evaluator", e))?;
        if !evaluation.all_checks_pass() {
            return Err(EngineError::ChecksFailed(evaluation.failing()));
        }

        let applier = self
            .effects
            .get(txn.kind())
            .ok_or_else(|| EngineError::Dependency {
                context: "domain effect",
                detail: format!("no applier registered for {}", txn.kind().as_str()),
            })?;
        // idempotent keyed by txn.id; if this fails nothing is stamped
        applier
            .apply(txn)
            .map_err(|e| EngineError::dependency("domain effect", e))?;

        let document = self
            .documents
            .render(txn, lang)
            .map_err(|e| EngineError::dependency("document render", e))?;
        let pdf_hash = self.documents.hash(&document);
        let integrity_id = new_uuid_to_bech32("doc_")
            .map_err(|e| EngineError::dependency("integrity id", e))?;

        txn.stamp_executed(pdf_hash.clone(), integrity_id, actor, note);

        Ok(ExecuteOutcome::Executed {
            ref_no: txn.ref_no.clone(),
            pdf_hash,
        })
    }
}
