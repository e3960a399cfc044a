//! Service layer: the operation surface over the persistent store
//!
//! Operations are short and atomic: load the record, route or guard the
//! transition, persist, maintain the secondary indices. Concurrent calls
//! on one id are serialized by a per-record lock, and every write goes
//! through a compare-and-swap against the bytes that were loaded, so a
//! stale write surfaces as [`EngineError::Conflict`] instead of silently
//! clobbering a newer record.
use crate::effects::{DocumentService, EffectRegistry};
use crate::error::{EngineError, require_reason};
use crate::guard::{ExecuteOutcome, ExecutionGuard};
use crate::policy::{BeforeAfterSnapshot, PolicyEvaluator, PreCheck, TraceStep};
use crate::transaction::{Transaction, TransactionData};
use crate::types::Actor;
use crate::workflow::{self, Action, Status, TransactionKind};
use sled::{Batch, IVec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const REF_NO_TREE: &str = "ref_no_idx";
const QUEUE_TREE: &str = "queue_idx";

/// The composed read-only review view for the final executor: one
/// consistent read instead of several round trips.
#[derive(Debug, Clone)]
pub struct Mirror {
    pub transaction: Transaction,
    pub pre_checks: Vec<PreCheck>,
    pub before_after: BeforeAfterSnapshot,
    pub trace: Vec<TraceStep>,
    pub all_checks_pass: bool,
}

pub struct WorkflowService {
    instance: Arc<sled::Db>,
    refs: sled::Tree,
    queues: sled::Tree,
    evaluator: Arc<dyn PolicyEvaluator>,
    documents: Arc<dyn DocumentService>,
    effects: EffectRegistry,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    lang: String,
}

impl WorkflowService {
    pub fn new(
        instance: Arc<sled::Db>,
        evaluator: Arc<dyn PolicyEvaluator>,
        documents: Arc<dyn DocumentService>,
        effects: EffectRegistry,
    ) -> Result<Self, EngineError> {
        let refs = instance.open_tree(REF_NO_TREE)?;
        let queues = instance.open_tree(QUEUE_TREE)?;
        Ok(Self {
            instance,
            refs,
            queues,
            evaluator,
            documents,
            effects,
            locks: Mutex::new(HashMap::new()),
            lang: "en".to_string(),
        })
    }

    /// Language passed to the document service when executing.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Submit a new transaction in its type's initial pending stage.
    pub fn submit(&self, data: TransactionData) -> Result<Transaction, EngineError> {
        let txn = Transaction::submit(data)?;
        let bytes = encode(&txn)?;

        let mut batch = Batch::default();
        batch.insert(txn.id.as_bytes(), bytes);
        self.instance.apply_batch(batch)?;
        self.refs.insert(txn.ref_no.as_bytes(), txn.id.as_bytes())?;
        self.queues
            .insert(queue_key(txn.kind(), txn.status, &txn.id), txn.id.as_bytes())?;

        tracing::info!(
            id = %txn.id,
            ref_no = %txn.ref_no,
            kind = txn.kind().as_str(),
            stage = txn.current_stage.as_str(),
            "transaction submitted"
        );
        Ok(txn)
    }

    /// Route one approval-chain action (approve, reject, return).
    pub fn act(
        &self,
        id: &str,
        action: Action,
        actor: &Actor,
        note: Option<&str>,
    ) -> Result<Transaction, EngineError> {
        let lock = self.record_lock(id);
        let _held = lock.lock().expect("record lock poisoned");

        let (mut txn, raw) = self.load(id)?;
        let was = txn.status;
        let outcome = workflow::route(&txn, action, actor, note)?;
        txn.apply(outcome, actor, note);
        self.persist(&txn, Some(&raw))?;
        self.reindex(was, &txn)?;

        tracing::info!(
            id = %txn.id,
            actor = %actor.id,
            decision = ?outcome.decision,
            status = txn.status.as_str(),
            stage = txn.current_stage.as_str(),
            "action routed"
        );
        drop(_held);
        if txn.is_terminal() {
            self.prune_lock(id, &lock);
        }
        Ok(txn)
    }

    /// Execute an approved transaction through the execution guard.
    pub fn execute(
        &self,
        id: &str,
        actor: &Actor,
        note: Option<&str>,
    ) -> Result<ExecuteOutcome, EngineError> {
        let lock = self.record_lock(id);
        let _held = lock.lock().expect("record lock poisoned");

        let (mut txn, raw) = self.load(id)?;
        let was = txn.status;
        let guard =
            ExecutionGuard::new(self.evaluator.as_ref(), self.documents.as_ref(), &self.effects);
        let outcome = guard
            .execute(&mut txn, actor, note, &self.lang)
            .inspect_err(|e| {
                tracing::warn!(id = %txn.id, error = %e, "execute blocked");
            })?;

        if let ExecuteOutcome::Executed { .. } = outcome {
            self.persist(&txn, Some(&raw))?;
            self.reindex(was, &txn)?;
            tracing::info!(
                id = %txn.id,
                ref_no = %txn.ref_no,
                pdf_hash = outcome.pdf_hash(),
                "transaction executed"
            );
        }
        drop(_held);
        if txn.is_terminal() {
            self.prune_lock(id, &lock);
        }
        Ok(outcome)
    }

    /// Cancel a non-terminal transaction. The reason is validated before
    /// anything is loaded or mutated.
    pub fn cancel(
        &self,
        id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<Transaction, EngineError> {
        let reason = require_reason("reason", Some(reason))?;

        let lock = self.record_lock(id);
        let _held = lock.lock().expect("record lock poisoned");

        let (mut txn, raw) = self.load(id)?;
        if txn.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "transaction {} is already {}",
                txn.ref_no,
                txn.status.as_str()
            )));
        }
        let def = workflow::definition(txn.kind());
        if !def.authorizes(actor.role) {
            return Err(EngineError::PermissionDenied {
                stage: txn.current_stage,
                role: actor.role,
            });
        }

        let was = txn.status;
        txn.record_cancel(actor, reason);
        self.persist(&txn, Some(&raw))?;
        self.reindex(was, &txn)?;

        tracing::info!(id = %txn.id, actor = %actor.id, "transaction cancelled");
        drop(_held);
        self.prune_lock(id, &lock);
        Ok(txn)
    }

    /// The composed review read for the final executor.
    pub fn mirror(&self, id: &str) -> Result<Mirror, EngineError> {
        let (txn, _) = self.load(id)?;
        let evaluation = self
            .evaluator
            .evaluate(&txn)
            .map_err(|e| EngineError::dependency("policy evaluator", e))?;

        Ok(Mirror {
            all_checks_pass: evaluation.all_checks_pass(),
            pre_checks: evaluation.checks,
            before_after: evaluation.snapshot,
            trace: evaluation.trace,
            transaction: txn,
        })
    }

    pub fn transaction(&self, id: &str) -> Result<Transaction, EngineError> {
        Ok(self.load(id)?.0)
    }

    pub fn by_ref_no(&self, ref_no: &str) -> Result<Transaction, EngineError> {
        let id = self
            .refs
            .get(ref_no.as_bytes())?
            .ok_or_else(|| EngineError::NotFound(ref_no.to_string()))?;
        let id = String::from_utf8_lossy(&id).into_owned();
        self.transaction(&id)
    }

    /// Pending-queue listing served from the (kind, status) index.
    pub fn pending(
        &self,
        kind: TransactionKind,
        status: Status,
    ) -> Result<Vec<Transaction>, EngineError> {
        let prefix = format!("{}/{}/", kind.as_str(), status.as_str());
        let mut out = vec![];
        for item in self.queues.scan_prefix(prefix.as_bytes()) {
            let (_, id) = item?;
            let id = String::from_utf8_lossy(&id).into_owned();
            out.push(self.transaction(&id)?);
        }
        Ok(out)
    }

    fn record_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Drop a terminal record's entry from the lock table. Holding the
    /// table mutex means the count cannot change under us: two references
    /// are the map's and ours, anything more is a caller still waiting.
    fn prune_lock(&self, id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        if Arc::strong_count(lock) == 2 {
            locks.remove(id);
        }
    }

    fn load(&self, id: &str) -> Result<(Transaction, IVec), EngineError> {
        let raw = self
            .instance
            .get(id.as_bytes())?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let txn =
            minicbor::decode::<Transaction>(&raw).map_err(|e| EngineError::Codec(e.to_string()))?;
        Ok((txn, raw))
    }

    /// Write the record back, guarded against a concurrent writer having
    /// replaced the bytes we loaded.
    fn persist(&self, txn: &Transaction, expected: Option<&IVec>) -> Result<(), EngineError> {
        let bytes = encode(txn)?;
        self.instance
            .compare_and_swap(txn.id.as_bytes(), expected, Some(bytes))?
            .map_err(|_| EngineError::Conflict)
    }

    /// Keep the (kind, status) queue index in step with the projection.
    fn reindex(&self, was: Status, txn: &Transaction) -> Result<(), EngineError> {
        if was == txn.status {
            return Ok(());
        }
        let mut batch = Batch::default();
        batch.remove(queue_key(txn.kind(), was, &txn.id).into_bytes());
        batch.insert(
            queue_key(txn.kind(), txn.status, &txn.id).into_bytes(),
            txn.id.as_bytes(),
        );
        self.queues.apply_batch(batch)?;
        Ok(())
    }
}

fn queue_key(kind: TransactionKind, status: Status, id: &str) -> String {
    format!("{}/{}/{}", kind.as_str(), status.as_str(), id)
}

fn encode(txn: &Transaction) -> Result<Vec<u8>, EngineError> {
    minicbor::to_vec(txn).map_err(|e| EngineError::Codec(e.to_string()))
}
