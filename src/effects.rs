//! Domain effect appliers and the document service boundary
use crate::transaction::Transaction;
use crate::workflow::TransactionKind;
use std::collections::HashMap;
use std::sync::Arc;

/// The authoritative, irreversible mutation behind one transaction type
/// (balance decrement, payroll posting, contract activation). Implementors
/// must be idempotent keyed by `txn.id`: a retried call after a partial
/// failure must not double-apply.
pub trait DomainEffect: Send + Sync {
    fn apply(&self, txn: &Transaction) -> anyhow::Result<()>;
}

/// One applier per transaction kind, registered once at startup.
#[derive(Default, Clone)]
pub struct EffectRegistry {
    appliers: HashMap<TransactionKind, Arc<dyn DomainEffect>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: TransactionKind, effect: Arc<dyn DomainEffect>) -> Self {
        self.appliers.insert(kind, effect);
        self
    }

    pub fn get(&self, kind: TransactionKind) -> Option<&Arc<dyn DomainEffect>> {
        self.appliers.get(&kind)
    }
}

/// Renders a transaction to a document and hashes it. Rendering is
/// external; the default hash is the same sha256 hex digest the store uses
/// for content addressing.
pub trait DocumentService: Send + Sync {
    fn render(&self, txn: &Transaction, lang: &str) -> anyhow::Result<Vec<u8>>;

    fn hash(&self, bytes: &[u8]) -> String {
        sha256::digest(bytes)
    }
}

/// Document service that renders the canonical CBOR encoding of the
/// transaction. The visual PDF layout is out of scope; what matters for
/// tamper evidence is a deterministic byte representation to hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborDocuments;

impl DocumentService for CborDocuments {
    fn render(&self, txn: &Transaction, _lang: &str) -> anyhow::Result<Vec<u8>> {
        Ok(minicbor::to_vec(txn)?)
    }
}
