use serde::{Deserialize, Serialize};

use bk_schemas::PurchaseRecord;

/// Terminal result of reconciling one purchase record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileResult {
    /// The platform had already registered the acknowledgement; no call made.
    AlreadyAcknowledged,
    /// This reconcile issued the acknowledge call and it succeeded.
    AcknowledgedNow,
    /// The purchase has not completed yet; no call made.
    Pending,
    /// The acknowledge call failed, or the record was not reconcilable.
    /// `reason` is the provider code identifier (e.g. `ITEM_NOT_OWNED`) or a
    /// reconciler-level reason string.
    Failed { reason: String },
}

impl ReconcileResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReconcileResult::Failed { .. })
    }
}

/// Full report for one reconciled record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub product_id: String,
    pub token: String,
    pub result: ReconcileResult,
}

impl ReconcileOutcome {
    pub fn new(record: &PurchaseRecord, result: ReconcileResult) -> Self {
        Self {
            product_id: record.product_id.clone(),
            token: record.token.clone(),
            result,
        }
    }
}
