//! Reconciliation engine: decides whether a purchase needs acknowledgement,
//! performs it at most once per token, and reports the terminal outcome.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{watch, Mutex};

use bk_provider::BillingProvider;
use bk_schemas::{PurchaseRecord, PurchaseState};

use crate::types::{ReconcileOutcome, ReconcileResult};
use crate::UNSPECIFIED_STATE_REASON;

type OutcomeSlot = Option<ReconcileOutcome>;

/// Role a `reconcile` call takes for its token: first caller acknowledges
/// and publishes, later overlapping callers wait.
enum TokenClaim {
    Owner(watch::Sender<OutcomeSlot>),
    Waiter(watch::Receiver<OutcomeSlot>),
}

/// At-most-once acknowledgement driver over a [`BillingProvider`].
///
/// The reconciler owns the only shared mutable state in this crate: the map
/// of tokens whose acknowledge call is currently in flight. A `reconcile`
/// call for a token already in the map does not issue a second provider
/// call; it awaits the owning call's outcome and returns it verbatim.
pub struct PurchaseReconciler<P: BillingProvider + ?Sized> {
    provider: Arc<P>,
    /// Tokens currently being acknowledged, mapped to the channel on which
    /// the owning call publishes its outcome. Entries are removed when the
    /// owning call completes, success or failure.
    in_flight: Mutex<HashMap<String, watch::Receiver<OutcomeSlot>>>,
}

impl<P: BillingProvider + ?Sized> PurchaseReconciler<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile one purchase record.
    ///
    /// - `PENDING` and already-acknowledged records short-circuit without a
    ///   provider call.
    /// - `PURCHASED`, unacknowledged records acknowledge through the
    ///   provider, deduplicated per token against concurrent callers.
    /// - Records in an unknown state fail defensively.
    ///
    /// Suspends until the provider's acknowledge call (if one is issued, by
    /// this caller or a concurrent one for the same token) completes.
    pub async fn reconcile(&self, record: &PurchaseRecord) -> ReconcileOutcome {
        match record.state {
            PurchaseState::Pending => {
                return ReconcileOutcome::new(record, ReconcileResult::Pending);
            }
            PurchaseState::Unspecified => {
                return ReconcileOutcome::new(
                    record,
                    ReconcileResult::Failed {
                        reason: UNSPECIFIED_STATE_REASON.to_string(),
                    },
                );
            }
            PurchaseState::Purchased => {}
        }

        if record.acknowledged {
            return ReconcileOutcome::new(record, ReconcileResult::AlreadyAcknowledged);
        }

        let claim = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&record.token) {
                // An entry is live only while its owner still holds the
                // sender; an owner dropped mid-call leaves a dead entry,
                // which the next caller reclaims instead of waiting forever.
                Some(slot) if slot.has_changed().is_ok() => TokenClaim::Waiter(slot.clone()),
                _ => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(record.token.clone(), rx);
                    TokenClaim::Owner(tx)
                }
            }
        };

        let publish = match claim {
            TokenClaim::Waiter(mut slot) => {
                return Self::await_in_flight(record, &mut slot).await;
            }
            TokenClaim::Owner(tx) => tx,
        };

        let result = match self.provider.acknowledge(&record.token).await {
            Ok(()) => ReconcileResult::AcknowledgedNow,
            Err(err) => ReconcileResult::Failed {
                reason: err.reason(),
            },
        };
        let outcome = ReconcileOutcome::new(record, result);

        self.in_flight.lock().await.remove(&record.token);
        // Send after removal so a later reconcile for this token starts fresh
        // instead of racing a stale map entry. Waiters hold their own
        // receiver clones and still observe the value.
        let _ = publish.send(Some(outcome.clone()));

        outcome
    }

    /// Reconcile a delivered batch.
    ///
    /// Outcomes are returned in input order. Distinct tokens may acknowledge
    /// concurrently; duplicate tokens within the batch deduplicate through
    /// the in-flight guard like any other concurrent callers.
    pub async fn reconcile_all(&self, records: &[PurchaseRecord]) -> Vec<ReconcileOutcome> {
        join_all(records.iter().map(|record| self.reconcile(record))).await
    }

    async fn await_in_flight(
        record: &PurchaseRecord,
        slot: &mut watch::Receiver<OutcomeSlot>,
    ) -> ReconcileOutcome {
        if let Ok(published) = slot.wait_for(|outcome| outcome.is_some()).await {
            if let Some(outcome) = published.as_ref() {
                return outcome.clone();
            }
        }
        // The owning call's future was dropped before publishing. Surface as
        // a failure rather than issuing a second acknowledge.
        ReconcileOutcome::new(
            record,
            ReconcileResult::Failed {
                reason: "acknowledge call dropped before completion".to_string(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
