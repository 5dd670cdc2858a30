use std::sync::Arc;

use bk_provider::BillingProvider;
use bk_provider_paper::PaperBilling;
use bk_reconcile::{PurchaseReconciler, ReconcileResult};
use bk_schemas::{PurchaseRecord, PurchaseState, ResponseCode};

fn unacknowledged(token: &str) -> PurchaseRecord {
    PurchaseRecord::new(token, "P1", PurchaseState::Purchased, false)
}

#[tokio::test]
async fn scenario_concurrent_duplicate_reconciles_issue_one_acknowledge() {
    let billing = Arc::new(PaperBilling::new());
    billing.initialize().await.unwrap();
    billing.seed_purchase(unacknowledged("T1"));
    billing.hold_acknowledges();

    let reconciler = Arc::new(PurchaseReconciler::new(Arc::clone(&billing)));

    let first = {
        let reconciler = Arc::clone(&reconciler);
        let record = unacknowledged("T1");
        tokio::spawn(async move { reconciler.reconcile(&record).await })
    };
    // Let the first call claim the in-flight slot and park on the provider.
    tokio::task::yield_now().await;

    let second = {
        let reconciler = Arc::clone(&reconciler);
        let record = unacknowledged("T1");
        tokio::spawn(async move { reconciler.reconcile(&record).await })
    };
    tokio::task::yield_now().await;

    // Both reconciles are in flight; the provider has seen exactly one call.
    assert_eq!(billing.acknowledge_calls("T1"), 1);

    billing.release_acknowledges();
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(first.result, ReconcileResult::AcknowledgedNow);
    assert_eq!(second, first);
    assert_eq!(billing.acknowledge_calls("T1"), 1);
}

#[tokio::test]
async fn scenario_duplicate_waiter_shares_failed_outcome() {
    let billing = Arc::new(PaperBilling::new());
    billing.initialize().await.unwrap();
    billing.seed_purchase(unacknowledged("T1"));
    billing.fail_acknowledge("T1", ResponseCode::ServiceUnavailable);
    billing.hold_acknowledges();

    let reconciler = Arc::new(PurchaseReconciler::new(Arc::clone(&billing)));

    let first = {
        let reconciler = Arc::clone(&reconciler);
        let record = unacknowledged("T1");
        tokio::spawn(async move { reconciler.reconcile(&record).await })
    };
    tokio::task::yield_now().await;
    let second = {
        let reconciler = Arc::clone(&reconciler);
        let record = unacknowledged("T1");
        tokio::spawn(async move { reconciler.reconcile(&record).await })
    };
    tokio::task::yield_now().await;

    billing.release_acknowledges();
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(
        first.result,
        ReconcileResult::Failed {
            reason: "SERVICE_UNAVAILABLE".to_string()
        }
    );
    // The waiter does not retry on the first caller's behalf.
    assert_eq!(second, first);
    assert_eq!(billing.acknowledge_calls("T1"), 1);
}
