use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use bk_log::{format_entry, LogSink};
use bk_provider::{BillingEvent, BillingProvider, ProviderError, PurchaseResponse};
use bk_reconcile::{PurchaseReconciler, ReconcileOutcome, ReconcileResult};
use bk_schemas::ResponseCode;

use crate::SessionConfig;

/// One billing session: connection state, reconciler, and log sink.
///
/// `connected` starts `false` and is owned by the event flow: a
/// `ConnectionUpdate` event sets it, `disconnect` forces it down without
/// waiting for the provider's own event. Operations that need the provider
/// refuse with `BILLING_NOT_READY` while disconnected instead of calling it.
pub struct BillingSession<P: BillingProvider + ?Sized, S: LogSink> {
    provider: Arc<P>,
    reconciler: PurchaseReconciler<P>,
    config: SessionConfig,
    sink: S,
    connected: bool,
    run_id: Uuid,
    /// Injectable wall clock for log entry headers. Tests pass a fixed
    /// function for deterministic output.
    clock: fn() -> DateTime<Utc>,
}

impl<P: BillingProvider + ?Sized, S: LogSink> BillingSession<P, S> {
    pub fn new(provider: Arc<P>, sink: S, config: SessionConfig) -> Self {
        Self {
            reconciler: PurchaseReconciler::new(Arc::clone(&provider)),
            provider,
            config,
            sink,
            connected: false,
            run_id: Uuid::new_v4(),
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Subscribe to the provider's event stream. Feed received events back
    /// through [`BillingSession::handle_event`].
    pub fn subscribe(&self) -> broadcast::Receiver<BillingEvent> {
        self.provider.subscribe()
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Start the billing connection. The session stays `connected = false`
    /// until the provider's `ConnectionUpdate` event arrives.
    pub async fn connect(&mut self) {
        if let Err(err) = self.provider.initialize().await {
            self.log(&format!("Connection error: {}", error_message(&err)));
        }
    }

    /// Tear the connection down. The flag is forced down immediately; the
    /// provider's own `ConnectionUpdate` event may repeat the transition.
    pub async fn disconnect(&mut self) {
        self.provider.disconnect().await;
        self.handle_event(BillingEvent::ConnectionUpdate { connected: false })
            .await;
    }

    // -- Event handling ------------------------------------------------------

    /// Apply one provider event to the session.
    ///
    /// A successful `PurchaseUpdate` reconciles **every** purchase in the
    /// delivered batch, not just the first.
    pub async fn handle_event(&mut self, event: BillingEvent) -> Vec<ReconcileOutcome> {
        match event {
            BillingEvent::ConnectionUpdate { connected } => {
                self.connected = connected;
                self.log(&format!("Connection: {connected}"));
                Vec::new()
            }
            BillingEvent::PurchaseUpdate { response } => {
                self.process_purchase_response("purchase_update", response)
                    .await
            }
        }
    }

    /// Drain and handle every event currently queued on `rx`, without
    /// blocking for future ones.
    pub async fn pump_events(
        &mut self,
        rx: &mut broadcast::Receiver<BillingEvent>,
    ) -> Vec<ReconcileOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => outcomes.extend(self.handle_event(event).await),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    self.log(&format!("event stream lagged, skipped {skipped} events"));
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
        outcomes
    }

    // -- Operations ----------------------------------------------------------

    /// Query current purchases and reconcile each one.
    pub async fn query_purchases(&mut self) -> Vec<ReconcileOutcome> {
        match self.provider.query_purchases(self.config.product_type).await {
            Ok(response) => {
                self.process_purchase_response("query_purchases", response)
                    .await
            }
            Err(err) => {
                self.log(&format!("query_purchases: {}", error_message(&err)));
                Vec::new()
            }
        }
    }

    /// Fetch historical purchases and reconcile each one.
    pub async fn fetch_purchase_history(&mut self) -> Vec<ReconcileOutcome> {
        match self
            .provider
            .query_purchase_history(self.config.product_type)
            .await
        {
            Ok(response) => {
                self.process_purchase_response("query_purchase_history", response)
                    .await
            }
            Err(err) => {
                self.log(&format!("query_purchase_history: {}", error_message(&err)));
                Vec::new()
            }
        }
    }

    /// Launch the purchase flow for one product.
    ///
    /// Refused with `BILLING_NOT_READY` (no provider call) while the session
    /// is disconnected or the provider reports not-ready. The terminal
    /// purchase arrives later as a `PurchaseUpdate` event.
    pub async fn buy(&mut self, product_id: &str) -> ResponseCode {
        if !self.connected || !self.provider.is_ready() {
            let code = ResponseCode::BillingNotReady;
            self.log(&code.message());
            return code;
        }

        let ids = [product_id.to_string()];
        match self
            .provider
            .retrieve_products(self.config.product_type, &ids)
            .await
        {
            Ok(infos) => match infos.first() {
                Some(info) => {
                    self.log(&format!("Item details: {} : {}", info.title, info.price));
                }
                None => {
                    let code = ResponseCode::SkuNotAvailable;
                    self.log(&format!("Item details error: {}", code.message()));
                    return code;
                }
            },
            Err(err) => {
                self.log(&format!("Item details error: {}", error_message(&err)));
                return err.code();
            }
        }

        match self.provider.launch_purchase(product_id).await {
            Ok(launch_code) => {
                if !launch_code.is_ok() {
                    self.log(&launch_code.message());
                }
                launch_code
            }
            Err(err) => {
                self.log(&error_message(&err));
                err.code()
            }
        }
    }

    /// Buy the first configured product id.
    pub async fn buy_first_configured(&mut self) -> ResponseCode {
        match self.config.product_ids.first().cloned() {
            Some(product_id) => self.buy(&product_id).await,
            None => {
                let code = ResponseCode::DeveloperError;
                self.log("No product id configured");
                code
            }
        }
    }

    // -- Internals -----------------------------------------------------------

    async fn process_purchase_response(
        &mut self,
        tag: &str,
        response: PurchaseResponse,
    ) -> Vec<ReconcileOutcome> {
        if !response.is_success() {
            self.log(&format!("{tag}: {}", response.code.message()));
            return Vec::new();
        }
        if response.purchases.is_empty() {
            self.log(&format!("{tag}: purchase list empty"));
            return Vec::new();
        }

        self.log(&format!(
            "{tag}: purchase list updated, {} purchase(s)",
            response.purchases.len()
        ));
        let outcomes = self.reconciler.reconcile_all(&response.purchases).await;
        for outcome in &outcomes {
            let line = describe_outcome(outcome);
            self.log(&line);
        }
        outcomes
    }

    fn log(&mut self, msg: &str) {
        debug!(run_id = %self.run_id, "{msg}");
        let entry = format_entry((self.clock)(), msg);
        if let Err(err) = self.sink.append(&entry) {
            warn!(run_id = %self.run_id, "billing log append failed: {err:#}");
        }
    }
}

/// On-screen log line for one reconcile outcome.
pub fn describe_outcome(outcome: &ReconcileOutcome) -> String {
    match &outcome.result {
        ReconcileResult::AcknowledgedNow => {
            format!("** Purchase successful for *{}*", outcome.product_id)
        }
        ReconcileResult::AlreadyAcknowledged => {
            format!(
                "** Purchase acknowledged & successful for *{}*",
                outcome.product_id
            )
        }
        ReconcileResult::Pending => {
            format!("** Purchase pending for *{}*", outcome.product_id)
        }
        ReconcileResult::Failed { reason } => {
            format!(
                "** Acknowledge error for *{}* : {}",
                outcome.product_id, reason
            )
        }
    }
}

/// Display string for provider errors in log lines: platform rejections use
/// the code's message, everything else its `Display` form.
fn error_message(err: &ProviderError) -> String {
    match err {
        ProviderError::Rejected { code } => code.message(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bk_schemas::PurchaseRecord;
    use bk_schemas::PurchaseState;

    fn outcome(result: ReconcileResult) -> ReconcileOutcome {
        ReconcileOutcome::new(
            &PurchaseRecord::new("T1", "P1", PurchaseState::Purchased, false),
            result,
        )
    }

    #[test]
    fn outcome_lines_match_on_screen_phrasing() {
        assert_eq!(
            describe_outcome(&outcome(ReconcileResult::AcknowledgedNow)),
            "** Purchase successful for *P1*"
        );
        assert_eq!(
            describe_outcome(&outcome(ReconcileResult::AlreadyAcknowledged)),
            "** Purchase acknowledged & successful for *P1*"
        );
        assert_eq!(
            describe_outcome(&outcome(ReconcileResult::Pending)),
            "** Purchase pending for *P1*"
        );
        assert_eq!(
            describe_outcome(&outcome(ReconcileResult::Failed {
                reason: "ITEM_NOT_OWNED".to_string()
            })),
            "** Acknowledge error for *P1* : ITEM_NOT_OWNED"
        );
    }

    #[test]
    fn rejection_messages_use_platform_text() {
        let err = ProviderError::Rejected {
            code: ResponseCode::ItemNotOwned,
        };
        assert_eq!(
            error_message(&err),
            "Failure to consume since item is not owned"
        );
        assert_eq!(
            error_message(&ProviderError::NotConnected),
            "billing connection not established"
        );
    }
}
