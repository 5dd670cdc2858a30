//! bk-provider-paper
//!
//! Deterministic in-process billing provider for tests and the demo CLI.
//! No randomness, no network I/O. Purchase tokens and order ids are minted
//! from running counters; acknowledge verdicts are scripted per token.
//!
//! Test seams are explicit: per-token acknowledge call counters, scripted
//! rejections, and a hold point that parks acknowledge calls until released
//! so tests can overlap concurrent reconciles deterministically.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, watch};

use bk_provider::{BillingEvent, BillingProvider, ProviderError, PurchaseResponse};
use bk_schemas::{ProductInfo, ProductType, PurchaseRecord, PurchaseState, ResponseCode};

#[derive(Default)]
struct Inner {
    connected: bool,
    purchases: Vec<PurchaseRecord>,
    history: Vec<PurchaseRecord>,
    catalog: Vec<ProductInfo>,
    ack_verdicts: HashMap<String, ResponseCode>,
    ack_calls: HashMap<String, usize>,
    next_token: u64,
    next_order: u64,
}

/// Deterministic paper billing provider.
///
/// Starts disconnected with an empty purchase list. Seed state with
/// [`PaperBilling::seed_purchase`] / [`PaperBilling::seed_history`] /
/// [`PaperBilling::seed_product`], or drive it through the normal
/// `initialize` → `launch_purchase` flow.
pub struct PaperBilling {
    inner: Mutex<Inner>,
    events: broadcast::Sender<BillingEvent>,
    /// Acknowledge hold flag. `acknowledge` waits for `false` before
    /// resolving, so tests can keep calls in flight.
    hold: watch::Sender<bool>,
}

impl Default for PaperBilling {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBilling {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        let (hold, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner {
                next_token: 1,
                next_order: 1,
                ..Inner::default()
            }),
            events,
            hold,
        }
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: BillingEvent) {
        // No subscribers is fine; events are best-effort notifications.
        let _ = self.events.send(event);
    }

    // -- Seeding -------------------------------------------------------------

    /// Add a purchase to the current-purchases list.
    pub fn seed_purchase(&self, record: PurchaseRecord) {
        self.state().purchases.push(record);
    }

    /// Add a purchase to the history list.
    pub fn seed_history(&self, record: PurchaseRecord) {
        self.state().history.push(record);
    }

    /// Add a catalog entry. Products without one get a deterministic
    /// placeholder entry from `retrieve_products`.
    pub fn seed_product(&self, info: ProductInfo) {
        self.state().catalog.push(info);
    }

    /// Script `acknowledge` to reject the given token with `code`.
    pub fn fail_acknowledge(&self, token: impl Into<String>, code: ResponseCode) {
        self.state().ack_verdicts.insert(token.into(), code);
    }

    // -- Test seams ----------------------------------------------------------

    /// How many times `acknowledge` has been called for `token`.
    pub fn acknowledge_calls(&self, token: &str) -> usize {
        self.state().ack_calls.get(token).copied().unwrap_or(0)
    }

    /// Park subsequent (and currently waiting) acknowledge calls until
    /// [`PaperBilling::release_acknowledges`].
    pub fn hold_acknowledges(&self) {
        self.hold.send_replace(true);
    }

    /// Let held acknowledge calls proceed.
    pub fn release_acknowledges(&self) {
        self.hold.send_replace(false);
    }

    /// Snapshot of the current-purchases list.
    pub fn purchases(&self) -> Vec<PurchaseRecord> {
        self.state().purchases.clone()
    }

    fn placeholder_product(product_id: &str, product_type: ProductType) -> ProductInfo {
        ProductInfo {
            product_id: product_id.to_string(),
            title: format!("Paper Product ({product_id})"),
            description: "Deterministic paper catalog entry".to_string(),
            price: "$6.90".to_string(),
            price_currency_code: "USD".to_string(),
            price_amount_micros: 6_900_000,
            product_type,
        }
    }
}

#[async_trait]
impl BillingProvider for PaperBilling {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        self.state().connected = true;
        self.emit(BillingEvent::ConnectionUpdate { connected: true });
        Ok(())
    }

    async fn disconnect(&self) {
        self.state().connected = false;
        self.emit(BillingEvent::ConnectionUpdate { connected: false });
    }

    fn is_ready(&self) -> bool {
        self.state().connected
    }

    async fn query_purchases(
        &self,
        _product_type: ProductType,
    ) -> Result<PurchaseResponse, ProviderError> {
        let state = self.state();
        if !state.connected {
            return Err(ProviderError::NotConnected);
        }
        Ok(PurchaseResponse::ok(state.purchases.clone()))
    }

    async fn query_purchase_history(
        &self,
        _product_type: ProductType,
    ) -> Result<PurchaseResponse, ProviderError> {
        let state = self.state();
        if !state.connected {
            return Err(ProviderError::NotConnected);
        }
        Ok(PurchaseResponse::ok(state.history.clone()))
    }

    async fn retrieve_products(
        &self,
        product_type: ProductType,
        product_ids: &[String],
    ) -> Result<Vec<ProductInfo>, ProviderError> {
        let state = self.state();
        if !state.connected {
            return Err(ProviderError::NotConnected);
        }
        Ok(product_ids
            .iter()
            .map(|id| {
                state
                    .catalog
                    .iter()
                    .find(|info| &info.product_id == id)
                    .cloned()
                    .unwrap_or_else(|| Self::placeholder_product(id, product_type))
            })
            .collect())
    }

    async fn launch_purchase(&self, product_id: &str) -> Result<ResponseCode, ProviderError> {
        let record = {
            let mut state = self.state();
            if !state.connected {
                return Ok(ResponseCode::BillingNotReady);
            }

            let record = PurchaseRecord {
                token: format!("PT-{:06}", state.next_token),
                product_id: product_id.to_string(),
                order_id: format!("ORDER-{:06}", state.next_order),
                state: PurchaseState::Purchased,
                acknowledged: false,
                purchase_time_ms: Utc::now().timestamp_millis(),
                package_name: "com.example.paper".to_string(),
                auto_renewing: false,
            };
            state.next_token += 1;
            state.next_order += 1;
            state.purchases.push(record.clone());
            record
        };

        self.emit(BillingEvent::PurchaseUpdate {
            response: PurchaseResponse::ok(vec![record]),
        });
        Ok(ResponseCode::Ok)
    }

    async fn acknowledge(&self, token: &str) -> Result<(), ProviderError> {
        {
            let mut state = self.state();
            if !state.connected {
                return Err(ProviderError::NotConnected);
            }
            *state.ack_calls.entry(token.to_string()).or_insert(0) += 1;
        }

        // Hold point: wait until the flag is down. `wait_for` checks the
        // current value first, so release-before-wait cannot deadlock.
        let mut hold = self.hold.subscribe();
        let _ = hold.wait_for(|held| !held).await;

        let mut state = self.state();
        let state = &mut *state;
        if let Some(code) = state.ack_verdicts.get(token).copied() {
            return Err(ProviderError::Rejected { code });
        }

        let known = state
            .purchases
            .iter_mut()
            .chain(state.history.iter_mut())
            .find(|record| record.token == token);
        match known {
            Some(record) => {
                record.acknowledged = true;
                Ok(())
            }
            None => Err(ProviderError::Rejected {
                code: ResponseCode::ItemNotOwned,
            }),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<BillingEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
