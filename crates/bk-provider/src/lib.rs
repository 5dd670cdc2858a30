//! bk-provider
//!
//! Provider boundary for the platform in-app-purchase module.
//!
//! This crate defines **only** the provider trait, its error type, and the
//! event stream payloads. No concrete platform bindings, no reconciliation
//! logic, and no log formatting belong here.
//!
//! The platform module's callback-style API is redesigned as awaitable
//! operations: every call returns a `Result` instead of invoking a caller
//! callback, and the module's unsolicited notifications (connection changes,
//! terminal purchase deliveries) arrive on a broadcast event stream.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use bk_schemas::{ProductInfo, ProductType, PurchaseRecord, ResponseCode};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`BillingProvider`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The billing connection is not established.
    NotConnected,
    /// The platform rejected or failed the operation; the code is opaque and
    /// passed through for display.
    Rejected { code: ResponseCode },
    /// Transport-level failure between the app and the platform module.
    Transport(String),
}

impl ProviderError {
    /// Platform code equivalent for this error, for callers that report
    /// response codes.
    pub fn code(&self) -> ResponseCode {
        match self {
            ProviderError::NotConnected => ResponseCode::ServiceDisconnected,
            ProviderError::Rejected { code } => *code,
            ProviderError::Transport(_) => ResponseCode::ServiceUnavailable,
        }
    }

    /// Stable identifier used as a reconcile failure reason.
    pub fn reason(&self) -> String {
        match self {
            ProviderError::NotConnected => "NOT_CONNECTED".to_string(),
            ProviderError::Rejected { code } => code.as_str().to_string(),
            ProviderError::Transport(_) => "TRANSPORT_ERROR".to_string(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotConnected => write!(f, "billing connection not established"),
            ProviderError::Rejected { code } => {
                write!(f, "provider rejected: {}", code.message())
            }
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// ---------------------------------------------------------------------------
// Responses and events
// ---------------------------------------------------------------------------

/// Purchase list response shared by queries, history fetches, and
/// purchase-update events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub code: ResponseCode,
    pub purchases: Vec<PurchaseRecord>,
}

impl PurchaseResponse {
    pub fn ok(purchases: Vec<PurchaseRecord>) -> Self {
        Self {
            code: ResponseCode::Ok,
            purchases,
        }
    }

    pub fn failed(code: ResponseCode) -> Self {
        Self {
            code,
            purchases: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_ok()
    }
}

/// Unsolicited notifications broadcast by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    /// Connection state changed. `connected = true` after a successful
    /// `initialize`, `false` after `disconnect` or a service drop.
    ConnectionUpdate { connected: bool },
    /// A purchase flow reached a terminal state and the platform delivered
    /// the affected purchases.
    PurchaseUpdate { response: PurchaseResponse },
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Platform billing module contract.
///
/// Implementations must be object-safe so callers can hold a
/// `Box<dyn BillingProvider>` (or `Arc<dyn BillingProvider>`) without knowing
/// the concrete type, and `Send + Sync` so calls can cross task boundaries.
///
/// Operations that the platform completes out-of-band (connection
/// establishment, the purchase flow itself) resolve early with a launch
/// result; their terminal outcome arrives as a [`BillingEvent`] on the
/// stream returned by [`BillingProvider::subscribe`].
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Human-readable name identifying this provider (e.g. `"paper"`).
    fn name(&self) -> &'static str;

    /// Start the billing connection. Completion is reported via a
    /// [`BillingEvent::ConnectionUpdate`] event.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Tear the connection down and emit `ConnectionUpdate { connected: false }`.
    async fn disconnect(&self);

    /// Whether the connection is currently established and usable.
    fn is_ready(&self) -> bool;

    /// Current purchases known to the platform for the given product family.
    async fn query_purchases(
        &self,
        product_type: ProductType,
    ) -> Result<PurchaseResponse, ProviderError>;

    /// Historical purchases, including ones no longer owned.
    async fn query_purchase_history(
        &self,
        product_type: ProductType,
    ) -> Result<PurchaseResponse, ProviderError>;

    /// Catalog details for the given product ids.
    async fn retrieve_products(
        &self,
        product_type: ProductType,
        product_ids: &[String],
    ) -> Result<Vec<ProductInfo>, ProviderError>;

    /// Launch the purchase flow for one product. The returned code reports
    /// whether the flow was *launched*; the purchase itself arrives later as
    /// a [`BillingEvent::PurchaseUpdate`].
    async fn launch_purchase(&self, product_id: &str) -> Result<ResponseCode, ProviderError>;

    /// Acknowledge a consumable purchase by token. A failed acknowledgement
    /// carries the platform code in [`ProviderError::Rejected`].
    async fn acknowledge(&self, token: &str) -> Result<(), ProviderError>;

    /// Subscribe to the provider's event stream. Each receiver observes
    /// events broadcast after the point of subscription.
    fn subscribe(&self) -> broadcast::Receiver<BillingEvent>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bk_schemas::PurchaseState;

    /// Minimal in-process stub proving the trait is object-safe and usable
    /// through a trait object.
    struct NullProvider {
        events: broadcast::Sender<BillingEvent>,
    }

    impl NullProvider {
        fn new() -> Self {
            let (events, _) = broadcast::channel(8);
            Self { events }
        }
    }

    #[async_trait]
    impl BillingProvider for NullProvider {
        fn name(&self) -> &'static str {
            "null"
        }

        async fn initialize(&self) -> Result<(), ProviderError> {
            let _ = self
                .events
                .send(BillingEvent::ConnectionUpdate { connected: true });
            Ok(())
        }

        async fn disconnect(&self) {
            let _ = self
                .events
                .send(BillingEvent::ConnectionUpdate { connected: false });
        }

        fn is_ready(&self) -> bool {
            false
        }

        async fn query_purchases(
            &self,
            _product_type: ProductType,
        ) -> Result<PurchaseResponse, ProviderError> {
            Ok(PurchaseResponse::ok(Vec::new()))
        }

        async fn query_purchase_history(
            &self,
            _product_type: ProductType,
        ) -> Result<PurchaseResponse, ProviderError> {
            Err(ProviderError::NotConnected)
        }

        async fn retrieve_products(
            &self,
            _product_type: ProductType,
            _product_ids: &[String],
        ) -> Result<Vec<ProductInfo>, ProviderError> {
            Ok(Vec::new())
        }

        async fn launch_purchase(
            &self,
            _product_id: &str,
        ) -> Result<ResponseCode, ProviderError> {
            Ok(ResponseCode::BillingNotReady)
        }

        async fn acknowledge(&self, _token: &str) -> Result<(), ProviderError> {
            Err(ProviderError::Rejected {
                code: ResponseCode::ItemNotOwned,
            })
        }

        fn subscribe(&self) -> broadcast::Receiver<BillingEvent> {
            self.events.subscribe()
        }
    }

    #[tokio::test]
    async fn provider_is_object_safe_via_box() {
        let provider: Box<dyn BillingProvider> = Box::new(NullProvider::new());
        assert_eq!(provider.name(), "null");
        let resp = provider.query_purchases(ProductType::InApp).await.unwrap();
        assert!(resp.is_success());
        assert!(resp.purchases.is_empty());
    }

    #[tokio::test]
    async fn subscribers_observe_connection_events() {
        let provider = NullProvider::new();
        let mut rx = provider.subscribe();
        provider.initialize().await.unwrap();
        provider.disconnect().await;

        assert_eq!(
            rx.recv().await.unwrap(),
            BillingEvent::ConnectionUpdate { connected: true }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            BillingEvent::ConnectionUpdate { connected: false }
        );
    }

    #[tokio::test]
    async fn acknowledge_rejection_carries_platform_code() {
        let provider = NullProvider::new();
        let err = provider.acknowledge("tok").await.unwrap_err();
        assert_eq!(err.reason(), "ITEM_NOT_OWNED");
        assert!(err.to_string().contains("not owned"));
    }

    #[test]
    fn provider_error_display_not_connected() {
        let err = ProviderError::NotConnected;
        assert_eq!(err.to_string(), "billing connection not established");
        assert_eq!(err.reason(), "NOT_CONNECTED");
    }

    #[test]
    fn billing_event_serde_tagging() {
        let ev = BillingEvent::ConnectionUpdate { connected: true };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"connection_update\""));
        let back: BillingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn purchase_response_success_flag_tracks_code() {
        let ok = PurchaseResponse::ok(vec![PurchaseRecord::new(
            "T1",
            "P1",
            PurchaseState::Purchased,
            false,
        )]);
        assert!(ok.is_success());

        let failed = PurchaseResponse::failed(ResponseCode::ServiceUnavailable);
        assert!(!failed.is_success());
        assert!(failed.purchases.is_empty());
    }
}
