//! bk-schemas
//!
//! Shared billing data model: purchase records as delivered by the platform
//! billing module, product catalog entries, and the platform response-code
//! set with its human-readable messages.
//!
//! Pure data. No provider calls, no IO, no async.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Purchase state
// ---------------------------------------------------------------------------

/// Purchase lifecycle state as reported by the platform module.
///
/// Wire values follow the platform constants:
/// `0 = UNSPECIFIED`, `1 = PURCHASED`, `2 = PENDING`.
/// Any integer outside that set maps to [`PurchaseState::Unspecified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseState {
    Unspecified,
    Purchased,
    Pending,
}

impl PurchaseState {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => PurchaseState::Purchased,
            2 => PurchaseState::Pending,
            _ => PurchaseState::Unspecified,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            PurchaseState::Unspecified => 0,
            PurchaseState::Purchased => 1,
            PurchaseState::Pending => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseState::Unspecified => "UNSPECIFIED",
            PurchaseState::Purchased => "PURCHASED",
            PurchaseState::Pending => "PENDING",
        }
    }
}

// ---------------------------------------------------------------------------
// Purchase record
// ---------------------------------------------------------------------------

/// A single purchase instance as delivered by the platform module.
///
/// Records are immutable per delivery: a later delivery for the same token
/// supersedes the earlier one rather than mutating it. The `token` is the
/// opaque identifier used for acknowledgement and consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Opaque token uniquely identifying this purchase instance.
    pub token: String,
    pub product_id: String,
    pub order_id: String,
    pub state: PurchaseState,
    /// Whether the platform has already registered an acknowledgement
    /// for this token.
    pub acknowledged: bool,
    /// Purchase timestamp in epoch milliseconds, as reported by the platform.
    pub purchase_time_ms: i64,
    pub package_name: String,
    pub auto_renewing: bool,
}

impl PurchaseRecord {
    /// Minimal constructor covering the fields reconciliation cares about.
    /// Passthrough fields default to empty / zero.
    pub fn new(
        token: impl Into<String>,
        product_id: impl Into<String>,
        state: PurchaseState,
        acknowledged: bool,
    ) -> Self {
        Self {
            token: token.into(),
            product_id: product_id.into(),
            order_id: String::new(),
            state,
            acknowledged,
            purchase_time_ms: 0,
            package_name: String::new(),
            auto_renewing: false,
        }
    }

    /// Purchase time as a UTC datetime, `None` when the reported epoch is
    /// out of chrono's representable range.
    pub fn purchase_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.purchase_time_ms).single()
    }
}

// ---------------------------------------------------------------------------
// Product catalog
// ---------------------------------------------------------------------------

/// Product family a purchase or query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    InApp,
    Subscription,
}

impl ProductType {
    /// Canonical platform string for this product family.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::InApp => "inapp",
            ProductType::Subscription => "subs",
        }
    }
}

/// Catalog entry for one purchasable product, as returned by the platform's
/// product-details call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: String,
    pub title: String,
    pub description: String,
    /// Display price, already localized by the platform (e.g. `"$6.90"`).
    pub price: String,
    pub price_currency_code: String,
    pub price_amount_micros: i64,
    pub product_type: ProductType,
}

// ---------------------------------------------------------------------------
// Response codes
// ---------------------------------------------------------------------------

/// Result code attached to every platform billing response.
///
/// Negative and small positive values are the store's standard codes; `9` and
/// `10` are module-level codes the billing module adds on top. Codes outside
/// the known set are preserved numerically in [`ResponseCode::Unknown`] so
/// nothing is lost on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Ok,
    UserCanceled,
    ServiceUnavailable,
    BillingUnavailable,
    ItemUnavailable,
    DeveloperError,
    FatalError,
    ItemAlreadyOwned,
    ItemNotOwned,
    ServiceTimeout,
    FeatureNotSupported,
    ServiceDisconnected,
    BillingNotReady,
    SkuNotAvailable,
    Unknown(i64),
}

impl ResponseCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ResponseCode::Ok,
            1 => ResponseCode::UserCanceled,
            2 => ResponseCode::ServiceUnavailable,
            3 => ResponseCode::BillingUnavailable,
            4 => ResponseCode::ItemUnavailable,
            5 => ResponseCode::DeveloperError,
            6 => ResponseCode::FatalError,
            7 => ResponseCode::ItemAlreadyOwned,
            8 => ResponseCode::ItemNotOwned,
            -3 => ResponseCode::ServiceTimeout,
            -2 => ResponseCode::FeatureNotSupported,
            -1 => ResponseCode::ServiceDisconnected,
            9 => ResponseCode::BillingNotReady,
            10 => ResponseCode::SkuNotAvailable,
            other => ResponseCode::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ResponseCode::Ok => 0,
            ResponseCode::UserCanceled => 1,
            ResponseCode::ServiceUnavailable => 2,
            ResponseCode::BillingUnavailable => 3,
            ResponseCode::ItemUnavailable => 4,
            ResponseCode::DeveloperError => 5,
            ResponseCode::FatalError => 6,
            ResponseCode::ItemAlreadyOwned => 7,
            ResponseCode::ItemNotOwned => 8,
            ResponseCode::ServiceTimeout => -3,
            ResponseCode::FeatureNotSupported => -2,
            ResponseCode::ServiceDisconnected => -1,
            ResponseCode::BillingNotReady => 9,
            ResponseCode::SkuNotAvailable => 10,
            ResponseCode::Unknown(other) => *other,
        }
    }

    /// Stable identifier for logs and reconcile failure reasons.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::Ok => "OK",
            ResponseCode::UserCanceled => "USER_CANCELED",
            ResponseCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ResponseCode::BillingUnavailable => "BILLING_UNAVAILABLE",
            ResponseCode::ItemUnavailable => "ITEM_UNAVAILABLE",
            ResponseCode::DeveloperError => "DEVELOPER_ERROR",
            ResponseCode::FatalError => "ERROR",
            ResponseCode::ItemAlreadyOwned => "ITEM_ALREADY_OWNED",
            ResponseCode::ItemNotOwned => "ITEM_NOT_OWNED",
            ResponseCode::ServiceTimeout => "SERVICE_TIMEOUT",
            ResponseCode::FeatureNotSupported => "FEATURE_NOT_SUPPORTED",
            ResponseCode::ServiceDisconnected => "SERVICE_DISCONNECTED",
            ResponseCode::BillingNotReady => "BILLING_NOT_READY",
            ResponseCode::SkuNotAvailable => "SKU_NOT_AVAILABLE",
            ResponseCode::Unknown(_) => "UNKNOWN",
        }
    }

    /// Human-readable description for the on-screen billing log.
    ///
    /// Total over the enum: unknown codes render with their raw value
    /// instead of falling through to a generic error.
    pub fn message(&self) -> String {
        match self {
            ResponseCode::Ok => "OK".to_string(),
            ResponseCode::UserCanceled => "User pressed back or canceled a dialog".to_string(),
            ResponseCode::ServiceUnavailable => "Network connection is down".to_string(),
            ResponseCode::BillingUnavailable => {
                "Billing API version is not supported for the type requested".to_string()
            }
            ResponseCode::ItemUnavailable => {
                "Requested product is not available for purchase".to_string()
            }
            ResponseCode::DeveloperError => "Invalid arguments provided to the API".to_string(),
            ResponseCode::FatalError => "Fatal error during the API action".to_string(),
            ResponseCode::ItemAlreadyOwned => {
                "Failure to purchase since item is already owned".to_string()
            }
            ResponseCode::ItemNotOwned => {
                "Failure to consume since item is not owned".to_string()
            }
            ResponseCode::ServiceTimeout => {
                "The request has reached the maximum timeout before the store responds".to_string()
            }
            ResponseCode::FeatureNotSupported => {
                "Requested feature is not supported by the store on the current device".to_string()
            }
            ResponseCode::ServiceDisconnected => {
                "Store service is not connected now".to_string()
            }
            ResponseCode::BillingNotReady => "Billing is not ready".to_string(),
            ResponseCode::SkuNotAvailable => {
                "Product details not available for making purchase".to_string()
            }
            ResponseCode::Unknown(code) => format!("unknown response code {}", code),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseCode::Ok)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_state_known_codes_round_trip() {
        for state in [
            PurchaseState::Unspecified,
            PurchaseState::Purchased,
            PurchaseState::Pending,
        ] {
            assert_eq!(PurchaseState::from_code(state.code()), state);
        }
    }

    #[test]
    fn purchase_state_out_of_range_maps_to_unspecified() {
        assert_eq!(PurchaseState::from_code(7), PurchaseState::Unspecified);
        assert_eq!(PurchaseState::from_code(-1), PurchaseState::Unspecified);
    }

    #[test]
    fn response_code_known_codes_round_trip() {
        for raw in [-3, -2, -1, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10] {
            let rc = ResponseCode::from_code(raw);
            assert_eq!(rc.code(), raw);
            assert!(!matches!(rc, ResponseCode::Unknown(_)));
        }
    }

    #[test]
    fn response_code_unknown_preserves_raw_value() {
        let rc = ResponseCode::from_code(42);
        assert_eq!(rc, ResponseCode::Unknown(42));
        assert_eq!(rc.code(), 42);
        assert_eq!(rc.message(), "unknown response code 42");
    }

    #[test]
    fn response_code_messages_are_nonempty() {
        for raw in -5..15 {
            assert!(!ResponseCode::from_code(raw).message().is_empty());
        }
    }

    #[test]
    fn item_not_owned_identifier_is_stable() {
        assert_eq!(ResponseCode::ItemNotOwned.as_str(), "ITEM_NOT_OWNED");
    }

    #[test]
    fn purchase_record_constructor_defaults_passthrough_fields() {
        let rec = PurchaseRecord::new("T1", "P1", PurchaseState::Purchased, false);
        assert_eq!(rec.token, "T1");
        assert_eq!(rec.product_id, "P1");
        assert!(rec.order_id.is_empty());
        assert_eq!(rec.purchase_time_ms, 0);
    }

    #[test]
    fn purchase_time_converts_epoch_millis() {
        let mut rec = PurchaseRecord::new("T1", "P1", PurchaseState::Purchased, false);
        rec.purchase_time_ms = 1_599_226_070_820;
        let ts = rec.purchase_time().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_599_226_070_820);
    }

    #[test]
    fn purchase_record_serde_round_trip() {
        let rec = PurchaseRecord {
            token: "tok".to_string(),
            product_id: "prod".to_string(),
            order_id: "GPA.3319-9400-1235-26613".to_string(),
            state: PurchaseState::Pending,
            acknowledged: false,
            purchase_time_ms: 1_599_226_070_820,
            package_name: "com.example.app".to_string(),
            auto_renewing: false,
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: PurchaseRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
