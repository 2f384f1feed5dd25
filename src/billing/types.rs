//! Lemon Squeezy resource shapes
//!
//! The API speaks JSON:API: every payload is `{ "data": { "id", "type",
//! "attributes" } }` with related resources under `included`. Only the
//! attributes the gateway reads are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A JSON:API resource object
#[derive(Debug, Clone, Deserialize)]
pub struct Resource<A> {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub attributes: A,
}

/// Single-resource document
#[derive(Debug, Clone, Deserialize)]
pub struct Document<A> {
    pub data: Resource<A>,
}

/// Collection document, optionally carrying included resources
#[derive(Debug, Clone, Deserialize)]
pub struct ListDocument<A, I = serde_json::Value> {
    pub data: Vec<Resource<A>>,
    #[serde(default = "Vec::new")]
    pub included: Vec<Resource<I>>,
}

/// Subscription attributes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionAttributes {
    #[serde(default)]
    pub order_id: i64,
    #[serde(default)]
    pub variant_id: i64,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    pub status: String,
    pub status_formatted: String,
    pub renews_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// `null` unless collection is paused
    #[serde(default)]
    pub pause: Option<serde_json::Value>,
    #[serde(default)]
    pub first_subscription_item: Option<SubscriptionItem>,
    #[serde(default)]
    pub urls: SubscriptionUrls,
}

/// First line item of a subscription
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItem {
    pub id: i64,
    #[serde(default)]
    pub is_usage_based: bool,
}

/// Pre-signed customer URLs attached to a subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUrls {
    pub update_payment_method: Option<String>,
    pub customer_portal: Option<String>,
}

/// Variant attributes
#[derive(Debug, Clone, Deserialize)]
pub struct VariantAttributes {
    pub product_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// `published`, `pending` or `draft`
    pub status: String,
    pub sort: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product attributes
#[derive(Debug, Clone, Deserialize)]
pub struct ProductAttributes {
    pub name: String,
}

/// Price attributes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceAttributes {
    /// `one_time`, `subscription`, `lead_magnet` or `pwyw`
    pub category: Option<String>,
    pub usage_aggregation: Option<String>,
    pub unit_price: Option<i64>,
    pub unit_price_decimal: Option<String>,
    pub renewal_interval_unit: Option<String>,
    pub renewal_interval_quantity: Option<i64>,
    pub trial_interval_unit: Option<String>,
    pub trial_interval_quantity: Option<i64>,
}

/// Checkout attributes
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutAttributes {
    pub url: String,
}

/// Everything needed to open a hosted checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    #[serde(skip)]
    pub variant_id: i64,
    pub checkout_options: CheckoutOptions,
    pub checkout_data: CheckoutData,
    pub product_options: ProductOptions,
}

/// Presentation of the checkout page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutOptions {
    pub embed: bool,
    pub media: bool,
    pub logo: bool,
}

/// Prefilled customer data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub custom: CheckoutCustom,
}

/// Custom data echoed back in webhooks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCustom {
    pub user_id: String,
}

/// Product page overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductOptions {
    pub enabled_variants: Vec<i64>,
    pub redirect_url: String,
    pub receipt_button_text: String,
    pub receipt_thank_you_note: String,
}

/// A change requested on an existing subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPatch {
    /// Pause payment collection (`pause: {mode: "void"}`)
    Pause,
    /// Resume payment collection (`pause: null`)
    Unpause,
    /// Move to another variant
    ChangeVariant(i64),
}

impl SubscriptionPatch {
    /// Attributes sent in the PATCH body
    #[must_use]
    pub fn attributes(self) -> serde_json::Value {
        match self {
            Self::Pause => serde_json::json!({ "pause": { "mode": "void" } }),
            Self::Unpause => serde_json::json!({ "pause": null }),
            Self::ChangeVariant(variant_id) => serde_json::json!({ "variant_id": variant_id }),
        }
    }
}

/// Incoming webhook delivery
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub meta: WebhookMeta,
    pub data: Resource<serde_json::Value>,
}

/// Webhook metadata
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMeta {
    pub event_name: String,
    #[serde(default)]
    pub custom_data: Option<CheckoutCustom>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_attributes() {
        assert_eq!(
            SubscriptionPatch::Pause.attributes(),
            serde_json::json!({ "pause": { "mode": "void" } })
        );
        assert_eq!(
            SubscriptionPatch::Unpause.attributes(),
            serde_json::json!({ "pause": null })
        );
        assert_eq!(
            SubscriptionPatch::ChangeVariant(42).attributes(),
            serde_json::json!({ "variant_id": 42 })
        );
    }

    #[test]
    fn subscription_document_parses_with_null_pause() {
        let doc: Document<SubscriptionAttributes> = serde_json::from_str(
            r#"{
                "data": {
                    "type": "subscriptions",
                    "id": "1",
                    "attributes": {
                        "status": "active",
                        "status_formatted": "Active",
                        "renews_at": "2030-01-01T00:00:00.000000Z",
                        "ends_at": null,
                        "trial_ends_at": null,
                        "pause": null,
                        "urls": {
                            "update_payment_method": "https://pay.example/u",
                            "customer_portal": "https://pay.example/p"
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let attrs = doc.data.attributes;
        assert!(attrs.pause.is_none());
        assert!(attrs.renews_at.is_some());
        assert_eq!(attrs.urls.customer_portal.as_deref(), Some("https://pay.example/p"));
    }

    #[test]
    fn list_document_defaults_included() {
        let doc: ListDocument<ProductAttributes> =
            serde_json::from_str(r#"{"data":[{"id":"1","type":"products","attributes":{"name":"Pro"}}]}"#)
                .unwrap();
        assert_eq!(doc.data[0].attributes.name, "Pro");
        assert!(doc.included.is_empty());
    }

    #[test]
    fn checkout_request_omits_variant_from_attributes() {
        let req = CheckoutRequest {
            variant_id: 7,
            checkout_options: CheckoutOptions {
                embed: false,
                media: false,
                logo: true,
            },
            checkout_data: CheckoutData {
                email: None,
                custom: CheckoutCustom {
                    user_id: "u1".to_string(),
                },
            },
            product_options: ProductOptions {
                enabled_variants: vec![7],
                redirect_url: "https://app/dashboard/billing/".to_string(),
                receipt_button_text: "Go to Dashboard".to_string(),
                receipt_thank_you_note: "Thanks".to_string(),
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("variant_id").is_none());
        assert!(value["checkout_data"].get("email").is_none());
        assert_eq!(value["checkout_data"]["custom"]["user_id"], "u1");
    }
}
