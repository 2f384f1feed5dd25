//! Subscription billing backed by Lemon Squeezy
//!
//! [`BillingService`] owns the local plan and subscription mirrors and talks
//! to the payments provider through the [`PaymentProvider`] trait, so the
//! provider can be swapped out in tests.

pub mod display;
pub mod lemonsqueezy;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;

use crate::db::{DbPool, NewPlan, Plan, PlanRepo, Subscription, SubscriptionRepo, SubscriptionUpdate};
use crate::{Error, Result};

pub use lemonsqueezy::LemonSqueezyClient;
use types::{
    CheckoutCustom, CheckoutData, CheckoutOptions, CheckoutRequest, PriceAttributes,
    ProductOptions, Resource, SubscriptionAttributes, SubscriptionPatch, SubscriptionUrls,
    VariantAttributes, WebhookEvent,
};

const RECEIPT_BUTTON_TEXT: &str = "Go to Dashboard";
const RECEIPT_THANK_YOU_NOTE: &str = "Thank you for signing up to Lemon Stand!";

/// Subscription events that carry a subscription resource
const SUBSCRIPTION_EVENTS: &[&str] = &[
    "subscription_created",
    "subscription_updated",
    "subscription_cancelled",
    "subscription_resumed",
    "subscription_expired",
    "subscription_paused",
    "subscription_unpaused",
];

/// Operations the gateway needs from a payments provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout and return its URL
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String>;

    /// Fetch a subscription
    async fn get_subscription(&self, id: &str) -> Result<SubscriptionAttributes>;

    /// Cancel a subscription at the end of the billing period
    async fn cancel_subscription(&self, id: &str) -> Result<SubscriptionAttributes>;

    /// Apply a change to a subscription
    async fn update_subscription(
        &self,
        id: &str,
        patch: SubscriptionPatch,
    ) -> Result<SubscriptionAttributes>;

    /// Every variant of every product in the store
    async fn list_variants(&self) -> Result<Vec<Resource<VariantAttributes>>>;

    /// Fetch a product
    async fn get_product(&self, product_id: i64) -> Result<types::ProductAttributes>;

    /// The first price attached to a variant
    async fn first_price(&self, variant_id: &str) -> Result<Option<PriceAttributes>>;
}

/// TTL cache of computed subscriber flags, keyed by user id
///
/// Both outcomes are cached; every local mutation for a user invalidates
/// that user's entry.
#[derive(Clone, Debug)]
pub struct SubscriberCache {
    inner: Cache<String, bool>,
}

impl SubscriberCache {
    /// Create a new cache with the given TTL in seconds
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(4096)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
        }
    }

    /// Look up a cached flag
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<bool> {
        self.inner.get(&user_id.to_string())
    }

    /// Store a flag
    pub fn put(&self, user_id: &str, is_subscriber: bool) {
        self.inner.insert(user_id.to_string(), is_subscriber);
    }

    /// Drop a user's entry
    pub fn invalidate(&self, user_id: &str) {
        self.inner.invalidate(&user_id.to_string());
    }
}

/// Whether a subscription currently grants access
///
/// It must be active and not paused; a missing end date counts as open-ended.
#[must_use]
pub fn grants_access(sub: &Subscription, now: DateTime<Utc>) -> bool {
    sub.status == "active" && !sub.is_paused && sub.ends_at.is_none_or(|ends| ends > now)
}

/// Billing operations for the API and CLI
#[derive(Clone)]
pub struct BillingService {
    provider: Arc<dyn PaymentProvider>,
    plans: PlanRepo,
    subscriptions: SubscriptionRepo,
    cache: SubscriberCache,
    app_url: String,
}

impl BillingService {
    /// Create a billing service
    #[must_use]
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        pool: DbPool,
        app_url: impl Into<String>,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            provider,
            plans: PlanRepo::new(pool.clone()),
            subscriptions: SubscriptionRepo::new(pool),
            cache: SubscriberCache::new(cache_ttl_secs),
            app_url: app_url.into(),
        }
    }

    /// Local plans in display order
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn plans(&self) -> Result<Vec<Plan>> {
        self.plans.list()
    }

    /// Create a checkout for a variant and return its URL
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the checkout
    pub async fn checkout_url(
        &self,
        user_id: &str,
        email: Option<&str>,
        variant_id: i64,
        embed: bool,
    ) -> Result<String> {
        let request = CheckoutRequest {
            variant_id,
            checkout_options: CheckoutOptions {
                embed,
                media: false,
                logo: !embed,
            },
            checkout_data: CheckoutData {
                email: email.map(String::from),
                custom: CheckoutCustom {
                    user_id: user_id.to_string(),
                },
            },
            product_options: ProductOptions {
                enabled_variants: vec![variant_id],
                redirect_url: format!("{}/dashboard/billing/", self.app_url),
                receipt_button_text: RECEIPT_BUTTON_TEXT.to_string(),
                receipt_thank_you_note: RECEIPT_THANK_YOU_NOTE.to_string(),
            },
        };

        let url = self.provider.create_checkout(&request).await?;
        tracing::info!(user_id, variant_id, embed, "checkout created");
        Ok(url)
    }

    /// The user's subscriptions
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn user_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>> {
        self.subscriptions.list_for_user(user_id)
    }

    fn owned_subscription(&self, user_id: &str, id: &str) -> Result<Subscription> {
        self.subscriptions
            .list_for_user(user_id)?
            .into_iter()
            .find(|s| s.lemon_squeezy_id == id)
            .ok_or_else(|| Error::NotFound(format!("Subscription #{id} not found.")))
    }

    /// Payment-method and customer-portal URLs for one of the user's subscriptions
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not own the subscription
    pub async fn subscription_urls(&self, user_id: &str, id: &str) -> Result<SubscriptionUrls> {
        let sub = self.owned_subscription(user_id, id)?;
        let attrs = self.provider.get_subscription(&sub.lemon_squeezy_id).await?;
        Ok(attrs.urls)
    }

    /// Cancel one of the user's subscriptions
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not own the subscription, or the
    /// provider error if cancellation fails
    pub async fn cancel(&self, user_id: &str, id: &str) -> Result<Subscription> {
        let sub = self.owned_subscription(user_id, id)?;
        let attrs = self.provider.cancel_subscription(&sub.lemon_squeezy_id).await?;

        let update = SubscriptionUpdate {
            status: Some(attrs.status),
            status_formatted: Some(attrs.status_formatted),
            ends_at: Some(attrs.ends_at.unwrap_or_else(Utc::now)),
            ..SubscriptionUpdate::default()
        };
        let updated = self.apply_local(user_id, &sub.lemon_squeezy_id, &update)?;
        tracing::info!(user_id, subscription = %id, "subscription cancelled");
        Ok(updated)
    }

    /// Pause payment collection on one of the user's subscriptions
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not own the subscription
    pub async fn pause(&self, user_id: &str, id: &str) -> Result<Subscription> {
        self.set_paused(user_id, id, SubscriptionPatch::Pause).await
    }

    /// Resume payment collection on one of the user's subscriptions
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not own the subscription
    pub async fn unpause(&self, user_id: &str, id: &str) -> Result<Subscription> {
        self.set_paused(user_id, id, SubscriptionPatch::Unpause).await
    }

    async fn set_paused(
        &self,
        user_id: &str,
        id: &str,
        patch: SubscriptionPatch,
    ) -> Result<Subscription> {
        let sub = self.owned_subscription(user_id, id)?;
        let attrs = self
            .provider
            .update_subscription(&sub.lemon_squeezy_id, patch)
            .await?;

        let update = SubscriptionUpdate {
            status: Some(attrs.status),
            status_formatted: Some(attrs.status_formatted),
            is_paused: Some(attrs.pause.is_some()),
            ends_at: attrs.ends_at,
            ..SubscriptionUpdate::default()
        };
        let updated = self.apply_local(user_id, &sub.lemon_squeezy_id, &update)?;
        tracing::info!(user_id, subscription = %id, paused = updated.is_paused, "subscription pause state changed");
        Ok(updated)
    }

    /// Move the user's subscription on `current_plan_id` to `new_plan_id`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user has no subscription on the current
    /// plan or the new plan does not exist
    pub async fn change_plan(
        &self,
        user_id: &str,
        current_plan_id: &str,
        new_plan_id: &str,
    ) -> Result<Subscription> {
        let sub = self
            .subscriptions
            .list_for_user(user_id)?
            .into_iter()
            .find(|s| s.plan_id == current_plan_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "No subscription with plan id #{current_plan_id} was found."
                ))
            })?;

        let new_plan = self.plans.find(new_plan_id)?.ok_or_else(|| {
            Error::NotFound(format!("No plan with plan id #{new_plan_id} was found."))
        })?;

        let attrs = self
            .provider
            .update_subscription(
                &sub.lemon_squeezy_id,
                SubscriptionPatch::ChangeVariant(new_plan.variant_id),
            )
            .await?;

        let update = SubscriptionUpdate {
            plan_id: Some(new_plan.id.clone()),
            price: Some(new_plan.price.clone()),
            ends_at: attrs.ends_at,
            ..SubscriptionUpdate::default()
        };
        let updated = self.apply_local(user_id, &sub.lemon_squeezy_id, &update)?;
        tracing::info!(user_id, from = current_plan_id, to = new_plan_id, "plan changed");
        Ok(updated)
    }

    fn apply_local(
        &self,
        user_id: &str,
        lemon_squeezy_id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription> {
        self.subscriptions
            .apply_update(lemon_squeezy_id, update)
            .map_err(|e| {
                tracing::error!(error = %e, subscription = lemon_squeezy_id, "local subscription update failed");
                Error::Database(format!(
                    "Failed to update Subscription #{lemon_squeezy_id} in the database."
                ))
            })?;
        self.cache.invalidate(user_id);

        self.subscriptions
            .find_by_lemon_squeezy_id(lemon_squeezy_id)?
            .ok_or_else(|| Error::NotFound(format!("Subscription #{lemon_squeezy_id} not found.")))
    }

    /// Mirror the store's subscription variants into the local plan table
    ///
    /// # Errors
    ///
    /// Returns error if a provider call or database write fails
    pub async fn sync_plans(&self) -> Result<Vec<Plan>> {
        let variants = self.provider.list_variants().await?;
        let only_variant = variants.len() == 1;
        let mut product_names: HashMap<i64, String> = HashMap::new();
        let mut synced = Vec::new();

        for variant in variants {
            let attrs = &variant.attributes;

            // A product with several variants keeps its default one as pending
            if attrs.status == "draft" || (!only_variant && attrs.status == "pending") {
                tracing::debug!(variant = %variant.id, status = %attrs.status, "variant skipped");
                continue;
            }

            let product_name = match product_names.get(&attrs.product_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.provider.get_product(attrs.product_id).await?.name;
                    product_names.insert(attrs.product_id, name.clone());
                    name
                }
            };

            let Some(price) = self.provider.first_price(&variant.id).await? else {
                tracing::warn!(variant = %variant.id, "variant has no price, skipped");
                continue;
            };

            let Some(plan) = plan_from_variant(&variant, product_name, &price)? else {
                continue;
            };

            let stored = self.plans.upsert(&plan)?;
            tracing::info!(name = %stored.name, variant_id = stored.variant_id, "plan synced");
            synced.push(stored);
        }

        Ok(synced)
    }

    /// Whether the user's first subscription grants access right now
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn is_subscriber(&self, user_id: &str) -> Result<bool> {
        if let Some(cached) = self.cache.get(user_id) {
            return Ok(cached);
        }

        let is_subscriber = self
            .subscriptions
            .first_for_user(user_id)?
            .is_some_and(|sub| grants_access(&sub, Utc::now()));

        self.cache.put(user_id, is_subscriber);
        Ok(is_subscriber)
    }

    /// Apply a verified webhook delivery to the local mirror
    ///
    /// Returns the stored subscription, or `None` for events that do not
    /// concern subscriptions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the payload lacks the owning user or
    /// references an unknown plan
    pub fn apply_webhook(&self, event: WebhookEvent) -> Result<Option<Subscription>> {
        let name = event.meta.event_name.as_str();
        if !SUBSCRIPTION_EVENTS.contains(&name) {
            tracing::debug!(event = name, "webhook event ignored");
            return Ok(None);
        }

        let user_id = event
            .meta
            .custom_data
            .map(|c| c.user_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidInput("webhook is missing custom_data.user_id".to_string()))?;

        let attrs: SubscriptionAttributes = serde_json::from_value(event.data.attributes)?;

        let plan = self.plans.find_by_variant(attrs.variant_id)?.ok_or_else(|| {
            Error::InvalidInput(format!("no plan for variant {}", attrs.variant_id))
        })?;

        let item = attrs.first_subscription_item.unwrap_or_default();
        let sub = Subscription {
            id: String::new(),
            lemon_squeezy_id: event.data.id,
            order_id: attrs.order_id,
            name: attrs.user_name,
            email: attrs.user_email,
            status: attrs.status,
            status_formatted: attrs.status_formatted,
            renews_at: attrs.renews_at,
            ends_at: attrs.ends_at,
            trial_ends_at: attrs.trial_ends_at,
            price: plan.price,
            is_usage_based: item.is_usage_based,
            is_paused: attrs.pause.is_some(),
            subscription_item_id: (item.id != 0).then_some(item.id),
            user_id: user_id.clone(),
            plan_id: plan.id,
        };

        let stored = self.subscriptions.upsert(&sub)?;
        self.cache.invalidate(&user_id);
        tracing::info!(event = name, user_id = %user_id, subscription = %stored.lemon_squeezy_id, "subscription mirrored");
        Ok(Some(stored))
    }
}

/// Build a plan from a variant and its price; `None` for non-subscription prices
fn plan_from_variant(
    variant: &Resource<VariantAttributes>,
    product_name: String,
    price: &PriceAttributes,
) -> Result<Option<NewPlan>> {
    if price.category.as_deref() != Some("subscription") {
        return Ok(None);
    }

    let variant_id: i64 = variant
        .id
        .parse()
        .map_err(|_| Error::Billing(format!("invalid variant id '{}'", variant.id)))?;

    let is_usage_based = price.usage_aggregation.is_some();
    let price_string = if is_usage_based {
        price.unit_price_decimal.clone().unwrap_or_default()
    } else {
        price.unit_price.map(|p| p.to_string()).unwrap_or_default()
    };

    let attrs = &variant.attributes;
    Ok(Some(NewPlan {
        product_id: attrs.product_id,
        product_name: Some(product_name),
        variant_id,
        name: attrs.name.clone(),
        description: attrs.description.clone(),
        price: price_string,
        is_usage_based,
        interval: Some(
            price
                .renewal_interval_unit
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        ),
        interval_count: Some(price.renewal_interval_quantity.unwrap_or(1)),
        trial_interval: Some(
            price
                .trial_interval_unit
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        ),
        trial_interval_count: Some(price.trial_interval_quantity.unwrap_or(1)),
        sort: attrs.sort,
        created_at: attrs.created_at,
        updated_at: attrs.updated_at,
    }))
}
