//! Lemon Squeezy REST client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::PaymentProvider;
use super::types::{
    CheckoutAttributes, CheckoutRequest, Document, ListDocument, PriceAttributes,
    ProductAttributes, Resource, SubscriptionAttributes, SubscriptionPatch, VariantAttributes,
};
use crate::config::LemonSqueezyConfig;
use crate::{Error, Result};

const JSON_API: &str = "application/vnd.api+json";

/// Client for the Lemon Squeezy API
#[derive(Debug, Clone)]
pub struct LemonSqueezyClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    store_id: Option<String>,
}

impl LemonSqueezyClient {
    /// Create a new client
    #[must_use]
    pub fn new(config: &LemonSqueezyConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            store_id: config.store_id.clone(),
        }
    }

    fn request(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header("Accept", JSON_API).header("Content-Type", JSON_API);
        match &self.api_key {
            Some(key) => req.bearer_auth(key.expose_secret()),
            None => req,
        }
    }

    fn store_id(&self) -> Result<&str> {
        self.store_id
            .as_deref()
            .ok_or_else(|| Error::Config("LEMONSQUEEZY_STORE_ID is not set".to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .request(self.client.get(&url).query(query))
            .send()
            .await?;
        read_json(response).await
    }

    async fn subscription_call(&self, req: RequestBuilder) -> Result<SubscriptionAttributes> {
        let response = self.request(req).send().await?;
        let doc: Document<SubscriptionAttributes> = read_json(response).await?;
        Ok(doc.data.attributes)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Billing(format!("Lemon Squeezy API error: {status} - {body}")));
    }

    Ok(response.json().await?)
}

#[async_trait]
impl PaymentProvider for LemonSqueezyClient {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String> {
        let store_id = self.store_id()?;
        let body = serde_json::json!({
            "data": {
                "type": "checkouts",
                "attributes": request,
                "relationships": {
                    "store": { "data": { "type": "stores", "id": store_id } },
                    "variant": { "data": { "type": "variants", "id": request.variant_id.to_string() } }
                }
            }
        });

        let url = format!("{}/checkouts", self.base_url);
        let response = self
            .request(self.client.post(&url).json(&body))
            .send()
            .await?;
        let doc: Document<CheckoutAttributes> = read_json(response).await?;

        tracing::debug!(variant_id = request.variant_id, "checkout created");
        Ok(doc.data.attributes.url)
    }

    async fn get_subscription(&self, id: &str) -> Result<SubscriptionAttributes> {
        let doc: Document<SubscriptionAttributes> =
            self.get(&format!("/subscriptions/{id}"), &[]).await?;
        Ok(doc.data.attributes)
    }

    async fn cancel_subscription(&self, id: &str) -> Result<SubscriptionAttributes> {
        let url = format!("{}/subscriptions/{id}", self.base_url);
        self.subscription_call(self.client.delete(&url)).await
    }

    async fn update_subscription(
        &self,
        id: &str,
        patch: SubscriptionPatch,
    ) -> Result<SubscriptionAttributes> {
        let url = format!("{}/subscriptions/{id}", self.base_url);
        let body = serde_json::json!({
            "data": {
                "type": "subscriptions",
                "id": id,
                "attributes": patch.attributes()
            }
        });
        self.subscription_call(self.client.patch(&url).json(&body))
            .await
    }

    async fn list_variants(&self) -> Result<Vec<Resource<VariantAttributes>>> {
        let store_id = self.store_id()?;
        let doc: ListDocument<serde_json::Value, serde_json::Value> = self
            .get(
                "/products",
                &[("filter[store_id]", store_id), ("include", "variants")],
            )
            .await?;

        let mut variants = Vec::new();
        for resource in doc.included {
            if resource.kind != "variants" {
                continue;
            }
            let attributes: VariantAttributes = serde_json::from_value(resource.attributes)?;
            variants.push(Resource {
                id: resource.id,
                kind: resource.kind,
                attributes,
            });
        }
        Ok(variants)
    }

    async fn get_product(&self, product_id: i64) -> Result<ProductAttributes> {
        let doc: Document<ProductAttributes> =
            self.get(&format!("/products/{product_id}"), &[]).await?;
        Ok(doc.data.attributes)
    }

    async fn first_price(&self, variant_id: &str) -> Result<Option<PriceAttributes>> {
        let doc: ListDocument<PriceAttributes> = self
            .get("/prices", &[("filter[variant_id]", variant_id)])
            .await?;
        Ok(doc.data.into_iter().next().map(|r| r.attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_store_id_is_a_config_error() {
        let client = LemonSqueezyClient::new(&LemonSqueezyConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            store_id: None,
            webhook_secret: None,
        });
        assert!(matches!(client.store_id(), Err(Error::Config(_))));
    }
}
