use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::CartItemId,
    error::{ApiError, ApiException},
    protocol::{
        AddToCartRequest, CartItem, CartSnapshot, PriceData, ProductData, UpdateCartItemRequest,
    },
};
use tracing::debug;
use url::Url;

/// Server-synchronized cart consumed by the summary bar.
#[async_trait]
pub trait CartCollaborator: Send + Sync {
    async fn cart_items(&self) -> Result<Vec<CartItem>>;
    async fn add_to_cart(&self, product: &ProductData, price: &PriceData) -> Result<CartSnapshot>;
    async fn update_cart_item(
        &self,
        line_id: CartItemId,
        product: &ProductData,
        price: &PriceData,
    ) -> Result<CartSnapshot>;
    async fn remove_from_cart(&self, line_id: CartItemId) -> Result<CartSnapshot>;
}

pub struct MissingCartCollaborator;

#[async_trait]
impl CartCollaborator for MissingCartCollaborator {
    async fn cart_items(&self) -> Result<Vec<CartItem>> {
        Err(anyhow!("cart collaborator is unavailable"))
    }

    async fn add_to_cart(
        &self,
        _product: &ProductData,
        _price: &PriceData,
    ) -> Result<CartSnapshot> {
        Err(anyhow!("cart collaborator is unavailable"))
    }

    async fn update_cart_item(
        &self,
        line_id: CartItemId,
        _product: &ProductData,
        _price: &PriceData,
    ) -> Result<CartSnapshot> {
        Err(anyhow!(
            "cart collaborator is unavailable; cannot update line {line_id}"
        ))
    }

    async fn remove_from_cart(&self, line_id: CartItemId) -> Result<CartSnapshot> {
        Err(anyhow!(
            "cart collaborator is unavailable; cannot remove line {line_id}"
        ))
    }
}

/// REST cart client.
///
/// Routes, relative to the base URL: `GET cart`, `POST cart/add`,
/// `PATCH cart/items/{id}`, `DELETE cart/items/{id}`. Every route answers
/// with the updated [`CartSnapshot`].
pub struct HttpCartClient {
    http: Client,
    base_url: String,
}

impl HttpCartClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed =
            Url::parse(base_url).with_context(|| format!("invalid cart api url '{base_url}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("cart api url must start with http:// or https://"));
        }
        Ok(Self {
            http: Client::new(),
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn snapshot_from(response: Response) -> Result<CartSnapshot> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<CartSnapshot>()
                .await
                .context("invalid cart payload from server");
        }

        let body = response.text().await.with_context(|| {
            format!("cart request failed with status {status} and its body could not be read")
        })?;
        match serde_json::from_str::<ApiError>(&body) {
            Ok(api_error) => Err(ApiException::from(api_error).into()),
            Err(_) => Err(anyhow!("cart request failed with status {status}: {body}")),
        }
    }
}

#[async_trait]
impl CartCollaborator for HttpCartClient {
    async fn cart_items(&self) -> Result<Vec<CartItem>> {
        let response = self
            .http
            .get(format!("{}/cart", self.base_url))
            .send()
            .await
            .context("failed to fetch cart")?;
        Ok(Self::snapshot_from(response).await?.items)
    }

    async fn add_to_cart(&self, product: &ProductData, price: &PriceData) -> Result<CartSnapshot> {
        debug!(subject = %product.subject_code, "cart: adding tutorial line");
        let response = self
            .http
            .post(format!("{}/cart/add", self.base_url))
            .json(&AddToCartRequest {
                product: product.clone(),
                price: price.clone(),
            })
            .send()
            .await
            .context("failed to add cart line")?;
        Self::snapshot_from(response).await
    }

    async fn update_cart_item(
        &self,
        line_id: CartItemId,
        product: &ProductData,
        price: &PriceData,
    ) -> Result<CartSnapshot> {
        debug!(subject = %product.subject_code, line_id = line_id.0, "cart: updating tutorial line");
        let response = self
            .http
            .patch(format!("{}/cart/items/{line_id}", self.base_url))
            .json(&UpdateCartItemRequest {
                product: product.clone(),
                price: price.clone(),
            })
            .send()
            .await
            .with_context(|| format!("failed to update cart line {line_id}"))?;
        Self::snapshot_from(response).await
    }

    async fn remove_from_cart(&self, line_id: CartItemId) -> Result<CartSnapshot> {
        debug!(line_id = line_id.0, "cart: removing line");
        let response = self
            .http
            .delete(format!("{}/cart/items/{line_id}", self.base_url))
            .send()
            .await
            .with_context(|| format!("failed to remove cart line {line_id}"))?;
        Self::snapshot_from(response).await
    }
}

#[cfg(test)]
#[path = "tests/cart_tests.rs"]
mod tests;
