use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use sliceline_core::domain::cart::{Cart, CartItem};
use sliceline_core::domain::product::ProductId;
use sliceline_core::domain::session::UserId;
use sliceline_core::errors::PortError;
use sliceline_core::ports::CartService;

use crate::auth::TokenCache;
use crate::error::StorefrontError;
use crate::transport::ApiContext;

#[derive(Debug, Deserialize)]
struct CartDto {
    #[serde(default)]
    data: Vec<CartItemDto>,
    #[serde(default)]
    meta: Option<CartMeta>,
}

#[derive(Debug, Deserialize)]
struct CartItemDto {
    id: String,
    product_id: String,
    name: String,
    #[serde(default)]
    description: String,
    quantity: u32,
    meta: ItemMeta,
}

#[derive(Debug, Deserialize)]
struct ItemMeta {
    display_price: ItemDisplayPrice,
}

#[derive(Debug, Deserialize)]
struct ItemDisplayPrice {
    without_tax: ItemPrices,
}

#[derive(Debug, Deserialize)]
struct ItemPrices {
    unit: FormattedAmount,
    value: FormattedAmount,
}

#[derive(Debug, Deserialize)]
struct CartMeta {
    display_price: CartDisplayPrice,
}

#[derive(Debug, Deserialize)]
struct CartDisplayPrice {
    without_tax: FormattedAmount,
}

#[derive(Debug, Deserialize)]
struct FormattedAmount {
    /// Minor currency units.
    amount: i64,
    formatted: String,
}

/// Cart commands against the commerce API. Per-user carts are addressed by
/// chat id; the server computes every total and hands back display strings
/// ready for rendering.
pub struct CartClient {
    api: ApiContext,
}

impl CartClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        tokens: Arc<TokenCache>,
        request_timeout: Duration,
    ) -> Self {
        Self { api: ApiContext::new(http, base_url, tokens, request_timeout) }
    }

    fn items_path(user: UserId) -> String {
        format!("/v2/carts/{user}/items")
    }
}

fn parse_cart(raw: Value) -> Result<Cart, StorefrontError> {
    let dto: CartDto = serde_json::from_value(raw).map_err(|err| StorefrontError::Decode {
        endpoint: "/v2/carts/{user}/items".to_owned(),
        detail: err.to_string(),
    })?;

    let items = dto
        .data
        .into_iter()
        .map(|item| {
            let prices = item.meta.display_price.without_tax;
            CartItem {
                item_id: item.id,
                product_id: ProductId(item.product_id),
                name: item.name,
                description: item.description,
                quantity: item.quantity,
                unit_price_display: prices.unit.formatted,
                line_total_display: prices.value.formatted,
            }
        })
        .collect();

    // An empty cart carries no price meta; it totals to zero.
    let (total, total_display) = match dto.meta {
        Some(meta) => {
            let without_tax = meta.display_price.without_tax;
            (Decimal::new(without_tax.amount, 2), without_tax.formatted)
        }
        None => (Decimal::ZERO, String::new()),
    };

    Ok(Cart { items, total, total_display })
}

#[async_trait]
impl CartService for CartClient {
    async fn cart(&self, user: UserId) -> Result<Cart, PortError> {
        let raw = self.api.get_json(&Self::items_path(user)).await?;
        Ok(parse_cart(raw)?)
    }

    async fn add_item(
        &self,
        user: UserId,
        product: &ProductId,
        quantity: u32,
    ) -> Result<(), PortError> {
        let body = json!({
            "data": {"id": product.0, "type": "cart_item", "quantity": quantity.max(1)}
        });
        self.api.post_json(&Self::items_path(user), &body).await?;
        Ok(())
    }

    async fn remove_item(&self, user: UserId, item_id: &str) -> Result<(), PortError> {
        let path = format!("{}/{item_id}", Self::items_path(user));
        self.api.delete(&path).await?;
        Ok(())
    }

    async fn clear(&self, user: UserId) -> Result<(), PortError> {
        self.api.delete(&Self::items_path(user)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::parse_cart;

    #[test]
    fn cart_items_carry_server_formatted_prices() {
        let raw = json!({
            "data": [{
                "id": "item-1",
                "product_id": "p-1",
                "name": "Pepperoni",
                "description": "Spicy salami",
                "quantity": 2,
                "meta": {"display_price": {"without_tax": {
                    "unit": {"amount": 45000, "formatted": "450.00 RUB"},
                    "value": {"amount": 90000, "formatted": "900.00 RUB"}
                }}}
            }],
            "meta": {"display_price": {"without_tax": {
                "amount": 90000, "formatted": "900.00 RUB"
            }}}
        });

        let cart = parse_cart(raw).expect("parse");
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].item_id, "item-1");
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[0].unit_price_display, "450.00 RUB");
        assert_eq!(cart.items[0].line_total_display, "900.00 RUB");
        assert_eq!(cart.total, Decimal::new(90000, 2));
        assert_eq!(cart.total_display, "900.00 RUB");
    }

    #[test]
    fn empty_cart_parses_to_a_zero_total() {
        let cart = parse_cart(json!({"data": []})).expect("parse");
        assert!(cart.is_empty());
        assert_eq!(cart.total, Decimal::ZERO);
    }

    #[test]
    fn malformed_cart_payload_is_a_decode_error() {
        let error = parse_cart(json!({"data": [{"id": "item-1"}]})).expect_err("must fail");
        assert!(error.to_string().contains("could not be decoded"));
    }
}
