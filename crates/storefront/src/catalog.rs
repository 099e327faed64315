use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use sliceline_core::domain::product::{ImageRef, Product, ProductId};
use sliceline_core::errors::PortError;
use sliceline_core::ports::Catalog;

use crate::auth::TokenCache;
use crate::error::StorefrontError;
use crate::transport::ApiContext;

#[derive(Debug, Deserialize)]
struct Collection<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ProductDto {
    id: String,
    attributes: ProductAttributes,
    #[serde(default)]
    relationships: Option<ProductRelationships>,
}

#[derive(Debug, Deserialize)]
struct ProductAttributes {
    name: String,
    #[serde(default)]
    description: String,
    /// Price-book amounts keyed by currency code, minor units.
    #[serde(default)]
    price: HashMap<String, PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct ProductRelationships {
    #[serde(default)]
    main_image: Option<Relationship>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(default)]
    data: Option<RelationshipTarget>,
}

#[derive(Debug, Deserialize)]
struct RelationshipTarget {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InventoryDto {
    id: String,
    #[serde(default)]
    available: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FileDto {
    data: FileData,
}

#[derive(Debug, Deserialize)]
struct FileData {
    link: FileLink,
}

#[derive(Debug, Deserialize)]
struct FileLink {
    href: String,
}

/// Catalog reads over the commerce API: the published product list joined
/// with inventory levels, and image byte downloads via the files endpoint.
pub struct CatalogClient {
    api: ApiContext,
    currency: String,
}

impl CatalogClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        tokens: Arc<TokenCache>,
        currency: String,
        request_timeout: Duration,
    ) -> Self {
        Self { api: ApiContext::new(http, base_url, tokens, request_timeout), currency }
    }
}

fn parse_products(
    currency: &str,
    products: Value,
    inventories: Value,
) -> Result<Vec<Product>, StorefrontError> {
    let products: Collection<ProductDto> =
        serde_json::from_value(products).map_err(|err| StorefrontError::Decode {
            endpoint: "/catalog/products".to_owned(),
            detail: err.to_string(),
        })?;
    let inventories: Collection<InventoryDto> =
        serde_json::from_value(inventories).map_err(|err| StorefrontError::Decode {
            endpoint: "/v2/inventories".to_owned(),
            detail: err.to_string(),
        })?;

    let stock_by_product: HashMap<String, u32> = inventories
        .data
        .into_iter()
        .filter_map(|inventory| inventory.available.map(|available| (inventory.id, available)))
        .collect();

    products
        .data
        .into_iter()
        .map(|dto| {
            let price =
                dto.attributes.price.get(currency).ok_or_else(|| StorefrontError::Decode {
                    endpoint: "/catalog/products".to_owned(),
                    detail: format!("product {} has no {currency} price", dto.id),
                })?;
            let image = dto
                .relationships
                .and_then(|relationships| relationships.main_image)
                .and_then(|main_image| main_image.data)
                .map(|target| ImageRef(target.id));
            let stock = stock_by_product.get(&dto.id).copied();

            Ok(Product {
                id: ProductId(dto.id),
                name: dto.attributes.name,
                description: dto.attributes.description,
                unit_price: Decimal::new(price.amount, 2),
                image,
                stock,
            })
        })
        .collect()
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn list_products(&self) -> Result<Vec<Product>, PortError> {
        let products = self.api.get_json("/catalog/products").await?;
        let inventories = self.api.get_json("/v2/inventories").await?;
        Ok(parse_products(&self.currency, products, inventories)?)
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, PortError> {
        let path = format!("/v2/files/{}", image.0);
        let raw = self.api.get_json(&path).await?;
        let file: FileDto = serde_json::from_value(raw).map_err(|err| {
            StorefrontError::Decode { endpoint: path.clone(), detail: err.to_string() }
        })?;
        Ok(self.api.download(&file.data.link.href).await?)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::parse_products;

    #[test]
    fn products_join_prices_images_and_stock() {
        let products = json!({
            "data": [{
                "id": "p-1",
                "attributes": {
                    "name": "Pepperoni",
                    "description": "Spicy salami",
                    "price": {"RUB": {"amount": 45000, "includes_tax": false}}
                },
                "relationships": {"main_image": {"data": {"id": "img-1", "type": "file"}}}
            }]
        });
        let inventories = json!({"data": [{"id": "p-1", "available": 12, "total": 20}]});

        let parsed = parse_products("RUB", products, inventories).expect("parse");
        assert_eq!(parsed.len(), 1);
        let product = &parsed[0];
        assert_eq!(product.id.0, "p-1");
        assert_eq!(product.unit_price, Decimal::new(45000, 2));
        assert_eq!(product.image.as_ref().map(|image| image.0.as_str()), Some("img-1"));
        assert_eq!(product.stock, Some(12));
    }

    #[test]
    fn missing_image_and_inventory_read_as_none() {
        let products = json!({
            "data": [{
                "id": "p-2",
                "attributes": {
                    "name": "Margherita",
                    "price": {"RUB": {"amount": 39900}}
                }
            }]
        });

        let parsed = parse_products("RUB", products, json!({"data": []})).expect("parse");
        assert!(parsed[0].image.is_none());
        assert!(parsed[0].stock.is_none());
        assert_eq!(parsed[0].description, "");
    }

    #[test]
    fn missing_currency_price_is_a_decode_error() {
        let products = json!({
            "data": [{
                "id": "p-3",
                "attributes": {"name": "Hawaiian", "price": {"USD": {"amount": 999}}}
            }]
        });

        let error = parse_products("RUB", products, json!({"data": []})).expect_err("must fail");
        assert!(error.to_string().contains("no RUB price"));
    }

    #[test]
    fn catalog_order_is_preserved() {
        let products = json!({
            "data": [
                {"id": "b", "attributes": {"name": "B", "price": {"RUB": {"amount": 100}}}},
                {"id": "a", "attributes": {"name": "A", "price": {"RUB": {"amount": 100}}}}
            ]
        });

        let parsed = parse_products("RUB", products, json!({"data": []})).expect("parse");
        let ids: Vec<&str> = parsed.iter().map(|product| product.id.0.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
