use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// One cart line as returned by the cart collaborator. Display strings are
/// server-formatted; `quantity` is always at least 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Cart-line id used for removal, distinct from the product id.
    pub item_id: String,
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price_display: String,
    pub line_total_display: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    /// Cart-level total in major currency units, server-computed.
    pub total: Decimal,
    pub total_display: String,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .filter(|item| &item.product_id == product_id)
            .map(|item| item.quantity)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Cart, CartItem};
    use crate::domain::product::ProductId;

    fn line(product: &str, quantity: u32) -> CartItem {
        CartItem {
            item_id: format!("line-{product}"),
            product_id: ProductId(product.to_owned()),
            name: product.to_owned(),
            description: String::new(),
            quantity,
            unit_price_display: "100.00 RUB".to_owned(),
            line_total_display: "100.00 RUB".to_owned(),
        }
    }

    #[test]
    fn quantity_of_sums_matching_lines() {
        let cart = Cart {
            items: vec![line("margherita", 2), line("pepperoni", 1), line("margherita", 1)],
            total: Decimal::new(40_000, 2),
            total_display: "400.00 RUB".to_owned(),
        };

        assert_eq!(cart.quantity_of(&ProductId("margherita".to_owned())), 3);
        assert_eq!(cart.quantity_of(&ProductId("hawaiian".to_owned())), 0);
    }
}
