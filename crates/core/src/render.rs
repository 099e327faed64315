use rust_decimal::Decimal;

use crate::domain::cart::Cart;
use crate::domain::location::StoreLocation;
use crate::domain::product::Product;
use crate::domain::session::CartSnapshot;
use crate::flows::states::tokens;
use crate::geo::{DeliveryTier, FeeSchedule};
use crate::outbound::{InlineKeyboard, KeyboardButton};
use crate::pagination::{self, PageWindow};

pub const MENU_PROMPT: &str = "Please choose a product:";

fn money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {currency}", amount.round_dp(2))
}

#[derive(Clone, Debug, PartialEq)]
pub struct MenuView {
    pub text: String,
    pub keyboard: InlineKeyboard,
    pub window: PageWindow,
}

/// Menu page over a fresh product list. Paging arrows appear only when
/// there is more than one page; the cart button is always present, so an
/// empty catalog still renders a usable menu.
pub fn menu_view(products: &[Product], requested_page: i64, page_size: usize) -> MenuView {
    let window = pagination::window(products.len(), page_size, requested_page);

    let mut keyboard = InlineKeyboard::new();
    for product in &products[window.range()] {
        keyboard = keyboard
            .button(&product.name, format!("{}{}", tokens::PRODUCT_PREFIX, product.id.0));
    }
    if window.total_pages > 1 {
        keyboard = keyboard.row(vec![
            KeyboardButton::new("<", tokens::NAV_BACK),
            KeyboardButton::new(">", tokens::NAV_FORWARD),
        ]);
    }
    keyboard = keyboard.button("Cart", tokens::OPEN_CART);

    MenuView { text: MENU_PROMPT.to_owned(), keyboard, window }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescriptionView {
    pub caption: String,
    pub keyboard: InlineKeyboard,
}

pub fn description_view(product: &Product, quantity_in_cart: u32, currency: &str) -> DescriptionView {
    let mut caption = format!(
        "{}\n\nPrice: {}\n\n{}",
        product.name,
        money(product.unit_price, currency),
        product.description
    );
    if let Some(stock) = product.stock {
        caption.push_str(&format!("\nIn stock: {stock}"));
    }
    if quantity_in_cart > 0 {
        let line_total = product.unit_price * Decimal::from(quantity_in_cart);
        caption.push_str(&format!(
            "\n\nIn your cart: {quantity_in_cart} (subtotal {})",
            money(line_total, currency)
        ));
    }

    let keyboard = InlineKeyboard::new()
        .button("Add to cart", tokens::ADD_TO_CART)
        .button("Cart", tokens::OPEN_CART)
        .button("Back", tokens::BACK_TO_MENU);

    DescriptionView { caption, keyboard }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CartView {
    pub text: String,
    pub keyboard: InlineKeyboard,
    /// Structured total captured at render time; the only amount the
    /// invoice is ever built from.
    pub snapshot: CartSnapshot,
}

pub fn cart_view(cart: &Cart) -> CartView {
    let mut keyboard = InlineKeyboard::new();
    let text = if cart.is_empty() {
        "Your cart is empty".to_owned()
    } else {
        let mut lines = Vec::with_capacity(cart.items.len() + 1);
        for item in &cart.items {
            lines.push(format!(
                "{}\n{}\n{} each, {} x {} = {}",
                item.name,
                item.description,
                item.unit_price_display,
                item.quantity,
                item.unit_price_display,
                item.line_total_display
            ));
            keyboard = keyboard.button(
                format!("Remove {}", item.name),
                format!("{}{}", tokens::REMOVE_PREFIX, item.item_id),
            );
        }
        lines.push(format!("Total: {}", cart.total_display));
        lines.join("\n\n")
    };

    keyboard = keyboard.button("Back to menu", tokens::BACK_TO_MENU);
    if !cart.is_empty() {
        keyboard = keyboard.button("Checkout", tokens::CHECKOUT);
    }

    let snapshot = CartSnapshot { total: cart.total, summary: text.clone() };
    CartView { text, keyboard, snapshot }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TierView {
    pub text: String,
    pub keyboard: InlineKeyboard,
}

/// Delivery/pickup offer for a resolved address. Out-of-range distances
/// drop the Delivery button entirely; Pickup is always available.
pub fn tier_view(
    tier: DeliveryTier,
    distance_km: f64,
    store: &StoreLocation,
    fees: &FeeSchedule,
    currency: &str,
) -> TierView {
    let text = match tier {
        DeliveryTier::Doorstep => format!(
            "There is a store only {:.0} m away from you, at {}. \
             We can also deliver for free.",
            distance_km * 1000.0,
            store.address
        ),
        DeliveryTier::Near => format!(
            "The nearest store is at {}. Delivery will cost {}. \
             Delivery or pickup?",
            store.address,
            money(fees.near, currency)
        ),
        DeliveryTier::Far => format!(
            "You are {distance_km:.1} km away, so delivery will cost {}. \
             Delivery or pickup?",
            money(fees.far, currency)
        ),
        DeliveryTier::OutOfRange => format!(
            "Unfortunately we do not deliver that far: the nearest store is \
             {distance_km:.1} km away. You can still pick your order up at {}.",
            store.address
        ),
    };

    let mut keyboard = InlineKeyboard::new();
    if tier.delivery_offered() {
        keyboard = keyboard.button("Delivery", tokens::DELIVERY);
    }
    keyboard = keyboard.button("Pickup", tokens::PICKUP);

    TierView { text, keyboard }
}

pub fn payment_keyboard() -> InlineKeyboard {
    InlineKeyboard::new().button("Cash", tokens::PAY_CASH).button("Card", tokens::PAY_CARD)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{cart_view, description_view, menu_view, tier_view};
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::location::{StoreId, StoreLocation};
    use crate::domain::product::{ImageRef, Product, ProductId};
    use crate::flows::states::tokens;
    use crate::geo::{DeliveryTier, FeeSchedule};

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: ProductId(id.to_owned()),
            name: name.to_owned(),
            description: format!("{name} description"),
            unit_price: Decimal::new(45_000, 2),
            image: Some(ImageRef(format!("img-{id}"))),
            stock: Some(12),
        }
    }

    fn fees() -> FeeSchedule {
        FeeSchedule { near: Decimal::new(100, 0), far: Decimal::new(300, 0) }
    }

    fn store() -> StoreLocation {
        StoreLocation {
            id: StoreId("s-1".to_owned()),
            latitude: 55.75,
            longitude: 37.61,
            address: "1 Main street".to_owned(),
            courier_id: Some("900100".to_owned()),
        }
    }

    #[test]
    fn menu_shows_arrows_only_with_multiple_pages() {
        let products: Vec<Product> =
            (0..7).map(|i| product(&format!("p{i}"), &format!("Pizza {i}"))).collect();

        let paged = menu_view(&products, 0, 6);
        assert!(paged
            .keyboard
            .rows
            .iter()
            .any(|row| row.iter().any(|b| b.token == tokens::NAV_FORWARD)));

        let single = menu_view(&products[..3], 0, 6);
        assert!(!single
            .keyboard
            .rows
            .iter()
            .any(|row| row.iter().any(|b| b.token == tokens::NAV_FORWARD)));
    }

    #[test]
    fn empty_catalog_renders_cart_only_menu() {
        let view = menu_view(&[], 0, 6);
        assert_eq!(view.window.total_pages, 0);
        assert_eq!(view.keyboard.rows.len(), 1);
        assert_eq!(view.keyboard.rows[0][0].token, tokens::OPEN_CART);
    }

    #[test]
    fn description_mentions_cart_quantity_only_when_present() {
        let item = product("p1", "Pepperoni");

        let absent = description_view(&item, 0, "RUB");
        assert!(!absent.caption.contains("In your cart"));

        let present = description_view(&item, 2, "RUB");
        assert!(present.caption.contains("In your cart: 2"));
        assert!(present.caption.contains("900.00 RUB"));
    }

    #[test]
    fn cart_view_snapshot_matches_the_rendered_total() {
        let cart = Cart {
            items: vec![CartItem {
                item_id: "line-1".to_owned(),
                product_id: ProductId("p1".to_owned()),
                name: "Pepperoni".to_owned(),
                description: "Spicy".to_owned(),
                quantity: 2,
                unit_price_display: "450.00 RUB".to_owned(),
                line_total_display: "900.00 RUB".to_owned(),
            }],
            total: Decimal::new(90_000, 2),
            total_display: "900.00 RUB".to_owned(),
        };

        let view = cart_view(&cart);
        assert_eq!(view.snapshot.total, Decimal::new(90_000, 2));
        assert_eq!(view.snapshot.summary, view.text);
        assert!(view.text.contains("Total: 900.00 RUB"));
        assert!(view
            .keyboard
            .rows
            .iter()
            .any(|row| row.iter().any(|b| b.token == tokens::CHECKOUT)));
    }

    #[test]
    fn empty_cart_offers_no_checkout() {
        let view = cart_view(&Cart::default());
        assert_eq!(view.text, "Your cart is empty");
        assert!(!view
            .keyboard
            .rows
            .iter()
            .any(|row| row.iter().any(|b| b.token == tokens::CHECKOUT)));
    }

    #[test]
    fn out_of_range_offer_drops_the_delivery_button() {
        let view = tier_view(DeliveryTier::OutOfRange, 25.0, &store(), &fees(), "RUB");
        let buttons: Vec<&str> =
            view.keyboard.rows.iter().flat_map(|row| row.iter().map(|b| b.token.as_str())).collect();
        assert_eq!(buttons, vec![tokens::PICKUP]);
        assert!(view.text.contains("do not deliver"));
    }

    #[test]
    fn near_tier_offer_names_the_low_fee_and_both_options() {
        let view = tier_view(DeliveryTier::Near, 0.6, &store(), &fees(), "RUB");
        let buttons: Vec<&str> =
            view.keyboard.rows.iter().flat_map(|row| row.iter().map(|b| b.token.as_str())).collect();
        assert_eq!(buttons, vec![tokens::DELIVERY, tokens::PICKUP]);
        assert!(view.text.contains("100.00 RUB"));
    }
}
