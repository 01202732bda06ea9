//! Cart lines and derived totals.
//!
//! The cart is an ordered list with at most one line per product. Totals are
//! never stored; they are re-derived from the current lines every time with
//! [`CartTotals::compute`].

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::{Coupon, DiscountType, ProductId, ProductSummary};

/// Orders with a subtotal at or above this ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

/// Flat shipping fee below the free-shipping threshold.
pub const FLAT_SHIPPING: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// Sales tax applied to the discounted subtotal (8%).
pub const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

/// How long a removed line can be restored.
pub const UNDO_WINDOW: Duration = Duration::milliseconds(5200);

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub product: ProductSummary,
    pub quantity: u32,
}

impl CartItem {
    #[must_use]
    pub const fn new(product: ProductSummary, quantity: u32) -> Self {
        Self { product, quantity }
    }

    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product.id
    }

    /// `price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// A line removed from the cart, kept for undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedItem {
    pub item: CartItem,
    pub removed_at: DateTime<Utc>,
}

impl RemovedItem {
    #[must_use]
    pub const fn new(item: CartItem, removed_at: DateTime<Utc>) -> Self {
        Self { item, removed_at }
    }

    /// Whether the removal can still be undone at `now`.
    #[must_use]
    pub fn is_restorable(&self, now: DateTime<Utc>) -> bool {
        now >= self.removed_at && now - self.removed_at <= UNDO_WINDOW
    }
}

/// Ordered cart lines, one per product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from lines, folding duplicate products into the first line.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            let qty = item.quantity;
            cart.add(item.product, qty);
        }
        cart
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id() == product_id)
    }

    /// Quantity currently held for `product_id` (0 when absent).
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.get(product_id).map_or(0, |i| i.quantity)
    }

    /// Increment an existing line, or append a new one.
    ///
    /// A zero `qty` is ignored.
    pub fn add(&mut self, product: ProductSummary, qty: u32) {
        if qty == 0 {
            return;
        }
        if let Some(line) = self.items.iter_mut().find(|i| i.product.id == product.id) {
            line.quantity = line.quantity.saturating_add(qty);
        } else {
            self.items.push(CartItem::new(product, qty));
        }
    }

    /// Remove the line for `product_id`, returning it.
    pub fn remove(&mut self, product_id: ProductId) -> Option<CartItem> {
        let pos = self.items.iter().position(|i| i.product_id() == product_id)?;
        Some(self.items.remove(pos))
    }

    /// Set a line's quantity. Zero or negative removes the line.
    ///
    /// Returns `false` when the product is not in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, qty: i64) -> bool {
        if qty <= 0 {
            return self.remove(product_id).is_some();
        }
        let qty = u32::try_from(qty).unwrap_or(u32::MAX);
        match self.items.iter_mut().find(|i| i.product_id() == product_id) {
            Some(line) => {
                line.quantity = qty;
                true
            }
            None => false,
        }
    }

    /// Quantities to write back when merging this (guest) cart into a remote one.
    ///
    /// Each guest line yields `guest + remote`; a product missing remotely
    /// counts as zero. Remote-only lines are not included since they are
    /// already stored.
    #[must_use]
    pub fn merge_quantities(
        &self,
        remote: impl IntoIterator<Item = (ProductId, u32)>,
    ) -> Vec<(ProductId, u32)> {
        let remote: Vec<(ProductId, u32)> = remote.into_iter().collect();
        self.items
            .iter()
            .map(|line| {
                let existing = remote
                    .iter()
                    .find(|(id, _)| *id == line.product_id())
                    .map_or(0, |(_, q)| *q);
                (line.product_id(), line.quantity.saturating_add(existing))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(CartItem::product_id).collect()
    }
}

impl From<Vec<CartItem>> for Cart {
    fn from(items: Vec<CartItem>) -> Self {
        Self::from_items(items)
    }
}

/// Derived cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub total_items: u32,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl CartTotals {
    /// Compute totals for `items` with an optional active coupon.
    ///
    /// Each component is rounded to cents before it feeds the next one, so
    /// `total == subtotal - discount + shipping + tax` holds exactly.
    #[must_use]
    pub fn compute(items: &[CartItem], coupon: Option<&Coupon>) -> Self {
        let subtotal = cents(items.iter().map(CartItem::line_total).sum());
        let total_items = items.iter().map(|i| i.quantity).sum();

        let discount = coupon.map_or(Decimal::ZERO, |c| match c.discount_type {
            DiscountType::Percentage => subtotal * c.value / Decimal::ONE_HUNDRED,
            DiscountType::Fixed => c.value,
        });
        let discount = cents(discount.clamp(Decimal::ZERO, subtotal));

        let shipping = if subtotal > Decimal::ZERO && subtotal < FREE_SHIPPING_THRESHOLD {
            FLAT_SHIPPING
        } else {
            Decimal::ZERO
        };

        let tax = cents((subtotal - discount) * TAX_RATE);
        let total = (subtotal - discount + shipping + tax).max(Decimal::ZERO);

        Self {
            subtotal,
            total_items,
            discount,
            shipping,
            tax,
            total,
        }
    }

    /// Totals for a [`Cart`].
    #[must_use]
    pub fn for_cart(cart: &Cart, coupon: Option<&Coupon>) -> Self {
        Self::compute(cart.items(), coupon)
    }
}

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::UserId;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn product(id: i64, price: &str) -> ProductSummary {
        ProductSummary {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            price: dec(price),
            image: format!("https://picsum.photos/seed/{id}/600/600"),
            stock: 10,
            seller_id: UserId::new(uuid::Uuid::nil()),
        }
    }

    fn coupon(kind: DiscountType, value: &str) -> Coupon {
        Coupon {
            code: "SAVE".to_owned(),
            discount_type: kind,
            value: dec(value),
        }
    }

    #[test]
    fn test_add_increments_existing_line() {
        let mut cart = Cart::new();
        cart.add(product(1, "5.00"), 1);
        cart.add(product(2, "3.00"), 2);
        cart.add(product(1, "5.00"), 1);

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.quantity_of(ProductId::new(1)), 2);
        assert_eq!(cart.total_items(), 4);
        assert_eq!(cart.product_ids(), vec![ProductId::new(1), ProductId::new(2)]);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::new();
        cart.add(product(1, "5.00"), 3);
        assert!(cart.set_quantity(ProductId::new(1), 5));
        assert_eq!(cart.quantity_of(ProductId::new(1)), 5);

        assert!(cart.set_quantity(ProductId::new(1), -1));
        assert!(cart.is_empty());
        assert!(!cart.set_quantity(ProductId::new(9), 2));
    }

    #[test]
    fn test_merge_quantities_adds_remote() {
        let mut guest = Cart::new();
        guest.add(product(1, "5.00"), 2);
        guest.add(product(2, "5.00"), 1);

        let merged = guest.merge_quantities([(ProductId::new(1), 3), (ProductId::new(7), 4)]);
        assert_eq!(
            merged,
            vec![(ProductId::new(1), 5), (ProductId::new(2), 1)]
        );
    }

    #[test]
    fn test_from_items_folds_duplicates() {
        let cart = Cart::from_items([
            CartItem::new(product(1, "1.00"), 1),
            CartItem::new(product(1, "1.00"), 2),
        ]);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_items(), 3);
    }

    #[test]
    fn test_undo_window() {
        let now = Utc::now();
        let removed = RemovedItem::new(CartItem::new(product(1, "1.00"), 1), now);
        assert!(removed.is_restorable(now + Duration::milliseconds(5000)));
        assert!(removed.is_restorable(now + Duration::milliseconds(5200)));
        assert!(!removed.is_restorable(now + Duration::milliseconds(5201)));
    }

    #[test]
    fn test_totals_empty_cart_is_all_zero() {
        let totals = CartTotals::compute(&[], Some(&coupon(DiscountType::Fixed, "20")));
        assert_eq!(totals, CartTotals::default());
    }

    #[test]
    fn test_totals_without_coupon() {
        let items = vec![
            CartItem::new(product(1, "19.99"), 2),
            CartItem::new(product(2, "5.50"), 1),
        ];
        let totals = CartTotals::compute(&items, None);
        assert_eq!(totals.subtotal, dec("45.48"));
        assert_eq!(totals.total_items, 3);
        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.shipping, dec("10"));
        assert_eq!(totals.tax, dec("3.64"));
        assert_eq!(totals.total, dec("59.12"));
    }

    #[test]
    fn test_totals_percentage_coupon() {
        let items = vec![CartItem::new(product(1, "100.00"), 2)];
        let totals = CartTotals::compute(&items, Some(&coupon(DiscountType::Percentage, "15")));
        assert_eq!(totals.discount, dec("30.00"));
        assert_eq!(totals.tax, dec("13.60"));
        assert_eq!(totals.total, dec("193.60"));
    }

    #[test]
    fn test_totals_fixed_coupon_clamped_to_subtotal() {
        let items = vec![CartItem::new(product(1, "12.00"), 1)];
        let totals = CartTotals::compute(&items, Some(&coupon(DiscountType::Fixed, "50")));
        assert_eq!(totals.discount, dec("12.00"));
        assert_eq!(totals.tax, Decimal::ZERO);
        assert_eq!(totals.shipping, dec("10"));
        assert_eq!(totals.total, dec("10.00"));
    }

    #[test]
    fn test_free_shipping_at_threshold() {
        let at = vec![CartItem::new(product(1, "250.00"), 2)];
        assert_eq!(CartTotals::compute(&at, None).shipping, Decimal::ZERO);

        let below = vec![CartItem::new(product(1, "499.99"), 1)];
        assert_eq!(CartTotals::compute(&below, None).shipping, dec("10"));
    }

    #[test]
    fn test_discount_does_not_change_free_shipping() {
        // Threshold applies to the pre-discount subtotal.
        let items = vec![CartItem::new(product(1, "600.00"), 1)];
        let totals = CartTotals::compute(&items, Some(&coupon(DiscountType::Fixed, "200")));
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, dec("432.00"));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        let items = vec![CartItem::new(product(1, "0.0625"), 1)];
        let totals = CartTotals::compute(&items, None);
        assert_eq!(totals.subtotal, dec("0.06"));

        let items = vec![CartItem::new(product(1, "1.25"), 5)];
        let totals = CartTotals::compute(&items, None);
        // 6.25 * 0.08 = 0.50
        assert_eq!(totals.tax, dec("0.50"));
        let items = vec![CartItem::new(product(1, "0.3125"), 2)];
        let totals = CartTotals::compute(&items, None);
        // 0.63 (0.625 rounded up) * 0.08 = 0.0504 -> 0.05
        assert_eq!(totals.subtotal, dec("0.63"));
        assert_eq!(totals.tax, dec("0.05"));
    }

    #[test]
    fn test_cart_serde_is_plain_list() {
        let mut cart = Cart::new();
        cart.add(product(3, "2.00"), 1);
        let json = serde_json::to_value(&cart).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["id"], 3);
        assert_eq!(json[0]["quantity"], 1);
        assert_eq!(json[0]["sellerId"], "00000000-0000-0000-0000-000000000000");
    }
}
