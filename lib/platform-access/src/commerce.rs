//! Optional shop module.
//!
//! When a shop is active, new accounts become customers, addresses are
//! mirrored into billing and shipping fields, the welcome coupon is applied,
//! and a non-empty cart sends the visitor to checkout.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};

/// Identifier of a visitor's cart, as carried by the cart cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CartId(String);

impl CartId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait Commerce: Send + Sync {
    /// Whether a shop module is installed and enabled.
    fn is_active(&self) -> bool;

    fn checkout_url(&self) -> &str;

    async fn cart_is_empty(&self, cart: Option<&CartId>) -> bool;

    async fn coupon_is_valid(&self, code: &str) -> bool;

    async fn apply_coupon(&self, cart: Option<&CartId>, code: &str) -> StoreResult<()>;
}

/// No shop installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCommerce;

#[async_trait]
impl Commerce for DisabledCommerce {
    fn is_active(&self) -> bool {
        false
    }

    fn checkout_url(&self) -> &str {
        ""
    }

    async fn cart_is_empty(&self, _cart: Option<&CartId>) -> bool {
        true
    }

    async fn coupon_is_valid(&self, _code: &str) -> bool {
        false
    }

    async fn apply_coupon(&self, _cart: Option<&CartId>, code: &str) -> StoreResult<()> {
        Err(StoreError::Commerce {
            details: format!("no shop to apply coupon {code}"),
        }
        .into())
    }
}

/// Shop kept in process memory: carts are lists of item names.
#[derive(Debug, Default)]
pub struct InMemoryCommerce {
    checkout_url: String,
    coupons: HashSet<String>,
    carts: RwLock<HashMap<CartId, Vec<String>>>,
    applied: RwLock<HashMap<CartId, Vec<String>>>,
}

impl InMemoryCommerce {
    #[must_use]
    pub fn new(checkout_url: impl Into<String>) -> Self {
        Self {
            checkout_url: checkout_url.into(),
            ..Self::default()
        }
    }

    /// Registers a coupon code as valid.
    #[must_use]
    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupons.insert(code.into());
        self
    }

    pub fn add_item(&self, cart: &CartId, item: impl Into<String>) {
        self.carts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(cart.clone())
            .or_default()
            .push(item.into());
    }

    /// Coupons applied to `cart` so far.
    #[must_use]
    pub fn applied_coupons(&self, cart: &CartId) -> Vec<String> {
        self.applied
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(cart)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Commerce for InMemoryCommerce {
    fn is_active(&self) -> bool {
        true
    }

    fn checkout_url(&self) -> &str {
        &self.checkout_url
    }

    async fn cart_is_empty(&self, cart: Option<&CartId>) -> bool {
        let Some(cart) = cart else {
            return true;
        };
        self.carts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(cart)
            .is_none_or(Vec::is_empty)
    }

    async fn coupon_is_valid(&self, code: &str) -> bool {
        self.coupons.contains(code)
    }

    async fn apply_coupon(&self, cart: Option<&CartId>, code: &str) -> StoreResult<()> {
        let cart = cart.ok_or_else(|| StoreError::Commerce {
            details: "no cart to apply the coupon to".to_string(),
        })?;
        if !self.coupons.contains(code) {
            return Err(StoreError::Commerce {
                details: format!("unknown coupon {code}"),
            }
            .into());
        }

        let mut applied = self
            .applied
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let codes = applied.entry(cart.clone()).or_default();
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_commerce_is_inert() {
        let shop = DisabledCommerce;
        assert!(!shop.is_active());
        assert!(shop.cart_is_empty(Some(&CartId::new("c1"))).await);
        assert!(!shop.coupon_is_valid("STANNER").await);
    }

    #[tokio::test]
    async fn cart_with_items_is_not_empty() {
        let shop = InMemoryCommerce::new("/checkout");
        let cart = CartId::new("c1");

        assert!(shop.cart_is_empty(Some(&cart)).await);
        shop.add_item(&cart, "mug");
        assert!(!shop.cart_is_empty(Some(&cart)).await);
        assert!(shop.cart_is_empty(None).await);
    }

    #[tokio::test]
    async fn coupon_applies_once() {
        let shop = InMemoryCommerce::new("/checkout").with_coupon("STANNER");
        let cart = CartId::new("c1");

        shop.apply_coupon(Some(&cart), "STANNER").await.unwrap();
        shop.apply_coupon(Some(&cart), "STANNER").await.unwrap();
        assert_eq!(shop.applied_coupons(&cart), vec!["STANNER".to_string()]);
    }

    #[tokio::test]
    async fn unknown_coupon_is_rejected() {
        let shop = InMemoryCommerce::new("/checkout");
        assert!(!shop.coupon_is_valid("STANNER").await);
        assert!(shop.apply_coupon(Some(&CartId::new("c1")), "STANNER").await.is_err());
    }
}
