//! Process-wide mutable state behind the resolvers.
//!
//! The product id counter and the authentication flag are shared by every
//! request. There is a single logical writer, so plain atomics are enough;
//! no ordering between concurrent requests is promised.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use cache_probe_core::{Product, ProductId, User};

/// First id handed out by [`ServerContext::fetch_products`].
pub const FIRST_PRODUCT_ID: i32 = 1;

/// Owner of the id counter and the authentication flag.
#[derive(Debug)]
pub struct ServerContext {
    next_product_id: AtomicI32,
    authenticated: AtomicBool,
    user: User,
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerContext {
    /// Fresh state: counter at 1, unauthenticated.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_product_id: AtomicI32::new(FIRST_PRODUCT_ID),
            authenticated: AtomicBool::new(false),
            user: User::fixed(),
        }
    }

    /// Returns a one-element product list carrying the current counter value,
    /// then advances the counter.
    ///
    /// Every call is an id-generation step: repeated reads return different data.
    pub fn fetch_products(&self) -> Vec<Product> {
        let id = self.next_product_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(product_id = id, "Issued product id");
        vec![Product::new(ProductId::new(id))]
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn login(&self) {
        self.authenticated.store(true, Ordering::SeqCst);
        tracing::info!("Session authenticated");
    }

    pub fn logout(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
        tracing::info!("Session logged out");
    }

    /// The fixed user, only while authenticated.
    #[must_use]
    pub fn authenticated_user(&self) -> Option<&User> {
        self.is_authenticated().then_some(&self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_products_is_monotonic_from_one() {
        let ctx = ServerContext::new();
        let ids: Vec<i32> = (0..3)
            .flat_map(|_| ctx.fetch_products())
            .map(|p| p.id.as_i32())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_fetch_products_returns_single_element() {
        let ctx = ServerContext::new();
        assert_eq!(ctx.fetch_products().len(), 1);
    }

    #[test]
    fn test_auth_toggling() {
        let ctx = ServerContext::new();
        assert!(ctx.authenticated_user().is_none());

        ctx.login();
        assert_eq!(ctx.authenticated_user(), Some(&User::fixed()));

        ctx.logout();
        assert!(ctx.authenticated_user().is_none());
    }

    #[test]
    fn test_login_is_idempotent() {
        let ctx = ServerContext::new();
        ctx.login();
        ctx.login();
        assert!(ctx.is_authenticated());
    }
}
