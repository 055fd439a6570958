//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::{Backend, PgStore};
use crate::services::email::EmailService;
use crate::services::{CheckoutService, Notifier, OrderService, ReviewService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store and configuration. Generic over the
/// store so the router can run against the in-memory backend in tests.
pub struct AppState<S = PgStore> {
    inner: Arc<AppStateInner<S>>,
}

struct AppStateInner<S> {
    config: StorefrontConfig,
    store: S,
    notifier: Notifier,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Backend> AppState<S> {
    /// Create application state with the given notifier.
    #[must_use]
    pub fn new(config: StorefrontConfig, store: S, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                notifier,
            }),
        }
    }

    /// Create application state, enabling email when SMTP is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay cannot be configured.
    pub fn from_config(
        config: StorefrontConfig,
        store: S,
    ) -> Result<Self, lettre::transport::smtp::Error> {
        let notifier = match &config.email {
            Some(email) => Notifier::Email(EmailService::new(email, &config.base_url)?),
            None => {
                tracing::warn!("SMTP not configured; order emails are disabled");
                Notifier::Disabled
            }
        };
        Ok(Self::new(config, store, notifier))
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the persistence backend.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Get a reference to the customer notifier.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Checkout bound to this state's store, notifier and tax rate.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_, S, Notifier> {
        let config = self.config();
        CheckoutService::new(
            self.store(),
            self.notifier(),
            config.tax_rate,
            config.notify_timeout,
        )
    }

    /// Order status service bound to this state.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_, S, Notifier> {
        OrderService::new(self.store(), self.notifier(), self.config().notify_timeout)
    }

    /// Review service bound to this state's store.
    #[must_use]
    pub fn reviews(&self) -> ReviewService<'_, S> {
        ReviewService::new(self.store())
    }
}
