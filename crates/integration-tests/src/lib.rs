//! Integration tests for the Bazaar storefront.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory backend; no services required
//! cargo test -p bazaar-integration-tests
//!
//! # Against a migrated PostgreSQL database as well
//! STOREFRONT_DATABASE_URL=postgres://localhost/bazaar_test \
//!     cargo test -p bazaar-integration-tests -- --include-ignored
//! ```
//!
//! # Test Categories
//!
//! - `http_storefront` - Full router driven with `tower::ServiceExt::oneshot`
//! - `checkout_concurrency` - Racing checkouts and stock reservations
//! - `review_reconcile` - Verification of reviews written before a purchase
//! - `postgres_stock` - Stock ledger against a real database (ignored by default)

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use tower::ServiceExt;
use tower_sessions::{MemoryStore as SessionMemoryStore, Session};

use bazaar_core::{Email, Price, ProductId, StoreId};
use bazaar_storefront::config::StorefrontConfig;
use bazaar_storefront::db::MemoryStore;
use bazaar_storefront::middleware::{SESSION_COOKIE_NAME, session_layer, set_current_user};
use bazaar_storefront::models::CurrentUser;
use bazaar_storefront::routes;
use bazaar_storefront::services::Notifier;
use bazaar_storefront::state::AppState;

/// Storefront configuration for tests: default tax rate, no SMTP.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig::from_lookup(|key| match key {
        "STOREFRONT_DATABASE_URL" => Some("postgres://localhost/bazaar_test".to_owned()),
        "STOREFRONT_BASE_URL" => Some("http://localhost:3000".to_owned()),
        "STOREFRONT_NOTIFY_TIMEOUT_SECS" => Some("1".to_owned()),
        _ => None,
    })
    .expect("test configuration is valid")
}

/// Default vendor store for fixtures.
pub const STORE: StoreId = StoreId::new(1);

/// Add an active product priced in cents.
pub async fn product(store: &MemoryStore, name: &str, cents: u32, stock: u32) -> ProductId {
    store
        .add_product(STORE, name, Price::from_cents(cents), stock)
        .await
}

/// Register a user and return them as the session would carry them.
pub async fn user(store: &MemoryStore, email: &str) -> CurrentUser {
    let email = Email::parse(email).expect("fixture email is valid");
    let id = store.add_user(email.clone()).await;
    CurrentUser { id, email }
}

/// The storefront router over an in-memory backend and session store.
#[derive(Clone)]
pub struct TestApp {
    pub store: MemoryStore,
    pub sessions: SessionMemoryStore,
    router: Router,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let sessions = SessionMemoryStore::default();
        let state = AppState::new(test_config(), store.clone(), Notifier::Disabled);
        let router = routes::app(state, session_layer(sessions.clone(), false));
        Self {
            store,
            sessions,
            router,
        }
    }

    /// A browser with no cookies yet.
    #[must_use]
    pub const fn browser(&self) -> Browser<'_> {
        Browser {
            app: self,
            cookie: None,
        }
    }

    /// A browser whose session already carries `user`, as the login flow
    /// would leave it.
    pub async fn logged_in(&self, user: &CurrentUser) -> Browser<'_> {
        let session = Session::new(None, Arc::new(self.sessions.clone()), None);
        set_current_user(&session, user)
            .await
            .expect("session insert");
        session.save().await.expect("session save");
        let id = session.id().expect("saved session has an id");
        Browser {
            app: self,
            cookie: Some(format!("{SESSION_COOKIE_NAME}={id}")),
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

/// Sends requests with a session cookie that follows `Set-Cookie`.
pub struct Browser<'a> {
    app: &'a TestApp,
    cookie: Option<String>,
}

impl Browser<'_> {
    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        let request = self.request("GET", uri).body(Body::empty()).expect("request");
        self.send(request).await
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub async fn post_form(&mut self, uri: &str, body: &str) -> Response<Body> {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .expect("request");
        self.send(request).await
    }

    /// POST a form the way a page script does, with `X-Requested-With`.
    pub async fn post_ajax_form(&mut self, uri: &str, body: &str) -> Response<Body> {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-requested-with", "XMLHttpRequest")
            .body(Body::from(body.to_owned()))
            .expect("request");
        self.send(request).await
    }

    pub async fn post_json(&mut self, uri: &str, body: &serde_json::Value) -> Response<Body> {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.send(request).await
    }

    fn request(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn send(&mut self, request: Request<Body>) -> Response<Body> {
        let response = self.app.send(request).await;
        if let Some(cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
        {
            self.cookie = Some(cookie.to_owned());
        }
        response
    }
}

/// `Location` header of a redirect.
#[must_use]
pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("redirect has a Location header")
}

/// Read a response body as JSON.
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// Read a response body as text.
pub async fn text_body(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("UTF-8 body")
}

/// Flash message texts from a page payload.
#[must_use]
pub fn messages(page: &serde_json::Value) -> Vec<String> {
    page["messages"]
        .as_array()
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m["text"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}
