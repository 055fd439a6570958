//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. Request ID (set `x-request-id` if absent, echo it on the response)
//! 3. `TraceLayer` (one span per request, carrying the request ID)
//! 4. Request ID Sentry tag
//! 5. Session layer (tower-sessions)

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, set_current_user};
pub use request_id::{REQUEST_ID_HEADER, make_request_span, tag_request_id};
pub use session::{SESSION_COOKIE_NAME, create_session_layer, session_layer};
