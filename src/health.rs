//! Built-in health probes for the gateway process itself.
//!
//! | Probe | Typical path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Should traffic be routed here? |
//!
//! They are ordinary upstream steps, so they can terminate a route with no
//! filters (probes are usually unauthenticated):
//!
//! ```rust,no_run
//! use turnstile::{FilterChain, Route, Router, health};
//!
//! let router = Router::new()
//!     .route("/healthz", Route::new("liveness", "local", FilterChain::builder(health::liveness).build()))
//!     .route("/readyz", Route::new("readiness", "local", FilterChain::builder(health::readiness).build()));
//! ```

use crate::{Request, Response};

/// Always `200 OK` with body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"`. Replace with your own upstream step to gate
/// on dependency health.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
