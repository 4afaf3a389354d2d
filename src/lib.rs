//! # turnstile
//!
//! The request-interception core of an API gateway: every request on a route
//! passes through an ordered chain of filters before it is forwarded
//! upstream, and back out through the same filters in reverse.
//!
//! ## The contract
//!
//! turnstile owns the part between "a route matched" and "forward it":
//!
//! - [`FilterChain`]: filters sorted by precedence, one upstream step,
//!   exactly one outcome per request (forwarded, short-circuited or cancelled)
//! - [`AuthorizationFilter`]: `Authorization: Bearer <jwt>` verified against
//!   a shared HMAC secret; anything else is `401`
//! - [`ObservabilityFilter`]: configurable pre/post request records
//!
//! Service discovery, TLS, load balancing, retries and the forwarding client
//! belong to the collaborators around it. Forwarding plugs in as an
//! [`Upstream`]: any `async fn(Request) -> impl IntoResponse`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use turnstile::{AuthorizationFilter, FilterChain, ObservabilityConfig, ObservabilityFilter};
//! use turnstile::{Request, Response, Route, Router, Server, TokenVerifier};
//! use turnstile::filter::order;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turnstile::Error> {
//!     let verifier = TokenVerifier::new("s3cr3t");
//!     let chain = FilterChain::builder(forward)
//!         .filter(AuthorizationFilter::new(verifier))
//!         .filter(ObservabilityFilter::new(
//!             ObservabilityConfig { base_message: "orders".into(), pre_logging: true, post_logging: true },
//!             order::LOWEST_PRECEDENCE,
//!         ))
//!         .build();
//!
//!     let router = Router::new().route("/orders/{*rest}", Route::new("orders", "http://orders:8080", chain));
//!     Server::bind("0.0.0.0:8000")?.serve(router).await
//! }
//!
//! async fn forward(req: Request) -> Response {
//!     // hand `req` to the forwarding client
//!     Response::text(format!("forwarded {}", req.path()))
//! }
//! ```

mod error;
mod exchange;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod filter;
pub mod health;
pub mod upstream;

pub use crate::config::GatewayConfig;
pub use error::{Error, FilterError};
pub use exchange::Exchange;
pub use filter::{
    AuthorizationFilter, Completion, Filter, FilterChain, FilterExt, Next, ObservabilityConfig,
    ObservabilityFilter, Rejection, TokenVerifier,
};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Route, Router};
pub use server::{REQUEST_ID_HEADER, Server};
pub use upstream::{BoxedUpstream, Upstream};
