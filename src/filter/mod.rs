//! Filters and the chain that runs them.
//!
//! A [`Filter`] sees every request on its route before the upstream step and
//! every outcome after it. Inside [`Filter::apply`] a filter may:
//!
//! - inspect the request and call `next.run(exchange)` to continue,
//! - return [`Exchange::short_circuit`] without calling `next` to end the
//!   request itself (authorization failures do this),
//! - await `next.run(exchange)` and then observe the outcome (post-phase).
//!
//! ```rust
//! use turnstile::filter::{BoxFuture, Completion, Filter, Next};
//! use turnstile::{Exchange, FilterError};
//!
//! struct Timing;
//!
//! impl Filter for Timing {
//!     fn name(&self) -> &'static str { "timing" }
//!
//!     fn apply<'a>(
//!         &'a self,
//!         exchange: &'a mut Exchange,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Result<Completion, FilterError>> {
//!         Box::pin(async move {
//!             let start = std::time::Instant::now();
//!             let completion = next.run(exchange).await;
//!             tracing::info!(elapsed = ?start.elapsed(), %completion, "timing");
//!             Ok(completion)
//!         })
//!     }
//! }
//! ```
//!
//! Pre-phases run in ascending [`Filter::order`]; post-phases unwind in the
//! reverse order, like nested scopes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::FilterError;
use crate::exchange::Exchange;

mod authorization;
mod chain;
mod observability;

pub use authorization::{AuthorizationFilter, Rejection, TokenVerifier};
pub use chain::{FilterChain, FilterChainBuilder, Next};
pub use observability::{ObservabilityConfig, ObservabilityFilter};

/// A heap-allocated, type-erased future. Filters return one from
/// [`Filter::apply`] so chains of different filters share one call shape.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A filter shared by every request on the routes that use it.
pub type BoxedFilter = Arc<dyn Filter>;

/// Precedence values. Lower runs earlier in the pre-phase.
pub mod order {
    /// Runs first among pre-phase filters and unwinds last.
    pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;
    /// Runs last among pre-phase filters and unwinds first.
    pub const LOWEST_PRECEDENCE: i32 = i32::MAX;
    pub const DEFAULT: i32 = 0;
}

/// How a request left the chain.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Completion {
    /// The upstream step ran and its response was committed.
    Forwarded,
    /// A filter completed the response without reaching the upstream step.
    ShortCircuited,
    /// The client went away before the upstream step finished.
    Cancelled,
}

impl Completion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forwarded      => "forwarded",
            Self::ShortCircuited => "short_circuited",
            Self::Cancelled      => "cancelled",
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of pre/post request processing.
///
/// Filters are immutable once built; per-request state lives in the
/// [`Exchange`]. Returning `Err` before the response is committed turns the
/// request into a `500`; returning it afterwards is logged and ignored.
pub trait Filter: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Placement within a chain. Lower runs earlier in the pre-phase.
    fn order(&self) -> i32 {
        order::DEFAULT
    }

    /// Runs this filter. `next` continues to the following filter, or to the
    /// upstream step after the last one; it can be run at most once.
    fn apply<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Completion, FilterError>>;
}

/// A filter placed at an explicit precedence without changing its behavior.
pub struct Ordered<F> {
    inner: F,
    order: i32,
}

impl<F: Filter> Ordered<F> {
    pub fn new(inner: F, order: i32) -> Self {
        Self { inner, order }
    }
}

impl<F: Filter> Filter for Ordered<F> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn apply<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Completion, FilterError>> {
        self.inner.apply(exchange, next)
    }
}

/// Adapters available on every [`Filter`].
pub trait FilterExt: Filter + Sized {
    /// Overrides this filter's precedence.
    fn with_order(self, order: i32) -> Ordered<Self> {
        Ordered::new(self, order)
    }

    fn boxed(self) -> BoxedFilter {
        Arc::new(self)
    }
}

impl<F: Filter> FilterExt for F {}
