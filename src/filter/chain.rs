//! Ordered filter chain and its index-driven dispatcher.
//!
//! A [`FilterChain`] is an arena of filters sorted by precedence plus one
//! upstream step. It owns no exchange: every request enters it through
//! [`FilterChain::execute`] with its own [`Exchange`].
//!
//! ```text
//! execute(exchange)
//!   └─ Next{0}.run ─ filters[0].apply(exchange, Next{1})
//!                      └─ Next{1}.run ─ filters[1].apply(exchange, Next{2})
//!                                         └─ Next{N}.run ─ upstream.call(request)
//! ```
//!
//! Each `Next` is consumed by `run`, so no stage can be entered twice for one
//! request. A filter that returns without running its `Next` stops the
//! descent; filters above it still unwind through their post-phase.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, warn};

use super::{BoxedFilter, Completion, Filter};
use crate::error::FilterError;
use crate::exchange::{COMMITTED_WRITE, Exchange};
use crate::upstream::{BoxedUpstream, Upstream};

pub struct FilterChain {
    filters: Vec<BoxedFilter>,
    upstream: BoxedUpstream,
}

impl FilterChain {
    /// Builds a chain from filters in declaration order.
    ///
    /// Filters are stably sorted by [`Filter::order`]: equal precedences keep
    /// their declaration order.
    pub fn new(filters: impl IntoIterator<Item = BoxedFilter>, upstream: BoxedUpstream) -> Self {
        let mut filters: Vec<BoxedFilter> = filters.into_iter().collect();
        filters.sort_by_key(|f| f.order());
        Self { filters, upstream }
    }

    pub fn builder(upstream: impl Upstream) -> FilterChainBuilder {
        FilterChainBuilder {
            filters: Vec::new(),
            upstream: upstream.into_boxed_upstream(),
        }
    }

    /// Filter names in execution order.
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Threads `exchange` through every filter and the upstream step.
    ///
    /// On return the exchange is committed.
    pub async fn execute(&self, exchange: &mut Exchange) -> Completion {
        self.execute_until(exchange, &CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), but abandons the upstream step once
    /// `cancel` fires. Post-phases still unwind and observe
    /// [`Completion::Cancelled`].
    pub async fn execute_until(
        &self,
        exchange: &mut Exchange,
        cancel: &CancellationToken,
    ) -> Completion {
        let span = debug_span!("chain", request_id = %exchange.request_id(), path = %exchange.path());
        let next = Next { chain: self, index: 0, cancel };
        let completion = next.run(exchange).instrument(span).await;
        exchange.complete();
        completion
    }
}

/// Builder for a [`FilterChain`]. Filters may be added in any order.
pub struct FilterChainBuilder {
    filters: Vec<BoxedFilter>,
    upstream: BoxedUpstream,
}

impl FilterChainBuilder {
    pub fn filter(mut self, filter: impl Filter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Adds a filter that is shared with other chains.
    pub fn shared(mut self, filter: BoxedFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn build(self) -> FilterChain {
        FilterChain::new(self.filters, self.upstream)
    }
}

/// The rest of the chain, as seen from inside a filter.
pub struct Next<'a> {
    chain: &'a FilterChain,
    index: usize,
    cancel: &'a CancellationToken,
}

impl Next<'_> {
    /// Runs the next filter, or the upstream step after the last filter.
    ///
    /// Never fails: faults and panics from later filters are resolved into
    /// the exchange before this returns. A write to a committed exchange is
    /// the one panic that keeps unwinding.
    pub async fn run(self, exchange: &mut Exchange) -> Completion {
        let Some(filter) = self.chain.filters.get(self.index) else {
            return self.forward(exchange).await;
        };

        let next = Next {
            chain: self.chain,
            index: self.index + 1,
            cancel: self.cancel,
        };
        let result = AssertUnwindSafe(filter.apply(exchange, next))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(completion)) => completion,
            Ok(Err(err)) => recover(filter.name(), err, exchange),
            Err(payload) => {
                if panic_message(&*payload).contains(COMMITTED_WRITE) {
                    panic::resume_unwind(payload);
                }
                let err = FilterError::new(format!("panicked: {}", panic_message(&*payload)));
                recover(filter.name(), err, exchange)
            }
        }
    }

    async fn forward(self, exchange: &mut Exchange) -> Completion {
        if exchange.is_committed() {
            // A filter completed the response and still continued the chain.
            warn!(request_id = %exchange.request_id(), "response already committed, upstream skipped");
            return exchange.outcome().unwrap_or(Completion::ShortCircuited);
        }

        let call = AssertUnwindSafe(self.chain.upstream.call(exchange.request().clone()))
            .catch_unwind();
        tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                debug!(request_id = %exchange.request_id(), "client gone, upstream abandoned");
                exchange.cancel();
                Completion::Cancelled
            }

            response = call => match response {
                Ok(response) => {
                    exchange.commit(response);
                    Completion::Forwarded
                }
                Err(payload) => {
                    error!(request_id = %exchange.request_id(), panic = panic_message(&*payload), "upstream panicked");
                    exchange.short_circuit(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Resolves a filter fault into the exchange.
fn recover(filter: &'static str, err: FilterError, exchange: &mut Exchange) -> Completion {
    if exchange.is_committed() {
        warn!(request_id = %exchange.request_id(), filter, error = %err, "filter fault after response committed");
        return exchange.outcome().unwrap_or(Completion::ShortCircuited);
    }

    error!(request_id = %exchange.request_id(), filter, error = %err, "filter fault");
    exchange.short_circuit(err.status())
}
