//! Request/response observation.
//!
//! One configurable filter covers every "log around the request" variant a
//! route needs: what it says is data ([`ObservabilityConfig`]), where it sits
//! is its order. Placing it at [`order::LOWEST_PRECEDENCE`](super::order::LOWEST_PRECEDENCE)
//! makes it the innermost filter: last to see the request, first to see the
//! outcome.

use http::StatusCode;
use serde::Deserialize;
use tracing::info;

use super::{BoxFuture, Completion, Filter, Next};
use crate::error::FilterError;
use crate::exchange::Exchange;

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Included in the pre-phase record.
    pub base_message: String,
    pub pre_logging: bool,
    pub post_logging: bool,
}

/// Emits one record before the request continues and one after the chain
/// below it finishes, whatever the outcome. It never changes the outcome.
#[derive(Clone, Debug)]
pub struct ObservabilityFilter {
    config: ObservabilityConfig,
    order: i32,
}

impl ObservabilityFilter {
    pub fn new(config: ObservabilityConfig, order: i32) -> Self {
        Self { config, order }
    }
}

impl Filter for ObservabilityFilter {
    fn name(&self) -> &'static str {
        "observability"
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn apply<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Completion, FilterError>> {
        Box::pin(async move {
            if self.config.pre_logging {
                info!(
                    request_id = %exchange.request_id(),
                    method = %exchange.method(),
                    path = %exchange.path(),
                    "{} pre",
                    self.config.base_message,
                );
            }

            let completion = next.run(exchange).await;

            if self.config.post_logging {
                let code = exchange.status();
                let status = code.as_ref().map_or("none", StatusCode::as_str);
                info!(
                    request_id = %exchange.request_id(),
                    status,
                    %completion,
                    "{} post",
                    self.config.base_message,
                );
            }

            Ok(completion)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::Method;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;
    use crate::filter::{AuthorizationFilter, FilterChain, FilterExt, TokenVerifier, order};
    use crate::request::Request;

    /// Counts records emitted by this module.
    struct Records(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Records {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().target() == "turnstile::filter::observability" {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn from_toml(toml: &str) -> ObservabilityConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    async fn records_for(pre_logging: bool, post_logging: bool) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(Records(Arc::clone(&count)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = ObservabilityConfig { base_message: "edge".into(), pre_logging, post_logging };
        let chain = FilterChain::builder(|_req: Request| async { StatusCode::OK })
            .filter(ObservabilityFilter::new(config, 0))
            .build();
        let mut ex = Exchange::new(Request::new("obs-0", Method::GET, "/"));
        chain.execute(&mut ex).await;

        count.load(Ordering::SeqCst)
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config = from_toml(r#"base_message = "global filter""#);
        assert_eq!(config.base_message, "global filter");
        assert!(!config.pre_logging);
        assert!(!config.post_logging);
    }

    #[tokio::test]
    async fn one_record_per_enabled_hook() {
        assert_eq!(records_for(false, false).await, 0);
        assert_eq!(records_for(true, false).await, 1);
        assert_eq!(records_for(false, true).await, 1);
        assert_eq!(records_for(true, true).await, 2);
    }

    #[tokio::test]
    async fn never_changes_the_outcome() {
        let loud = ObservabilityConfig {
            base_message: "edge".into(),
            pre_logging: true,
            post_logging: true,
        };
        let chain = FilterChain::builder(|_req: Request| async { StatusCode::CREATED })
            .filter(ObservabilityFilter::new(loud.clone(), -1))
            .filter(ObservabilityFilter::new(loud, order::LOWEST_PRECEDENCE))
            .build();

        let mut ex = Exchange::new(Request::new("obs-1", Method::POST, "/orders"));
        assert_eq!(chain.execute(&mut ex).await, Completion::Forwarded);
        assert_eq!(ex.status(), Some(StatusCode::CREATED));
    }

    #[tokio::test]
    async fn post_phase_runs_after_a_short_circuit_below() {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(Records(Arc::clone(&count)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let chain = FilterChain::builder(|_req: Request| async { StatusCode::OK })
            .filter(ObservabilityFilter::new(
                ObservabilityConfig { post_logging: true, ..Default::default() },
                -10,
            ))
            .filter(AuthorizationFilter::new(TokenVerifier::new("s3cr3t")).with_order(0))
            .build();

        let mut ex = Exchange::new(Request::new("obs-2", Method::GET, "/orders"));
        assert_eq!(chain.execute(&mut ex).await, Completion::ShortCircuited);
        assert_eq!(ex.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
