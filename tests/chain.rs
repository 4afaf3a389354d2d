//! Chain ordering and exchange lifecycle through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};
use turnstile::filter::{BoxFuture, order};
use turnstile::{
    Completion, Exchange, Filter, FilterChain, FilterError, FilterExt, GatewayConfig, Next,
    Request, Router, upstream,
};

type Log = Arc<Mutex<Vec<String>>>;

struct Trace {
    name: &'static str,
    order: i32,
    log: Log,
}

impl Filter for Trace {
    fn name(&self) -> &'static str { self.name }
    fn order(&self) -> i32 { self.order }

    fn apply<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Completion, FilterError>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(format!("{}-pre", self.name));
            let completion = next.run(exchange).await;
            self.log.lock().unwrap().push(format!("{}-post", self.name));
            Ok(completion)
        })
    }
}

/// Stamps a response header before the upstream step.
struct Stamp;

impl Filter for Stamp {
    fn name(&self) -> &'static str { "stamp" }

    fn apply<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Completion, FilterError>> {
        Box::pin(async move {
            exchange.insert_response_header(
                HeaderName::from_static("x-gateway"),
                HeaderValue::from_static("turnstile"),
            );
            Ok(next.run(exchange).await)
        })
    }
}

fn exchange(path: &str) -> Exchange {
    Exchange::new(Request::new("req-7", Method::GET, path))
}

#[tokio::test]
async fn filters_run_by_order_then_unwind() {
    let log = Log::default();
    let upstream_log = Arc::clone(&log);
    let trace = |name, order| Trace { name, order, log: Arc::clone(&log) };

    let chain = FilterChain::builder(move |_req: Request| {
        upstream_log.lock().unwrap().push("upstream".to_owned());
        async { StatusCode::NO_CONTENT }
    })
    .filter(trace("A", 5))
    .filter(trace("B", 1))
    .filter(trace("C", 10))
    .build();

    let mut ex = exchange("/orders");
    assert_eq!(chain.execute(&mut ex).await, Completion::Forwarded);
    assert_eq!(
        *log.lock().unwrap(),
        ["B-pre", "A-pre", "C-pre", "upstream", "C-post", "A-post", "B-post"],
    );
    assert_eq!(ex.into_response().status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn pre_phase_headers_survive_forwarding() {
    let chain = FilterChain::builder(|_req: Request| async { "hello" })
        .filter(Stamp.with_order(order::HIGHEST_PRECEDENCE))
        .build();

    let mut ex = exchange("/greeting");
    chain.execute(&mut ex).await;

    let res = ex.into_response();
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.headers()["x-gateway"], "turnstile");
    assert_eq!(res.body().as_ref(), b"hello");
}

#[test]
fn complete_is_idempotent() {
    let mut ex = exchange("/orders");
    ex.set_status(StatusCode::ACCEPTED);
    ex.complete();
    ex.complete();

    assert!(ex.is_committed());
    assert_eq!(ex.outcome(), Some(Completion::ShortCircuited));
    assert_eq!(ex.status(), Some(StatusCode::ACCEPTED));
}

#[tokio::test]
async fn configured_route_requires_a_token() {
    let config = GatewayConfig::from_toml(r#"
        [token]
        secret = "s3cr3t"

        [[default_filters]]
        kind = "observability"
        base_message = "global filter"
        pre_logging = true
        post_logging = true

        [[routes]]
        id = "orders"
        path = "/orders/{id}"
        uri = "http://orders"

        [[routes.filters]]
        kind = "authorization"
    "#)
    .unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::from_config(&config, |_route| {
        let hits = Arc::clone(&hits);
        upstream::boxed(move |_req: Request| {
            hits.fetch_add(1, Ordering::SeqCst);
            async { StatusCode::OK }
        })
    })
    .unwrap();

    let route = router.lookup("/orders/42").unwrap();
    assert_eq!(route.id(), "orders");

    let mut ex = exchange("/orders/42");
    assert_eq!(route.chain().execute(&mut ex).await, Completion::ShortCircuited);
    assert_eq!(ex.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
