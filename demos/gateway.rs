//! A gateway with two filtered routes and health probes.
//!
//! Run with:
//!   TURNSTILE__TOKEN__SECRET=s3cr3t RUST_LOG=info cargo run --example gateway
//!   cargo run --example gateway -- path/to/gateway.toml
//!
//! Try:
//!   curl -i http://localhost:8000/orders/42
//!   curl -i -H "Authorization: Bearer $TOKEN" http://localhost:8000/orders/42
//!   curl -i http://localhost:8000/healthz

use turnstile::{
    FilterChain, GatewayConfig, Request, Response, Route, Router, Server, health, upstream,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "demos/gateway.toml";

#[tokio::main]
async fn main() -> Result<(), turnstile::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let config = GatewayConfig::load(path)?;

    let router = Router::from_config(&config, |route| {
        let target = route.uri.clone();
        upstream::boxed(move |req: Request| echo(target.clone(), req))
    })?
    .try_route("/healthz", Route::new("liveness", "local", FilterChain::builder(health::liveness).build()))?
    .try_route("/readyz", Route::new("readiness", "local", FilterChain::builder(health::readiness).build()))?;

    Server::bind(&config.server.addr)?.serve(router).await
}

/// Stands in for the forwarding client: reports where the request would go.
async fn echo(target: String, req: Request) -> Response {
    Response::json(format!(
        r#"{{"target":"{target}","method":"{}","path":"{}","request_id":"{}"}}"#,
        req.method(),
        req.path(),
        req.id(),
    ))
}
