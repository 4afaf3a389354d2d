//! Gateway configuration.
//!
//! Loaded once at startup from a TOML file, with environment variables
//! layered on top. Nested keys use `__`, so the signing secret `token.secret`
//! can come from `TURNSTILE__TOKEN__SECRET` instead of the file.
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:8000"
//!
//! [token]
//! secret = "s3cr3t"
//!
//! [[default_filters]]
//! kind = "observability"
//! base_message = "gateway"
//! pre_logging = true
//! post_logging = true
//!
//! [[routes]]
//! id = "orders"
//! path = "/orders/{*rest}"
//! uri = "http://orders.internal:8080"
//!
//! [[routes.filters]]
//! kind = "authorization"
//!
//! [[routes.filters]]
//! kind = "observability"
//! base_message = "orders"
//! post_logging = true
//! order = "lowest"
//! ```

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Error;
use crate::filter::{
    AuthorizationFilter, BoxedFilter, FilterExt, ObservabilityConfig, ObservabilityFilter,
    TokenVerifier, order,
};

pub const ENV_PREFIX: &str = "TURNSTILE";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub token: TokenConfig,
    /// Applied to every route, declared before the route's own filters.
    pub default_filters: Vec<FilterSpec>,
    pub routes: Vec<RouteConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: "0.0.0.0:8000".to_owned() }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub secret: Option<String>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RouteConfig {
    pub id: String,
    /// Path pattern in `matchit` syntax, e.g. `/users/{id}` or `/files/{*rest}`.
    pub path: String,
    /// Upstream target handed to the forwarding collaborator.
    pub uri: String,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

/// One filter declaration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    Authorization {
        #[serde(default)]
        order: Option<OrderSpec>,
    },
    Observability {
        #[serde(flatten)]
        config: ObservabilityConfig,
        #[serde(default)]
        order: Option<OrderSpec>,
    },
}

/// A precedence written either as a number or by name.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum OrderSpec {
    Value(i32),
    Named(NamedOrder),
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NamedOrder {
    Highest,
    Lowest,
}

impl OrderSpec {
    pub fn value(self) -> i32 {
        match self {
            Self::Value(v)                   => v,
            Self::Named(NamedOrder::Highest) => order::HIGHEST_PRECEDENCE,
            Self::Named(NamedOrder::Lowest)  => order::LOWEST_PRECEDENCE,
        }
    }
}

impl FilterSpec {
    /// Instantiates the declared filter. Authorization filters share `verifier`.
    pub fn build(&self, verifier: &TokenVerifier) -> BoxedFilter {
        match self {
            Self::Authorization { order } => {
                let filter = AuthorizationFilter::new(verifier.clone());
                match order {
                    Some(o) => filter.with_order(o.value()).boxed(),
                    None => filter.boxed(),
                }
            }
            Self::Observability { config, order } => ObservabilityFilter::new(
                config.clone(),
                order.map_or(order::DEFAULT, OrderSpec::value),
            )
            .boxed(),
        }
    }
}

impl GatewayConfig {
    /// Loads `path`, then applies `TURNSTILE__*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parses configuration from TOML text, without environment overrides.
    pub fn from_toml(toml: &str) -> Result<Self, Error> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// The verifier every authorization filter shares. Fails closed without a
    /// secret.
    pub fn token_verifier(&self) -> TokenVerifier {
        TokenVerifier::from_secret(self.token.secret.as_deref())
    }
}
