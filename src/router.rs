//! Radix-tree route table.
//!
//! A gateway route is method-agnostic: a path pattern resolves to one
//! [`Route`], whose filter chain decides what happens to the request.
//! Build the table once at startup; lookups allocate nothing.

use std::sync::Arc;

use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::config::{GatewayConfig, RouteConfig};
use crate::error::Error;
use crate::filter::FilterChain;
use crate::upstream::BoxedUpstream;

/// A resolved route: path pattern → ordered filters → upstream target.
pub struct Route {
    id: String,
    uri: String,
    chain: FilterChain,
}

impl Route {
    pub fn new(id: impl Into<String>, uri: impl Into<String>, chain: FilterChain) -> Self {
        Self { id: id.into(), uri: uri.into(), chain }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn uri(&self) -> &str { &self.uri }
    pub fn chain(&self) -> &FilterChain { &self.chain }
}

pub struct Router {
    routes: MatchitRouter<Arc<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: MatchitRouter::new() }
    }

    /// Registers `route` under a path pattern. Returns `self` for chaining.
    ///
    /// Patterns use `matchit` syntax: `/users/{id}`, `/files/{*rest}`.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is invalid or conflicts with an existing one.
    /// Use [`try_route`](Self::try_route) for patterns read from configuration.
    pub fn route(self, path: &str, route: Route) -> Self {
        self.try_route(path, route)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_route(mut self, path: &str, route: Route) -> Result<Self, Error> {
        self.routes
            .insert(path, Arc::new(route))
            .map_err(|source| Error::Route { path: path.to_owned(), source })?;
        Ok(self)
    }

    /// Builds every configured route.
    ///
    /// Each chain is assembled from the gateway's default filters followed by
    /// the route's own, then sorted by precedence. `upstream` supplies the
    /// terminal forwarding step for each route.
    pub fn from_config(
        config: &GatewayConfig,
        mut upstream: impl FnMut(&RouteConfig) -> BoxedUpstream,
    ) -> Result<Self, Error> {
        let verifier = config.token_verifier();
        let mut router = Self::new();

        for route in &config.routes {
            let filters = config.default_filters.iter()
                .chain(&route.filters)
                .map(|spec| spec.build(&verifier));
            let chain = FilterChain::new(filters, upstream(route));
            debug!(route = %route.id, path = %route.path, filters = ?chain.filter_names(), "route registered");
            router = router.try_route(&route.path, Route::new(&route.id, &route.uri, chain))?;
        }

        Ok(router)
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<Route>> {
        self.routes.at(path).ok().map(|matched| Arc::clone(matched.value))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
