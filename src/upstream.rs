//! The terminal step of a chain and its type erasure.
//!
//! Forwarding to a backend service is an external collaborator. The gateway
//! only needs something it can call with the request and await a response
//! from, so any `async fn` of the right shape qualifies:
//!
//! ```text
//! async fn forward(req: Request) -> Response { … }   ← collaborator writes this
//!        ↓ FilterChain::builder(forward)
//! forward.into_boxed_upstream()                      ← Upstream blanket impl
//!        ↓
//! Arc::new(FnUpstream(forward))                      ← stored as BoxedUpstream
//!        ↓
//! upstream.call(req) once per forwarded request      ← one vtable dispatch
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::filter::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Internal dispatch interface behind [`BoxedUpstream`].
#[doc(hidden)]
pub trait ErasedUpstream {
    fn call(&self, req: Request) -> BoxFuture<'static, Response>;
}

/// A type-erased upstream shared by every request on a route.
pub type BoxedUpstream = Arc<dyn ErasedUpstream + Send + Sync + 'static>;

/// Implemented for every valid terminal step.
///
/// Satisfied automatically by any function with the signature
/// `async fn name(req: Request) -> impl IntoResponse`. Sealed: only the
/// blanket impls below can satisfy it.
pub trait Upstream: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_upstream(self) -> BoxedUpstream;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Upstream for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_upstream(self) -> BoxedUpstream {
        Arc::new(FnUpstream(self))
    }
}

/// Boxes `upstream` so it can be cloned into several chains.
pub fn boxed(upstream: impl Upstream) -> BoxedUpstream {
    upstream.into_boxed_upstream()
}

struct FnUpstream<F>(F);

impl<F, Fut, R> ErasedUpstream for FnUpstream<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};

    use super::*;

    async fn echo_path(req: Request) -> String {
        req.path().to_owned()
    }

    #[tokio::test]
    async fn async_fn_becomes_upstream() {
        let upstream = boxed(echo_path);
        let res = upstream.call(Request::new("r", Method::GET, "/inventory")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"/inventory");
    }

    #[tokio::test]
    async fn upstream_receives_the_request_body() {
        let upstream = boxed(|req: Request| async move { format!("{} bytes", req.body().len()) });
        let req = Request::new("r", Method::PUT, "/inventory/7").with_body(&b"{\"qty\":3}"[..]);
        let res = upstream.call(req).await;
        assert_eq!(res.body().as_ref(), b"9 bytes");
    }

    #[tokio::test]
    async fn boxed_upstream_is_shared_across_calls() {
        let shared = boxed(|_req: Request| async { StatusCode::ACCEPTED });
        let other = Arc::clone(&shared);
        let res = other.call(Request::new("r", Method::POST, "/")).await;
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(Arc::strong_count(&shared), 2);
    }
}
