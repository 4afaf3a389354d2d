//! The per-request [`Exchange`]: one inbound request bound to its in-progress
//! response.
//!
//! An exchange is owned by the chain executing it and is never shared across
//! requests, so nothing here needs locking. Once the response is committed
//! (by a short-circuiting filter, by the upstream step, or by an explicit
//! [`Exchange::complete`]) the response half is sealed: writing to it again
//! is a bug in the calling filter and panics.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};

use crate::filter::Completion;
use crate::request::Request;
use crate::response::Response;

/// Marks the panic raised by a write to a committed exchange. The chain lets
/// that panic through instead of recovering from it.
pub(crate) const COMMITTED_WRITE: &str = "on committed exchange";

#[derive(Debug)]
pub struct Exchange {
    request: Request,
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
    committed: bool,
    outcome: Option<Completion>,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            status: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            committed: false,
            outcome: None,
        }
    }

    // ── Request half (read-only) ──────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_id(&self) -> &str { self.request.id() }
    pub fn method(&self) -> &Method { self.request.method() }
    pub fn path(&self) -> &str { self.request.path() }

    /// First value of a request header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Every value of a request header in the order it was received.
    pub fn header_values(&self, name: &str) -> Option<Vec<&str>> {
        self.request.header_values(name)
    }

    // ── Response half ─────────────────────────────────────────────────────────

    pub fn status(&self) -> Option<StatusCode> { self.status }
    pub fn response_headers(&self) -> &HeaderMap { &self.headers }
    pub fn is_committed(&self) -> bool { self.committed }

    /// How the chain finished with this exchange, once it has.
    pub fn outcome(&self) -> Option<Completion> { self.outcome }

    /// # Panics
    ///
    /// Panics if the response is already committed.
    pub fn set_status(&mut self, code: StatusCode) {
        self.assert_open("set_status");
        self.status = Some(code);
    }

    /// # Panics
    ///
    /// Panics if the response is already committed.
    pub fn insert_response_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.assert_open("insert_response_header");
        self.headers.append(name, value);
    }

    /// Marks the response as finished and seals the exchange. Idempotent.
    ///
    /// Completing an exchange that never reached the upstream step counts as a
    /// short-circuit.
    pub fn complete(&mut self) {
        self.committed = true;
        self.outcome.get_or_insert(Completion::ShortCircuited);
    }

    /// Writes `code`, completes the exchange and reports a short-circuit.
    ///
    /// Filters return the result directly instead of invoking the next stage.
    ///
    /// # Panics
    ///
    /// Panics if the response is already committed.
    pub fn short_circuit(&mut self, code: StatusCode) -> Completion {
        self.set_status(code);
        self.complete();
        Completion::ShortCircuited
    }

    /// Commits the upstream response.
    pub(crate) fn commit(&mut self, response: Response) {
        self.assert_open("commit");
        self.status = Some(response.status);
        for (name, value) in &response.headers {
            self.headers.append(name.clone(), value.clone());
        }
        self.body = response.body;
        self.complete();
        self.outcome = Some(Completion::Forwarded);
    }

    /// Records that the client went away before the upstream step finished.
    pub(crate) fn cancel(&mut self) {
        self.complete();
        self.outcome = Some(Completion::Cancelled);
    }

    /// Converts the finished exchange into the response sent to the client.
    ///
    /// An exchange that never received a status answers `200 OK`.
    pub fn into_response(self) -> Response {
        Response {
            status: self.status.unwrap_or(StatusCode::OK),
            headers: self.headers,
            body: self.body,
        }
    }

    fn assert_open(&self, op: &str) {
        assert!(
            !self.committed,
            "{op} {} {}",
            COMMITTED_WRITE,
            self.request.id(),
        );
    }
}
