//! Bearer-token authorization.
//!
//! Every request on a protected route must carry `Authorization: Bearer <jwt>`
//! signed with the gateway's shared HMAC secret (`token.secret`) and naming a
//! non-empty subject. Anything else ends the request with `401`:
//!
//! | Request | Rejection |
//! |---|---|
//! | no `Authorization` header | [`Rejection::MissingCredential`] |
//! | not `Bearer …`, empty token, malformed, bad signature, expired | [`Rejection::InvalidCredential`] |
//! | valid signature, missing or empty `sub` | [`Rejection::InvalidCredential`] |
//!
//! Tokens are verified on every request; nothing is cached.

use std::collections::HashSet;
use std::fmt;

use http::StatusCode;
use http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{BoxFuture, Completion, Filter, Next};
use crate::error::FilterError;
use crate::exchange::Exchange;

const SCHEME: &str = "Bearer";

/// Why a request was refused.
///
/// Every invalid-token cause maps to the same variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("No authorization header")]
    MissingCredential,
    #[error("JWT token is not valid")]
    InvalidCredential,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

/// Only the subject is read from a verified payload.
#[derive(Clone, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Verifies HMAC-signed tokens against the shared secret.
///
/// Built once at startup and shared read-only by every request. Without a
/// secret the verifier fails closed: every token is invalid.
#[derive(Clone)]
pub struct TokenVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self::from_secret(Some(secret))
    }

    /// A verifier for an optional secret. `None` or `""` rejects everything.
    pub fn from_secret(secret: Option<&str>) -> Self {
        let key = secret
            .filter(|s| !s.is_empty())
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        // Expiry is enforced when the token carries `exp`, but not required.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;

        Self { key, validation }
    }

    pub fn is_fail_closed(&self) -> bool {
        self.key.is_none()
    }

    /// Verifies `token` and returns its subject.
    pub fn verify(&self, token: &str) -> Result<String, Rejection> {
        let key = self.key.as_ref().ok_or(Rejection::InvalidCredential)?;
        let data = decode::<Claims>(token, key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "token verification failed");
                Rejection::InvalidCredential
            })?;

        data.claims.sub
            .filter(|sub| !sub.is_empty())
            .ok_or(Rejection::InvalidCredential)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("fail_closed", &self.is_fail_closed())
            .finish_non_exhaustive()
    }
}

/// Extracts the token from an `Authorization` value.
///
/// Only a leading `Bearer` scheme is removed, along with the whitespace after
/// it. A value without the scheme yields `None`.
fn bearer_token(value: &str) -> Option<&str> {
    value.strip_prefix(SCHEME).map(str::trim_start)
}

/// Lets a request through only when it carries a valid bearer token.
///
/// Success passes the exchange on untouched and adds no post-phase.
#[derive(Clone, Debug)]
pub struct AuthorizationFilter {
    verifier: TokenVerifier,
}

impl AuthorizationFilter {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Checks the request's credentials and returns the verified subject.
    ///
    /// Only the first `Authorization` value is considered. A value that is not
    /// visible ASCII is an invalid credential, not a missing one.
    pub fn authorize(&self, exchange: &Exchange) -> Result<String, Rejection> {
        if !exchange.request().headers().contains_key(AUTHORIZATION) {
            return Err(Rejection::MissingCredential);
        }
        let header = exchange
            .header(AUTHORIZATION.as_str())
            .ok_or(Rejection::InvalidCredential)?;
        let token = bearer_token(header).ok_or(Rejection::InvalidCredential)?;
        self.verifier.verify(token)
    }
}

impl Filter for AuthorizationFilter {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn apply<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Completion, FilterError>> {
        Box::pin(async move {
            match self.authorize(exchange) {
                Ok(subject) => {
                    debug!(request_id = %exchange.request_id(), %subject, "bearer token accepted");
                    Ok(next.run(exchange).await)
                }
                Err(rejection) => {
                    warn!(request_id = %exchange.request_id(), path = %exchange.path(), "{rejection}");
                    Ok(exchange.short_circuit(rejection.status()))
                }
            }
        })
    }
}
