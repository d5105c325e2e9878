//! Admission backend trait for abstracting the decision source.

use async_trait::async_trait;

use super::client_key::ClientKey;
use super::decision::Decision;
use super::limiter::RateLimiter;

/// Trait for admission decision sources.
///
/// The HTTP layer only talks to this trait, so it can be driven by the
/// in-process [`RateLimiter`] or by any other implementation.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// Decide whether a request from `client` may proceed right now.
    async fn admit(&self, client: &ClientKey) -> Decision;
}

#[async_trait]
impl AdmissionBackend for RateLimiter {
    async fn admit(&self, client: &ClientKey) -> Decision {
        self.check_now(client)
    }
}
