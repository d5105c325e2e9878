//! Rate limiting logic and state management.

mod backend;
mod client_key;
mod decision;
mod limiter;
mod message;
mod store;
mod window;

pub use backend::AdmissionBackend;
pub use client_key::ClientKey;
pub use decision::{
    Decision, RateLimitHeaders, RejectKind, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET,
};
pub use limiter::RateLimiter;
pub use store::{ClientState, WindowCounterStore};
pub use window::{Window, WindowKind, WindowLimits, WindowSpec};
