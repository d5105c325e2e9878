//! Admission decisions and the advisory headers that go with them.

use std::fmt;

use super::window::{WindowKind, WindowSpec};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectKind {
    ShortWindowExceeded,
    LongWindowExceeded,
}

impl RejectKind {
    /// The window whose cap was hit.
    pub fn window(&self) -> WindowKind {
        match self {
            RejectKind::ShortWindowExceeded => WindowKind::Short,
            RejectKind::LongWindowExceeded => WindowKind::Long,
        }
    }
}

impl fmt::Display for RejectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectKind::ShortWindowExceeded => f.write_str("SHORT_WINDOW_EXCEEDED"),
            RejectKind::LongWindowExceeded => f.write_str("LONG_WINDOW_EXCEEDED"),
        }
    }
}

/// Values for the `X-RateLimit-*` response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Cap of the window being reported
    pub limit: u64,
    /// Requests left in that window
    pub remaining: u64,
    /// Unix time in seconds, rounded up, at which that window ends
    pub reset: u64,
}

impl RateLimitHeaders {
    /// Header name/value pairs in a fixed order.
    pub fn pairs(&self) -> [(&'static str, u64); 3] {
        [
            (HEADER_LIMIT, self.limit),
            (HEADER_REMAINING, self.remaining),
            (HEADER_RESET, self.reset),
        ]
    }
}

/// Convert a millisecond timestamp to whole seconds, rounding up.
pub(crate) fn reset_secs(ends_at_ms: u64) -> u64 {
    ends_at_ms.div_ceil(1000)
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed. Headers describe the long window.
    Admitted { headers: RateLimitHeaders },
    /// The request must be answered with 429.
    Rejected {
        kind: RejectKind,
        headers: RateLimitHeaders,
        /// Rendered message for the response body
        message: String,
    },
}

impl Decision {
    pub(crate) fn rejected(kind: RejectKind, spec: &WindowSpec, ends_at_ms: u64, message: String) -> Self {
        Decision::Rejected {
            kind,
            headers: RateLimitHeaders {
                limit: spec.max,
                remaining: 0,
                reset: reset_secs(ends_at_ms),
            },
            message,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    pub fn reject_kind(&self) -> Option<RejectKind> {
        match self {
            Decision::Admitted { .. } => None,
            Decision::Rejected { kind, .. } => Some(*kind),
        }
    }

    pub fn headers(&self) -> &RateLimitHeaders {
        match self {
            Decision::Admitted { headers } | Decision::Rejected { headers, .. } => headers,
        }
    }
}
