//! Fixed-shape rolling window buckets.

use std::fmt;

/// Which of the two windows a count or limit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// The burst window
    Short,
    /// The sustained-rate window
    Long,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Short => "short",
            WindowKind::Long => "long",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duration and request cap of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    /// Window length in milliseconds
    pub duration_ms: u64,
    /// Requests admitted per window
    pub max: u64,
}

impl WindowSpec {
    pub fn new(duration_ms: u64, max: u64) -> Self {
        Self { duration_ms, max }
    }
}

/// Both window specs a limiter enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    pub short: WindowSpec,
    pub long: WindowSpec,
}

impl WindowLimits {
    pub fn spec(&self, kind: WindowKind) -> &WindowSpec {
        match kind {
            WindowKind::Short => &self.short,
            WindowKind::Long => &self.long,
        }
    }
}

/// The single bucket of a window: when it started and how many requests it
/// has counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start_ms: u64,
    count: u64,
}

impl Window {
    /// Open a new window at `now_ms` holding one request.
    pub fn open(now_ms: u64) -> Self {
        Self {
            start_ms: now_ms,
            count: 1,
        }
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// A window is live while `start > now - duration`.
    ///
    /// A start in the future (clock stepped backwards) counts as live.
    pub fn is_live(&self, now_ms: u64, spec: &WindowSpec) -> bool {
        now_ms.saturating_sub(self.start_ms) < spec.duration_ms
    }

    /// Millisecond timestamp at which this window stops being live.
    pub fn ends_at_ms(&self, spec: &WindowSpec) -> u64 {
        self.start_ms.saturating_add(spec.duration_ms)
    }

    pub(crate) fn bump(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }
}
