//! Client key validation and handling.

use std::fmt;
use std::net::IpAddr;

use crate::error::{Result, WindowgateError};

/// Longest accepted client key, in bytes.
const MAX_KEY_LEN: usize = 255;

/// A key that identifies one client for rate limiting purposes.
///
/// Usually the caller's IP address. Keys are validated on construction so a
/// malformed identifier can never share a counter with other bad input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Parse a caller-supplied key.
    ///
    /// Surrounding whitespace is trimmed. Empty keys, keys longer than 255
    /// bytes, and keys with inner whitespace or control characters are
    /// rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let key = raw.trim();

        if key.is_empty() {
            return Err(WindowgateError::InvalidClientKey(
                "client key is empty".to_string(),
            ));
        }

        if key.len() > MAX_KEY_LEN {
            return Err(WindowgateError::InvalidClientKey(format!(
                "client key is {} bytes, limit is {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }

        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(WindowgateError::InvalidClientKey(format!(
                "client key {:?} contains whitespace or control characters",
                key
            )));
        }

        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientKey {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
