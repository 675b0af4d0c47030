//! Connection target.

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// ConnectionTarget
// ============================================================================

/// Where to connect and which device the connection belongs to.
///
/// Each [`TransportClient`](super::TransportClient) copies the target at
/// construction; later changes only affect clients created afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Agent URL, `ws://host:port`.
    pub address: String,
    /// Device serial; empty selects the only attached device.
    pub device_id: String,
}

impl ConnectionTarget {
    /// Creates a target.
    #[inline]
    #[must_use]
    pub fn new(address: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            device_id: device_id.into(),
        }
    }

    /// Parses and checks the address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] unless the address is a `ws://` or
    /// `wss://` URL with a host.
    pub fn url(&self) -> Result<Url> {
        let url = Url::parse(&self.address)
            .map_err(|e| Error::connection(format!("invalid address '{}': {e}", self.address)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::connection(format!(
                "unsupported scheme '{}' in '{}'",
                url.scheme(),
                self.address
            )));
        }
        if url.host_str().is_none() {
            return Err(Error::connection(format!(
                "missing host in '{}'",
                self.address
            )));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_url() {
        let target = ConnectionTarget::new("ws://127.0.0.1:6667", "");
        let url = target.url().expect("valid");
        assert_eq!(url.port(), Some(6667));
    }

    #[test]
    fn test_rejects_http() {
        let target = ConnectionTarget::new("http://127.0.0.1:6667", "");
        assert!(target.url().unwrap_err().is_connection_error());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ConnectionTarget::new("", "").url().is_err());
        assert!(ConnectionTarget::new("localhost:6667", "").url().is_err());
    }
}
