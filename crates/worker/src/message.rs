//! Control messages posted to the worker by its host.

use serde::{Deserialize, Serialize};
use shellcache_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Activate a waiting generation now instead of waiting for all pages to close.
    #[serde(rename = "SKIP_WAITING", alias = "skip-waiting")]
    SkipWaiting,
}

impl ControlMessage {
    /// Parse a JSON message such as `{"type": "SKIP_WAITING"}`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMessage` for malformed JSON or an unknown type.
    pub fn parse(json: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(json).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}
