//! Protocol version gate

use std::fmt;

/// Protocol version spoken by this build unless configured otherwise
pub const DEFAULT_PROTOCOL_VERSION: &str = "RU/0.4";

/// The single protocol version a server supports
///
/// There is no negotiation and there are no version ranges: a request is
/// served only if it declares exactly this identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolVersion(String);

impl ProtocolVersion {
    /// Wrap a version identifier such as `"RU/0.4"`
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The identifier as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a request's declared version (exact, case-sensitive match)
    pub fn verify(&self, declared: &str) -> bool {
        self.0 == declared
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOCOL_VERSION)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
