use lazy_static::lazy_static;
use regex::Regex;
use rendermap_core::ConnectionType;

/// Hostname suffix of services reachable over the platform's network.
pub const INTERNAL_HOST_SUFFIX: &str = ".onrender.com";

lazy_static! {
    /// Ordered connection-string shapes; first match wins. New connection
    /// kinds are added here, not in the matching loop.
    pub static ref CONNECTION_PATTERNS: Vec<(ConnectionType, Regex)> = vec![
        (ConnectionType::Postgres, Regex::new(r"(?i)postgres(?:ql)?://").unwrap()),
        (ConnectionType::Redis, Regex::new(r"(?i)rediss?://").unwrap()),
        (ConnectionType::Internal, Regex::new(r"(?i)\.onrender\.com").unwrap()),
    ];

    /// Extracts the host label from a platform hostname embedded in a value.
    pub static ref INTERNAL_HOST_RE: Regex =
        Regex::new(r"(?i)([a-z0-9-]+)\.onrender\.com").unwrap();
}

/// Classify a variable value against the known connection-string shapes.
pub fn detect_connection_type(value: &str) -> ConnectionType {
    for (conn_type, pattern) in CONNECTION_PATTERNS.iter() {
        if pattern.is_match(value) {
            return *conn_type;
        }
    }
    ConnectionType::Unknown
}
