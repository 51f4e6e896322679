//! Cache key constants and builders for document lookups
//!
//! Every key starts with its document kind so that invalidating one kind
//! never evicts another.
//!
//! # Key Patterns
//!
//! - `configuration:{hostname}:{config_name}` - Generated configuration files
//! - `directory:{domain}:{user}` - Directory (SIP user) documents
//! - `dialplan:{context}` - Whole-context dialplans
//! - `dialplan:{context}:{destination}` - Single-destination dialplans
//!
//! # Example
//!
//! ```
//! use callsign_cache::keys;
//!
//! let key = keys::directory_key("acme.example.com", "1001");
//! assert_eq!(key, "directory:acme.example.com:1001");
//! ```

use std::time::Duration;

/// Prefix for configuration documents
///
/// Format: `configuration:{hostname}:{config_name}`
pub const CONFIGURATION_PREFIX: &str = "configuration";

/// Prefix for directory documents
///
/// Format: `directory:{domain}:{user}`
pub const DIRECTORY_PREFIX: &str = "directory";

/// Prefix for dialplan documents
///
/// Format: `dialplan:{context}` or `dialplan:{context}:{destination}`
pub const DIALPLAN_PREFIX: &str = "dialplan";

/// Default TTL for configuration documents (1 hour)
pub const CONFIGURATION_TTL_SECS: u64 = 3600;

/// Default TTL for directory documents (5 minutes)
pub const DIRECTORY_TTL_SECS: u64 = 300;

/// Default TTL for dialplan documents (30 minutes)
pub const DIALPLAN_TTL_SECS: u64 = 1800;

/// Default interval of the background expiry sweep (5 minutes)
pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// Per-kind lifetimes applied by the document endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub configuration: Duration,
    pub directory: Duration,
    pub dialplan: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            configuration: Duration::from_secs(CONFIGURATION_TTL_SECS),
            directory: Duration::from_secs(DIRECTORY_TTL_SECS),
            dialplan: Duration::from_secs(DIALPLAN_TTL_SECS),
        }
    }
}

impl From<&callsign_core::config::CacheConfig> for CacheTtl {
    fn from(config: &callsign_core::config::CacheConfig) -> Self {
        Self {
            configuration: Duration::from_secs(config.configuration_ttl_secs),
            directory: Duration::from_secs(config.directory_ttl_secs),
            dialplan: Duration::from_secs(config.dialplan_ttl_secs),
        }
    }
}

/// Build a cache key for a configuration document
///
/// # Example
///
/// ```
/// use callsign_cache::keys::configuration_key;
///
/// assert_eq!(configuration_key("fs01", "acl.conf"), "configuration:fs01:acl.conf");
/// ```
pub fn configuration_key(hostname: &str, config_name: &str) -> String {
    format!("{}:{}:{}", CONFIGURATION_PREFIX, hostname, config_name)
}

/// Build a cache key for a directory document
///
/// # Example
///
/// ```
/// use callsign_cache::keys::directory_key;
///
/// assert_eq!(directory_key("acme.example.com", "1001"), "directory:acme.example.com:1001");
/// ```
pub fn directory_key(domain: &str, user: &str) -> String {
    format!("{}:{}:{}", DIRECTORY_PREFIX, domain, user)
}

/// Build a cache key for a whole-context dialplan
pub fn dialplan_key(context: &str) -> String {
    format!("{}:{}", DIALPLAN_PREFIX, context)
}

/// Build a cache key for a single-destination dialplan
pub fn dialplan_single_key(context: &str, destination: &str) -> String {
    format!("{}:{}:{}", DIALPLAN_PREFIX, context, destination)
}

/// Pattern covering every directory document of a domain
///
/// # Example
///
/// ```
/// use callsign_cache::keys::directory_domain_pattern;
///
/// assert_eq!(directory_domain_pattern("acme.example.com"), "directory:acme.example.com:*");
/// ```
pub fn directory_domain_pattern(domain: &str) -> String {
    format!("{}:{}:*", DIRECTORY_PREFIX, domain)
}

/// Pattern covering the single-destination dialplans of a context
pub fn dialplan_single_pattern(context: &str) -> String {
    format!("{}:{}:*", DIALPLAN_PREFIX, context)
}

/// Build a pattern for matching all keys with a given prefix
///
/// # Example
///
/// ```
/// use callsign_cache::keys::pattern;
///
/// assert_eq!(pattern("dialplan"), "dialplan:*");
/// ```
pub fn pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_key() {
        assert_eq!(configuration_key("fs01", "sofia.conf"), "configuration:fs01:sofia.conf");
    }

    #[test]
    fn test_dialplan_keys() {
        assert_eq!(dialplan_key("default"), "dialplan:default");
        assert_eq!(dialplan_single_key("public", "15551234"), "dialplan:public:15551234");
    }

    #[test]
    fn test_patterns() {
        assert_eq!(pattern("directory"), "directory:*");
        assert_eq!(directory_domain_pattern("a.com"), "directory:a.com:*");
        assert_eq!(dialplan_single_pattern("a.com"), "dialplan:a.com:*");
    }

    #[test]
    fn test_key_uniqueness() {
        // Same parameters under different kinds must not collide
        let keys = vec![
            configuration_key("x", "y"),
            directory_key("x", "y"),
            dialplan_single_key("x", "y"),
            dialplan_key("x"),
        ];

        let unique_count = keys.iter().collect::<std::collections::HashSet<_>>().len();
        assert_eq!(unique_count, keys.len());
    }

    #[test]
    fn test_ttl_constants() {
        assert_eq!(CONFIGURATION_TTL_SECS, 3600); // 1 hour
        assert_eq!(DIRECTORY_TTL_SECS, 300); // 5 minutes
        assert_eq!(DIALPLAN_TTL_SECS, 1800); // 30 minutes
        assert_eq!(SWEEP_INTERVAL_SECS, 300);
    }

    #[test]
    fn test_ttl_from_config() {
        let ttl = CacheTtl::from(&callsign_core::config::CacheConfig::default());
        assert_eq!(ttl, CacheTtl::default());
    }
}
