//! Configuration types

use crate::error::{ConfigError, QueryCacheError, QueryCacheResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default fingerprint namespace.
pub const DEFAULT_NAMESPACE: &str = "cache-query";

/// Default TTL when a directive does not set one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default page size for pagination calls.
pub const DEFAULT_PER_PAGE: u64 = 15;

/// Default pagination parameter name.
pub const DEFAULT_PAGE_NAME: &str = "page";

/// Settings shared by every decorated query on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Prefix of every fingerprint, separated from the hash by `|`.
    pub namespace: String,
    /// TTL used when the directive does not set one.
    pub default_ttl: Duration,
    /// Page size for `paginate` without an explicit size.
    pub default_per_page: u64,
    /// Pagination-context parameter holding the current page.
    pub page_name: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl: DEFAULT_TTL,
            default_per_page: DEFAULT_PER_PAGE,
            page_name: DEFAULT_PAGE_NAME.to_string(),
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_default_per_page(mut self, per_page: u64) -> Self {
        self.default_per_page = per_page;
        self
    }

    pub fn with_page_name(mut self, page_name: impl Into<String>) -> Self {
        self.page_name = page_name.into();
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `QUERYCACHE_NAMESPACE`: Fingerprint namespace (default: cache-query)
    /// - `QUERYCACHE_DEFAULT_TTL_SECS`: Default TTL in seconds (default: 60)
    /// - `QUERYCACHE_DEFAULT_PER_PAGE`: Default page size (default: 15)
    /// - `QUERYCACHE_PAGE_NAME`: Pagination parameter name (default: page)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            namespace: std::env::var("QUERYCACHE_NAMESPACE").unwrap_or(defaults.namespace),
            default_ttl: std::env::var("QUERYCACHE_DEFAULT_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            default_per_page: std::env::var("QUERYCACHE_DEFAULT_PER_PAGE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_per_page),
            page_name: std::env::var("QUERYCACHE_PAGE_NAME").unwrap_or(defaults.page_name),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - namespace is non-empty and has no `|`
    /// - default_ttl is positive
    /// - default_per_page > 0
    /// - page_name is non-empty
    pub fn validate(&self) -> QueryCacheResult<()> {
        if self.namespace.is_empty() {
            return Err(invalid("namespace", &self.namespace, "namespace must not be empty"));
        }

        if self.namespace.contains('|') {
            return Err(invalid(
                "namespace",
                &self.namespace,
                "namespace must not contain the '|' separator",
            ));
        }

        if self.default_ttl.is_zero() {
            return Err(invalid(
                "default_ttl",
                &format!("{:?}", self.default_ttl),
                "default_ttl must be positive",
            ));
        }

        if self.default_per_page == 0 {
            return Err(invalid(
                "default_per_page",
                &self.default_per_page.to_string(),
                "default_per_page must be greater than 0",
            ));
        }

        if self.page_name.is_empty() {
            return Err(invalid("page_name", &self.page_name, "page_name must not be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> QueryCacheError {
    QueryCacheError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = CacheSettings::default();
        assert_eq!(settings.namespace, "cache-query");
        assert_eq!(settings.default_ttl, Duration::from_secs(60));
        assert_eq!(settings.default_per_page, 15);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_separator_in_namespace() {
        let settings = CacheSettings::new().with_namespace("a|b");
        assert!(matches!(
            settings.validate(),
            Err(QueryCacheError::Config(ConfigError::InvalidValue { ref field, .. })) if field == "namespace"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(CacheSettings::new()
            .with_default_ttl(Duration::ZERO)
            .validate()
            .is_err());
        assert!(CacheSettings::new()
            .with_default_per_page(0)
            .validate()
            .is_err());
        assert!(CacheSettings::new().with_page_name("").validate().is_err());
        assert!(CacheSettings::new().with_namespace("").validate().is_err());
    }
}
