//! Server version capabilities.
//!
//! Different Elasticsearch releases disagree on URL shapes, verbs and response
//! formats. A [`VersionProfile`] is resolved once from the version string and
//! answers those questions by name.

use serde::{Deserialize, Serialize};

/// Version assumed by the raw wire layer when nothing is configured.
pub const DEFAULT_VERSION: &str = "0.90.13";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionProfile {
    version: String,
    major: u32,
    minor: u32,
}

impl VersionProfile {
    pub fn resolve(version: &str) -> Self {
        let mut parts = version.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .unwrap_or(0);
        let minor = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .unwrap_or(0);
        Self {
            version: version.trim().to_string(),
            major,
            minor,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    /// 0.x puts mappings at `{index}/{type}/_mapping`, later releases at
    /// `{index}/_mapping/{type}`.
    pub fn mapping_url_per_type(&self) -> bool {
        self.major == 0
    }

    /// `fields` queries (structured per-field responses) were removed in 5.0.
    pub fn fields_query(&self) -> bool {
        self.major < 5
    }

    /// 0.x has no HEAD support on type URLs.
    pub fn type_exists_via_get(&self) -> bool {
        self.major == 0
    }

    pub fn create_index_with_post(&self) -> bool {
        self.major < 5
    }

    /// Key used for `_source` filtering.
    pub fn source_include_key(&self) -> &'static str {
        if self.major < 5 {
            "include"
        } else {
            "includes"
        }
    }

    /// The 0.9x `_query` endpoint expects the bare query without the outer
    /// `query` wrapper.
    pub fn delete_by_query_unwraps(&self) -> bool {
        self.major == 0 && self.minor == 90
    }
}

impl Default for VersionProfile {
    fn default() -> Self {
        Self::resolve(DEFAULT_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_parses_major_and_minor() {
        let v = VersionProfile::resolve("5.1.1");
        assert_eq!(v.major(), 5);
        assert_eq!(v.version(), "5.1.1");
    }

    #[test]
    fn test_legacy_profile() {
        let v = VersionProfile::resolve("0.90.13");
        assert!(v.mapping_url_per_type());
        assert!(v.fields_query());
        assert!(v.type_exists_via_get());
        assert!(v.create_index_with_post());
        assert!(v.delete_by_query_unwraps());
        assert_eq!(v.source_include_key(), "include");
    }

    #[test]
    fn test_modern_profile() {
        let v = VersionProfile::resolve("7.10.2");
        assert!(!v.mapping_url_per_type());
        assert!(!v.fields_query());
        assert!(!v.type_exists_via_get());
        assert!(!v.create_index_with_post());
        assert!(!v.delete_by_query_unwraps());
        assert_eq!(v.source_include_key(), "includes");
    }

    #[test]
    fn test_one_x_still_uses_fields() {
        let v = VersionProfile::resolve("1.7.5");
        assert!(v.fields_query());
        assert!(!v.mapping_url_per_type());
        assert!(!v.delete_by_query_unwraps());
    }

    #[test]
    fn test_garbage_falls_back_to_zero() {
        assert_eq!(VersionProfile::resolve("dev").major(), 0);
    }
}
