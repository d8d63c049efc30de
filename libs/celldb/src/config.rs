//! Database configuration.

use serde::{Deserialize, Serialize};

/// Tunable parameters of a [`Database`](crate::Database).
///
/// Every field has a default, so a TOML document only needs the keys it overrides:
///
/// ```
/// # use celldb::DbConfig;
/// let config = DbConfig::from_toml_str("name_separator = '/'").unwrap();
/// assert_eq!(config.name_separator, '/');
/// assert_eq!(config.quadtree_split_threshold, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// Separator between instance names in path and occurrence names.
    pub name_separator: char,
    /// Number of items a quad-tree node holds before it splits.
    pub quadtree_split_threshold: usize,
    /// Zero-padded width of the counter in uniquified clone names.
    pub uniquify_suffix_width: usize,
    /// Initial bucket count of intrusive collections.
    pub intrusive_initial_buckets: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            name_separator: '.',
            quadtree_split_threshold: 100,
            uniquify_suffix_width: 2,
            intrusive_initial_buckets: 8,
        }
    }
}

impl DbConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
