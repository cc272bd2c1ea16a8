use serde::{Deserialize, Serialize};

use crate::error::LoaderResult;

/// Loader tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Document field holding the primary identifier.
    pub id_field: String,
    /// Field name in lookups that is rewritten to `id_field`.
    pub id_alias: Option<String>,
    /// Scheduler yields between opening a window and dispatching it.
    /// Requests issued within those yields share one store query.
    pub dispatch_yields: usize,
    /// Remember resolved results per signature until cleared.
    pub memoize: bool,
    /// Dispatch a window as soon as it holds this many distinct requests.
    pub max_batch_size: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            id_field: "_id".to_string(),
            id_alias: Some("id".to_string()),
            dispatch_yields: 1,
            memoize: false,
            max_batch_size: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_id_alias(mut self, alias: Option<String>) -> Self {
        self.id_alias = alias;
        self
    }

    pub fn with_dispatch_yields(mut self, yields: usize) -> Self {
        self.dispatch_yields = yields;
        self
    }

    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = Some(max.max(1));
        self
    }

    /// Parse from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> LoaderResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Map a lookup field name onto the document field it reads.
    pub(crate) fn resolve_field<'a>(&'a self, name: &'a str) -> &'a str {
        match &self.id_alias {
            Some(alias) if alias == name => &self.id_field,
            _ => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.id_field, "_id");
        assert_eq!(config.resolve_field("id"), "_id");
        assert_eq!(config.resolve_field("tags"), "tags");
        assert!(!config.memoize);
        assert_eq!(config.dispatch_yields, 1);
    }

    #[test]
    fn parses_partial_toml() {
        let config = LoaderConfig::from_toml_str("memoize = true\nmax_batch_size = 50\n").unwrap();
        assert!(config.memoize);
        assert_eq!(config.max_batch_size, Some(50));
        assert_eq!(config.id_field, "_id");
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(LoaderConfig::from_toml_str("memoize = \"yes\"").is_err());
    }

    #[test]
    fn alias_can_be_disabled() {
        let config = LoaderConfig::default().with_id_alias(None);
        assert_eq!(config.resolve_field("id"), "id");
    }
}
