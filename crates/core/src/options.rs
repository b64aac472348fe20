//! Database options schema.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunable names for a database instance.
///
/// The envelope sentinels mark the three non-record journal line shapes.
/// They must stay inside the reserved `$$` prefix so they can never
/// collide with user field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Field holding the primary key.
    #[serde(default = "default_primary_field")]
    pub primary_field: String,

    /// Envelope key marking a deletion tombstone.
    #[serde(default = "default_deleted_sentinel")]
    pub deleted_sentinel: String,

    /// Envelope key marking an index-creation directive.
    #[serde(default = "default_add_index_sentinel")]
    pub add_index_sentinel: String,

    /// Envelope key marking an index-removal directive.
    #[serde(default = "default_remove_index_sentinel")]
    pub remove_index_sentinel: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            primary_field: default_primary_field(),
            deleted_sentinel: default_deleted_sentinel(),
            add_index_sentinel: default_add_index_sentinel(),
            remove_index_sentinel: default_remove_index_sentinel(),
        }
    }
}

fn default_primary_field() -> String {
    "_id".to_string()
}
fn default_deleted_sentinel() -> String {
    "$$deleted".to_string()
}
fn default_add_index_sentinel() -> String {
    "$$addIndex".to_string()
}
fn default_remove_index_sentinel() -> String {
    "$$deleteIndex".to_string()
}

impl Options {
    /// Validate that the configured names are usable.
    pub fn validate(&self) -> Result<()> {
        if self.primary_field.is_empty() {
            return Err(Error::InvalidOptions("primary_field must not be empty".into()));
        }
        if self.primary_field.contains('.') {
            return Err(Error::InvalidOptions(
                "primary_field must be a top-level field".into(),
            ));
        }
        if self.primary_field.starts_with("$$") {
            return Err(Error::InvalidOptions(
                "primary_field must not use the reserved $$ prefix".into(),
            ));
        }
        let sentinels = [
            &self.deleted_sentinel,
            &self.add_index_sentinel,
            &self.remove_index_sentinel,
        ];
        for s in sentinels {
            if !s.starts_with("$$") {
                return Err(Error::InvalidOptions(format!(
                    "sentinel '{s}' must use the reserved $$ prefix"
                )));
            }
        }
        for (i, a) in sentinels.iter().enumerate() {
            for b in &sentinels[i + 1..] {
                if a == b {
                    return Err(Error::InvalidOptions(format!("duplicate sentinel '{a}'")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let opts = Options::default();
        assert_eq!(opts.primary_field, "_id");
        assert_eq!(opts.deleted_sentinel, "$$deleted");
        opts.validate().unwrap();
    }

    #[test]
    fn test_rejects_duplicate_sentinels() {
        let opts = Options {
            add_index_sentinel: "$$deleted".into(),
            ..Options::default()
        };
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_unreserved_sentinel() {
        let opts = Options {
            deleted_sentinel: "deleted".into(),
            ..Options::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_primary_field() {
        let dotted = Options {
            primary_field: "meta.id".into(),
            ..Options::default()
        };
        assert!(dotted.validate().is_err());

        let reserved = Options {
            primary_field: "$$id".into(),
            ..Options::default()
        };
        assert!(reserved.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let opts: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.primary_field, "_id");

        let opts: Options = serde_json::from_str(r#"{"primary_field": "uuid"}"#).unwrap();
        assert_eq!(opts.primary_field, "uuid");
        assert_eq!(opts.add_index_sentinel, "$$addIndex");
    }
}
