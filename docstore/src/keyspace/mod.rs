// Key scheme - maps logical document ids to physical store keys

use crate::error::{DocStoreError, Result};

/// Separator between the type namespace and the logical id.
pub const KEY_SEPARATOR: char = ':';

/// Prefix of every index name derived from a namespace.
pub const INDEX_NAME_PREFIX: &str = "idx:";

/// The per-type namespace that every physical key and the index name derive from.
///
/// The namespace is fixed at construction. Ids are not escaped: an id that
/// contains the separator can produce the same physical key as a different
/// (namespace, id) pair, so callers that care about collisions must avoid `:`
/// in their ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
    prefix: String,
    index_name: String,
}

impl Keyspace {
    /// Derive a keyspace from a document type name. The name is lowercased.
    pub fn new(type_name: &str) -> Result<Self> {
        let namespace = type_name.trim().to_lowercase();
        if namespace.is_empty() {
            return Err(DocStoreError::Config(
                "Document type name must not be empty".to_string(),
            ));
        }
        if namespace.chars().any(|c| c.is_whitespace()) {
            return Err(DocStoreError::Config(format!(
                "Document type name '{type_name}' must not contain whitespace"
            )));
        }

        Ok(Keyspace {
            prefix: format!("{namespace}{KEY_SEPARATOR}"),
            index_name: format!("{INDEX_NAME_PREFIX}{namespace}"),
            namespace,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The key prefix the index is scoped to, e.g. `account:`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The derived index name, e.g. `idx:account`.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Physical key for a logical id: `<namespace>:<id>`.
    pub fn key(&self, id: &str) -> String {
        let mut key = String::with_capacity(self.prefix.len() + id.len());
        key.push_str(&self.prefix);
        key.push_str(id);
        key
    }

    /// Recover the logical id from a physical key in this namespace.
    pub fn id_from_key<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.prefix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_is_lowercased() {
        let ks = Keyspace::new("Account").unwrap();
        assert_eq!(ks.namespace(), "account");
        assert_eq!(ks.prefix(), "account:");
        assert_eq!(ks.index_name(), "idx:account");
    }

    #[test]
    fn test_key_format() {
        let ks = Keyspace::new("Account").unwrap();
        assert_eq!(ks.key("42"), "account:42");
        assert_eq!(ks.key(""), "account:");
    }

    #[test]
    fn test_distinct_ids_never_collide() {
        let ks = Keyspace::new("account").unwrap();
        let ids = ["1", "10", "01", "a", "A", "1 ", "ä"];
        let keys: std::collections::HashSet<String> = ids.iter().map(|id| ks.key(id)).collect();
        assert_eq!(keys.len(), ids.len());
    }

    #[test]
    fn test_separator_in_id_is_not_escaped() {
        let ks = Keyspace::new("a").unwrap();
        assert_eq!(ks.key("b:c"), "a:b:c");
        assert_eq!(ks.id_from_key("a:b:c"), Some("b:c"));
    }

    #[test]
    fn test_id_from_key() {
        let ks = Keyspace::new("account").unwrap();
        assert_eq!(ks.id_from_key("account:7"), Some("7"));
        assert_eq!(ks.id_from_key("order:7"), None);
    }

    #[test]
    fn test_rejects_empty_or_spaced_names() {
        assert!(matches!(Keyspace::new("  "), Err(DocStoreError::Config(_))));
        assert!(matches!(Keyspace::new("my type"), Err(DocStoreError::Config(_))));
    }
}
