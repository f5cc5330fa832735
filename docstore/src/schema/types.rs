use crate::error::{DocStoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Ordered field mappings used to build a search index for one document type.
///
/// The descriptor is supplied by the caller; the client never derives it from
/// the document type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    #[serde(default)]
    fields: Vec<FieldMapping>,
}

/// One indexed field: where it lives in the document and how it is indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// JSONPath of the value inside the document, e.g. `$.balance`.
    pub path: String,
    /// Field name used in queries (`@balance:[10 20]`) and for sorting.
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub sortable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Text,
}

impl FieldKind {
    /// Keyword used by the store's index definition.
    pub fn as_keyword(&self) -> &'static str {
        match self {
            FieldKind::Numeric => "NUMERIC",
            FieldKind::Text => "TEXT",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_keyword())
    }
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a numeric field.
    pub fn numeric(self, path: &str, name: &str, sortable: bool) -> Self {
        self.field(path, name, FieldKind::Numeric, sortable)
    }

    /// Add a full-text field.
    pub fn text(self, path: &str, name: &str, sortable: bool) -> Self {
        self.field(path, name, FieldKind::Text, sortable)
    }

    pub fn field(mut self, path: &str, name: &str, kind: FieldKind, sortable: bool) -> Self {
        self.fields.push(FieldMapping {
            path: path.to_string(),
            name: name.to_string(),
            kind,
            sortable,
        });
        self
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that the descriptor can be turned into an index definition.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(DocStoreError::Schema(
                "Schema descriptor has no fields".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name.chars().any(|c| c.is_whitespace()) {
                return Err(DocStoreError::Schema(format!(
                    "Invalid index field name '{}'",
                    field.name
                )));
            }
            if !field.path.starts_with('$') {
                return Err(DocStoreError::Schema(format!(
                    "Field '{}' has path '{}', expected a JSONPath starting with '$'",
                    field.name, field.path
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DocStoreError::Schema(format!(
                    "Duplicate index field name '{}'",
                    field.name
                )));
            }
        }

        Ok(())
    }

    /// The `SCHEMA ...` section of an index definition.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(1 + self.fields.len() * 5);
        args.push("SCHEMA".to_string());
        for field in &self.fields {
            args.push(field.path.clone());
            args.push("AS".to_string());
            args.push(field.name.clone());
            args.push(field.kind.as_keyword().to_string());
            if field.sortable {
                args.push("SORTABLE".to_string());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn account_schema() -> SchemaDescriptor {
        SchemaDescriptor::new()
            .numeric("$.id", "id", false)
            .text("$.name", "name", true)
            .numeric("$.balance", "balance", true)
    }

    #[test]
    fn test_builder_keeps_order() {
        let schema = account_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "balance"]);
        assert_eq!(schema.get("balance").unwrap().kind, FieldKind::Numeric);
        assert!(schema.get("missing").is_none());
    }

    #[test]
    fn test_to_args() {
        let args = account_schema().to_args();
        assert_eq!(
            args,
            vec![
                "SCHEMA", "$.id", "AS", "id", "NUMERIC", "$.name", "AS", "name", "TEXT",
                "SORTABLE", "$.balance", "AS", "balance", "NUMERIC", "SORTABLE",
            ]
        );
    }

    #[test]
    fn test_validate_ok() {
        assert!(account_schema().validate().is_ok());
    }

    #[test]
    fn test_validate_empty() {
        assert!(matches!(
            SchemaDescriptor::new().validate(),
            Err(DocStoreError::Schema(_))
        ));
    }

    #[test]
    fn test_validate_bad_path() {
        let schema = SchemaDescriptor::new().numeric("balance", "balance", false);
        assert!(matches!(schema.validate(), Err(DocStoreError::Schema(_))));
    }

    #[test]
    fn test_validate_duplicate() {
        let schema = SchemaDescriptor::new()
            .numeric("$.a", "a", false)
            .text("$.b", "a", false);
        assert!(matches!(schema.validate(), Err(DocStoreError::Schema(_))));
    }
}
