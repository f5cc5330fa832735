use super::types::SchemaDescriptor;
use crate::error::Result;
use std::path::Path;

/// Parse a schema descriptor YAML file
pub fn parse_schema(path: &Path) -> Result<SchemaDescriptor> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema descriptor from a YAML string and validate it
pub fn parse_schema_str(content: &str) -> Result<SchemaDescriptor> {
    let schema: SchemaDescriptor = serde_yaml::from_str(content)?;
    schema.validate()?;
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use crate::DocStoreError;
    use std::io::Write;

    const ACCOUNT_SCHEMA: &str = r#"
fields:
  - path: $.id
    name: id
    kind: numeric
  - path: $.name
    name: name
    kind: text
    sortable: true
  - path: $.balance
    name: balance
    kind: numeric
    sortable: true
"#;

    #[test]
    fn test_parse_schema_str() {
        let schema = parse_schema_str(ACCOUNT_SCHEMA).unwrap();
        assert_eq!(schema.len(), 3);

        let fields = schema.fields();
        assert_eq!(fields[0].name, "id");
        assert_eq!(fields[0].kind, FieldKind::Numeric);
        assert!(!fields[0].sortable);
        assert_eq!(fields[1].path, "$.name");
        assert_eq!(fields[1].kind, FieldKind::Text);
        assert!(fields[1].sortable);
    }

    #[test]
    fn test_parse_schema_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ACCOUNT_SCHEMA.as_bytes()).unwrap();

        let schema = parse_schema(file.path()).unwrap();
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let yaml = "fields:\n  - { path: $.x, name: x, kind: vector }\n";
        assert!(matches!(parse_schema_str(yaml), Err(DocStoreError::Yaml(_))));
    }

    #[test]
    fn test_parse_rejects_duplicate_names() {
        let yaml = "fields:\n  - { path: $.a, name: x, kind: text }\n  - { path: $.b, name: x, kind: numeric }\n";
        assert!(matches!(parse_schema_str(yaml), Err(DocStoreError::Schema(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = parse_schema(Path::new("/nonexistent/schema.yaml"));
        assert!(matches!(result, Err(DocStoreError::Io(_))));
    }
}
